//! Plan configuration
//!
//! `PlanConfig` is the complete, typed engine input: the household plus the
//! economic assumptions, tax tables, benefit rules and the drawdown strategy.
//! Every invariant is checked once by [`PlanConfig::validate`] before any year
//! is simulated.
//!
//! # Builder DSL
//!
//! ```ignore
//! use nestplan_core::config::{AccountBuilder, PersonBuilder, PlanBuilder};
//! use nestplan_core::model::Province;
//!
//! let plan = PlanBuilder::new()
//!     .start_year(2025)
//!     .person(PersonBuilder::new("Alex").born(1960, 3, 1).province(Province::Ontario))
//!     .account(AccountBuilder::rrif("Alex RRIF").owned_by("Alex").balance(500_000.0))
//!     .build();
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConstraintViolation, ProjectionError};
use crate::model::{
    AccountId, AccountKind, AssumptionSet, BenefitRules, ExpenseKind, Household,
    MinimumWithdrawalTable, Owner, PersonId, TaxTables,
};

pub mod account_builder;
pub mod builder;
pub mod person_builder;

pub use account_builder::AccountBuilder;
pub use builder::PlanBuilder;
pub use person_builder::PersonBuilder;

/// Order in which accounts are drawn to cover a deficit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalOrder {
    /// By account kind; accounts of one kind are drawn in household order
    ByKind(Vec<AccountKind>),
    /// Explicit account sequence
    ByAccount(Vec<AccountId>),
}

/// Kinds drawn by the default order; accounts an explicit order leaves out
/// follow in this sequence
pub const DEFAULT_WITHDRAWAL_KINDS: [AccountKind; 5] = [
    AccountKind::NonRegistered,
    AccountKind::Rrif,
    AccountKind::Lif,
    AccountKind::Rrsp,
    AccountKind::Tfsa,
];

impl Default for WithdrawalOrder {
    fn default() -> Self {
        WithdrawalOrder::ByKind(DEFAULT_WITHDRAWAL_KINDS.to_vec())
    }
}

/// Bounds on the per-year withdrawal / tax settlement loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementPolicy {
    /// Residuals within this many dollars are considered settled
    pub tolerance: f64,
    pub max_rounds: u32,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            max_rounds: 64,
        }
    }
}

/// Decumulation and accumulation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategy {
    pub withdrawal_order: WithdrawalOrder,
    /// Where surplus cash goes, in order
    pub contribution_priority: Vec<AccountKind>,
    /// RRSP and LIRA accounts convert the year after the owner reaches this age
    pub conversion_age: u8,
    pub minimum_withdrawals: MinimumWithdrawalTable,
    pub settlement: SettlementPolicy,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            withdrawal_order: WithdrawalOrder::default(),
            contribution_priority: vec![
                AccountKind::Tfsa,
                AccountKind::Rrsp,
                AccountKind::NonRegistered,
            ],
            conversion_age: 71,
            minimum_withdrawals: MinimumWithdrawalTable::canadian_prescribed(),
            settlement: SettlementPolicy::default(),
        }
    }
}

impl Strategy {
    pub fn validate(&self, household: &Household) -> Result<(), ConfigError> {
        if let Some(kind) = self
            .contribution_priority
            .iter()
            .find(|k| !k.accepts_contributions())
        {
            return Err(ConfigError::InvalidStrategy(format!(
                "{kind} cannot receive contributions"
            )));
        }
        if let WithdrawalOrder::ByAccount(ids) = &self.withdrawal_order {
            for id in ids {
                if !household.accounts.iter().any(|a| a.account_id == *id) {
                    return Err(ConfigError::UnknownAccount(*id));
                }
            }
        }
        if !(55..=90).contains(&self.conversion_age) {
            return Err(ConfigError::InvalidParameter {
                field: "strategy.conversion_age",
                value: f64::from(self.conversion_age),
                reason: "must be between 55 and 90",
            });
        }
        if self.settlement.tolerance <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "strategy.settlement.tolerance",
                value: self.settlement.tolerance,
                reason: "must be positive",
            });
        }
        if self.settlement.max_rounds == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "strategy.settlement.max_rounds",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        self.minimum_withdrawals.validate()
    }
}

/// Complete engine input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub household: Household,
    #[serde(default)]
    pub assumptions: AssumptionSet,
    #[serde(default)]
    pub tax_tables: TaxTables,
    #[serde(default)]
    pub benefit_rules: BenefitRules,
    #[serde(default)]
    pub strategy: Strategy,
}

impl PlanConfig {
    /// Check every input invariant; the first violation is returned
    pub fn validate(&self) -> Result<(), ProjectionError> {
        self.validate_household()?;
        self.assumptions.validate()?;
        self.tax_tables.validate()?;
        self.benefit_rules.validate()?;
        self.strategy.validate(&self.household)?;

        for person in &self.household.persons {
            self.tax_tables.provincial_table(person.province)?;
        }
        Ok(())
    }

    fn validate_household(&self) -> Result<(), ProjectionError> {
        let household = &self.household;
        if household.persons.is_empty() {
            return Err(ConfigError::EmptyHousehold.into());
        }

        let mut person_ids = HashSet::new();
        for person in &household.persons {
            if !person_ids.insert(person.person_id) {
                return Err(ConfigError::DuplicatePerson(person.person_id).into());
            }
            if let Some(cpp) = &person.cpp {
                self.benefit_rules
                    .cpp
                    .validate_entitlement(person.person_id, cpp)?;
            }
            if let Some(oas) = &person.oas {
                self.benefit_rules
                    .oas
                    .validate_entitlement(person.person_id, oas)?;
            }
            for source in &person.income_sources {
                if source.amount < 0.0 || !source.amount.is_finite() {
                    return Err(ConfigError::NegativeAmount {
                        account_id: None,
                        person_id: Some(person.person_id),
                        field: "income_sources.amount",
                        value: source.amount,
                    }
                    .into());
                }
            }
        }

        let mut account_ids = HashSet::new();
        for account in &household.accounts {
            let id = account.account_id;
            if !account_ids.insert(id) {
                return Err(ConfigError::DuplicateAccount(id).into());
            }
            match account.owner {
                Owner::Person(person_id) if !person_ids.contains(&person_id) => {
                    return Err(ConfigError::UnknownPerson {
                        person_id,
                        context: "account owner",
                    }
                    .into());
                }
                Owner::Household if account.kind.is_registered() => {
                    return Err(ConfigError::RegisteredAccountNotPersonal {
                        account_id: id,
                        kind: account.kind,
                    }
                    .into());
                }
                _ => {}
            }
            if account.balance < 0.0 || !account.balance.is_finite() {
                return Err(ConfigError::NegativeAmount {
                    account_id: Some(id),
                    person_id: None,
                    field: "balance",
                    value: account.balance,
                }
                .into());
            }
            if !account.asset_mix.is_normalized() {
                return Err(ConfigError::AssetMixNotNormalized {
                    account_id: id,
                    total: account.asset_mix.total(),
                }
                .into());
            }
            if let Some(room) = account.contribution_room {
                if !account.kind.has_contribution_room() {
                    return Err(ConfigError::RoomNotApplicable {
                        account_id: id,
                        kind: account.kind,
                    }
                    .into());
                }
                if room < 0.0 {
                    let person_id = account.owner.person().unwrap_or(PersonId(0));
                    return Err(ConstraintViolation::NegativeRoom {
                        person_id,
                        kind: account.kind,
                        room,
                    }
                    .into());
                }
            }
            if let Some(acb) = account.cost_basis
                && acb < 0.0
            {
                return Err(ConfigError::NegativeAmount {
                    account_id: Some(id),
                    person_id: None,
                    field: "cost_basis",
                    value: acb,
                }
                .into());
            }
            if let Some(table) = &account.minimum_withdrawals {
                table.validate()?;
            }
        }

        for expense in &household.expenses {
            if expense.amount < 0.0 || !expense.amount.is_finite() {
                return Err(ConfigError::NegativeAmount {
                    account_id: None,
                    person_id: None,
                    field: "expenses.amount",
                    value: expense.amount,
                }
                .into());
            }
            if let ExpenseKind::Periodic { every_years: 0, .. } = expense.kind {
                return Err(ConfigError::InvalidParameter {
                    field: "expenses.every_years",
                    value: 0.0,
                    reason: "must be at least 1",
                }
                .into());
            }
        }
        Ok(())
    }
}
