//! Plan Builder
//!
//! Fluent construction of a `PlanConfig` with automatic id assignment.
//! Persons receive `PersonId(1)`, `PersonId(2)`, ... and accounts receive
//! `AccountId(1)`, `AccountId(2)`, ... in the order they are added.
//!
//! ```ignore
//! let plan = PlanBuilder::new()
//!     .start_year(2025)
//!     .person(PersonBuilder::new("Alex").born(1960, 1, 1).oas(65))
//!     .person(PersonBuilder::new("Sam").born(1962, 5, 9))
//!     .account(AccountBuilder::rrif("Alex RRIF").owned_by("Alex").balance(400_000.0))
//!     .account(AccountBuilder::non_registered("Joint").joint().balance(150_000.0))
//!     .expense(Expense::recurring("Living", 60_000.0, ExpenseCategory::Other))
//!     .inflation(0.02)
//!     .build();
//! ```

use std::collections::HashMap;

use super::account_builder::{AccountBuilder, OwnerRef};
use super::person_builder::PersonBuilder;
use super::{PlanConfig, Strategy, WithdrawalOrder};
use crate::model::{
    AccountId, AccountKind, AssetClass, AssetClassAssumption, AssumptionSet, BenefitRules,
    BlackSwan, DistributionYields, Expense, GlidePath, Household, Owner, PersonId,
    ReturnAssumptions, ReturnModel, SpendingSmile, TaxTables,
};

/// Placeholder id for an owner name that matches no person; rejected by
/// `PlanConfig::validate`
const UNRESOLVED_PERSON: PersonId = PersonId(u16::MAX);

pub struct PlanBuilder {
    start_year: i16,
    end_year_override: Option<i16>,
    persons: Vec<PersonBuilder>,
    accounts: Vec<AccountBuilder>,
    expenses: Vec<Expense>,
    assumptions: AssumptionSet,
    tax_tables: TaxTables,
    benefit_rules: BenefitRules,
    strategy: Strategy,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_year: 2025,
            end_year_override: None,
            persons: Vec::new(),
            accounts: Vec::new(),
            expenses: Vec::new(),
            assumptions: AssumptionSet::default(),
            tax_tables: TaxTables::default(),
            benefit_rules: BenefitRules::default(),
            strategy: Strategy::default(),
        }
    }

    // =========================================================================
    // Household
    // =========================================================================

    #[must_use]
    pub fn start_year(mut self, year: i16) -> Self {
        self.start_year = year;
        self
    }

    /// Stop the projection early (never extends past life expectancy)
    #[must_use]
    pub fn end_year(mut self, year: i16) -> Self {
        self.end_year_override = Some(year);
        self
    }

    #[must_use]
    pub fn person(mut self, person: PersonBuilder) -> Self {
        self.persons.push(person);
        self
    }

    #[must_use]
    pub fn account(mut self, account: AccountBuilder) -> Self {
        self.accounts.push(account);
        self
    }

    #[must_use]
    pub fn expense(mut self, expense: Expense) -> Self {
        self.expenses.push(expense);
        self
    }

    // =========================================================================
    // Assumptions
    // =========================================================================

    #[must_use]
    pub fn assumptions(mut self, assumptions: AssumptionSet) -> Self {
        self.assumptions = assumptions;
        self
    }

    #[must_use]
    pub fn inflation(mut self, general: f64) -> Self {
        self.assumptions.inflation.general = general;
        self
    }

    #[must_use]
    pub fn healthcare_premium(mut self, premium: f64) -> Self {
        self.assumptions.inflation.healthcare_premium = premium;
        self
    }

    #[must_use]
    pub fn returns(mut self, returns: ReturnAssumptions) -> Self {
        self.assumptions.returns = returns;
        self
    }

    #[must_use]
    pub fn asset_return(mut self, class: AssetClass, mean: f64, volatility: f64) -> Self {
        *self.assumptions.returns.get_mut(class) = AssetClassAssumption::new(mean, volatility);
        self
    }

    /// Every asset class returns `rate` with no volatility
    #[must_use]
    pub fn flat_returns(mut self, rate: f64) -> Self {
        for class in AssetClass::ALL {
            *self.assumptions.returns.get_mut(class) = AssetClassAssumption::fixed(rate);
        }
        self
    }

    #[must_use]
    pub fn glide_path(mut self, glide_path: GlidePath) -> Self {
        self.assumptions.glide_path = Some(glide_path);
        self
    }

    #[must_use]
    pub fn black_swan(mut self, shock: BlackSwan) -> Self {
        self.assumptions.black_swan = Some(shock);
        self
    }

    #[must_use]
    pub fn spending_smile(mut self, smile: SpendingSmile) -> Self {
        self.assumptions.spending_smile = smile;
        self
    }

    #[must_use]
    pub fn return_model(mut self, model: ReturnModel) -> Self {
        self.assumptions.return_model = model;
        self
    }

    /// Interest and dividend yields paid out of non-registered holdings
    #[must_use]
    pub fn distributions(mut self, yields: DistributionYields) -> Self {
        self.assumptions.distributions = yields;
        self
    }

    // =========================================================================
    // Rules and strategy
    // =========================================================================

    #[must_use]
    pub fn tax_tables(mut self, tables: TaxTables) -> Self {
        self.tax_tables = tables;
        self
    }

    #[must_use]
    pub fn benefit_rules(mut self, rules: BenefitRules) -> Self {
        self.benefit_rules = rules;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn withdrawal_order(mut self, order: WithdrawalOrder) -> Self {
        self.strategy.withdrawal_order = order;
        self
    }

    #[must_use]
    pub fn contribution_priority(mut self, kinds: Vec<AccountKind>) -> Self {
        self.strategy.contribution_priority = kinds;
        self
    }

    #[must_use]
    pub fn conversion_age(mut self, age: u8) -> Self {
        self.strategy.conversion_age = age;
        self
    }

    /// Resolve names to ids and produce the configuration
    #[must_use]
    pub fn build(self) -> PlanConfig {
        let mut person_ids: HashMap<String, PersonId> = HashMap::new();
        let persons: Vec<_> = self
            .persons
            .into_iter()
            .zip(1u16..)
            .map(|(builder, id)| {
                person_ids.insert(builder.name.clone(), PersonId(id));
                builder.build(PersonId(id))
            })
            .collect();
        let first_person = persons.first().map(|p| p.person_id);

        let accounts = self
            .accounts
            .into_iter()
            .zip(1u16..)
            .map(|(builder, id)| {
                let owner = match &builder.owner {
                    Some(OwnerRef::Person(name)) => {
                        Owner::Person(person_ids.get(name).copied().unwrap_or(UNRESOLVED_PERSON))
                    }
                    Some(OwnerRef::Household) => Owner::Household,
                    None => builder.default_owner(first_person),
                };
                builder.build(AccountId(id), owner)
            })
            .collect();

        PlanConfig {
            household: Household {
                start_year: self.start_year,
                end_year_override: self.end_year_override,
                persons,
                accounts,
                expenses: self.expenses,
            },
            assumptions: self.assumptions,
            tax_tables: self.tax_tables,
            benefit_rules: self.benefit_rules,
            strategy: self.strategy,
        }
    }
}
