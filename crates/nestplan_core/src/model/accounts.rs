//! Account definitions
//!
//! Accounts are balances with a Canadian tax treatment. Registered kinds are
//! owned by exactly one person; non-registered accounts may be shared by the
//! household.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{AccountId, PersonId};
use super::market::ClassReturns;
use super::withdrawal_schedule::MinimumWithdrawalTable;

/// Tolerance for asset-mix weights summing to 1.0
pub const ASSET_MIX_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    /// Registered Retirement Savings Plan
    Rrsp,
    /// Registered Retirement Income Fund
    Rrif,
    /// Tax-Free Savings Account
    Tfsa,
    /// Open (taxable) account, capital gains on withdrawal
    NonRegistered,
    /// Locked-In Retirement Account
    Lira,
    /// Life Income Fund
    Lif,
}

/// How a withdrawal from an account enters taxable income
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalTaxation {
    /// Whole amount is ordinary income
    Ordinary,
    /// Only the realized gain, at the inclusion rate
    CapitalGains,
    /// Not taxable
    Exempt,
}

impl AccountKind {
    #[must_use]
    pub fn is_registered(self) -> bool {
        !matches!(self, AccountKind::NonRegistered)
    }

    /// RRSP and TFSA contributions are limited by room
    #[must_use]
    pub fn has_contribution_room(self) -> bool {
        matches!(self, AccountKind::Rrsp | AccountKind::Tfsa)
    }

    /// RRIF and LIF carry a mandatory annual minimum
    #[must_use]
    pub fn has_minimum_withdrawal(self) -> bool {
        matches!(self, AccountKind::Rrif | AccountKind::Lif)
    }

    #[must_use]
    pub fn is_locked_in(self) -> bool {
        matches!(self, AccountKind::Lira)
    }

    /// Whether surplus cash may be deposited into this kind
    #[must_use]
    pub fn accepts_contributions(self) -> bool {
        matches!(
            self,
            AccountKind::Rrsp | AccountKind::Tfsa | AccountKind::NonRegistered
        )
    }

    /// Kind the account becomes at the conversion age
    #[must_use]
    pub fn converts_to(self) -> Option<AccountKind> {
        match self {
            AccountKind::Rrsp => Some(AccountKind::Rrif),
            AccountKind::Lira => Some(AccountKind::Lif),
            _ => None,
        }
    }

    #[must_use]
    pub fn withdrawal_taxation(self) -> WithdrawalTaxation {
        match self {
            AccountKind::Rrsp | AccountKind::Rrif | AccountKind::Lira | AccountKind::Lif => {
                WithdrawalTaxation::Ordinary
            }
            AccountKind::NonRegistered => WithdrawalTaxation::CapitalGains,
            AccountKind::Tfsa => WithdrawalTaxation::Exempt,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AccountKind::Rrsp => "RRSP",
            AccountKind::Rrif => "RRIF",
            AccountKind::Tfsa => "TFSA",
            AccountKind::NonRegistered => "Non-Registered",
            AccountKind::Lira => "LIRA",
            AccountKind::Lif => "LIF",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who owns an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Person(PersonId),
    /// Joint ownership; only valid for non-registered accounts
    Household,
}

impl Owner {
    #[must_use]
    pub fn person(self) -> Option<PersonId> {
        match self {
            Owner::Person(id) => Some(id),
            Owner::Household => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    FixedIncome,
    Cash,
    RealEstate,
}

impl AssetClass {
    pub const ALL: [AssetClass; 4] = [
        AssetClass::Equity,
        AssetClass::FixedIncome,
        AssetClass::Cash,
        AssetClass::RealEstate,
    ];
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetClass::Equity => "equity",
            AssetClass::FixedIncome => "fixed income",
            AssetClass::Cash => "cash",
            AssetClass::RealEstate => "real estate",
        };
        f.write_str(label)
    }
}

/// Portfolio weights by asset class; must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetMix {
    pub equity: f64,
    pub fixed_income: f64,
    pub cash: f64,
    pub real_estate: f64,
}

impl Default for AssetMix {
    fn default() -> Self {
        Self::balanced()
    }
}

impl AssetMix {
    #[must_use]
    pub fn new(equity: f64, fixed_income: f64, cash: f64, real_estate: f64) -> Self {
        Self {
            equity,
            fixed_income,
            cash,
            real_estate,
        }
    }

    /// 60/40 equity / fixed income
    #[must_use]
    pub fn balanced() -> Self {
        Self::new(0.6, 0.4, 0.0, 0.0)
    }

    #[must_use]
    pub fn all_equity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    #[must_use]
    pub fn all_cash() -> Self {
        Self::new(0.0, 0.0, 1.0, 0.0)
    }

    #[must_use]
    pub fn weight(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::Equity => self.equity,
            AssetClass::FixedIncome => self.fixed_income,
            AssetClass::Cash => self.cash,
            AssetClass::RealEstate => self.real_estate,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.equity + self.fixed_income + self.cash + self.real_estate
    }

    #[must_use]
    pub fn is_normalized(&self) -> bool {
        AssetClass::ALL.iter().all(|c| self.weight(*c) >= 0.0)
            && (self.total() - 1.0).abs() <= ASSET_MIX_TOLERANCE
    }

    /// Replace the equity weight, spreading the remainder over the other
    /// classes in their existing proportions, then renormalize to 1.0.
    #[must_use]
    pub fn with_equity(&self, equity: f64) -> Self {
        let equity = equity.clamp(0.0, 1.0);
        let rest = 1.0 - equity;
        let others = self.fixed_income + self.cash + self.real_estate;

        let mix = if others > 0.0 {
            Self::new(
                equity,
                rest * self.fixed_income / others,
                rest * self.cash / others,
                rest * self.real_estate / others,
            )
        } else {
            Self::new(equity, rest, 0.0, 0.0)
        };

        let total = mix.total();
        if total > 0.0 {
            Self::new(
                mix.equity / total,
                mix.fixed_income / total,
                mix.cash / total,
                mix.real_estate / total,
            )
        } else {
            mix
        }
    }

    /// Weighted return for a year's class returns
    #[must_use]
    pub fn blended_return(&self, returns: &ClassReturns) -> f64 {
        self.equity * returns.equity
            + self.fixed_income * returns.fixed_income
            + self.cash * returns.cash
            + self.real_estate * returns.real_estate
    }
}

/// A savings or investment account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub name: String,
    pub kind: AccountKind,
    pub owner: Owner,
    pub balance: f64,
    #[serde(default)]
    pub asset_mix: AssetMix,
    /// Unused contribution room (RRSP / TFSA only)
    #[serde(default)]
    pub contribution_room: Option<f64>,
    /// Adjusted cost base (non-registered only); defaults to the balance
    #[serde(default)]
    pub cost_basis: Option<f64>,
    /// Age-indexed minimum schedule (RRIF / LIF, or the RRSP / LIRA that
    /// will convert); the strategy's table applies when absent
    #[serde(default)]
    pub minimum_withdrawals: Option<MinimumWithdrawalTable>,
    /// Whether the household glide path overrides this account's equity weight
    #[serde(default = "default_true")]
    pub follows_glide_path: bool,
}

fn default_true() -> bool {
    true
}
