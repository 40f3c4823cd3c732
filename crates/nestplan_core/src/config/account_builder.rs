//! Account Builder DSL
//!
//! Accounts name their owner; `PlanBuilder` resolves the name to a person id.
//!
//! ```ignore
//! let tfsa = AccountBuilder::tfsa("Alex TFSA")
//!     .owned_by("Alex")
//!     .balance(60_000.0)
//!     .room(14_000.0);
//!
//! let joint = AccountBuilder::non_registered("Joint")
//!     .joint()
//!     .balance(200_000.0)
//!     .cost_basis(150_000.0);
//! ```

use crate::model::{
    Account, AccountId, AccountKind, AssetMix, MinimumWithdrawalTable, Owner, PersonId,
};

#[derive(Debug, Clone)]
pub(crate) enum OwnerRef {
    Person(String),
    Household,
}

/// Builder for creating accounts with a fluent API
#[derive(Debug, Clone)]
pub struct AccountBuilder {
    pub(crate) name: String,
    kind: AccountKind,
    pub(crate) owner: Option<OwnerRef>,
    balance: f64,
    asset_mix: AssetMix,
    contribution_room: Option<f64>,
    cost_basis: Option<f64>,
    minimum_withdrawals: Option<MinimumWithdrawalTable>,
    follows_glide_path: bool,
}

impl AccountBuilder {
    // =========================================================================
    // Preset Account Kind Constructors
    // =========================================================================

    #[must_use]
    pub fn new(name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: None,
            balance: 0.0,
            asset_mix: AssetMix::default(),
            contribution_room: None,
            cost_basis: None,
            minimum_withdrawals: None,
            follows_glide_path: true,
        }
    }

    /// Tax-deferred savings; withdrawals are ordinary income
    #[must_use]
    pub fn rrsp(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Rrsp)
    }

    /// Retirement income fund with a mandatory annual minimum
    #[must_use]
    pub fn rrif(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Rrif)
    }

    /// Tax-free savings; withdrawals are not taxed and restore room next year
    #[must_use]
    pub fn tfsa(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Tfsa)
    }

    /// Taxable account; withdrawals realize capital gains
    #[must_use]
    pub fn non_registered(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::NonRegistered)
    }

    /// Locked-in account; never drawn before conversion to a LIF
    #[must_use]
    pub fn lira(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Lira)
    }

    #[must_use]
    pub fn lif(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Lif)
    }

    // =========================================================================
    // Ownership and balances
    // =========================================================================

    #[must_use]
    pub fn owned_by(mut self, person: impl Into<String>) -> Self {
        self.owner = Some(OwnerRef::Person(person.into()));
        self
    }

    /// Shared by the household (non-registered only)
    #[must_use]
    pub fn joint(mut self) -> Self {
        self.owner = Some(OwnerRef::Household);
        self
    }

    #[must_use]
    pub fn balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    #[must_use]
    pub fn asset_mix(mut self, mix: AssetMix) -> Self {
        self.asset_mix = mix;
        self
    }

    /// Keep the configured mix instead of following the glide path
    #[must_use]
    pub fn fixed_mix(mut self) -> Self {
        self.follows_glide_path = false;
        self
    }

    #[must_use]
    pub fn room(mut self, room: f64) -> Self {
        self.contribution_room = Some(room);
        self
    }

    #[must_use]
    pub fn cost_basis(mut self, cost_basis: f64) -> Self {
        self.cost_basis = Some(cost_basis);
        self
    }

    #[must_use]
    pub fn minimum_withdrawals(mut self, table: MinimumWithdrawalTable) -> Self {
        self.minimum_withdrawals = Some(table);
        self
    }

    pub(crate) fn build(self, account_id: AccountId, owner: Owner) -> Account {
        Account {
            account_id,
            name: self.name,
            kind: self.kind,
            owner,
            balance: self.balance,
            asset_mix: self.asset_mix,
            contribution_room: self.contribution_room,
            cost_basis: self.cost_basis,
            minimum_withdrawals: self.minimum_withdrawals,
            follows_glide_path: self.follows_glide_path,
        }
    }

    /// Owner used when none is named: the household for non-registered
    /// accounts, otherwise the first person
    pub(crate) fn default_owner(&self, first_person: Option<PersonId>) -> Owner {
        match (self.kind, first_person) {
            (AccountKind::NonRegistered, _) | (_, None) => Owner::Household,
            (_, Some(id)) => Owner::Person(id),
        }
    }
}
