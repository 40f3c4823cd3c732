//! Mutable per-run state
//!
//! Each projection run (the deterministic run or one Monte Carlo trial) owns
//! a `ProjectionState` cloned from the validated plan. The orchestrator is
//! its only writer; nothing here is shared between runs.

use std::collections::BTreeMap;

use crate::error::ConstraintViolation;
use crate::model::{
    Account, AccountId, AccountKind, BenefitRules, Household, Owner, PersonId, RoomYear,
};

/// Balances within this amount of zero are treated as empty
pub const BALANCE_EPSILON: f64 = 1e-9;

/// Outcome of a single withdrawal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Withdrawal {
    pub amount: f64,
    /// Capital gain realized (non-registered only)
    pub realized_gain: f64,
}

/// Balance and yearly flows for one account
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub owner: Owner,
    pub balance: f64,
    /// Adjusted cost base (non-registered)
    pub cost_basis: f64,

    // Flows for the current year
    pub opening_balance: f64,
    pub mandatory_withdrawal: f64,
    pub discretionary_withdrawal: f64,
    pub contribution: f64,
    pub distribution: f64,
    pub realized_gain: f64,
}

impl AccountState {
    fn from_account(account: &Account) -> Self {
        Self {
            account_id: account.account_id,
            kind: account.kind,
            owner: account.owner,
            balance: account.balance,
            cost_basis: account.cost_basis.unwrap_or(account.balance),
            opening_balance: account.balance,
            mandatory_withdrawal: 0.0,
            discretionary_withdrawal: 0.0,
            contribution: 0.0,
            distribution: 0.0,
            realized_gain: 0.0,
        }
    }

    fn begin_year(&mut self) {
        self.opening_balance = self.balance;
        self.mandatory_withdrawal = 0.0;
        self.discretionary_withdrawal = 0.0;
        self.contribution = 0.0;
        self.distribution = 0.0;
        self.realized_gain = 0.0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balance <= BALANCE_EPSILON
    }

    /// Withdraw `amount`; asking for more than the balance is an overdraw.
    /// Non-registered withdrawals realize the proportional gain and reduce
    /// the cost base.
    pub fn withdraw(
        &mut self,
        amount: f64,
        mandatory: bool,
        year: i16,
    ) -> Result<Withdrawal, ConstraintViolation> {
        let available = self.balance.max(0.0);
        if amount > available + BALANCE_EPSILON {
            return Err(ConstraintViolation::Overdraw {
                account_id: self.account_id,
                year,
                requested: amount,
                available,
            });
        }
        let amount = amount.clamp(0.0, available);
        if amount <= 0.0 {
            return Ok(Withdrawal::default());
        }

        let mut realized_gain = 0.0;
        if self.kind == AccountKind::NonRegistered && self.balance > 0.0 {
            let share = amount / self.balance;
            realized_gain = amount * (1.0 - self.cost_basis / self.balance).max(0.0);
            self.cost_basis = (self.cost_basis * (1.0 - share)).max(0.0);
        }

        self.balance = (self.balance - amount).max(0.0);
        if mandatory {
            self.mandatory_withdrawal += amount;
        } else {
            self.discretionary_withdrawal += amount;
        }
        self.realized_gain += realized_gain;

        Ok(Withdrawal {
            amount,
            realized_gain,
        })
    }

    /// Pay out `amount` of interest and dividends in cash, capped at the
    /// balance. The cost base is unchanged.
    pub fn distribute(&mut self, amount: f64) -> f64 {
        let amount = amount.clamp(0.0, self.balance.max(0.0));
        self.balance -= amount;
        self.distribution += amount;
        amount
    }

    /// Put back up to `amount` of this year's discretionary withdrawals;
    /// returns the amount restored
    pub fn return_withdrawal(&mut self, amount: f64) -> f64 {
        let amount = amount.clamp(0.0, self.discretionary_withdrawal.max(0.0));
        if amount <= 0.0 {
            return 0.0;
        }
        if self.kind == AccountKind::NonRegistered {
            let gain = self.realized_gain * amount / self.discretionary_withdrawal;
            self.realized_gain -= gain;
            self.cost_basis += amount - gain;
        }
        self.discretionary_withdrawal -= amount;
        self.balance += amount;
        amount
    }

    pub fn contribute(&mut self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        self.balance += amount;
        self.contribution += amount;
        if self.kind == AccountKind::NonRegistered {
            self.cost_basis += amount;
        }
    }

    /// Apply a year's return to the post-flow balance; returns the growth
    pub fn grow(&mut self, rate: f64) -> f64 {
        let before = self.balance;
        self.balance = (before * (1.0 + rate)).max(0.0);
        self.balance - before
    }

    #[must_use]
    pub fn total_withdrawal(&self) -> f64 {
        self.mandatory_withdrawal + self.discretionary_withdrawal
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RoomEntry {
    remaining: f64,
    accrued: f64,
    consumed: f64,
    /// TFSA withdrawals re-credited next January
    pending_restore: f64,
}

/// Cumulative RRSP / TFSA contribution room per person
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomLedger {
    entries: BTreeMap<(PersonId, AccountKind), RoomEntry>,
}

impl RoomLedger {
    /// Opening room from the accounts' stated room; every person owning a
    /// room-tracked account gets an entry for that kind
    pub fn from_accounts(accounts: &[Account]) -> Result<Self, ConstraintViolation> {
        let mut entries: BTreeMap<(PersonId, AccountKind), RoomEntry> = BTreeMap::new();
        for account in accounts {
            let Some(person_id) = account.owner.person() else {
                continue;
            };
            if !account.kind.has_contribution_room() {
                continue;
            }
            let room = account.contribution_room.unwrap_or(0.0);
            if room < 0.0 {
                return Err(ConstraintViolation::NegativeRoom {
                    person_id,
                    kind: account.kind,
                    room,
                });
            }
            entries
                .entry((person_id, account.kind))
                .or_default()
                .remaining += room;
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn remaining(&self, person_id: PersonId, kind: AccountKind) -> f64 {
        self.entries
            .get(&(person_id, kind))
            .map_or(0.0, |e| e.remaining)
    }

    fn begin_year(&mut self) {
        for entry in self.entries.values_mut() {
            entry.accrued = 0.0;
            entry.consumed = 0.0;
            entry.remaining += entry.pending_restore;
            entry.pending_restore = 0.0;
        }
    }

    pub fn accrue(&mut self, person_id: PersonId, kind: AccountKind, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&(person_id, kind)) {
            entry.accrued += amount;
            entry.remaining += amount;
        }
    }

    /// Use room for a contribution; room never goes negative
    pub fn consume(
        &mut self,
        person_id: PersonId,
        kind: AccountKind,
        amount: f64,
        year: i16,
    ) -> Result<(), ConstraintViolation> {
        let available = self.remaining(person_id, kind);
        if amount < 0.0 || amount > available + BALANCE_EPSILON {
            return Err(ConstraintViolation::RoomExceeded {
                person_id,
                kind,
                year,
                requested: amount,
                available,
            });
        }
        if let Some(entry) = self.entries.get_mut(&(person_id, kind)) {
            entry.remaining = (entry.remaining - amount).max(0.0);
            entry.consumed += amount;
        }
        Ok(())
    }

    /// TFSA withdrawals become room again the following year
    pub fn schedule_restore(&mut self, person_id: PersonId, amount: f64) {
        if let Some(entry) = self.entries.get_mut(&(person_id, AccountKind::Tfsa)) {
            entry.pending_restore += amount.max(0.0);
        }
    }

    /// Room movement for the current year, one line per person and kind
    #[must_use]
    pub fn year_lines(&self) -> Vec<RoomYear> {
        self.entries
            .iter()
            .map(|(&(person_id, kind), e)| RoomYear {
                person_id,
                kind,
                accrued: e.accrued,
                consumed: e.consumed,
                remaining: e.remaining,
            })
            .collect()
    }
}

/// All mutable state of one run
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionState {
    pub accounts: Vec<AccountState>,
    pub room: RoomLedger,
    /// Earned income of the previous year, for RRSP room
    prior_earned: BTreeMap<PersonId, f64>,
}

impl ProjectionState {
    pub fn new(household: &Household) -> Result<Self, ConstraintViolation> {
        Ok(Self {
            accounts: household
                .accounts
                .iter()
                .map(AccountState::from_account)
                .collect(),
            room: RoomLedger::from_accounts(&household.accounts)?,
            prior_earned: BTreeMap::new(),
        })
    }

    /// Start-of-year transitions: reset flows, roll registered accounts to
    /// the surviving spouse, convert RRSP/LIRA past the conversion age,
    /// restore TFSA room and accrue the year's new room.
    pub fn begin_year(
        &mut self,
        year: i16,
        household: &Household,
        rules: &BenefitRules,
        conversion_age: u8,
        general_index: f64,
    ) {
        for account in &mut self.accounts {
            account.begin_year();
        }
        self.room.begin_year();

        let survivor = household.living_in(year).next().map(|p| p.person_id);
        for account in &mut self.accounts {
            let Owner::Person(owner_id) = account.owner else {
                continue;
            };
            let owner_alive = household
                .person(owner_id)
                .is_some_and(|p| p.is_alive_in(year));
            if !owner_alive && let Some(survivor) = survivor {
                account.owner = Owner::Person(survivor);
            }

            let Owner::Person(owner_id) = account.owner else {
                continue;
            };
            if let (Some(target), Some(owner)) =
                (account.kind.converts_to(), household.person(owner_id))
                && owner.age_in(year) > conversion_age
            {
                account.kind = target;
            }
        }

        if year <= household.start_year {
            return;
        }
        let contributions = &rules.contributions;
        for person in household.living_in(year) {
            let age = person.age_in(year);
            if age >= contributions.tfsa_minimum_age {
                self.room.accrue(
                    person.person_id,
                    AccountKind::Tfsa,
                    contributions.tfsa_limit(general_index),
                );
            }
            if age <= conversion_age {
                let earned = self
                    .prior_earned
                    .get(&person.person_id)
                    .copied()
                    .unwrap_or(0.0);
                self.room.accrue(
                    person.person_id,
                    AccountKind::Rrsp,
                    contributions.rrsp_accrual(earned, general_index),
                );
            }
        }
    }

    pub fn record_earned_income(&mut self, person_id: PersonId, earned: f64) {
        self.prior_earned.insert(person_id, earned);
    }

    #[must_use]
    pub fn net_worth(&self) -> f64 {
        self.accounts.iter().map(|a| a.balance.max(0.0)).sum()
    }

    #[must_use]
    pub fn account_index(&self, account_id: AccountId) -> Option<usize> {
        self.accounts.iter().position(|a| a.account_id == account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetMix;

    fn account(kind: AccountKind, balance: f64) -> Account {
        Account {
            account_id: AccountId(1),
            name: "A".into(),
            kind,
            owner: Owner::Person(PersonId(1)),
            balance,
            asset_mix: AssetMix::default(),
            contribution_room: None,
            cost_basis: None,
            minimum_withdrawals: None,
            follows_glide_path: true,
        }
    }

    #[test]
    fn test_overdraw_rejected_and_balance_untouched() {
        let mut state = AccountState::from_account(&account(AccountKind::Rrsp, 1_000.0));
        let err = state.withdraw(5_000.0, false, 2030).unwrap_err();
        assert_eq!(
            err,
            ConstraintViolation::Overdraw {
                account_id: AccountId(1),
                year: 2030,
                requested: 5_000.0,
                available: 1_000.0,
            }
        );
        assert_eq!(state.balance, 1_000.0);
        assert_eq!(state.discretionary_withdrawal, 0.0);

        let w = state.withdraw(1_000.0, false, 2030).unwrap();
        assert!((w.amount - 1_000.0).abs() < 1e-9);
        assert!(state.is_empty());
    }

    #[test]
    fn test_distribution_keeps_cost_base() {
        let mut acct = account(AccountKind::NonRegistered, 100_000.0);
        acct.cost_basis = Some(60_000.0);
        let mut state = AccountState::from_account(&acct);

        let paid = state.distribute(3_000.0);
        assert!((paid - 3_000.0).abs() < 1e-9);
        assert!((state.balance - 97_000.0).abs() < 1e-9);
        assert!((state.cost_basis - 60_000.0).abs() < 1e-9);
        assert_eq!(state.total_withdrawal(), 0.0);
        assert!((state.distribute(1e9) - 97_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_registered_gain_is_proportional() {
        let mut acct = account(AccountKind::NonRegistered, 100_000.0);
        acct.cost_basis = Some(60_000.0);
        let mut state = AccountState::from_account(&acct);

        let w = state.withdraw(10_000.0, false, 2025).unwrap();
        assert!((w.realized_gain - 4_000.0).abs() < 1e-9);
        assert!((state.cost_basis - 54_000.0).abs() < 1e-9);

        state.contribute(5_000.0);
        assert!((state.cost_basis - 59_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_returned_withdrawal_reverses_gain() {
        let mut acct = account(AccountKind::NonRegistered, 100_000.0);
        acct.cost_basis = Some(60_000.0);
        let mut state = AccountState::from_account(&acct);

        state.withdraw(10_000.0, false, 2025).unwrap();
        let back = state.return_withdrawal(4_000.0);
        assert!((back - 4_000.0).abs() < 1e-9);
        assert!((state.discretionary_withdrawal - 6_000.0).abs() < 1e-9);
        assert!((state.realized_gain - 2_400.0).abs() < 1e-9);
        assert!((state.balance - 94_000.0).abs() < 1e-9);
        assert!((state.cost_basis - 56_400.0).abs() < 1e-9);

        assert!((state.return_withdrawal(50_000.0) - 6_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_growth_after_flows() {
        let mut state = AccountState::from_account(&account(AccountKind::Rrif, 500_000.0));
        state.withdraw(20_000.0, true, 2025).unwrap();
        let growth = state.grow(0.05);
        assert!((growth - 24_000.0).abs() < 1e-9);
        assert!((state.balance - 504_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_loss_clamps_to_zero() {
        let mut state = AccountState::from_account(&account(AccountKind::Tfsa, 1_000.0));
        state.grow(-1.5);
        assert_eq!(state.balance, 0.0);
    }

    #[test]
    fn test_room_cannot_go_negative() {
        let mut acct = account(AccountKind::Tfsa, 0.0);
        acct.contribution_room = Some(5_000.0);
        let mut ledger = RoomLedger::from_accounts(&[acct]).unwrap();

        ledger
            .consume(PersonId(1), AccountKind::Tfsa, 3_000.0, 2025)
            .unwrap();
        assert!((ledger.remaining(PersonId(1), AccountKind::Tfsa) - 2_000.0).abs() < 1e-9);

        let err = ledger.consume(PersonId(1), AccountKind::Tfsa, 2_500.0, 2025);
        assert!(matches!(err, Err(ConstraintViolation::RoomExceeded { .. })));
        assert!((ledger.remaining(PersonId(1), AccountKind::Tfsa) - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_tfsa_withdrawal_restored_next_year() {
        let mut acct = account(AccountKind::Tfsa, 10_000.0);
        acct.contribution_room = Some(0.0);
        let mut ledger = RoomLedger::from_accounts(&[acct]).unwrap();

        ledger.schedule_restore(PersonId(1), 4_000.0);
        assert_eq!(ledger.remaining(PersonId(1), AccountKind::Tfsa), 0.0);
        ledger.begin_year();
        assert!((ledger.remaining(PersonId(1), AccountKind::Tfsa) - 4_000.0).abs() < 1e-9);
    }
}
