//! Withdrawal / contribution engine
//!
//! Settles one year's cash flow. Mandatory RRIF/LIF minimums are taken
//! first, unconditionally. Then a bounded loop alternates between computing
//! household tax on everything withdrawn so far and correcting the residual:
//! a deficit draws grossed-up top-ups down the withdrawal order until it is
//! covered or every account is empty, while a surplus first puts back any over-drawn top-up and is
//! otherwise contributed by priority within contribution room. The loop ends
//! when the residual is within tolerance, when no account can move, or at
//! the round cap.

use tracing::{trace, warn};

use crate::config::{DEFAULT_WITHDRAWAL_KINDS, Strategy, WithdrawalOrder};
use crate::error::ProjectionError;
use crate::model::{AccountKind, Household, Owner, PersonId, WithdrawalTaxation};
use crate::projection_state::{BALANCE_EPSILON, ProjectionState};
use crate::taxes::{HouseholdTax, PersonIncome, YearTaxContext};

/// Everything the settlement loop needs to know about the year
#[derive(Debug)]
pub struct SettlementInput<'a, 'b> {
    pub year: i16,
    pub household: &'a Household,
    pub strategy: &'a Strategy,
    pub tax: &'a YearTaxContext<'b>,
    pub capital_gains_inclusion: f64,
    /// Age from which RRIF/LIF withdrawals are eligible pension income
    pub rrif_eligible_age: u8,
    /// Non-portfolio taxable components for each living person, in
    /// household order
    pub base_incomes: Vec<PersonIncome>,
    /// All non-portfolio cash received, taxable or not, before tax
    pub cash_inflow: f64,
    pub expenses: f64,
}

/// Portfolio-driven tax components for one person
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortfolioIncome {
    pub registered_withdrawals: f64,
    pub taxable_capital_gains: f64,
    pub rrsp_deduction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub tax: HouseholdTax,
    /// Final taxable components, same order as `base_incomes`
    pub incomes: Vec<PersonIncome>,
    pub portfolio: Vec<PortfolioIncome>,
    pub realized_capital_gains: f64,
    pub total_withdrawals: f64,
    pub total_contributions: f64,
    pub shortfall: f64,
    pub unallocated_surplus: f64,
    pub rounds: u32,
}

/// Take every RRIF/LIF minimum for the year from the opening balance
pub fn take_minimum_withdrawals(
    year: i16,
    household: &Household,
    strategy: &Strategy,
    state: &mut ProjectionState,
) -> Result<(), ProjectionError> {
    for account in &mut state.accounts {
        if !account.kind.has_minimum_withdrawal() {
            continue;
        }
        let Some(owner) = account.owner.person().and_then(|id| household.person(id)) else {
            continue;
        };
        let table = household
            .accounts
            .iter()
            .find(|a| a.account_id == account.account_id)
            .and_then(|a| a.minimum_withdrawals.as_ref())
            .unwrap_or(&strategy.minimum_withdrawals);
        let minimum = table
            .minimum_for(account.opening_balance, owner.age_in(year))
            .min(account.balance.max(0.0));
        account.withdraw(minimum, true, year)?;
    }
    Ok(())
}

/// Account indices in the order they are drawn this round. Listed accounts
/// come first; withdrawable accounts not named by the order follow in the
/// default kind order. Locked-in accounts are never drawn.
#[must_use]
pub fn withdrawal_sequence(order: &WithdrawalOrder, state: &ProjectionState) -> Vec<usize> {
    let withdrawable = |i: &usize| !state.accounts[*i].kind.is_locked_in();
    let mut sequence: Vec<usize> = match order {
        WithdrawalOrder::ByKind(kinds) => kinds
            .iter()
            .flat_map(|kind| {
                (0..state.accounts.len()).filter(move |i| state.accounts[*i].kind == *kind)
            })
            .filter(withdrawable)
            .collect(),
        WithdrawalOrder::ByAccount(ids) => ids
            .iter()
            .filter_map(|id| state.account_index(*id))
            .filter(withdrawable)
            .collect(),
    };

    for kind in DEFAULT_WITHDRAWAL_KINDS {
        for i in 0..state.accounts.len() {
            if state.accounts[i].kind == kind && !sequence.contains(&i) {
                sequence.push(i);
            }
        }
    }
    sequence
}

fn portfolio_incomes(
    input: &SettlementInput<'_, '_>,
    state: &ProjectionState,
) -> Vec<PortfolioIncome> {
    let living: Vec<PersonId> = input.base_incomes.iter().map(|i| i.person_id).collect();
    let mut portfolio = vec![PortfolioIncome::default(); living.len()];
    let position = |id: PersonId| living.iter().position(|p| *p == id);

    for account in &state.accounts {
        match (account.kind.withdrawal_taxation(), account.owner) {
            (WithdrawalTaxation::Ordinary, Owner::Person(id)) => {
                if let Some(i) = position(id) {
                    portfolio[i].registered_withdrawals += account.total_withdrawal();
                }
            }
            (WithdrawalTaxation::CapitalGains, Owner::Person(id)) => {
                if let Some(i) = position(id) {
                    portfolio[i].taxable_capital_gains +=
                        account.realized_gain * input.capital_gains_inclusion;
                }
            }
            (WithdrawalTaxation::CapitalGains, Owner::Household) if !living.is_empty() => {
                let share = account.realized_gain * input.capital_gains_inclusion
                    / living.len() as f64;
                for entry in &mut portfolio {
                    entry.taxable_capital_gains += share;
                }
            }
            _ => {}
        }
        if account.kind == AccountKind::Rrsp
            && let Owner::Person(id) = account.owner
            && let Some(i) = position(id)
        {
            portfolio[i].rrsp_deduction += account.contribution;
        }
    }
    portfolio
}

fn current_incomes(
    input: &SettlementInput<'_, '_>,
    state: &ProjectionState,
    portfolio: &[PortfolioIncome],
) -> Vec<PersonIncome> {
    input
        .base_incomes
        .iter()
        .zip(portfolio)
        .map(|(base, extra)| {
            let eligible_rrif: f64 = input
                .household
                .person(base.person_id)
                .filter(|p| p.age_in(input.year) >= input.rrif_eligible_age)
                .map_or(0.0, |_| {
                    state
                        .accounts
                        .iter()
                        .filter(|a| {
                            a.kind.has_minimum_withdrawal()
                                && a.owner == Owner::Person(base.person_id)
                        })
                        .map(|a| a.total_withdrawal())
                        .sum()
                });
            PersonIncome {
                ordinary_income: base.ordinary_income + extra.registered_withdrawals,
                taxable_capital_gains: base.taxable_capital_gains + extra.taxable_capital_gains,
                deductions: base.deductions + extra.rrsp_deduction,
                eligible_pension_income: base.eligible_pension_income + eligible_rrif,
                ..*base
            }
        })
        .collect()
}

/// Gross amount to withdraw from account `index` so that roughly `needed`
/// is left after the tax it triggers
fn gross_withdrawal(
    needed: f64,
    index: usize,
    input: &SettlementInput<'_, '_>,
    state: &ProjectionState,
    incomes: &[PersonIncome],
) -> Result<f64, ProjectionError> {
    let account = &state.accounts[index];
    let payer = match account.owner {
        Owner::Person(id) => incomes.iter().find(|i| i.person_id == id),
        Owner::Household => incomes.first(),
    };
    let Some(payer) = payer else {
        return Ok(needed);
    };

    let gross = match account.kind.withdrawal_taxation() {
        WithdrawalTaxation::Exempt => needed,
        WithdrawalTaxation::Ordinary => input.tax.gross_up(needed, payer)?,
        WithdrawalTaxation::CapitalGains => {
            let gain_ratio = if account.balance > 0.0 {
                (1.0 - account.cost_basis / account.balance).max(0.0)
            } else {
                0.0
            };
            let rate =
                input.tax.marginal_rate(payer)? * gain_ratio * input.capital_gains_inclusion;
            needed / (1.0 - rate.min(0.95))
        }
    };
    Ok(gross)
}

/// Draw grossed-up top-ups down the withdrawal sequence until `needed` is
/// covered or the sequence runs out; returns whether any account moved.
/// A partly covered need carries to the next account in the same round.
fn draw_deficit(
    needed: f64,
    input: &SettlementInput<'_, '_>,
    state: &mut ProjectionState,
    incomes: &[PersonIncome],
) -> Result<bool, ProjectionError> {
    let mut remaining = needed;
    let mut moved = false;
    for index in withdrawal_sequence(&input.strategy.withdrawal_order, state) {
        if remaining <= BALANCE_EPSILON {
            break;
        }
        if state.accounts[index].is_empty() {
            continue;
        }
        let gross = gross_withdrawal(remaining, index, input, state, incomes)?;
        if gross <= BALANCE_EPSILON {
            continue;
        }
        let drawn = gross.min(state.accounts[index].balance);
        let taken = state.accounts[index]
            .withdraw(drawn, false, input.year)?
            .amount;
        moved |= taken > 0.0;
        remaining -= remaining * (taken / gross).min(1.0);
    }
    Ok(moved)
}

/// Contribute `surplus` by priority; returns the amount placed
fn contribute_surplus(
    surplus: f64,
    input: &SettlementInput<'_, '_>,
    state: &mut ProjectionState,
) -> Result<f64, ProjectionError> {
    let mut remaining = surplus;
    for kind in &input.strategy.contribution_priority {
        if remaining <= BALANCE_EPSILON {
            break;
        }
        match kind {
            AccountKind::Tfsa | AccountKind::Rrsp => {
                for income in &input.base_incomes {
                    let person_id = income.person_id;
                    let Some(index) = state
                        .accounts
                        .iter()
                        .position(|a| a.kind == *kind && a.owner == Owner::Person(person_id))
                    else {
                        continue;
                    };
                    let amount = remaining.min(state.room.remaining(person_id, *kind));
                    if amount <= BALANCE_EPSILON {
                        continue;
                    }
                    state.room.consume(person_id, *kind, amount, input.year)?;
                    state.accounts[index].contribute(amount);
                    remaining -= amount;
                }
            }
            AccountKind::NonRegistered => {
                let index = state
                    .accounts
                    .iter()
                    .position(|a| {
                        a.kind == AccountKind::NonRegistered && a.owner == Owner::Household
                    })
                    .or_else(|| {
                        state
                            .accounts
                            .iter()
                            .position(|a| a.kind == AccountKind::NonRegistered)
                    });
                if let Some(index) = index {
                    state.accounts[index].contribute(remaining);
                    remaining = 0.0;
                }
            }
            AccountKind::Rrif | AccountKind::Lira | AccountKind::Lif => {}
        }
    }
    Ok(surplus - remaining)
}

/// Settle the year: minimums must already have been taken
pub fn settle_year(
    input: &SettlementInput<'_, '_>,
    state: &mut ProjectionState,
) -> Result<Settlement, ProjectionError> {
    let policy = input.strategy.settlement;
    let mut rounds = 0;
    let mut shortfall = 0.0;
    let mut unallocated_surplus = 0.0;

    loop {
        let portfolio = portfolio_incomes(input, state);
        let incomes = current_incomes(input, state, &portfolio);
        let tax = input.tax.household_tax(&incomes)?;

        let withdrawals: f64 = state.accounts.iter().map(|a| a.total_withdrawal()).sum();
        let contributions: f64 = state.accounts.iter().map(|a| a.contribution).sum();
        let residual = input.cash_inflow + withdrawals
            - contributions
            - input.expenses
            - tax.total_burden();

        trace!(
            year = input.year,
            round = rounds,
            residual,
            withdrawals,
            contributions,
            tax = tax.total_tax(),
            "settlement round"
        );

        let settled = residual.abs() <= policy.tolerance;
        let capped = rounds >= policy.max_rounds;
        let moved = if settled || capped {
            false
        } else if residual < 0.0 {
            draw_deficit(-residual, input, state, &incomes)?
        } else {
            // An overshooting top-up is put back before anything is contributed
            let sequence = withdrawal_sequence(&input.strategy.withdrawal_order, state);
            let drawn = sequence
                .into_iter()
                .rev()
                .find(|i| state.accounts[*i].discretionary_withdrawal > BALANCE_EPSILON);
            match drawn {
                Some(index) => state.accounts[index].return_withdrawal(residual) > 0.0,
                None => contribute_surplus(residual, input, state)? > BALANCE_EPSILON,
            }
        };

        if !moved {
            if capped && !settled {
                warn!(
                    year = input.year,
                    residual,
                    max_rounds = policy.max_rounds,
                    "settlement hit round cap"
                );
            }
            if residual < -policy.tolerance {
                shortfall = -residual;
            } else if residual > policy.tolerance {
                unallocated_surplus = residual;
            }
            for account in &state.accounts {
                if account.kind == AccountKind::Tfsa
                    && let Owner::Person(person_id) = account.owner
                {
                    state.room.schedule_restore(person_id, account.total_withdrawal());
                }
            }
            let realized_capital_gains = state.accounts.iter().map(|a| a.realized_gain).sum();
            return Ok(Settlement {
                tax,
                incomes,
                portfolio,
                realized_capital_gains,
                total_withdrawals: withdrawals,
                total_contributions: contributions,
                shortfall,
                unallocated_surplus,
                rounds,
            });
        }
        rounds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountBuilder, PersonBuilder, PlanBuilder, PlanConfig};
    use crate::model::{AccountId, Province};
    use crate::taxes::TaxCalculator;

    fn run(plan: &PlanConfig, cash_inflow: f64, expenses: f64) -> (Settlement, ProjectionState) {
        let household = &plan.household;
        let year = household.start_year;
        let mut state = ProjectionState::new(household).unwrap();
        let calc = TaxCalculator::new(&plan.tax_tables, &plan.benefit_rules).unwrap();
        let ctx = calc
            .for_year(year, household.persons.iter().map(|p| p.province), 1.0)
            .unwrap();
        take_minimum_withdrawals(year, household, &plan.strategy, &mut state).unwrap();
        let input = SettlementInput {
            year,
            household,
            strategy: &plan.strategy,
            tax: &ctx,
            capital_gains_inclusion: 0.5,
            rrif_eligible_age: 65,
            base_incomes: household
                .living_in(year)
                .map(|p| PersonIncome::new(p.person_id, p.province))
                .collect(),
            cash_inflow,
            expenses,
        };
        let settlement = settle_year(&input, &mut state).unwrap();
        (settlement, state)
    }

    #[test]
    fn test_deficit_drawn_in_order_and_tax_covered() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1960, 1, 1).province(Province::Ontario))
            .account(AccountBuilder::rrsp("RRSP").owned_by("Alex").balance(300_000.0))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(50_000.0))
            .build();

        let (settlement, state) = run(&plan, 0.0, 40_000.0);
        let rrsp = &state.accounts[0];
        assert!(rrsp.discretionary_withdrawal > 40_000.0, "grossed up for tax");
        assert_eq!(state.accounts[1].total_withdrawal(), 0.0);
        assert_eq!(settlement.shortfall, 0.0);

        let net = settlement.total_withdrawals - settlement.tax.total_burden();
        assert!((net - 40_000.0).abs() <= 1.0);
    }

    #[test]
    fn test_shortfall_when_accounts_exhausted() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1960, 1, 1))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(10_000.0))
            .build();

        let (settlement, mut state) = run(&plan, 0.0, 25_000.0);
        assert!((settlement.shortfall - 15_000.0).abs() < 0.01);
        assert_eq!(state.accounts[0].balance, 0.0);

        // The TFSA draw comes back as room next year
        let household = &plan.household;
        state.begin_year(2026, household, &plan.benefit_rules, 71, 1.0);
        assert!(state.room.remaining(PersonId(1), AccountKind::Tfsa) >= 10_000.0);
    }

    #[test]
    fn test_surplus_fills_tfsa_room_then_non_registered() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1980, 1, 1))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").room(5_000.0))
            .account(AccountBuilder::non_registered("Open").owned_by("Alex"))
            .contribution_priority(vec![AccountKind::Tfsa, AccountKind::NonRegistered])
            .build();

        let (settlement, state) = run(&plan, 12_000.0, 0.0);
        assert!((state.accounts[0].contribution - 5_000.0).abs() < 1e-9);
        assert_eq!(state.room.remaining(PersonId(1), AccountKind::Tfsa), 0.0);
        assert!(state.accounts[1].contribution > 0.0);
        assert_eq!(settlement.unallocated_surplus, 0.0);
    }

    #[test]
    fn test_surplus_without_destination_is_unallocated() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1980, 1, 1))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").room(1_000.0))
            .contribution_priority(vec![AccountKind::Tfsa])
            .build();

        let (settlement, _) = run(&plan, 5_000.0, 0.0);
        assert!((settlement.unallocated_surplus - 4_000.0).abs() < 0.01);
    }

    #[test]
    fn test_lira_never_drawn() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1970, 1, 1))
            .account(AccountBuilder::lira("LIRA").owned_by("Alex").balance(100_000.0))
            .build();

        let (settlement, state) = run(&plan, 0.0, 10_000.0);
        assert_eq!(state.accounts[0].total_withdrawal(), 0.0);
        assert!((settlement.shortfall - 10_000.0).abs() < 0.01);
    }

    #[test]
    fn test_explicit_account_order() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1960, 1, 1))
            .account(AccountBuilder::non_registered("Open").owned_by("Alex").balance(50_000.0))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(50_000.0))
            .withdrawal_order(WithdrawalOrder::ByAccount(vec![AccountId(2), AccountId(1)]))
            .build();

        let (_, state) = run(&plan, 0.0, 10_000.0);
        assert!((state.accounts[1].discretionary_withdrawal - 10_000.0).abs() < 1.0);
        assert_eq!(state.accounts[0].discretionary_withdrawal, 0.0);
    }
}
