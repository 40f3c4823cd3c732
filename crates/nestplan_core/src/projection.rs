//! Year-step projection orchestrator
//!
//! Drives one run forward a year at a time. Each step resolves ages, income
//! and government benefits, pays out non-registered interest and dividends,
//! inflates expenses, settles withdrawals,
//! contributions and tax, then grows every account and freezes the year into
//! a `ProjectionYear`. The same step function is the per-trial unit of the
//! Monte Carlo simulator; only the market path and shock timing differ.

use tracing::{debug, trace};

use crate::config::PlanConfig;
use crate::error::ProjectionError;
use crate::model::{
    AccountKind, AccountYear, BenefitRules, BlackSwan, Household, IncomeBreakdown, IncomeKind,
    MarketPath, Owner, Person, PersonYear, ProjectionResult, ProjectionYear, TerminalState,
};
use crate::projection_state::{BALANCE_EPSILON, ProjectionState};
use crate::projector::{ReturnProjector, YearRates};
use crate::taxes::{PersonIncome, TaxCalculator};
use crate::withdrawal::{SettlementInput, settle_year, take_minimum_withdrawals};

/// Deterministic projection using each asset class's mean return
pub fn project(plan: &PlanConfig) -> Result<ProjectionResult, ProjectionError> {
    plan.validate()?;
    let horizon = plan.household.horizon_years();
    let path = MarketPath::deterministic(&plan.assumptions.returns, horizon);
    run_projection(plan, &path, plan.assumptions.black_swan)
}

/// Projection along an explicit market path, with `black_swan` replacing the
/// plan's own shock
pub fn project_with_market(
    plan: &PlanConfig,
    path: &MarketPath,
    black_swan: Option<BlackSwan>,
) -> Result<ProjectionResult, ProjectionError> {
    plan.validate()?;
    run_projection(plan, path, black_swan)
}

/// Run an already validated plan
pub(crate) fn run_projection(
    plan: &PlanConfig,
    path: &MarketPath,
    black_swan: Option<BlackSwan>,
) -> Result<ProjectionResult, ProjectionError> {
    let household = &plan.household;
    let start_year = household.start_year;
    let end_year = household.end_year();
    debug!(
        start_year,
        end_year,
        persons = household.persons.len(),
        accounts = household.accounts.len(),
        "projection started"
    );

    let calculator = TaxCalculator::new(&plan.tax_tables, &plan.benefit_rules)?;
    let projector = ReturnProjector::new(&plan.assumptions, start_year).with_black_swan(black_swan);
    let mut state = ProjectionState::new(household)?;

    let mut years = Vec::with_capacity(household.horizon_years());
    let mut depletion_year = None;
    let mut terminal = TerminalState::HorizonComplete;

    for year in start_year..=end_year {
        let record = step_year(year, plan, &calculator, &projector, path, &mut state)?;

        if depletion_year.is_none() && record.is_depletion_event() {
            depletion_year = Some(year);
        }
        let after_tax_income = record.gross_income - record.total_tax() - record.oas_clawback;
        let exhausted = record.is_depletion_event()
            && record.net_worth <= BALANCE_EPSILON
            && after_tax_income < record.mandatory_expenses;
        years.push(record);

        if exhausted {
            debug!(year, "household depleted");
            terminal = TerminalState::Depleted { year };
            break;
        }
    }

    debug!(
        ?terminal,
        ?depletion_year,
        final_net_worth = years.last().map_or(0.0, |y| y.net_worth),
        "projection finished"
    );

    let depletion_age = depletion_year
        .and_then(|year| household.primary().map(|person| person.age_in(year)));
    Ok(ProjectionResult {
        start_year,
        end_year,
        years,
        terminal,
        depletion_year,
        depletion_age,
    })
}

/// Gross income for a living person before tax
fn resolve_income(
    person: &Person,
    year: i16,
    rates: &YearRates,
    rules: &BenefitRules,
) -> IncomeBreakdown {
    let mut income = IncomeBreakdown::default();
    let age = person.age_in(year);

    for source in &person.income_sources {
        if !source.is_active(year, person.birth_year()) {
            continue;
        }
        let amount = if source.indexed {
            source.amount * rates.general_index
        } else {
            source.amount
        };
        match source.kind {
            IncomeKind::Employment => income.employment += amount,
            IncomeKind::SelfEmployment => income.self_employment += amount,
            IncomeKind::Pension => income.pension += amount,
            IncomeKind::Rental => income.rental += amount,
            IncomeKind::Cpp => income.cpp += amount,
            IncomeKind::Oas => income.oas += amount,
            IncomeKind::Other { taxable: true } => income.other_taxable += amount,
            IncomeKind::Other { taxable: false } => income.other_non_taxable += amount,
        }
    }

    if let Some(cpp) = &person.cpp {
        income.cpp += rules.cpp.annual_amount(cpp, age, rates.general_index);
    }
    if let Some(oas) = &person.oas {
        income.oas += rules.oas.annual_amount(oas, age, rates.general_index);
    }
    income
}

/// Age that drives the glide path for an account: the owner's, or the
/// primary living person's for household accounts
fn reference_age(owner: Owner, household: &Household, year: i16) -> Option<u8> {
    match owner {
        Owner::Person(id) => household.person(id).map(|p| p.age_in(year)),
        Owner::Household => household
            .living_in(year)
            .next()
            .or_else(|| household.primary())
            .map(|p| p.age_in(year)),
    }
}

/// Interest and dividends credited to one living person
#[derive(Debug, Clone, Copy, Default)]
struct Payout {
    interest: f64,
    dividends: f64,
}

/// Pay each non-registered account's interest and dividends out in cash.
/// Household accounts are shared equally between the living persons.
fn pay_distributions(
    year: i16,
    plan: &PlanConfig,
    projector: &ReturnProjector<'_>,
    living: &[&Person],
    state: &mut ProjectionState,
) -> Vec<Payout> {
    let household = &plan.household;
    let yields = &plan.assumptions.distributions;
    let mut payouts = vec![Payout::default(); living.len()];
    if living.is_empty() {
        return payouts;
    }

    for (account_state, account) in state.accounts.iter_mut().zip(&household.accounts) {
        if account_state.kind != AccountKind::NonRegistered || account_state.is_empty() {
            continue;
        }
        let age = reference_age(account_state.owner, household, year);
        let rates = yields.rates_for(&projector.account_mix(account, age));
        let paid = account_state.distribute(account_state.balance * rates.total());
        if paid <= 0.0 {
            continue;
        }
        let interest = paid * rates.interest / rates.total();
        let owners: Vec<usize> = match account_state.owner {
            Owner::Person(id) => living
                .iter()
                .position(|p| p.person_id == id)
                .into_iter()
                .collect(),
            Owner::Household => (0..living.len()).collect(),
        };
        let owners = if owners.is_empty() { vec![0] } else { owners };
        let share = 1.0 / owners.len() as f64;
        for i in owners {
            payouts[i].interest += interest * share;
            payouts[i].dividends += (paid - interest) * share;
        }
        trace!(year, account = ?account_state.account_id, paid, "distribution paid");
    }
    payouts
}

fn step_year(
    year: i16,
    plan: &PlanConfig,
    calculator: &TaxCalculator<'_>,
    projector: &ReturnProjector<'_>,
    path: &MarketPath,
    state: &mut ProjectionState,
) -> Result<ProjectionYear, ProjectionError> {
    let household = &plan.household;
    let rates = projector.rates_for(year, path);
    state.begin_year(
        year,
        household,
        &plan.benefit_rules,
        plan.strategy.conversion_age,
        rates.general_index,
    );

    // Income
    let living: Vec<&Person> = household.living_in(year).collect();
    let breakdowns: Vec<IncomeBreakdown> = living
        .iter()
        .map(|p| resolve_income(p, year, &rates, &plan.benefit_rules))
        .collect();
    let payouts = pay_distributions(year, plan, projector, &living, state);
    let gross_up = 1.0 + calculator.dividend_gross_up();
    let base_incomes: Vec<PersonIncome> = living
        .iter()
        .zip(&breakdowns)
        .zip(&payouts)
        .map(|((person, income), payout)| PersonIncome {
            ordinary_income: income.taxable_total() - income.oas + payout.interest,
            oas_income: income.oas,
            taxable_dividends: payout.dividends * gross_up,
            eligible_pension_income: income.pension,
            ..PersonIncome::new(person.person_id, person.province)
        })
        .collect();
    for (person, income) in living.iter().zip(&breakdowns) {
        state.record_earned_income(person.person_id, income.earned());
    }
    let portfolio_interest_income: f64 = payouts.iter().map(|p| p.interest).sum();
    let portfolio_dividend_income: f64 = payouts.iter().map(|p| p.dividends).sum();
    let gross_income: f64 = breakdowns.iter().map(IncomeBreakdown::total).sum::<f64>()
        + portfolio_interest_income
        + portfolio_dividend_income;

    // Expenses
    let (mandatory_expenses, discretionary_expenses) =
        household
            .expenses
            .iter()
            .fold((0.0, 0.0), |(mandatory, discretionary), expense| {
                let amount = rates.expense_amount(expense);
                if expense.discretionary {
                    (mandatory, discretionary + amount)
                } else {
                    (mandatory + amount, discretionary)
                }
            });

    // Settlement
    let tax = calculator.for_year(year, living.iter().map(|p| p.province), rates.general_index)?;
    take_minimum_withdrawals(year, household, &plan.strategy, state)?;
    let settlement = settle_year(
        &SettlementInput {
            year,
            household,
            strategy: &plan.strategy,
            tax: &tax,
            capital_gains_inclusion: calculator.capital_gains_inclusion(),
            rrif_eligible_age: plan.benefit_rules.pension_split.rrif_eligible_age,
            base_incomes,
            cash_inflow: gross_income,
            expenses: mandatory_expenses + discretionary_expenses,
        },
        state,
    )?;

    // Growth
    let mut accounts = Vec::with_capacity(state.accounts.len());
    for (account_state, account) in state.accounts.iter_mut().zip(&household.accounts) {
        let age = reference_age(account_state.owner, household, year);
        let mut return_rate = projector.account_return(account, age, &rates);
        if account_state.kind == AccountKind::NonRegistered {
            // The distributed share of the return was already paid out
            let mix = projector.account_mix(account, age);
            return_rate -= plan.assumptions.distributions.rates_for(&mix).total();
        }
        let growth = account_state.grow(return_rate);
        accounts.push(AccountYear {
            account_id: account_state.account_id,
            kind: account_state.kind,
            owner: account_state.owner,
            opening_balance: account_state.opening_balance,
            mandatory_withdrawal: account_state.mandatory_withdrawal,
            discretionary_withdrawal: account_state.discretionary_withdrawal,
            contribution: account_state.contribution,
            distribution: account_state.distribution,
            realized_gain: account_state.realized_gain,
            return_rate,
            growth,
            closing_balance: account_state.balance,
        });
    }

    // Tax rates on the settled incomes
    let mut marginal_rates = Vec::with_capacity(living.len());
    let mut net_incomes = Vec::with_capacity(living.len());
    for income in &settlement.incomes {
        let split = settlement.tax.split_for(income.person_id);
        marginal_rates.push(tax.effective_marginal_rate(income, split)?);
        net_incomes.push(income.net_income(split));
    }
    let average_rate = |burden: f64, net_income: f64| {
        if net_income > 0.0 {
            burden / net_income
        } else {
            0.0
        }
    };

    let persons = household
        .persons
        .iter()
        .map(|person| {
            let position = living.iter().position(|p| p.person_id == person.person_id);
            let portfolio = position.map(|i| settlement.portfolio[i]).unwrap_or_default();
            let payout = position.map(|i| payouts[i]).unwrap_or_default();
            let person_tax = position
                .and_then(|i| settlement.tax.persons.get(i).copied())
                .unwrap_or_default();
            PersonYear {
                person_id: person.person_id,
                age: person.age_in(year),
                alive: position.is_some(),
                income: position.map(|i| breakdowns[i]).unwrap_or_default(),
                registered_withdrawals: portfolio.registered_withdrawals,
                taxable_capital_gains: portfolio.taxable_capital_gains,
                rrsp_deduction: portfolio.rrsp_deduction,
                interest_income: payout.interest,
                dividend_income: payout.dividends,
                tax: person_tax,
                marginal_tax_rate: position.map_or(0.0, |i| marginal_rates[i]),
                average_tax_rate: position.map_or(0.0, |i| {
                    average_rate(
                        person_tax.total_tax() + person_tax.oas_clawback,
                        net_incomes[i],
                    )
                }),
            }
        })
        .collect::<Vec<_>>();

    let person_taxes = &settlement.tax.persons;
    let oas_clawback = settlement.tax.total_clawback();
    let total_tax = settlement.tax.total_tax();
    let net_worth = state.net_worth();

    trace!(
        year,
        gross_income,
        withdrawals = settlement.total_withdrawals,
        tax = total_tax,
        shortfall = settlement.shortfall,
        net_worth,
        "year settled"
    );

    Ok(ProjectionYear {
        year,
        persons,
        accounts,
        room: state.room.year_lines(),
        pension_split: settlement.tax.split,
        gross_income,
        mandatory_expenses,
        discretionary_expenses,
        total_withdrawals: settlement.total_withdrawals,
        total_contributions: settlement.total_contributions,
        realized_capital_gains: settlement.realized_capital_gains,
        taxable_capital_gains: settlement
            .portfolio
            .iter()
            .map(|p| p.taxable_capital_gains)
            .sum(),
        portfolio_interest_income,
        portfolio_dividend_income,
        taxable_income: person_taxes.iter().map(|t| t.taxable_income).sum(),
        federal_tax: person_taxes.iter().map(|t| t.federal_tax).sum(),
        provincial_tax: person_taxes.iter().map(|t| t.provincial_tax).sum(),
        oas_clawback,
        marginal_tax_rate: marginal_rates.first().copied().unwrap_or(0.0),
        average_tax_rate: average_rate(total_tax + oas_clawback, net_incomes.iter().sum()),
        net_cash_flow: gross_income
            - total_tax
            - oas_clawback
            - mandatory_expenses
            - discretionary_expenses,
        unallocated_surplus: settlement.unallocated_surplus,
        shortfall: settlement.shortfall,
        net_worth,
        settlement_rounds: settlement.rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountBuilder, PersonBuilder, PlanBuilder};
    use crate::model::{Expense, ExpenseCategory, PersonId};

    #[test]
    fn test_empty_horizon_produces_no_years() {
        let plan = PlanBuilder::new()
            .start_year(2025)
            .person(PersonBuilder::new("Alex").born(1930, 1, 1).life_expectancy(90))
            .build();
        let result = project(&plan).unwrap();
        assert!(result.years.is_empty());
        assert_eq!(result.terminal, TerminalState::HorizonComplete);
        assert_eq!(result.final_net_worth(), 0.0);
    }

    #[test]
    fn test_income_stops_after_death() {
        let plan = PlanBuilder::new()
            .person(
                PersonBuilder::new("Alex")
                    .born(1955, 1, 1)
                    .life_expectancy(72)
                    .pension(20_000.0, 60),
            )
            .person(PersonBuilder::new("Sam").born(1960, 1, 1).life_expectancy(80))
            .flat_returns(0.0)
            .inflation(0.0)
            .build();
        let result = project(&plan).unwrap();

        let alive = result.year(2027).unwrap().person(PersonId(1)).unwrap();
        assert!(alive.alive);
        assert!((alive.income.pension - 20_000.0).abs() < 1e-9);

        let after = result.year(2028).unwrap();
        assert!(!after.person(PersonId(1)).unwrap().alive);
        assert_eq!(after.gross_income, 0.0);
    }

    #[test]
    fn test_depletion_terminates_run() {
        let plan = PlanBuilder::new()
            .person(PersonBuilder::new("Alex").born(1960, 1, 1))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(30_000.0))
            .expense(Expense::recurring("Living", 20_000.0, ExpenseCategory::Other))
            .flat_returns(0.0)
            .inflation(0.0)
            .build();
        let result = project(&plan).unwrap();

        assert_eq!(result.depletion_year, Some(2026));
        assert_eq!(result.terminal, TerminalState::Depleted { year: 2026 });
        assert_eq!(result.depletion_age, Some(66));
        assert_eq!(result.years.len(), 2);
        assert!((result.years[1].shortfall - 10_000.0).abs() < 1.0);
    }
}
