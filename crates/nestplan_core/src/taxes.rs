//! Federal and provincial income tax, OAS recovery and pension splitting
//!
//! Tax is the sum of marginal-bracket amounts less the basic personal credit.
//! All rates and thresholds come from `TaxTables` and `BenefitRules`; nothing
//! about a particular tax year is hard-wired here.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::model::{
    BenefitRules, BracketSchedule, Jurisdiction, PensionSplit, PensionSplitRules, PersonId,
    PersonTax, Province, TaxBracket, TaxTables,
};

/// Minimum combined saving for a pension split to be taken
const SPLIT_IMPROVEMENT_EPSILON: f64 = 1e-6;

/// Combined marginal rates are capped here when grossing up
const MAX_GROSS_UP_RATE: f64 = 0.95;

/// Tax on `income` from progressive brackets, before credits
pub fn bracket_tax(income: f64, brackets: &[TaxBracket]) -> f64 {
    if income <= 0.0 || brackets.is_empty() {
        return 0.0;
    }

    let mut tax = 0.0;
    for (i, bracket) in brackets.iter().enumerate() {
        if income <= bracket.threshold {
            break;
        }
        let next_threshold = brackets
            .get(i + 1)
            .map_or(f64::INFINITY, |b| b.threshold);
        let taxable_in_bracket = (income.min(next_threshold) - bracket.threshold).max(0.0);
        tax += taxable_in_bracket * bracket.rate;
    }

    tax
}

/// Bracket tax less the basic personal credit, never negative
pub fn schedule_tax(income: f64, schedule: &BracketSchedule) -> f64 {
    credited_tax(income, schedule, 0.0)
}

/// Bracket tax less the basic personal and dividend credits, never negative.
/// `taxable_dividends` is the grossed-up amount already inside `income`.
pub fn credited_tax(income: f64, schedule: &BracketSchedule, taxable_dividends: f64) -> f64 {
    let credits = schedule.basic_personal_amount * schedule.lowest_rate()
        + taxable_dividends.max(0.0) * schedule.dividend_credit_rate;
    (bracket_tax(income, &schedule.brackets) - credits).max(0.0)
}

/// Tax on additional income on top of `base_income`
pub fn marginal_tax(additional_income: f64, base_income: f64, schedule: &BracketSchedule) -> f64 {
    schedule_tax(base_income + additional_income, schedule) - schedule_tax(base_income, schedule)
}

/// OAS recovery tax: a share of net income above the threshold, capped at
/// the OAS received
pub fn oas_clawback(oas_income: f64, net_income: f64, threshold: f64, recovery_rate: f64) -> f64 {
    let recovery = (net_income - threshold).max(0.0) * recovery_rate;
    recovery.min(oas_income.max(0.0))
}

/// Gross ordinary income needed to net `net_amount` after combined federal
/// and provincial marginal tax, starting from `current_income`
pub fn gross_from_net(
    net_amount: f64,
    current_income: f64,
    federal: &BracketSchedule,
    provincial: &BracketSchedule,
) -> f64 {
    if net_amount <= 0.0 {
        return 0.0;
    }

    // Walk the merged breakpoints of both schedules above the current income
    let mut breakpoints: Vec<f64> = federal
        .brackets
        .iter()
        .chain(provincial.brackets.iter())
        .map(|b| b.threshold)
        .filter(|t| *t > current_income)
        .collect();
    breakpoints.sort_by(f64::total_cmp);
    breakpoints.dedup();

    let mut remaining_net = net_amount;
    let mut gross = 0.0;
    let mut cursor = current_income.max(0.0);

    for next_threshold in breakpoints.into_iter().chain(std::iter::once(f64::MAX)) {
        let combined_rate = (federal.marginal_rate(cursor) + provincial.marginal_rate(cursor))
            .min(MAX_GROSS_UP_RATE);
        let net_per_gross = 1.0 - combined_rate;
        let bracket_room = next_threshold - cursor;
        let max_net_in_bracket = bracket_room * net_per_gross;

        if remaining_net <= max_net_in_bracket {
            gross += remaining_net / net_per_gross;
            break;
        }
        gross += bracket_room;
        remaining_net -= max_net_in_bracket;
        cursor = next_threshold;
    }

    gross
}

/// Taxable components for one person and year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonIncome {
    pub person_id: PersonId,
    pub province: Province,
    /// Employment, pension, CPP, rental, taxable other, interest and
    /// registered withdrawals
    pub ordinary_income: f64,
    pub oas_income: f64,
    pub taxable_capital_gains: f64,
    /// Eligible dividends after the gross-up
    pub taxable_dividends: f64,
    /// RRSP contributions deducted this year
    pub deductions: f64,
    /// Income that may be split with a spouse
    pub eligible_pension_income: f64,
}

impl PersonIncome {
    #[must_use]
    pub fn new(person_id: PersonId, province: Province) -> Self {
        Self {
            person_id,
            province,
            ordinary_income: 0.0,
            oas_income: 0.0,
            taxable_capital_gains: 0.0,
            taxable_dividends: 0.0,
            deductions: 0.0,
            eligible_pension_income: 0.0,
        }
    }

    /// Net income before the OAS recovery, with `split` added (received) or
    /// removed (transferred)
    #[must_use]
    pub fn net_income(&self, split: f64) -> f64 {
        (self.ordinary_income + self.oas_income + self.taxable_capital_gains
            + self.taxable_dividends
            - self.deductions
            + split)
            .max(0.0)
    }
}

/// Tax for every person in the household plus the chosen pension split
#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdTax {
    /// Same order as the incomes passed in
    pub persons: Vec<PersonTax>,
    pub split: Option<PensionSplit>,
}

impl HouseholdTax {
    #[must_use]
    pub fn total_tax(&self) -> f64 {
        self.persons.iter().map(PersonTax::total_tax).sum()
    }

    #[must_use]
    pub fn total_clawback(&self) -> f64 {
        self.persons.iter().map(|p| p.oas_clawback).sum()
    }

    /// Tax plus OAS recovery: the household's cash cost
    #[must_use]
    pub fn total_burden(&self) -> f64 {
        self.total_tax() + self.total_clawback()
    }

    /// Pension income received (positive) or transferred away (negative)
    /// by `person_id`
    #[must_use]
    pub fn split_for(&self, person_id: PersonId) -> f64 {
        match self.split {
            Some(split) if split.to == person_id => split.amount,
            Some(split) if split.from == person_id => -split.amount,
            _ => 0.0,
        }
    }
}

/// Validated tables and rules for a run
#[derive(Debug, Clone, Copy)]
pub struct TaxCalculator<'a> {
    tables: &'a TaxTables,
    rules: &'a BenefitRules,
}

impl<'a> TaxCalculator<'a> {
    pub fn new(tables: &'a TaxTables, rules: &'a BenefitRules) -> Result<Self, ConfigError> {
        tables.validate()?;
        Ok(Self { tables, rules })
    }

    #[must_use]
    pub fn capital_gains_inclusion(&self) -> f64 {
        self.tables.capital_gains_inclusion
    }

    #[must_use]
    pub fn dividend_gross_up(&self) -> f64 {
        self.tables.dividend_gross_up
    }

    /// Resolve every schedule in force for `year`. `index_factor` is
    /// cumulative general inflation since the start year and indexes the
    /// OAS recovery threshold.
    pub fn for_year(
        &self,
        year: i16,
        provinces: impl IntoIterator<Item = Province>,
        index_factor: f64,
    ) -> Result<YearTaxContext<'a>, ConfigError> {
        let federal = self
            .tables
            .federal
            .schedule_for(Jurisdiction::Federal, year)?;
        let mut provincial = BTreeMap::new();
        for province in provinces {
            if provincial.contains_key(&province) {
                continue;
            }
            let schedule = self
                .tables
                .provincial_table(province)?
                .schedule_for(Jurisdiction::Provincial(province), year)?;
            provincial.insert(province, schedule);
        }
        Ok(YearTaxContext {
            year,
            federal,
            provincial,
            oas_threshold: self.rules.oas.clawback_threshold * index_factor,
            recovery_rate: self.rules.oas.recovery_rate,
            split_rules: self.rules.pension_split,
        })
    }
}

/// Schedules for one tax year
#[derive(Debug, Clone)]
pub struct YearTaxContext<'a> {
    pub year: i16,
    federal: Cow<'a, BracketSchedule>,
    provincial: BTreeMap<Province, Cow<'a, BracketSchedule>>,
    oas_threshold: f64,
    recovery_rate: f64,
    split_rules: PensionSplitRules,
}

impl YearTaxContext<'_> {
    fn provincial(&self, province: Province) -> Result<&BracketSchedule, ConfigError> {
        self.provincial
            .get(&province)
            .map(|s| s.as_ref())
            .ok_or(ConfigError::MissingProvincialTable(province))
    }

    #[must_use]
    pub fn federal(&self) -> &BracketSchedule {
        &self.federal
    }

    #[must_use]
    pub fn oas_threshold(&self) -> f64 {
        self.oas_threshold
    }

    /// Tax for one person with `split` dollars of pension income received
    /// (positive) or transferred away (negative)
    pub fn person_tax(&self, income: &PersonIncome, split: f64) -> Result<PersonTax, ConfigError> {
        let provincial = self.provincial(income.province)?;
        let net_income = income.net_income(split);
        let oas_clawback = oas_clawback(
            income.oas_income,
            net_income,
            self.oas_threshold,
            self.recovery_rate,
        );
        let taxable_income = net_income - oas_clawback;
        Ok(PersonTax {
            net_income,
            oas_clawback,
            taxable_income,
            federal_tax: credited_tax(taxable_income, &self.federal, income.taxable_dividends),
            provincial_tax: credited_tax(taxable_income, provincial, income.taxable_dividends),
        })
    }

    /// Tax plus OAS recovery on one more dollar of ordinary income, with the
    /// person's pension split applied. Credits and the recovery phase-in
    /// are reflected, so the rate is zero below the basic personal amount.
    pub fn effective_marginal_rate(
        &self,
        income: &PersonIncome,
        split: f64,
    ) -> Result<f64, ConfigError> {
        let now = self.person_tax(income, split)?;
        let next = self.person_tax(income, split + 1.0)?;
        Ok((next.total_tax() + next.oas_clawback) - (now.total_tax() + now.oas_clawback))
    }

    /// Combined federal + provincial marginal rate at the person's current
    /// taxable income
    pub fn marginal_rate(&self, income: &PersonIncome) -> Result<f64, ConfigError> {
        let provincial = self.provincial(income.province)?;
        let taxable = income.net_income(0.0);
        Ok(self.federal.marginal_rate(taxable) + provincial.marginal_rate(taxable))
    }

    /// Gross ordinary income needed for `net_amount` after tax
    pub fn gross_up(&self, net_amount: f64, income: &PersonIncome) -> Result<f64, ConfigError> {
        let provincial = self.provincial(income.province)?;
        Ok(gross_from_net(
            net_amount,
            income.net_income(0.0),
            &self.federal,
            provincial,
        ))
    }

    /// Tax for every person, choosing the pension split between the first
    /// two persons that minimizes the household's tax plus OAS recovery.
    ///
    /// Fractions are evaluated in ascending order and a candidate replaces
    /// the incumbent only when it saves more than a millionth of a dollar, so
    /// ties resolve to no split, then to the smaller fraction.
    pub fn household_tax(&self, incomes: &[PersonIncome]) -> Result<HouseholdTax, ConfigError> {
        let mut persons = incomes
            .iter()
            .map(|income| self.person_tax(income, 0.0))
            .collect::<Result<Vec<_>, _>>()?;

        if incomes.len() < 2 {
            return Ok(HouseholdTax {
                persons,
                split: None,
            });
        }

        let pair_cost = |a: &PersonTax, b: &PersonTax| {
            a.total_tax() + a.oas_clawback + b.total_tax() + b.oas_clawback
        };
        let baseline = pair_cost(&persons[0], &persons[1]);
        let mut best_cost = baseline;
        let mut best: Option<(usize, usize, f64, f64, PersonTax, PersonTax)> = None;
        let fractions = self.split_rules.fractions();

        for (from, to) in [(0usize, 1usize), (1, 0)] {
            let transferor = &incomes[from];
            let transferee = &incomes[to];
            if transferor.eligible_pension_income <= 0.0
                || persons[from].taxable_income <= persons[to].taxable_income
            {
                continue;
            }
            for &fraction in fractions.iter().filter(|f| **f > 0.0) {
                let amount = transferor.eligible_pension_income * fraction;
                let from_tax = self.person_tax(transferor, -amount)?;
                let to_tax = self.person_tax(transferee, amount)?;
                let cost = pair_cost(&from_tax, &to_tax);
                if cost < best_cost - SPLIT_IMPROVEMENT_EPSILON {
                    best_cost = cost;
                    best = Some((from, to, fraction, amount, from_tax, to_tax));
                }
            }
        }

        let split = best.map(|(from, to, fraction, amount, from_tax, to_tax)| {
            persons[from] = from_tax;
            persons[to] = to_tax;
            PensionSplit {
                from: incomes[from].person_id,
                to: incomes[to].person_id,
                fraction,
                amount,
                tax_saved: baseline - best_cost,
            }
        });

        Ok(HouseholdTax { persons, split })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JurisdictionTable;

    fn simple_schedule() -> BracketSchedule {
        BracketSchedule::new(&[(0.0, 0.10), (50_000.0, 0.20), (100_000.0, 0.30)], 0.0)
    }

    #[test]
    fn test_bracket_tax_sums_marginal_amounts() {
        let s = simple_schedule();
        assert_eq!(bracket_tax(0.0, &s.brackets), 0.0);
        assert!((bracket_tax(40_000.0, &s.brackets) - 4_000.0).abs() < 1e-9);
        assert!((bracket_tax(75_000.0, &s.brackets) - 10_000.0).abs() < 1e-9);
        assert!((bracket_tax(150_000.0, &s.brackets) - 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_bracket_tax_below_first_threshold() {
        let brackets = [TaxBracket {
            threshold: 10_000.0,
            rate: 0.2,
        }];
        assert_eq!(bracket_tax(5_000.0, &brackets), 0.0);
        assert!((bracket_tax(15_000.0, &brackets) - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_tax_is_monotonic_in_income() {
        let tables = TaxTables::canada_2025();
        let federal = &tables.federal.by_year[&2025];
        let mut prev = 0.0;
        for step in 0..400 {
            let income = f64::from(step) * 1_000.0;
            let tax = schedule_tax(income, federal);
            assert!(tax >= prev - 1e-9, "tax decreased at {income}");
            prev = tax;
        }
    }

    #[test]
    fn test_basic_personal_amount_credit() {
        let schedule = BracketSchedule::new(&[(0.0, 0.15)], 16_000.0);
        assert_eq!(schedule_tax(10_000.0, &schedule), 0.0);
        assert!((schedule_tax(20_000.0, &schedule) - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_oas_clawback_example() {
        let clawback = oas_clawback(8_000.0, 100_000.0, 80_000.0, 0.15);
        assert!((clawback - 3_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_oas_clawback_capped_at_oas() {
        assert!((oas_clawback(8_000.0, 200_000.0, 80_000.0, 0.15) - 8_000.0).abs() < 1e-9);
        assert_eq!(oas_clawback(8_000.0, 70_000.0, 80_000.0, 0.15), 0.0);
    }

    #[test]
    fn test_gross_from_net_inverts_marginal_tax() {
        let federal = simple_schedule();
        let provincial = BracketSchedule::new(&[(0.0, 0.05), (60_000.0, 0.10)], 0.0);
        let base = 45_000.0;
        let gross = gross_from_net(20_000.0, base, &federal, &provincial);
        let tax = marginal_tax(gross, base, &federal) + marginal_tax(gross, base, &provincial);
        assert!((gross - tax - 20_000.0).abs() < 0.01);
    }

    #[test]
    fn test_person_tax_deducts_clawback_from_taxable_income() {
        let mut rules = BenefitRules::default();
        rules.oas.clawback_threshold = 80_000.0;
        let tables = TaxTables::canada_2025();
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        let ctx = calc.for_year(2025, [Province::Ontario], 1.0).unwrap();

        let mut income = PersonIncome::new(PersonId(1), Province::Ontario);
        income.ordinary_income = 92_000.0;
        income.oas_income = 8_000.0;

        let tax = ctx.person_tax(&income, 0.0).unwrap();
        assert!((tax.net_income - 100_000.0).abs() < 1e-9);
        assert!((tax.oas_clawback - 3_000.0).abs() < 1e-9);
        assert!((tax.taxable_income - 97_000.0).abs() < 1e-9);
        assert!(tax.federal_tax > 0.0 && tax.provincial_tax > 0.0);
    }

    #[test]
    fn test_pension_split_lowers_household_tax() {
        let (tables, rules) = (TaxTables::canada_2025(), BenefitRules::default());
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        let ctx = calc.for_year(2025, [Province::Ontario], 1.0).unwrap();
        let mut high = PersonIncome::new(PersonId(1), Province::Ontario);
        high.ordinary_income = 120_000.0;
        high.eligible_pension_income = 80_000.0;
        let low = PersonIncome::new(PersonId(2), Province::Ontario);

        let unsplit = ctx.person_tax(&high, 0.0).unwrap().total_tax()
            + ctx.person_tax(&low, 0.0).unwrap().total_tax();
        let household = ctx.household_tax(&[high, low]).unwrap();
        let split = household.split.expect("split should be chosen");

        assert_eq!(split.from, PersonId(1));
        assert_eq!(split.to, PersonId(2));
        assert!(split.fraction > 0.0 && split.fraction <= 0.5 + 1e-12);
        assert!(household.total_tax() < unsplit);
        assert!((split.tax_saved - (unsplit - household.total_tax())).abs() < 0.01);
    }

    #[test]
    fn test_no_split_when_it_cannot_help() {
        let (tables, rules) = (TaxTables::canada_2025(), BenefitRules::default());
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        let ctx = calc.for_year(2025, [Province::Ontario], 1.0).unwrap();
        let mut a = PersonIncome::new(PersonId(1), Province::Ontario);
        a.ordinary_income = 50_000.0;
        a.eligible_pension_income = 50_000.0;
        let mut b = PersonIncome::new(PersonId(2), Province::Ontario);
        b.ordinary_income = 50_000.0;

        let household = ctx.household_tax(&[a, b]).unwrap();
        assert!(household.split.is_none());
    }

    #[test]
    fn test_equal_cost_splits_resolve_to_no_split() {
        // One flat bracket and no credits: moving income between spouses
        // never changes the combined tax
        let flat = BracketSchedule::new(&[(0.0, 0.20)], 0.0);
        let tables = TaxTables {
            federal: JurisdictionTable::single(2025, flat, 0.0),
            provincial: BTreeMap::from([(
                Province::Ontario,
                JurisdictionTable::single(2025, BracketSchedule::new(&[(0.0, 0.0)], 0.0), 0.0),
            )]),
            capital_gains_inclusion: 0.5,
            dividend_gross_up: 0.38,
        };
        let rules = BenefitRules::default();
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        let ctx = calc.for_year(2025, [Province::Ontario], 1.0).unwrap();

        let mut high = PersonIncome::new(PersonId(1), Province::Ontario);
        high.ordinary_income = 90_000.0;
        high.eligible_pension_income = 60_000.0;
        let mut low = PersonIncome::new(PersonId(2), Province::Ontario);
        low.ordinary_income = 10_000.0;

        let household = ctx.household_tax(&[high, low]).unwrap();
        assert!(household.split.is_none());
        assert!((household.total_tax() - 20_000.0).abs() < 1e-9);
        assert_eq!(household.split_for(PersonId(1)), 0.0);
    }

    #[test]
    fn test_dividend_credit_lowers_tax() {
        let schedule = BracketSchedule::new(&[(0.0, 0.20)], 0.0).with_dividend_credit(0.15);
        let income = 10_000.0 * 1.38;
        let credited = credited_tax(income, &schedule, income);
        assert!((credited - (income * 0.20 - income * 0.15)).abs() < 1e-9);
        assert!(credited < schedule_tax(income, &schedule));
        let full_credit = schedule.clone().with_dividend_credit(1.0);
        assert_eq!(credited_tax(1_000.0, &full_credit, 1_000.0), 0.0);
    }

    #[test]
    fn test_effective_marginal_rate_includes_recovery() {
        let mut rules = BenefitRules::default();
        rules.oas.clawback_threshold = 80_000.0;
        let tables = TaxTables::canada_2025();
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        let ctx = calc.for_year(2025, [Province::Ontario], 1.0).unwrap();

        let mut income = PersonIncome::new(PersonId(1), Province::Ontario);
        income.ordinary_income = 92_000.0;
        income.oas_income = 8_000.0;
        let bracket = ctx.federal().marginal_rate(97_000.0) + 0.0915;
        let rate = ctx.effective_marginal_rate(&income, 0.0).unwrap();
        assert!((rate - (0.15 + 0.85 * bracket)).abs() < 1e-6);

        let mut low = PersonIncome::new(PersonId(1), Province::Ontario);
        low.ordinary_income = 5_000.0;
        assert!(ctx.effective_marginal_rate(&low, 0.0).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_split_search_is_stable() {
        let (tables, rules) = (TaxTables::canada_2025(), BenefitRules::default());
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        let ctx = calc.for_year(2025, [Province::Ontario], 1.0).unwrap();
        let mut high = PersonIncome::new(PersonId(1), Province::Ontario);
        high.ordinary_income = 150_000.0;
        high.eligible_pension_income = 60_000.0;
        let mut low = PersonIncome::new(PersonId(2), Province::Ontario);
        low.ordinary_income = 20_000.0;

        let first = ctx.household_tax(&[high, low]).unwrap();
        let second = ctx.household_tax(&[high, low]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_year_is_config_error() {
        let tables = TaxTables::canada_2025();
        let rules = BenefitRules::default();
        let calc = TaxCalculator::new(&tables, &rules).unwrap();
        assert!(matches!(
            calc.for_year(2010, [Province::Ontario], 1.0),
            Err(ConfigError::MissingTaxTable { .. })
        ));
    }
}
