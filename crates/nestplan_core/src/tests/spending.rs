//! Sustainable spending tests
//!
//! These tests verify:
//! - The found level is the boundary between funded and depleted plans
//! - Desired spending and the gap are reported
//! - The ceiling stops the bracket search
//! - Scenarios resolve before the search runs

use std::collections::BTreeMap;

use super::retiree;
use crate::config::{AccountBuilder, PersonBuilder, PlanBuilder, PlanConfig};
use crate::model::{Expense, ExpenseCategory, PersonId};
use crate::projection::project;
use crate::scenario::{PersonOverrides, PlanOverrides, Scenario, ScenarioSet};
use crate::spending::{SpendingSearch, sustainable_spending};

/// 300k in a TFSA over 26 years (2025 through 2050) with no growth
fn savings_only(spending: f64) -> PlanConfig {
    retiree()
        .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(300_000.0))
        .expense(Expense::recurring("Living", spending, ExpenseCategory::Other))
        .build()
}

fn with_level(plan: &PlanConfig, level: f64) -> PlanConfig {
    let mut plan = plan.clone();
    plan.household.expenses = vec![Expense::recurring("Flat", level, ExpenseCategory::Other)];
    plan
}

#[test]
fn test_level_is_funding_boundary() {
    let plan = savings_only(20_000.0);
    let solution = sustainable_spending(&plan, &SpendingSearch::default()).unwrap();

    let exact = 300_000.0 / 26.0;
    assert!(
        (solution.sustainable_spending - exact).abs() < 2.0,
        "expected about {exact:.2}, got {:.2}",
        solution.sustainable_spending
    );
    assert!(solution.converged);
    assert!(solution.evaluations > 2);

    let at_level = project(&with_level(&plan, solution.sustainable_spending)).unwrap();
    assert_eq!(at_level.depletion_year, None);
    let above = project(&with_level(&plan, solution.sustainable_spending + 50.0)).unwrap();
    assert!(above.depletion_year.is_some());
}

#[test]
fn test_gap_against_desired_spending() {
    let search = SpendingSearch::default();
    let underfunded = sustainable_spending(&savings_only(20_000.0), &search).unwrap();
    assert!((underfunded.desired_spending - 20_000.0).abs() < 1e-9);
    assert!(underfunded.gap() < 0.0);
    assert!(!underfunded.is_funded());

    let funded = sustainable_spending(&savings_only(5_000.0), &search).unwrap();
    assert!((funded.desired_spending - 5_000.0).abs() < 1e-9);
    assert!(funded.is_funded());
    assert!((funded.sustainable_spending - underfunded.sustainable_spending).abs() < 2.0);
}

#[test]
fn test_ceiling_stops_search() {
    let plan = PlanBuilder::new()
        .start_year(2025)
        .person(
            PersonBuilder::new("Alex")
                .born(1960, 1, 1)
                .life_expectancy(90)
                .pension(500_000.0, 60),
        )
        .account(AccountBuilder::tfsa("TFSA").owned_by("Alex"))
        .flat_returns(0.0)
        .inflation(0.0)
        .build();
    let search = SpendingSearch {
        ceiling: 50_000.0,
        ..SpendingSearch::default()
    };
    let solution = sustainable_spending(&plan, &search).unwrap();
    assert_eq!(solution.sustainable_spending, 50_000.0);
    assert!(!solution.converged);
    assert_eq!(solution.desired_spending, 0.0);
}

#[test]
fn test_shorter_horizon_supports_more_spending() {
    let overrides = PlanOverrides {
        persons: BTreeMap::from([(
            PersonId(1),
            PersonOverrides {
                life_expectancy: Some(80),
                ..PersonOverrides::default()
            },
        )]),
        ..PlanOverrides::default()
    };
    let set = ScenarioSet::new(savings_only(20_000.0))
        .with_scenarios([Scenario::new("short", overrides)])
        .unwrap();

    let search = SpendingSearch::default();
    let base = set.sustainable_spending("base", &search).unwrap();
    let short = set.sustainable_spending("short", &search).unwrap();
    assert!((short.sustainable_spending - 300_000.0 / 16.0).abs() < 2.0);
    assert!(short.sustainable_spending > base.sustainable_spending);
}
