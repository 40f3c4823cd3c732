//! Behavioural tests for the projection engine
//!
//! Tests are organized by topic:
//! - `projection` - Year stepping, account lifecycle and growth
//! - `withdrawals` - Minimum withdrawals, top-ups, contributions and room
//! - `taxes` - Tax, OAS recovery and pension splitting inside a projection
//! - `monte_carlo` - Trial determinism, aggregation and cancellation
//! - `scenarios` - Override resolution and comparison
//! - `spending` - Sustainable spending search

mod spending;

use crate::config::{AccountBuilder, PersonBuilder, PlanBuilder};
use crate::model::DistributionYields;

/// One person aged 65 in 2025 with no market or inflation movement and no
/// portfolio distributions
pub(crate) fn retiree() -> PlanBuilder {
    PlanBuilder::new()
        .start_year(2025)
        .person(PersonBuilder::new("Alex").born(1960, 1, 1).life_expectancy(90))
        .flat_returns(0.0)
        .inflation(0.0)
        .healthcare_premium(0.0)
        .distributions(DistributionYields::none())
}

/// Two-person household with registered savings on both sides
pub(crate) fn couple() -> PlanBuilder {
    PlanBuilder::new()
        .start_year(2025)
        .person(
            PersonBuilder::new("Alex")
                .born(1958, 4, 1)
                .life_expectancy(88)
                .cpp(65, 14_000.0)
                .oas(65)
                .pension(45_000.0, 65),
        )
        .person(
            PersonBuilder::new("Sam")
                .born(1961, 9, 1)
                .life_expectancy(92)
                .cpp(65, 8_000.0)
                .oas(65),
        )
        .account(AccountBuilder::rrsp("Alex RRSP").owned_by("Alex").balance(350_000.0))
        .account(AccountBuilder::rrsp("Sam RRSP").owned_by("Sam").balance(150_000.0))
        .account(AccountBuilder::tfsa("Alex TFSA").owned_by("Alex").balance(90_000.0))
        .account(
            AccountBuilder::non_registered("Joint")
                .joint()
                .balance(200_000.0)
                .cost_basis(150_000.0),
        )
}
