//! Canadian household retirement projection library
//!
//! This crate projects a household's finances year by year through
//! retirement. It supports:
//! - Registered and non-registered accounts (RRSP, RRIF, TFSA, LIRA, LIF)
//! - Federal and provincial income tax with OAS recovery and pension splitting
//! - CPP/OAS elections, indexed income streams and category inflation
//! - RRIF/LIF minimum withdrawals and tax-aware top-up withdrawals
//! - Glide paths, the retirement spending smile and black-swan stress tests
//! - Monte Carlo simulation (parametric or bootstrapped returns)
//! - Named scenarios with field-level overrides
//! - Sustainable spending search against the desired spending
//!
//! # Builder DSL
//!
//! ```ignore
//! use nestplan_core::{AccountBuilder, PersonBuilder, PlanBuilder, project};
//! use nestplan_core::model::{Expense, ExpenseCategory};
//!
//! let plan = PlanBuilder::new()
//!     .start_year(2025)
//!     .person(PersonBuilder::new("Alex").born(1960, 1, 1).cpp(65, 12_000.0).oas(65))
//!     .account(AccountBuilder::rrif("RRIF").owned_by("Alex").balance(500_000.0))
//!     .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(100_000.0))
//!     .expense(Expense::recurring("Living", 55_000.0, ExpenseCategory::Other))
//!     .build();
//!
//! let result = project(&plan)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod error;
pub mod projection;
pub mod projection_state;
pub mod projector;
pub mod scenario;
pub mod simulation;
pub mod spending;
pub mod taxes;
pub mod withdrawal;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::{AccountBuilder, PersonBuilder, PlanBuilder, PlanConfig, Strategy};
pub use error::{ConfigError, ConstraintViolation, ProjectionError, ScenarioError, SimulationError};
pub use projection::{project, project_with_market};
pub use scenario::{PlanOverrides, Scenario, ScenarioComparison, ScenarioSet};
pub use simulation::{monte_carlo, monte_carlo_with_progress};
pub use spending::{SpendingSearch, sustainable_spending};
