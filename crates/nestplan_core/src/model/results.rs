//! Projection and simulation results
//!
//! Output records are plain data. A `ProjectionResult` is the ordered
//! sequence of `ProjectionYear`s from one deterministic run; a
//! `SimulationResult` aggregates many trials.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::accounts::{AccountKind, Owner};
use super::ids::{AccountId, PersonId};

/// Tolerance for floating-point percentile comparison
pub const PERCENTILE_TOLERANCE: f64 = 0.001;

/// Find a percentile value from a slice of (percentile, value) pairs
#[inline]
pub fn find_percentile_value(values: &[(f64, f64)], target: f64) -> Option<f64> {
    values
        .iter()
        .find(|(p, _)| (*p - target).abs() < PERCENTILE_TOLERANCE)
        .map(|(_, v)| *v)
}

// ============================================================================
// Deterministic projection
// ============================================================================

/// Gross income by source for one person and year (pre-tax, before clawback)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeBreakdown {
    pub employment: f64,
    pub self_employment: f64,
    pub pension: f64,
    pub rental: f64,
    pub cpp: f64,
    pub oas: f64,
    pub other_taxable: f64,
    pub other_non_taxable: f64,
}

impl IncomeBreakdown {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.taxable_total() + self.other_non_taxable
    }

    #[must_use]
    pub fn taxable_total(&self) -> f64 {
        self.employment
            + self.self_employment
            + self.pension
            + self.rental
            + self.cpp
            + self.oas
            + self.other_taxable
    }

    /// Income that generates RRSP room
    #[must_use]
    pub fn earned(&self) -> f64 {
        self.employment + self.self_employment
    }
}

/// Tax outcome for one person and year
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonTax {
    /// Income after deductions and pension split, before the OAS recovery
    pub net_income: f64,
    pub oas_clawback: f64,
    pub taxable_income: f64,
    pub federal_tax: f64,
    pub provincial_tax: f64,
}

impl PersonTax {
    #[must_use]
    pub fn total_tax(&self) -> f64 {
        self.federal_tax + self.provincial_tax
    }

    /// Net income less tax and the OAS recovery
    #[must_use]
    pub fn after_tax_income(&self) -> f64 {
        self.net_income - self.oas_clawback - self.total_tax()
    }
}

/// Pension income transferred between spouses for tax purposes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PensionSplit {
    pub from: PersonId,
    pub to: PersonId,
    pub fraction: f64,
    pub amount: f64,
    /// Combined tax saved relative to not splitting
    pub tax_saved: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonYear {
    pub person_id: PersonId,
    pub age: u8,
    pub alive: bool,
    pub income: IncomeBreakdown,
    /// RRSP/RRIF/LIRA/LIF withdrawals attributed to this person
    pub registered_withdrawals: f64,
    pub taxable_capital_gains: f64,
    pub rrsp_deduction: f64,
    /// Cash interest and eligible dividends from non-registered holdings
    pub interest_income: f64,
    pub dividend_income: f64,
    pub tax: PersonTax,
    /// Tax plus OAS recovery on the next dollar of ordinary income
    pub marginal_tax_rate: f64,
    /// Tax plus OAS recovery over net income
    pub average_tax_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountYear {
    pub account_id: AccountId,
    /// Kind in force during the year (after any conversion)
    pub kind: AccountKind,
    pub owner: Owner,
    pub opening_balance: f64,
    pub mandatory_withdrawal: f64,
    pub discretionary_withdrawal: f64,
    pub contribution: f64,
    /// Interest and dividends paid out in cash (non-registered only)
    pub distribution: f64,
    /// Capital gain realized by withdrawals (non-registered only)
    pub realized_gain: f64,
    /// Return applied to the post-flow balance, net of any distribution
    pub return_rate: f64,
    pub growth: f64,
    pub closing_balance: f64,
}

impl AccountYear {
    #[must_use]
    pub fn total_withdrawal(&self) -> f64 {
        self.mandatory_withdrawal + self.discretionary_withdrawal
    }
}

/// Contribution room movement for one person and room-tracked kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomYear {
    pub person_id: PersonId,
    pub kind: AccountKind,
    pub accrued: f64,
    pub consumed: f64,
    pub remaining: f64,
}

/// One simulated year; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionYear {
    pub year: i16,
    pub persons: Vec<PersonYear>,
    pub accounts: Vec<AccountYear>,
    pub room: Vec<RoomYear>,
    pub pension_split: Option<PensionSplit>,

    /// Income from sources other than account withdrawals, including
    /// non-registered interest and dividends
    pub gross_income: f64,
    pub mandatory_expenses: f64,
    pub discretionary_expenses: f64,
    pub total_withdrawals: f64,
    pub total_contributions: f64,
    pub realized_capital_gains: f64,
    pub taxable_capital_gains: f64,
    pub portfolio_interest_income: f64,
    pub portfolio_dividend_income: f64,

    pub taxable_income: f64,
    pub federal_tax: f64,
    pub provincial_tax: f64,
    pub oas_clawback: f64,
    /// Marginal rate of the first living person
    pub marginal_tax_rate: f64,
    /// Household tax plus OAS recovery over combined net income
    pub average_tax_rate: f64,

    /// Gross income less tax, clawback and expenses; negative when
    /// the household draws on savings
    pub net_cash_flow: f64,
    /// Surplus left after every contribution option was exhausted
    pub unallocated_surplus: f64,
    /// Spending the household could not fund (depletion event)
    pub shortfall: f64,
    pub net_worth: f64,
    pub settlement_rounds: u32,
}

impl ProjectionYear {
    #[must_use]
    pub fn total_expenses(&self) -> f64 {
        self.mandatory_expenses + self.discretionary_expenses
    }

    #[must_use]
    pub fn total_tax(&self) -> f64 {
        self.federal_tax + self.provincial_tax
    }

    #[must_use]
    pub fn account(&self, account_id: AccountId) -> Option<&AccountYear> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    #[must_use]
    pub fn person(&self, person_id: PersonId) -> Option<&PersonYear> {
        self.persons.iter().find(|p| p.person_id == person_id)
    }

    #[must_use]
    pub fn room_for(&self, person_id: PersonId, kind: AccountKind) -> Option<&RoomYear> {
        self.room
            .iter()
            .find(|r| r.person_id == person_id && r.kind == kind)
    }

    #[must_use]
    pub fn is_depletion_event(&self) -> bool {
        self.shortfall > 0.0
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum TerminalState {
    HorizonComplete,
    /// No assets left and income cannot cover mandatory spending
    Depleted { year: i16 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub start_year: i16,
    pub end_year: i16,
    pub years: Vec<ProjectionYear>,
    pub terminal: TerminalState,
    /// First year with an unfunded shortfall
    pub depletion_year: Option<i16>,
    /// Primary person's age in `depletion_year`
    pub depletion_age: Option<u8>,
}

impl ProjectionResult {
    #[must_use]
    pub fn year(&self, year: i16) -> Option<&ProjectionYear> {
        self.years.iter().find(|y| y.year == year)
    }

    /// Net worth at the end of the last simulated year (zero for an empty run)
    #[must_use]
    pub fn final_net_worth(&self) -> f64 {
        self.years.last().map_or(0.0, |y| y.net_worth)
    }

    /// Net worth at the end of `year`; years after an early termination are zero
    #[must_use]
    pub fn net_worth_in(&self, year: i16) -> f64 {
        self.year(year).map_or(0.0, |y| y.net_worth)
    }

    #[must_use]
    pub fn total_tax(&self) -> f64 {
        self.years.iter().map(ProjectionYear::total_tax).sum()
    }

    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.depletion_year.is_some()
    }
}

/// Desired spending against the largest flat spending the plan can carry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendingSolution {
    /// Total expenses of the first projected year
    pub desired_spending: f64,
    /// Largest start-year-dollar spending, indexed with inflation every year,
    /// that never produces a shortfall; zero when even no spending fails
    pub sustainable_spending: f64,
    /// Projections run by the search
    pub evaluations: u32,
    /// Whether the bracket narrowed to the tolerance
    pub converged: bool,
}

impl SpendingSolution {
    /// Sustainable minus desired; negative when the plan is underfunded
    #[must_use]
    pub fn gap(&self) -> f64 {
        self.sustainable_spending - self.desired_spending
    }

    #[must_use]
    pub fn is_funded(&self) -> bool {
        self.gap() >= 0.0
    }
}

// ============================================================================
// Monte Carlo
// ============================================================================

/// Configuration for Monte Carlo simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub trials: usize,
    pub seed: u64,
    /// Percentiles reported for terminal net worth and the yearly bands
    pub percentiles: Vec<f64>,
    /// Worker threads; the rayon default when absent
    pub workers: Option<usize>,
    /// Number of full trial projections kept in the result
    pub keep_sample_paths: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            trials: 1_000,
            seed: 42,
            percentiles: vec![0.10, 0.25, 0.50, 0.75, 0.90],
            workers: None,
            keep_sample_paths: 0,
        }
    }
}

/// Progress tracking shared between a running batch and its caller
#[derive(Debug, Clone)]
pub struct MonteCarloProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl MonteCarloProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create from existing atomics (for host integration)
    pub fn from_atomics(
        completed: Arc<AtomicUsize>,
        total: Arc<AtomicUsize>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            completed,
            total,
            cancelled,
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Start counting a batch of `total` trials. A cancel requested before
    /// the batch starts is kept.
    pub fn begin(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Clear counts and any earlier cancel so the handle can drive another
    /// batch
    pub fn reset(&self, total: usize) {
        self.begin(total);
        self.cancelled.store(false, Ordering::Relaxed);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for MonteCarloProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal outcome of one trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial: usize,
    pub terminal_net_worth: f64,
    pub depletion_year: Option<i16>,
    /// Primary person's age in the depletion year
    pub depletion_age: Option<u8>,
}

/// Net worth distribution across trials for one calendar year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub year: i16,
    pub primary_age: Option<u8>,
    /// (percentile, value) pairs
    pub values: Vec<(f64, f64)>,
}

impl PercentileBand {
    #[must_use]
    pub fn value(&self, percentile: f64) -> Option<f64> {
        find_percentile_value(&self.values, percentile)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub num_trials: usize,
    pub seed: u64,
    /// One entry per trial, ordered by trial index
    pub outcomes: Vec<TrialOutcome>,
    /// (percentile, terminal net worth) pairs
    pub terminal_percentiles: Vec<(f64, f64)>,
    pub mean_terminal_net_worth: f64,
    /// Fraction of trials with a depletion event before the horizon end
    pub depletion_probability: f64,
    /// Median depletion age of the primary person over depleting trials
    pub median_depletion_age: Option<f64>,
    pub net_worth_bands: Vec<PercentileBand>,
    pub sample_paths: Vec<ProjectionResult>,
}

impl SimulationResult {
    #[must_use]
    pub fn terminal_percentile(&self, percentile: f64) -> Option<f64> {
        find_percentile_value(&self.terminal_percentiles, percentile)
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        1.0 - self.depletion_probability
    }
}
