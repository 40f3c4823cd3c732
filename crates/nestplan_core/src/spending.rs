//! Sustainable spending search
//!
//! Finds the largest flat spending level, indexed like any recurring
//! expense, that the plan funds in every year without a shortfall. The
//! plan's own expenses are replaced by that single level. Being funded is
//! monotonic in the level, so a bracket of (funded, unfunded) levels only
//! ever narrows under bisection.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PlanConfig;
use crate::error::{ConfigError, ProjectionError};
use crate::model::{Expense, ExpenseCategory, MarketPath, SpendingSolution};
use crate::projection::{project, run_projection};

/// Lowest upper bound tried before doubling
const INITIAL_CEILING: f64 = 1_000.0;

/// Bisection settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendingSearch {
    /// Stop once the bracket is narrower than this many dollars
    pub tolerance: f64,
    pub max_iterations: u32,
    /// Largest level the search will consider
    pub ceiling: f64,
}

impl Default for SpendingSearch {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            max_iterations: 60,
            ceiling: 10_000_000.0,
        }
    }
}

impl SpendingSearch {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "spending_search.tolerance",
                value: self.tolerance,
                reason: "must be positive",
            });
        }
        if !self.ceiling.is_finite() || self.ceiling <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "spending_search.ceiling",
                value: self.ceiling,
                reason: "must be positive and finite",
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "spending_search.max_iterations",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Runs the plan at candidate spending levels along the mean-return path
struct LevelEvaluator<'a> {
    plan: &'a PlanConfig,
    path: MarketPath,
    evaluations: u32,
}

impl<'a> LevelEvaluator<'a> {
    fn new(plan: &'a PlanConfig) -> Self {
        let horizon = plan.household.horizon_years();
        Self {
            plan,
            path: MarketPath::deterministic(&plan.assumptions.returns, horizon),
            evaluations: 0,
        }
    }

    fn is_funded(&mut self, level: f64) -> Result<bool, ProjectionError> {
        let mut candidate = self.plan.clone();
        candidate.household.expenses = vec![Expense::recurring(
            "Sustainable spending",
            level,
            ExpenseCategory::Other,
        )];
        let result = run_projection(&candidate, &self.path, self.plan.assumptions.black_swan)?;
        self.evaluations += 1;

        let funded = result.depletion_year.is_none();
        debug!(level, funded, evaluation = self.evaluations, "spending level evaluated");
        Ok(funded)
    }
}

/// Largest indexed spending the plan can carry, next to the spending it
/// currently asks for
pub fn sustainable_spending(
    plan: &PlanConfig,
    search: &SpendingSearch,
) -> Result<SpendingSolution, ProjectionError> {
    search.validate()?;
    let desired_spending = project(plan)?
        .years
        .first()
        .map_or(0.0, |year| year.total_expenses());

    let mut evaluator = LevelEvaluator::new(plan);
    let solution = |sustainable_spending: f64, evaluations: u32, converged: bool| {
        SpendingSolution {
            desired_spending,
            sustainable_spending,
            evaluations,
            converged,
        }
    };

    if !evaluator.is_funded(0.0)? {
        info!(desired_spending, "plan fails even without spending");
        return Ok(solution(0.0, evaluator.evaluations, true));
    }

    // Grow the bracket until its top is unfunded
    let mut low = 0.0;
    let mut high = desired_spending.max(INITIAL_CEILING).min(search.ceiling);
    while evaluator.is_funded(high)? {
        if high >= search.ceiling {
            info!(ceiling = search.ceiling, "spending search reached its ceiling");
            return Ok(solution(high, evaluator.evaluations, false));
        }
        low = high;
        high = (high * 2.0).min(search.ceiling);
    }

    let mut iterations = 0;
    while high - low > search.tolerance && iterations < search.max_iterations {
        iterations += 1;
        let mid = f64::midpoint(low, high);
        if evaluator.is_funded(mid)? {
            low = mid;
        } else {
            high = mid;
        }
    }

    let converged = high - low <= search.tolerance;
    info!(
        desired_spending,
        sustainable_spending = low,
        evaluations = evaluator.evaluations,
        converged,
        "spending search finished"
    );
    Ok(solution(low, evaluator.evaluations, converged))
}
