//! Monte Carlo simulator
//!
//! Runs the deterministic orchestrator once per trial with a sampled market
//! path (and optionally a randomly timed shock), then aggregates terminal
//! wealth, depletion and per-year net worth into a `SimulationResult`.
//!
//! Each trial owns its RNG, seeded from the batch seed and the trial index,
//! so results are identical whatever the worker count or scheduling.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::PlanConfig;
use crate::error::{ProjectionError, SimulationError};
use crate::model::{
    MarketPath, MonteCarloConfig, MonteCarloProgress, PercentileBand, ProjectionResult,
    SimulationResult, TrialOutcome,
};
use crate::projection::run_projection;

/// Reduced trial output kept for aggregation
#[derive(Debug, Clone)]
struct TrialRun {
    outcome: TrialOutcome,
    /// Year-end net worth for every horizon year; zero after depletion
    net_worth: Vec<f64>,
    /// Full projection, kept only for sample paths
    projection: Option<ProjectionResult>,
}

/// Seed for one trial: a splitmix64 finalizer over the batch seed and index
#[must_use]
pub fn trial_seed(seed: u64, trial: usize) -> u64 {
    let mut z = seed ^ (trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Linear interpolation between closest ranks; `sorted` must be ascending
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

fn validate_config(config: &MonteCarloConfig) -> Result<(), SimulationError> {
    if config.trials == 0 {
        return Err(SimulationError::InvalidConfig("trials must be > 0".into()));
    }
    if config.workers == Some(0) {
        return Err(SimulationError::InvalidConfig("workers must be > 0".into()));
    }
    if let Some(p) = config
        .percentiles
        .iter()
        .find(|p| !(0.0..=1.0).contains(*p))
    {
        return Err(SimulationError::InvalidConfig(format!(
            "percentile {p} outside [0, 1]"
        )));
    }
    Ok(())
}

pub fn monte_carlo(
    plan: &PlanConfig,
    config: &MonteCarloConfig,
) -> Result<SimulationResult, SimulationError> {
    monte_carlo_with_progress(plan, config, &MonteCarloProgress::new())
}

/// Monte Carlo batch reporting into `progress`; cancellation is checked
/// between trials
pub fn monte_carlo_with_progress(
    plan: &PlanConfig,
    config: &MonteCarloConfig,
    progress: &MonteCarloProgress,
) -> Result<SimulationResult, SimulationError> {
    validate_config(config)?;
    plan.validate().map_err(SimulationError::InvalidPlan)?;

    progress.begin(config.trials);
    info!(
        trials = config.trials,
        seed = config.seed,
        workers = ?config.workers,
        "monte carlo started"
    );

    let runs = run_trials(plan, config, progress)?;
    if progress.is_cancelled() {
        return Err(SimulationError::Cancelled);
    }

    let result = aggregate(plan, config, runs);
    info!(
        trials = result.num_trials,
        depletion_probability = result.depletion_probability,
        mean_terminal_net_worth = result.mean_terminal_net_worth,
        "monte carlo finished"
    );
    Ok(result)
}

fn run_trial(
    plan: &PlanConfig,
    config: &MonteCarloConfig,
    trial: usize,
    progress: &MonteCarloProgress,
) -> Result<TrialRun, SimulationError> {
    if progress.is_cancelled() {
        return Err(SimulationError::Cancelled);
    }
    let fail = |source: ProjectionError| SimulationError::Projection { trial, source };

    let horizon = plan.household.horizon_years();
    let mut rng = SmallRng::seed_from_u64(trial_seed(config.seed, trial));
    let assumptions = &plan.assumptions;
    let path = MarketPath::sample(
        &mut rng,
        &assumptions.returns,
        &assumptions.return_model,
        horizon,
    )
    .map_err(|e| fail(e.into()))?;

    let black_swan = assumptions.black_swan.map(|shock| {
        if shock.randomize_timing && horizon > 0 {
            let offset = rng.random_range(0..horizon);
            shock.at_offset(u16::try_from(offset).unwrap_or(u16::MAX))
        } else {
            shock
        }
    });

    let projection = run_projection(plan, &path, black_swan).map_err(fail)?;
    debug!(trial, terminal = ?projection.terminal, "trial finished");

    let household = &plan.household;
    let net_worth = (0..horizon)
        .map(|offset| projection.net_worth_in(household.start_year + offset as i16))
        .collect();
    let outcome = TrialOutcome {
        trial,
        terminal_net_worth: projection.final_net_worth(),
        depletion_year: projection.depletion_year,
        depletion_age: projection.depletion_age,
    };

    progress.increment();
    Ok(TrialRun {
        outcome,
        net_worth,
        projection: (trial < config.keep_sample_paths).then_some(projection),
    })
}

#[cfg(feature = "parallel")]
fn run_trials(
    plan: &PlanConfig,
    config: &MonteCarloConfig,
    progress: &MonteCarloProgress,
) -> Result<Vec<TrialRun>, SimulationError> {
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let batch = || {
        (0..config.trials)
            .into_par_iter()
            .map(|trial| run_trial(plan, config, trial, progress))
            .collect::<Result<Vec<_>, _>>()
    };
    match config.workers {
        Some(workers) => rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SimulationError::InvalidConfig(e.to_string()))?
            .install(batch),
        None => batch(),
    }
}

#[cfg(not(feature = "parallel"))]
fn run_trials(
    plan: &PlanConfig,
    config: &MonteCarloConfig,
    progress: &MonteCarloProgress,
) -> Result<Vec<TrialRun>, SimulationError> {
    (0..config.trials)
        .map(|trial| run_trial(plan, config, trial, progress))
        .collect()
}

fn aggregate(
    plan: &PlanConfig,
    config: &MonteCarloConfig,
    runs: Vec<TrialRun>,
) -> SimulationResult {
    let num_trials = runs.len();
    let household = &plan.household;

    let mut terminal: Vec<f64> = runs.iter().map(|r| r.outcome.terminal_net_worth).collect();
    terminal.sort_by(f64::total_cmp);
    let terminal_percentiles = config
        .percentiles
        .iter()
        .filter_map(|&p| percentile(&terminal, p).map(|v| (p, v)))
        .collect();
    let mean_terminal_net_worth = if num_trials == 0 {
        0.0
    } else {
        terminal.iter().sum::<f64>() / num_trials as f64
    };

    let depleted = runs.iter().filter(|r| r.outcome.depletion_year.is_some()).count();
    let depletion_probability = if num_trials == 0 {
        0.0
    } else {
        depleted as f64 / num_trials as f64
    };
    let mut ages: Vec<f64> = runs
        .iter()
        .filter_map(|r| r.outcome.depletion_age.map(f64::from))
        .collect();
    ages.sort_by(f64::total_cmp);
    let median_depletion_age = percentile(&ages, 0.5);

    let net_worth_bands = (0..household.horizon_years())
        .map(|offset| {
            let year = household.start_year + offset as i16;
            let mut values: Vec<f64> = runs.iter().map(|r| r.net_worth[offset]).collect();
            values.sort_by(f64::total_cmp);
            PercentileBand {
                year,
                primary_age: household.primary().map(|p| p.age_in(year)),
                values: config
                    .percentiles
                    .iter()
                    .filter_map(|&p| percentile(&values, p).map(|v| (p, v)))
                    .collect(),
            }
        })
        .collect();

    let mut outcomes = Vec::with_capacity(num_trials);
    let mut sample_paths = Vec::new();
    for run in runs {
        outcomes.push(run.outcome);
        if let Some(projection) = run.projection {
            sample_paths.push(projection);
        }
    }

    SimulationResult {
        num_trials,
        seed: config.seed,
        outcomes,
        terminal_percentiles,
        mean_terminal_net_worth,
        depletion_probability,
        median_depletion_age,
        net_worth_bands,
        sample_paths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 0.0), Some(10.0));
        assert_eq!(percentile(&values, 1.0), Some(40.0));
        assert!((percentile(&values, 0.5).unwrap() - 25.0).abs() < 1e-12);
        assert!((percentile(&values, 0.25).unwrap() - 17.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_trial_seeds_are_distinct() {
        let seeds: std::collections::HashSet<u64> =
            (0..1_000).map(|t| trial_seed(42, t)).collect();
        assert_eq!(seeds.len(), 1_000);
        assert_eq!(trial_seed(7, 3), trial_seed(7, 3));
        assert_ne!(trial_seed(7, 3), trial_seed(8, 3));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let plan = crate::config::PlanBuilder::new()
            .person(crate::config::PersonBuilder::new("Alex"))
            .build();
        let zero = MonteCarloConfig {
            trials: 0,
            ..MonteCarloConfig::default()
        };
        assert!(matches!(
            monte_carlo(&plan, &zero),
            Err(SimulationError::InvalidConfig(_))
        ));

        let bad_percentile = MonteCarloConfig {
            percentiles: vec![1.5],
            ..MonteCarloConfig::default()
        };
        assert!(matches!(
            monte_carlo(&plan, &bad_percentile),
            Err(SimulationError::InvalidConfig(_))
        ));
    }
}
