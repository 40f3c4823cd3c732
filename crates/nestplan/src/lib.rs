//! Command-line host for the nestplan projection engine
//!
//! Reads a JSON plan document, runs a deterministic projection, a Monte Carlo
//! batch, a scenario comparison or a sustainable spending search, and writes
//! the result as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use nestplan_core::model::{MonteCarloConfig, MonteCarloProgress, SimulationResult};
use nestplan_core::scenario::BASE_SCENARIO;
use nestplan_core::{PlanConfig, Scenario, ScenarioError, ScenarioSet, SpendingSearch};
use serde::{Deserialize, Serialize};
use tracing::info;

mod logging;

pub use logging::{default_filter, init_logging};

/// How often the foreground thread reports batch progress
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "nestplan")]
#[command(about = "Retirement projections for Canadian households")]
pub struct Cli {
    /// Plan document (JSON)
    #[arg(short, long, global = true, default_value = "plan.json")]
    pub plan: PathBuf,

    /// Write results here instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Deterministic year-by-year projection
    Project {
        #[arg(short, long, default_value = BASE_SCENARIO)]
        scenario: String,
    },
    /// Monte Carlo simulation
    Simulate {
        #[arg(short, long, default_value = BASE_SCENARIO)]
        scenario: String,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Compare scenarios against a baseline
    Compare {
        #[arg(short, long, default_value = BASE_SCENARIO)]
        baseline: String,
        /// Scenario to compare; every scenario when omitted
        #[arg(short, long)]
        scenario: Option<String>,
        /// Compare Monte Carlo batches instead of deterministic runs
        #[arg(long)]
        monte_carlo: bool,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Largest indexed spending the plan can fund every year
    Spending {
        #[arg(short, long, default_value = BASE_SCENARIO)]
        scenario: String,
        /// Dollar width at which the search stops
        #[arg(long, default_value_t = 1.0)]
        tolerance: f64,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct BatchArgs {
    #[arg(short, long, default_value_t = 1_000)]
    pub trials: usize,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Worker threads (rayon default when omitted)
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Full trial projections to keep in the output
    #[arg(long, default_value_t = 0)]
    pub keep_paths: usize,
}

impl BatchArgs {
    #[must_use]
    pub fn to_config(&self) -> MonteCarloConfig {
        MonteCarloConfig {
            trials: self.trials,
            seed: self.seed,
            workers: self.workers,
            keep_sample_paths: self.keep_paths,
            ..MonteCarloConfig::default()
        }
    }
}

// ============================================================================
// Plan document
// ============================================================================

/// On-disk input: a base plan plus named scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub base: PlanConfig,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl PlanDocument {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read plan document {}", path.display()))?;
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("failed to parse plan document {}", path.display()))
    }

    pub fn into_scenario_set(self) -> Result<ScenarioSet, ScenarioError> {
        ScenarioSet::new(self.base).with_scenarios(self.scenarios)
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Run one command to completion and write its JSON result
pub fn run(cli: &Cli) -> color_eyre::Result<()> {
    let document = PlanDocument::load(&cli.plan)?;
    let set = document.into_scenario_set()?;
    info!(
        plan = %cli.plan.display(),
        scenarios = set.names().count() - 1,
        "plan loaded"
    );

    let json = match &cli.command {
        Command::Project { scenario } => {
            let result = set.project(scenario)?;
            info!(
                scenario = scenario.as_str(),
                years = result.years.len(),
                depletion_year = ?result.depletion_year,
                final_net_worth = result.final_net_worth(),
                "projection complete"
            );
            serde_json::to_string_pretty(&result)?
        }
        Command::Simulate { scenario, batch } => {
            let result = simulate_with_progress(&set, scenario, &batch.to_config())?;
            info!(
                scenario = scenario.as_str(),
                success_rate = result.success_rate(),
                "simulation complete"
            );
            serde_json::to_string_pretty(&result)?
        }
        Command::Compare {
            baseline,
            scenario,
            monte_carlo,
            batch,
        } => {
            let targets: Vec<String> = match scenario {
                Some(name) => vec![name.clone()],
                None => set
                    .names()
                    .filter(|name| *name != baseline.as_str())
                    .map(str::to_string)
                    .collect(),
            };
            if targets.is_empty() {
                return Err(eyre!("plan document has no scenarios to compare"));
            }

            if *monte_carlo {
                let config = batch.to_config();
                let comparisons = targets
                    .iter()
                    .map(|name| set.compare_simulations(baseline, name, &config))
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_string_pretty(&comparisons)?
            } else {
                let comparisons = targets
                    .iter()
                    .map(|name| set.compare(baseline, name))
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_string_pretty(&comparisons)?
            }
        }
        Command::Spending {
            scenario,
            tolerance,
        } => {
            let search = SpendingSearch {
                tolerance: *tolerance,
                ..SpendingSearch::default()
            };
            let solution = set.sustainable_spending(scenario, &search)?;
            info!(
                scenario = scenario.as_str(),
                desired = solution.desired_spending,
                sustainable = solution.sustainable_spending,
                "spending search complete"
            );
            serde_json::to_string_pretty(&solution)?
        }
    };

    write_output(cli.output.as_deref(), &json)
}

fn write_output(output: Option<&Path>, json: &str) -> color_eyre::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, json)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "results written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Run a Monte Carlo batch on a worker thread, logging progress until it ends
pub fn simulate_with_progress(
    set: &ScenarioSet,
    scenario: &str,
    config: &MonteCarloConfig,
) -> color_eyre::Result<SimulationResult> {
    let progress = MonteCarloProgress::new();

    thread::scope(|scope| -> color_eyre::Result<SimulationResult> {
        let worker_progress = progress.clone();
        let handle = scope.spawn(move || set.simulate(scenario, config, &worker_progress));

        let mut reported = 0;
        while !handle.is_finished() {
            thread::sleep(PROGRESS_INTERVAL);
            let completed = progress.completed();
            if completed != reported {
                reported = completed;
                info!(
                    completed,
                    total = progress.total(),
                    "simulating {scenario}"
                );
            }
        }

        handle
            .join()
            .map_err(|_| eyre!("simulation worker panicked"))?
            .map_err(Into::into)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use nestplan_core::config::{AccountBuilder, PersonBuilder, PlanBuilder};
    use nestplan_core::model::{Expense, ExpenseCategory, ProjectionResult, SpendingSolution};
    use nestplan_core::scenario::ScenarioComparison;
    use nestplan_core::PlanOverrides;

    fn write_document(dir: &Path) -> PathBuf {
        let base = PlanBuilder::new()
            .start_year(2025)
            .person(
                PersonBuilder::new("Alex")
                    .born(1960, 5, 1)
                    .life_expectancy(85)
                    .cpp(65, 12_000.0)
                    .oas(65),
            )
            .account(AccountBuilder::rrif("RRIF").owned_by("Alex").balance(400_000.0))
            .account(AccountBuilder::tfsa("TFSA").owned_by("Alex").balance(80_000.0))
            .expense(Expense::recurring("Living", 45_000.0, ExpenseCategory::Other))
            .build();
        let document = PlanDocument {
            base,
            scenarios: vec![Scenario::new(
                "inflation",
                PlanOverrides {
                    general_inflation: Some(0.04),
                    ..PlanOverrides::default()
                },
            )],
        };
        let path = dir.join("plan.json");
        fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
        path
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nestplan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_document_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path());
        let document = PlanDocument::load(&path).unwrap();
        assert_eq!(document.scenarios.len(), 1);
        let set = document.into_scenario_set().unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec![BASE_SCENARIO, "inflation"]);
    }

    #[test]
    fn test_project_writes_result() {
        let dir = tempfile::tempdir().unwrap();
        let plan = write_document(dir.path());
        let output = dir.path().join("out.json");
        let cli = parse(&[
            "project",
            "--plan",
            plan.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ]);
        run(&cli).unwrap();

        let result: ProjectionResult =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(result.start_year, 2025);
        assert_eq!(result.end_year, 2045);
    }

    #[test]
    fn test_spending_reports_desired_and_sustainable() {
        let dir = tempfile::tempdir().unwrap();
        let plan = write_document(dir.path());
        let output = dir.path().join("spending.json");
        let cli = parse(&[
            "spending",
            "--plan",
            plan.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--tolerance",
            "10",
        ]);
        assert_eq!(
            cli.command,
            Command::Spending {
                scenario: BASE_SCENARIO.to_string(),
                tolerance: 10.0,
            }
        );
        run(&cli).unwrap();

        let solution: SpendingSolution =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert!(solution.desired_spending >= 45_000.0);
        assert!(solution.sustainable_spending > 0.0);
        assert!(solution.converged);
    }

    #[test]
    fn test_simulate_uses_batch_options() {
        let dir = tempfile::tempdir().unwrap();
        let plan = write_document(dir.path());
        let output = dir.path().join("mc.json");
        let cli = parse(&[
            "simulate",
            "--plan",
            plan.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--scenario",
            "inflation",
            "--trials",
            "25",
            "--seed",
            "9",
            "--workers",
            "2",
        ]);
        run(&cli).unwrap();

        let result: SimulationResult =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(result.num_trials, 25);
        assert_eq!(result.seed, 9);
    }

    #[test]
    fn test_compare_defaults_to_every_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let plan = write_document(dir.path());
        let output = dir.path().join("compare.json");
        let cli = parse(&[
            "compare",
            "--plan",
            plan.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ]);
        run(&cli).unwrap();

        let comparisons: Vec<ScenarioComparison> =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].baseline, BASE_SCENARIO);
        assert_eq!(comparisons[0].scenario, "inflation");
    }

    #[test]
    fn test_unknown_scenario_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let plan = write_document(dir.path());
        let cli = parse(&["project", "--plan", plan.to_str().unwrap(), "--scenario", "nope"]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("unknown scenario 'nope'"));
    }

    #[test]
    fn test_missing_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let cli = parse(&["project", "--plan", missing.to_str().unwrap()]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("failed to read plan document"));
    }

    #[test]
    fn test_worker_thread_simulation_matches_direct_call() {
        let dir = tempfile::tempdir().unwrap();
        let set = PlanDocument::load(&write_document(dir.path()))
            .unwrap()
            .into_scenario_set()
            .unwrap();
        let config = MonteCarloConfig {
            trials: 10,
            ..MonteCarloConfig::default()
        };
        let threaded = simulate_with_progress(&set, BASE_SCENARIO, &config).unwrap();
        let direct = nestplan_core::monte_carlo(set.base(), &config).unwrap();
        assert_eq!(threaded, direct);
    }
}
