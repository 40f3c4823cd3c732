//! Scenario manager
//!
//! A scenario is a named set of field-level overrides on a base plan. A
//! present field replaces the base value; an absent one inherits it. Every
//! scenario resolves to its own cloned `PlanConfig`, so runs never share
//! mutable state and can be compared year by year.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{PlanConfig, WithdrawalOrder};
use crate::error::{ConfigError, ScenarioError};
use crate::model::{
    AccountKind, AssetClass, AssetClassAssumption, BlackSwan, DistributionYields,
    ExpenseCategory, GlidePath, MonteCarloConfig, MonteCarloProgress, PersonId,
    ProjectionResult, ReturnModel, SimulationResult, SpendingSmile, SpendingSolution,
};
use crate::projection::project;
use crate::simulation::monte_carlo_with_progress;
use crate::spending::{SpendingSearch, sustainable_spending};

/// Name under which the unmodified base plan is addressed
pub const BASE_SCENARIO: &str = "base";

/// Replace or remove the base plan's market shock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShockOverride {
    Set(BlackSwan),
    Disable,
}

/// Per-person elections a scenario may change
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonOverrides {
    pub life_expectancy: Option<u8>,
    pub cpp_start_age: Option<u8>,
    pub oas_start_age: Option<u8>,
}

impl PersonOverrides {
    #[must_use]
    pub fn then(self, later: Self) -> Self {
        Self {
            life_expectancy: later.life_expectancy.or(self.life_expectancy),
            cpp_start_age: later.cpp_start_age.or(self.cpp_start_age),
            oas_start_age: later.oas_start_age.or(self.oas_start_age),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOverrides {
    // Assumptions
    pub general_inflation: Option<f64>,
    pub healthcare_premium: Option<f64>,
    /// Merged key-wise into the base category rates
    pub category_inflation: BTreeMap<ExpenseCategory, f64>,
    /// Merged per asset class
    pub returns: BTreeMap<AssetClass, AssetClassAssumption>,
    pub glide_path: Option<GlidePath>,
    pub black_swan: Option<ShockOverride>,
    pub spending_smile: Option<SpendingSmile>,
    pub return_model: Option<ReturnModel>,
    pub distributions: Option<DistributionYields>,

    // Strategy
    pub withdrawal_order: Option<WithdrawalOrder>,
    pub contribution_priority: Option<Vec<AccountKind>>,
    pub conversion_age: Option<u8>,

    // Household
    pub end_year: Option<i16>,
    /// Start of the spending smile
    pub retirement_year: Option<i16>,
    pub persons: BTreeMap<PersonId, PersonOverrides>,
}

impl PlanOverrides {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer `later` on top of `self`; `later` wins field by field
    #[must_use]
    pub fn then(self, later: Self) -> Self {
        let mut category_inflation = self.category_inflation;
        category_inflation.extend(later.category_inflation);
        let mut returns = self.returns;
        returns.extend(later.returns);
        let mut persons = self.persons;
        for (id, person) in later.persons {
            let merged = persons.get(&id).copied().unwrap_or_default().then(person);
            persons.insert(id, merged);
        }

        Self {
            general_inflation: later.general_inflation.or(self.general_inflation),
            healthcare_premium: later.healthcare_premium.or(self.healthcare_premium),
            category_inflation,
            returns,
            glide_path: later.glide_path.or(self.glide_path),
            black_swan: later.black_swan.or(self.black_swan),
            spending_smile: later.spending_smile.or(self.spending_smile),
            return_model: later.return_model.or(self.return_model),
            distributions: later.distributions.or(self.distributions),
            withdrawal_order: later.withdrawal_order.or(self.withdrawal_order),
            contribution_priority: later.contribution_priority.or(self.contribution_priority),
            conversion_age: later.conversion_age.or(self.conversion_age),
            end_year: later.end_year.or(self.end_year),
            retirement_year: later.retirement_year.or(self.retirement_year),
            persons,
        }
    }

    /// Resolve against `base`, producing an independent plan
    pub fn apply(&self, base: &PlanConfig) -> Result<PlanConfig, ConfigError> {
        let mut plan = base.clone();

        let assumptions = &mut plan.assumptions;
        if let Some(rate) = self.general_inflation {
            assumptions.inflation.general = rate;
        }
        if let Some(premium) = self.healthcare_premium {
            assumptions.inflation.healthcare_premium = premium;
        }
        assumptions
            .inflation
            .categories
            .extend(self.category_inflation.iter().map(|(k, v)| (*k, *v)));
        for (class, assumption) in &self.returns {
            *assumptions.returns.get_mut(*class) = *assumption;
        }
        if let Some(glide) = &self.glide_path {
            assumptions.glide_path = Some(glide.clone());
        }
        match self.black_swan {
            Some(ShockOverride::Set(shock)) => assumptions.black_swan = Some(shock),
            Some(ShockOverride::Disable) => assumptions.black_swan = None,
            None => {}
        }
        if let Some(smile) = self.spending_smile {
            assumptions.spending_smile = smile;
        }
        if let Some(year) = self.retirement_year {
            assumptions.spending_smile.retirement_year = Some(year);
        }
        if let Some(model) = &self.return_model {
            assumptions.return_model = model.clone();
        }
        if let Some(yields) = self.distributions {
            assumptions.distributions = yields;
        }

        if let Some(order) = &self.withdrawal_order {
            plan.strategy.withdrawal_order = order.clone();
        }
        if let Some(priority) = &self.contribution_priority {
            plan.strategy.contribution_priority = priority.clone();
        }
        if let Some(age) = self.conversion_age {
            plan.strategy.conversion_age = age;
        }

        if let Some(year) = self.end_year {
            plan.household.end_year_override = Some(year);
        }
        for (&person_id, overrides) in &self.persons {
            let person = plan
                .household
                .persons
                .iter_mut()
                .find(|p| p.person_id == person_id)
                .ok_or(ConfigError::UnknownPerson {
                    person_id,
                    context: "scenario override",
                })?;
            if let Some(age) = overrides.life_expectancy {
                person.life_expectancy = age;
            }
            if let Some(age) = overrides.cpp_start_age {
                let cpp = person.cpp.as_mut().ok_or(ConfigError::InvalidElection {
                    person_id,
                    field: "cpp.start_age",
                    value: f64::from(age),
                    reason: "person has no CPP entitlement",
                })?;
                cpp.start_age = age;
            }
            if let Some(age) = overrides.oas_start_age {
                let oas = person.oas.as_mut().ok_or(ConfigError::InvalidElection {
                    person_id,
                    field: "oas.start_age",
                    value: f64::from(age),
                    reason: "person has no OAS entitlement",
                })?;
                oas.start_age = age;
            }
        }
        Ok(plan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub overrides: PlanOverrides,
}

impl Scenario {
    #[must_use]
    pub fn new(name: impl Into<String>, overrides: PlanOverrides) -> Self {
        Self {
            name: name.into(),
            description: None,
            overrides,
        }
    }
}

/// Net worth and tax difference for one calendar year (scenario − baseline)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearDelta {
    pub year: i16,
    pub baseline_net_worth: f64,
    pub scenario_net_worth: f64,
    pub net_worth_delta: f64,
    pub tax_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub baseline: String,
    pub scenario: String,
    pub years: Vec<YearDelta>,
    pub terminal_net_worth_delta: f64,
    pub total_tax_delta: f64,
    pub baseline_depletion_year: Option<i16>,
    pub scenario_depletion_year: Option<i16>,
}

impl ScenarioComparison {
    #[must_use]
    pub fn between(
        baseline: (&str, &ProjectionResult),
        scenario: (&str, &ProjectionResult),
    ) -> Self {
        let (base_name, base) = baseline;
        let (name, other) = scenario;
        let first = base.start_year.min(other.start_year);
        let last = base.end_year.max(other.end_year);
        let tax_in = |result: &ProjectionResult, year| {
            result
                .year(year)
                .map_or(0.0, |y| y.total_tax() + y.oas_clawback)
        };

        let years = (first..=last)
            .map(|year| {
                let baseline_net_worth = base.net_worth_in(year);
                let scenario_net_worth = other.net_worth_in(year);
                YearDelta {
                    year,
                    baseline_net_worth,
                    scenario_net_worth,
                    net_worth_delta: scenario_net_worth - baseline_net_worth,
                    tax_delta: tax_in(other, year) - tax_in(base, year),
                }
            })
            .collect();

        Self {
            baseline: base_name.to_string(),
            scenario: name.to_string(),
            years,
            terminal_net_worth_delta: other.final_net_worth() - base.final_net_worth(),
            total_tax_delta: other.total_tax() - base.total_tax(),
            baseline_depletion_year: base.depletion_year,
            scenario_depletion_year: other.depletion_year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationComparison {
    pub baseline: String,
    pub scenario: String,
    pub success_rate_delta: f64,
    pub mean_terminal_delta: f64,
    /// (percentile, scenario − baseline) pairs
    pub terminal_percentile_deltas: Vec<(f64, f64)>,
}

impl SimulationComparison {
    #[must_use]
    pub fn between(
        baseline: (&str, &SimulationResult),
        scenario: (&str, &SimulationResult),
    ) -> Self {
        let (base_name, base) = baseline;
        let (name, other) = scenario;
        Self {
            baseline: base_name.to_string(),
            scenario: name.to_string(),
            success_rate_delta: other.success_rate() - base.success_rate(),
            mean_terminal_delta: other.mean_terminal_net_worth - base.mean_terminal_net_worth,
            terminal_percentile_deltas: base
                .terminal_percentiles
                .iter()
                .filter_map(|&(p, v)| other.terminal_percentile(p).map(|o| (p, o - v)))
                .collect(),
        }
    }
}

/// Base plan plus named scenarios
#[derive(Debug, Clone)]
pub struct ScenarioSet {
    base: PlanConfig,
    scenarios: Vec<Scenario>,
    index: FxHashMap<String, usize>,
}

impl ScenarioSet {
    #[must_use]
    pub fn new(base: PlanConfig) -> Self {
        Self {
            base,
            scenarios: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, scenario: Scenario) -> Result<(), ScenarioError> {
        if scenario.name == BASE_SCENARIO || self.index.contains_key(&scenario.name) {
            return Err(ScenarioError::DuplicateScenario(scenario.name));
        }
        self.index.insert(scenario.name.clone(), self.scenarios.len());
        self.scenarios.push(scenario);
        Ok(())
    }

    pub fn with_scenarios(
        mut self,
        scenarios: impl IntoIterator<Item = Scenario>,
    ) -> Result<Self, ScenarioError> {
        for scenario in scenarios {
            self.add(scenario)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn base(&self) -> &PlanConfig {
        &self.base
    }

    /// The base name followed by every scenario in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(BASE_SCENARIO).chain(self.scenarios.iter().map(|s| s.name.as_str()))
    }

    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.index.get(name).map(|&i| &self.scenarios[i])
    }

    /// Fully resolved plan for `name`
    pub fn resolve(&self, name: &str) -> Result<PlanConfig, ScenarioError> {
        if name == BASE_SCENARIO {
            return Ok(self.base.clone());
        }
        let scenario = self
            .scenario(name)
            .ok_or_else(|| ScenarioError::UnknownScenario(name.to_string()))?;
        Ok(scenario.overrides.apply(&self.base)?)
    }

    pub fn project(&self, name: &str) -> Result<ProjectionResult, ScenarioError> {
        let plan = self.resolve(name)?;
        debug!(scenario = name, "projecting scenario");
        Ok(project(&plan)?)
    }

    pub fn simulate(
        &self,
        name: &str,
        config: &MonteCarloConfig,
        progress: &MonteCarloProgress,
    ) -> Result<SimulationResult, ScenarioError> {
        let plan = self.resolve(name)?;
        debug!(scenario = name, trials = config.trials, "simulating scenario");
        Ok(monte_carlo_with_progress(&plan, config, progress)?)
    }

    /// Sustainable spending for one scenario
    pub fn sustainable_spending(
        &self,
        name: &str,
        search: &SpendingSearch,
    ) -> Result<SpendingSolution, ScenarioError> {
        let plan = self.resolve(name)?;
        debug!(scenario = name, "searching sustainable spending");
        Ok(sustainable_spending(&plan, search)?)
    }

    /// Deterministic projection of the base and every scenario
    pub fn run_all(&self) -> Result<Vec<(String, ProjectionResult)>, ScenarioError> {
        self.names()
            .map(|name| Ok((name.to_string(), self.project(name)?)))
            .collect()
    }

    pub fn compare(
        &self,
        baseline: &str,
        scenario: &str,
    ) -> Result<ScenarioComparison, ScenarioError> {
        let base = self.project(baseline)?;
        let other = self.project(scenario)?;
        Ok(ScenarioComparison::between(
            (baseline, &base),
            (scenario, &other),
        ))
    }

    /// Every scenario against the base plan
    pub fn compare_all(&self) -> Result<Vec<ScenarioComparison>, ScenarioError> {
        let base = self.project(BASE_SCENARIO)?;
        self.scenarios
            .iter()
            .map(|s| {
                let other = self.project(&s.name)?;
                Ok(ScenarioComparison::between(
                    (BASE_SCENARIO, &base),
                    (&s.name, &other),
                ))
            })
            .collect()
    }

    pub fn compare_simulations(
        &self,
        baseline: &str,
        scenario: &str,
        config: &MonteCarloConfig,
    ) -> Result<SimulationComparison, ScenarioError> {
        let progress = MonteCarloProgress::new();
        let base = self.simulate(baseline, config, &progress)?;
        let other = self.simulate(scenario, config, &progress)?;
        Ok(SimulationComparison::between(
            (baseline, &base),
            (scenario, &other),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(inflation: Option<f64>, age: Option<u8>) -> PlanOverrides {
        PlanOverrides {
            general_inflation: inflation,
            conversion_age: age,
            ..PlanOverrides::default()
        }
    }

    #[test]
    fn test_later_layer_wins() {
        let merged = layer(Some(0.02), Some(71)).then(layer(Some(0.03), None));
        assert_eq!(merged.general_inflation, Some(0.03));
        assert_eq!(merged.conversion_age, Some(71));
    }

    #[test]
    fn test_then_is_associative() {
        let mut a = layer(Some(0.02), None);
        a.category_inflation.insert(ExpenseCategory::Food, 0.03);
        let mut b = layer(None, Some(65));
        b.persons.insert(
            PersonId(1),
            PersonOverrides {
                cpp_start_age: Some(70),
                ..PersonOverrides::default()
            },
        );
        let mut c = layer(Some(0.04), None);
        c.category_inflation.insert(ExpenseCategory::Food, 0.05);
        c.persons.insert(
            PersonId(1),
            PersonOverrides {
                life_expectancy: Some(95),
                ..PersonOverrides::default()
            },
        );

        let left = a.clone().then(b.clone()).then(c.clone());
        let right = a.then(b.then(c));
        assert_eq!(left, right);
        assert_eq!(left.persons[&PersonId(1)].cpp_start_age, Some(70));
        assert_eq!(left.persons[&PersonId(1)].life_expectancy, Some(95));
    }

    #[test]
    fn test_empty_overrides_are_identity() {
        assert!(PlanOverrides::default().is_empty());
        let a = layer(Some(0.02), Some(70));
        assert_eq!(a.clone().then(PlanOverrides::default()), a);
        assert_eq!(PlanOverrides::default().then(a.clone()), a);
    }
}
