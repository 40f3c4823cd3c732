//! Economic assumptions: inflation, asset-class returns, glide path,
//! black-swan stress and the retirement spending curve.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::accounts::{AssetClass, AssetMix};
use super::expenses::ExpenseCategory;
use super::market::{ClassReturns, ReturnModel};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InflationAssumptions {
    /// General (CPI) inflation; indexes benefits, brackets and indexed income
    pub general: f64,
    /// Category-specific rates replacing the general rate
    pub categories: BTreeMap<ExpenseCategory, f64>,
    /// Added to the general rate for healthcare expenses
    pub healthcare_premium: f64,
}

impl Default for InflationAssumptions {
    fn default() -> Self {
        Self {
            general: 0.02,
            categories: BTreeMap::new(),
            healthcare_premium: 0.015,
        }
    }
}

impl InflationAssumptions {
    /// Annual inflation rate for an expense category
    #[must_use]
    pub fn rate_for(&self, category: ExpenseCategory) -> f64 {
        if let Some(rate) = self.categories.get(&category) {
            return *rate;
        }
        match category {
            ExpenseCategory::Healthcare => self.general + self.healthcare_premium,
            _ => self.general,
        }
    }
}

/// Mean and volatility of one asset class's annual return
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetClassAssumption {
    pub mean: f64,
    pub volatility: f64,
}

impl AssetClassAssumption {
    #[must_use]
    pub fn new(mean: f64, volatility: f64) -> Self {
        Self { mean, volatility }
    }

    #[must_use]
    pub fn fixed(rate: f64) -> Self {
        Self::new(rate, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnAssumptions {
    pub equity: AssetClassAssumption,
    pub fixed_income: AssetClassAssumption,
    pub cash: AssetClassAssumption,
    pub real_estate: AssetClassAssumption,
}

impl Default for ReturnAssumptions {
    fn default() -> Self {
        Self {
            equity: AssetClassAssumption::new(0.065, 0.16),
            fixed_income: AssetClassAssumption::new(0.035, 0.06),
            cash: AssetClassAssumption::new(0.02, 0.01),
            real_estate: AssetClassAssumption::new(0.05, 0.10),
        }
    }
}

impl ReturnAssumptions {
    #[must_use]
    pub fn get(&self, class: AssetClass) -> &AssetClassAssumption {
        match class {
            AssetClass::Equity => &self.equity,
            AssetClass::FixedIncome => &self.fixed_income,
            AssetClass::Cash => &self.cash,
            AssetClass::RealEstate => &self.real_estate,
        }
    }

    pub fn get_mut(&mut self, class: AssetClass) -> &mut AssetClassAssumption {
        match class {
            AssetClass::Equity => &mut self.equity,
            AssetClass::FixedIncome => &mut self.fixed_income,
            AssetClass::Cash => &mut self.cash,
            AssetClass::RealEstate => &mut self.real_estate,
        }
    }

    #[must_use]
    pub fn means(&self) -> ClassReturns {
        ClassReturns::new(
            self.equity.mean,
            self.fixed_income.mean,
            self.cash.mean,
            self.real_estate.mean,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlidePoint {
    pub age: u8,
    pub equity_weight: f64,
}

/// Equity weight as a function of age, linearly interpolated between points
/// and held flat beyond the first and last points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlidePath {
    pub points: Vec<GlidePoint>,
}

impl GlidePath {
    #[must_use]
    pub fn new(points: Vec<GlidePoint>) -> Self {
        Self { points }
    }

    /// Straight line from `from_weight` at `from_age` to `to_weight` at `to_age`
    #[must_use]
    pub fn linear(from_age: u8, from_weight: f64, to_age: u8, to_weight: f64) -> Self {
        Self::new(vec![
            GlidePoint {
                age: from_age,
                equity_weight: from_weight,
            },
            GlidePoint {
                age: to_age,
                equity_weight: to_weight,
            },
        ])
    }

    #[must_use]
    pub fn equity_weight(&self, age: u8) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if age <= first.age {
            return Some(first.equity_weight);
        }
        if age >= last.age {
            return Some(last.equity_weight);
        }
        self.points.windows(2).find_map(|w| {
            let (lo, hi) = (w[0], w[1]);
            (age >= lo.age && age <= hi.age).then(|| {
                let t = f64::from(age - lo.age) / f64::from(hi.age - lo.age);
                lo.equity_weight + t * (hi.equity_weight - lo.equity_weight)
            })
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.points.is_empty() {
            return Err(ConfigError::InvalidGlidePath("no points"));
        }
        if self.points.windows(2).any(|w| w[1].age <= w[0].age) {
            return Err(ConfigError::InvalidGlidePath(
                "ages must be strictly increasing",
            ));
        }
        if self
            .points
            .iter()
            .any(|p| !(0.0..=1.0).contains(&p.equity_weight))
        {
            return Err(ConfigError::InvalidGlidePath(
                "equity weights must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Severe equity shock followed by a flat recovery window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackSwan {
    /// Years after the start year (0 = start year)
    pub shock_year_offset: u16,
    /// Equity return in the shock year (-0.30 = -30%)
    pub magnitude: f64,
    /// Years of zero equity return after the shock
    pub recovery_years: u16,
    /// Monte Carlo only: draw the shock year uniformly per trial
    #[serde(default)]
    pub randomize_timing: bool,
}

impl BlackSwan {
    /// Forced equity return for the year at `year_offset`, if any
    #[must_use]
    pub fn equity_override(&self, year_offset: usize) -> Option<f64> {
        let shock = usize::from(self.shock_year_offset);
        if year_offset == shock {
            Some(self.magnitude)
        } else if year_offset > shock && year_offset <= shock + usize::from(self.recovery_years) {
            Some(0.0)
        } else {
            None
        }
    }

    #[must_use]
    pub fn at_offset(self, shock_year_offset: u16) -> Self {
        Self {
            shock_year_offset,
            ..self
        }
    }
}

/// Retirement spending "smile": real discretionary spending declines, holds
/// flat, then rises again late in retirement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendingSmile {
    /// First year of retirement; the curve is inactive when absent
    pub retirement_year: Option<i16>,
    /// Annual real decline during the first phase
    pub decline_rate: f64,
    pub decline_years: u16,
    pub flat_years: u16,
    /// Annual real increase after the flat phase
    pub rise_rate: f64,
}

impl Default for SpendingSmile {
    fn default() -> Self {
        Self {
            retirement_year: None,
            decline_rate: 0.01,
            decline_years: 10,
            flat_years: 10,
            rise_rate: 0.01,
        }
    }
}

impl SpendingSmile {
    /// Multiplier applied to discretionary expenses in `year`
    #[must_use]
    pub fn multiplier(&self, year: i16) -> f64 {
        let Some(retirement_year) = self.retirement_year else {
            return 1.0;
        };
        let t = i32::from(year) - i32::from(retirement_year);
        if t <= 0 {
            return 1.0;
        }
        let decline = i32::from(self.decline_years);
        let flat_end = decline + i32::from(self.flat_years);
        let floor = (1.0 - self.decline_rate).powi(t.min(decline));
        if t <= flat_end {
            floor
        } else {
            floor * (1.0 + self.rise_rate).powi(t - flat_end)
        }
    }
}

/// Share of each asset class's value paid out in cash every year. The
/// payout is part of the class's total return, not added to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionYields {
    /// Eligible Canadian dividends
    pub equity_dividend: f64,
    pub fixed_income_interest: f64,
    pub cash_interest: f64,
    /// Rental and trust income, taxed like interest
    pub real_estate_income: f64,
}

impl Default for DistributionYields {
    fn default() -> Self {
        Self {
            equity_dividend: 0.02,
            fixed_income_interest: 0.03,
            cash_interest: 0.02,
            real_estate_income: 0.03,
        }
    }
}

impl DistributionYields {
    /// Holdings pay nothing out; the whole return compounds
    #[must_use]
    pub fn none() -> Self {
        Self {
            equity_dividend: 0.0,
            fixed_income_interest: 0.0,
            cash_interest: 0.0,
            real_estate_income: 0.0,
        }
    }

    /// Blended payout rates for an account holding `mix`
    #[must_use]
    pub fn rates_for(&self, mix: &AssetMix) -> DistributionRates {
        DistributionRates {
            interest: mix.fixed_income * self.fixed_income_interest
                + mix.cash * self.cash_interest
                + mix.real_estate * self.real_estate_income,
            dividends: mix.equity * self.equity_dividend,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("distributions.equity_dividend", self.equity_dividend),
            ("distributions.fixed_income_interest", self.fixed_income_interest),
            ("distributions.cash_interest", self.cash_interest),
            ("distributions.real_estate_income", self.real_estate_income),
        ];
        for (field, value) in fields {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigError::InvalidParameter {
                    field,
                    value,
                    reason: "must be in [0, 1)",
                });
            }
        }
        Ok(())
    }
}

/// Payout rates of one account for one year
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistributionRates {
    pub interest: f64,
    pub dividends: f64,
}

impl DistributionRates {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.interest + self.dividends
    }
}

/// Complete set of economic assumptions for a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumptionSet {
    pub inflation: InflationAssumptions,
    pub returns: ReturnAssumptions,
    pub glide_path: Option<GlidePath>,
    pub black_swan: Option<BlackSwan>,
    pub spending_smile: SpendingSmile,
    /// Stochastic model used by Monte Carlo trials
    pub return_model: ReturnModel,
    /// Yearly payouts of non-registered holdings
    pub distributions: DistributionYields,
}

impl AssumptionSet {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inflation.general <= -1.0 {
            return Err(ConfigError::InvalidParameter {
                field: "inflation.general",
                value: self.inflation.general,
                reason: "must exceed -100%",
            });
        }
        for rate in self.inflation.categories.values() {
            if *rate <= -1.0 {
                return Err(ConfigError::InvalidParameter {
                    field: "inflation.categories",
                    value: *rate,
                    reason: "must exceed -100%",
                });
            }
        }
        for class in AssetClass::ALL {
            let a = self.returns.get(class);
            if !a.volatility.is_finite() || a.volatility < 0.0 || a.mean <= -1.0 {
                return Err(ConfigError::InvalidDistribution {
                    asset_class: class,
                    mean: a.mean,
                    volatility: a.volatility,
                    reason: "volatility must be non-negative and mean above -100%",
                });
            }
        }
        self.distributions.validate()?;
        if let Some(glide) = &self.glide_path {
            glide.validate()?;
        }
        if let Some(shock) = &self.black_swan
            && shock.magnitude < -1.0
        {
            return Err(ConfigError::InvalidParameter {
                field: "black_swan.magnitude",
                value: shock.magnitude,
                reason: "cannot lose more than 100%",
            });
        }
        let smile = &self.spending_smile;
        if !(0.0..1.0).contains(&smile.decline_rate) {
            return Err(ConfigError::InvalidParameter {
                field: "spending_smile.decline_rate",
                value: smile.decline_rate,
                reason: "must be in [0, 1)",
            });
        }
        if smile.rise_rate < 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "spending_smile.rise_rate",
                value: smile.rise_rate,
                reason: "must be non-negative",
            });
        }
        if let ReturnModel::Bootstrap { history, .. } = &self.return_model
            && history.is_empty()
        {
            return Err(ConfigError::EmptyHistory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthcare_premium_added_to_general() {
        let inflation = InflationAssumptions {
            general: 0.02,
            categories: BTreeMap::new(),
            healthcare_premium: 0.03,
        };
        assert!((inflation.rate_for(ExpenseCategory::Healthcare) - 0.05).abs() < 1e-12);
        assert!((inflation.rate_for(ExpenseCategory::Food) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_category_override_wins() {
        let mut inflation = InflationAssumptions::default();
        inflation.categories.insert(ExpenseCategory::Travel, 0.04);
        assert!((inflation.rate_for(ExpenseCategory::Travel) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_glide_path_interpolation() {
        let glide = GlidePath::linear(60, 0.7, 80, 0.3);
        assert!((glide.equity_weight(50).unwrap() - 0.7).abs() < 1e-12);
        assert!((glide.equity_weight(70).unwrap() - 0.5).abs() < 1e-12);
        assert!((glide.equity_weight(90).unwrap() - 0.3).abs() < 1e-12);
        assert!(GlidePath::new(vec![]).equity_weight(70).is_none());
    }

    #[test]
    fn test_black_swan_shock_then_flat_recovery() {
        let shock = BlackSwan {
            shock_year_offset: 5,
            magnitude: -0.30,
            recovery_years: 2,
            randomize_timing: false,
        };
        assert_eq!(shock.equity_override(4), None);
        assert_eq!(shock.equity_override(5), Some(-0.30));
        assert_eq!(shock.equity_override(6), Some(0.0));
        assert_eq!(shock.equity_override(7), Some(0.0));
        assert_eq!(shock.equity_override(8), None);
    }

    #[test]
    fn test_spending_smile_phases() {
        let smile = SpendingSmile {
            retirement_year: Some(2030),
            decline_rate: 0.02,
            decline_years: 5,
            flat_years: 5,
            rise_rate: 0.03,
        };
        assert_eq!(smile.multiplier(2029), 1.0);
        assert_eq!(smile.multiplier(2030), 1.0);
        assert!((smile.multiplier(2032) - 0.98_f64.powi(2)).abs() < 1e-12);
        let floor = 0.98_f64.powi(5);
        assert!((smile.multiplier(2035) - floor).abs() < 1e-12);
        assert!((smile.multiplier(2040) - floor).abs() < 1e-12);
        assert!((smile.multiplier(2042) - floor * 1.03_f64.powi(2)).abs() < 1e-12);
    }

    #[test]
    fn test_smile_inactive_without_retirement_year() {
        assert_eq!(SpendingSmile::default().multiplier(2050), 1.0);
    }

    #[test]
    fn test_distribution_rates_follow_mix() {
        let yields = DistributionYields::default();
        let rates = yields.rates_for(&AssetMix::balanced());
        assert!((rates.dividends - 0.6 * 0.02).abs() < 1e-12);
        assert!((rates.interest - 0.4 * 0.03).abs() < 1e-12);
        assert_eq!(DistributionYields::none().rates_for(&AssetMix::balanced()).total(), 0.0);
    }

    #[test]
    fn test_negative_yield_rejected() {
        let assumptions = AssumptionSet {
            distributions: DistributionYields {
                cash_interest: -0.01,
                ..DistributionYields::default()
            },
            ..AssumptionSet::default()
        };
        assert!(matches!(
            assumptions.validate(),
            Err(ConfigError::InvalidParameter { field: "distributions.cash_interest", .. })
        ));
    }

    #[test]
    fn test_invalid_glide_path_rejected() {
        let assumptions = AssumptionSet {
            glide_path: Some(GlidePath::linear(70, 1.5, 80, 0.3)),
            ..AssumptionSet::default()
        };
        assert!(matches!(
            assumptions.validate(),
            Err(ConfigError::InvalidGlidePath(_))
        ));
    }
}
