//! Market return paths
//!
//! A `MarketPath` holds one return per asset class per projected year. The
//! deterministic projection uses the assumption means; each Monte Carlo trial
//! samples its own path from the configured `ReturnModel`.

use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use super::accounts::AssetClass;
use super::assumptions::{AssetClassAssumption, ReturnAssumptions};
use crate::error::ConfigError;

/// One value per asset class (a year's returns)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassReturns {
    pub equity: f64,
    pub fixed_income: f64,
    pub cash: f64,
    pub real_estate: f64,
}

impl ClassReturns {
    #[must_use]
    pub fn new(equity: f64, fixed_income: f64, cash: f64, real_estate: f64) -> Self {
        Self {
            equity,
            fixed_income,
            cash,
            real_estate,
        }
    }

    #[must_use]
    pub fn get(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::Equity => self.equity,
            AssetClass::FixedIncome => self.fixed_income,
            AssetClass::Cash => self.cash,
            AssetClass::RealEstate => self.real_estate,
        }
    }
}

/// Parametric family used to sample annual returns from (mean, volatility)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnDistribution {
    #[default]
    Normal,
    /// Log-normal growth factor matching the arithmetic mean and volatility
    LogNormal,
}

impl ReturnDistribution {
    pub fn sample<R: Rng + ?Sized>(
        self,
        rng: &mut R,
        class: AssetClass,
        assumption: &AssetClassAssumption,
    ) -> Result<f64, ConfigError> {
        let AssetClassAssumption { mean, volatility } = *assumption;
        let invalid = |reason: &'static str| ConfigError::InvalidDistribution {
            asset_class: class,
            mean,
            volatility,
            reason,
        };

        match self {
            ReturnDistribution::Normal => rand_distr::Normal::new(mean, volatility)
                .map(|d| d.sample(rng))
                .map_err(|_| invalid("volatility must be non-negative and finite")),
            ReturnDistribution::LogNormal => {
                let growth = 1.0 + mean;
                if growth <= 0.0 {
                    return Err(invalid("mean return must exceed -100%"));
                }
                let sigma_sq = (1.0 + (volatility / growth).powi(2)).ln();
                let mu = growth.ln() - sigma_sq / 2.0;
                rand_distr::LogNormal::new(mu, sigma_sq.sqrt())
                    .map(|d| d.sample(rng) - 1.0)
                    .map_err(|_| invalid("volatility must be non-negative and finite"))
            }
        }
    }
}

/// Historical annual returns for all classes, one entry per calendar year.
/// Years are sampled whole so cross-class correlation is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalReturns {
    pub start_year: i16,
    pub years: Vec<ClassReturns>,
}

impl HistoricalReturns {
    #[must_use]
    pub fn len(&self) -> usize {
        self.years.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Sample n years with replacement (i.i.d. bootstrap).
    pub fn sample_years<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n: usize,
    ) -> Option<Vec<ClassReturns>> {
        if self.years.is_empty() {
            return None;
        }
        Some(
            (0..n)
                .map(|_| self.years[rng.random_range(0..self.years.len())])
                .collect(),
        )
    }

    /// Circular block bootstrap: contiguous runs of `block_size` years,
    /// wrapping past the end of the series.
    pub fn block_bootstrap<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n: usize,
        block_size: usize,
    ) -> Option<Vec<ClassReturns>> {
        if self.years.is_empty() || block_size == 0 {
            return None;
        }
        let mut result = Vec::with_capacity(n);
        while result.len() < n {
            let start = rng.random_range(0..self.years.len());
            for i in 0..block_size {
                if result.len() >= n {
                    break;
                }
                result.push(self.years[(start + i) % self.years.len()]);
            }
        }
        Some(result)
    }
}

/// How Monte Carlo trials generate their return sequences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReturnModel {
    /// Independent annual draws per class from (mean, volatility)
    Parametric { distribution: ReturnDistribution },
    /// Resample historical years; `block_size` > 1 keeps runs of years together
    Bootstrap {
        history: HistoricalReturns,
        #[serde(default)]
        block_size: Option<usize>,
    },
}

impl Default for ReturnModel {
    fn default() -> Self {
        ReturnModel::Parametric {
            distribution: ReturnDistribution::Normal,
        }
    }
}

/// Per-year class returns for one projection run (index 0 = start year)
#[derive(Debug, Clone, PartialEq)]
pub struct MarketPath {
    returns: Vec<ClassReturns>,
}

impl MarketPath {
    #[must_use]
    pub fn new(returns: Vec<ClassReturns>) -> Self {
        Self { returns }
    }

    /// Every year earns the assumption means
    #[must_use]
    pub fn deterministic(assumptions: &ReturnAssumptions, num_years: usize) -> Self {
        Self {
            returns: vec![assumptions.means(); num_years],
        }
    }

    /// Draw a full path from the return model.
    pub fn sample<R: Rng + ?Sized>(
        rng: &mut R,
        assumptions: &ReturnAssumptions,
        model: &ReturnModel,
        num_years: usize,
    ) -> Result<Self, ConfigError> {
        let returns = match model {
            ReturnModel::Parametric { distribution } => {
                let mut returns = Vec::with_capacity(num_years);
                for _ in 0..num_years {
                    // Fixed class order keeps streams reproducible per seed
                    returns.push(ClassReturns {
                        equity: distribution.sample(rng, AssetClass::Equity, &assumptions.equity)?,
                        fixed_income: distribution.sample(
                            rng,
                            AssetClass::FixedIncome,
                            &assumptions.fixed_income,
                        )?,
                        cash: distribution.sample(rng, AssetClass::Cash, &assumptions.cash)?,
                        real_estate: distribution.sample(
                            rng,
                            AssetClass::RealEstate,
                            &assumptions.real_estate,
                        )?,
                    });
                }
                returns
            }
            ReturnModel::Bootstrap {
                history,
                block_size,
            } => {
                let sampled = match block_size {
                    Some(bs) if *bs > 1 => history.block_bootstrap(rng, num_years, *bs),
                    _ => history.sample_years(rng, num_years),
                };
                sampled.ok_or(ConfigError::EmptyHistory)?
            }
        };
        Ok(Self { returns })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Returns for the year at `offset` from the start; years past the end of
    /// the path earn nothing.
    #[must_use]
    pub fn year(&self, offset: usize) -> ClassReturns {
        self.returns.get(offset).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn assumptions() -> ReturnAssumptions {
        ReturnAssumptions {
            equity: AssetClassAssumption::new(0.07, 0.16),
            fixed_income: AssetClassAssumption::new(0.035, 0.06),
            cash: AssetClassAssumption::new(0.02, 0.0),
            real_estate: AssetClassAssumption::new(0.05, 0.10),
        }
    }

    #[test]
    fn test_deterministic_path_uses_means() {
        let path = MarketPath::deterministic(&assumptions(), 3);
        assert_eq!(path.len(), 3);
        assert!((path.year(2).equity - 0.07).abs() < 1e-12);
        assert_eq!(path.year(5), ClassReturns::default());
    }

    #[test]
    fn test_sampling_is_reproducible_per_seed() {
        let model = ReturnModel::default();
        let a = MarketPath::sample(&mut SmallRng::seed_from_u64(7), &assumptions(), &model, 30)
            .unwrap();
        let b = MarketPath::sample(&mut SmallRng::seed_from_u64(7), &assumptions(), &model, 30)
            .unwrap();
        let c = MarketPath::sample(&mut SmallRng::seed_from_u64(8), &assumptions(), &model, 30)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_zero_volatility_samples_the_mean() {
        let mut rng = SmallRng::seed_from_u64(1);
        let cash = AssetClassAssumption::new(0.02, 0.0);
        for _ in 0..10 {
            let r = ReturnDistribution::Normal
                .sample(&mut rng, AssetClass::Cash, &cash)
                .unwrap();
            assert!((r - 0.02).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lognormal_mean_is_close_to_arithmetic_mean() {
        let mut rng = SmallRng::seed_from_u64(42);
        let equity = AssetClassAssumption::new(0.07, 0.16);
        let n = 50_000;
        let mean = (0..n)
            .map(|_| {
                ReturnDistribution::LogNormal
                    .sample(&mut rng, AssetClass::Equity, &equity)
                    .unwrap()
            })
            .sum::<f64>()
            / n as f64;
        assert!((mean - 0.07).abs() < 0.005, "sample mean {mean}");
    }

    #[test]
    fn test_negative_volatility_rejected() {
        let mut rng = SmallRng::seed_from_u64(1);
        let bad = AssetClassAssumption::new(0.05, -0.1);
        let err = ReturnDistribution::Normal.sample(&mut rng, AssetClass::Equity, &bad);
        assert!(matches!(err, Err(ConfigError::InvalidDistribution { .. })));
    }

    #[test]
    fn test_block_bootstrap_keeps_runs_together() {
        let history = HistoricalReturns {
            start_year: 2000,
            years: (0..10)
                .map(|i| ClassReturns::new(f64::from(i), 0.0, 0.0, 0.0))
                .collect(),
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let sampled = history.block_bootstrap(&mut rng, 12, 4).unwrap();
        assert_eq!(sampled.len(), 12);
        for block in sampled.chunks(4) {
            for pair in block.windows(2) {
                let next = (pair[0].equity as usize + 1) % 10;
                assert_eq!(pair[1].equity as usize, next);
            }
        }
    }

    #[test]
    fn test_empty_history_is_config_error() {
        let model = ReturnModel::Bootstrap {
            history: HistoricalReturns {
                start_year: 2000,
                years: vec![],
            },
            block_size: Some(5),
        };
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(
            MarketPath::sample(&mut rng, &assumptions(), &model, 5),
            Err(ConfigError::EmptyHistory)
        );
    }
}
