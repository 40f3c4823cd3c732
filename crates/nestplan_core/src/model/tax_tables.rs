//! Year-keyed bracket tables per jurisdiction
//!
//! Tables are data supplied with the plan. Years after the last explicit
//! table are derived by indexing thresholds and the basic personal amount
//! from the latest earlier table.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::household::Province;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    /// Lower bound of the bracket
    pub threshold: f64,
    pub rate: f64,
}

/// One jurisdiction's brackets for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketSchedule {
    pub brackets: Vec<TaxBracket>,
    /// Non-refundable credit base, credited at the lowest bracket rate
    #[serde(default)]
    pub basic_personal_amount: f64,
    /// Non-refundable credit on grossed-up eligible dividends
    #[serde(default)]
    pub dividend_credit_rate: f64,
}

impl BracketSchedule {
    #[must_use]
    pub fn new(brackets: &[(f64, f64)], basic_personal_amount: f64) -> Self {
        Self {
            brackets: brackets
                .iter()
                .map(|&(threshold, rate)| TaxBracket { threshold, rate })
                .collect(),
            basic_personal_amount,
            dividend_credit_rate: 0.0,
        }
    }

    #[must_use]
    pub fn with_dividend_credit(mut self, rate: f64) -> Self {
        self.dividend_credit_rate = rate;
        self
    }

    #[must_use]
    pub fn lowest_rate(&self) -> f64 {
        self.brackets.first().map_or(0.0, |b| b.rate)
    }

    /// Rate applying to the next dollar above `income`
    #[must_use]
    pub fn marginal_rate(&self, income: f64) -> f64 {
        self.brackets
            .iter()
            .rev()
            .find(|b| income >= b.threshold)
            .map_or(0.0, |b| b.rate)
    }

    /// Scale every dollar amount by `factor`
    #[must_use]
    pub fn indexed(&self, factor: f64) -> Self {
        Self {
            brackets: self
                .brackets
                .iter()
                .map(|b| TaxBracket {
                    threshold: b.threshold * factor,
                    rate: b.rate,
                })
                .collect(),
            basic_personal_amount: self.basic_personal_amount * factor,
            dividend_credit_rate: self.dividend_credit_rate,
        }
    }

    pub fn validate(&self, jurisdiction: Jurisdiction, year: i16) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidBrackets {
            jurisdiction,
            year,
            reason,
        };
        let first = self.brackets.first().ok_or_else(|| invalid("no brackets"))?;
        if first.threshold < 0.0 {
            return Err(invalid("first threshold is negative"));
        }
        if self
            .brackets
            .windows(2)
            .any(|w| w[1].threshold <= w[0].threshold)
        {
            return Err(invalid("thresholds must be strictly increasing"));
        }
        if self
            .brackets
            .iter()
            .any(|b| !b.threshold.is_finite() || !(0.0..=1.0).contains(&b.rate))
        {
            return Err(invalid("rates must be between 0 and 1"));
        }
        if self.basic_personal_amount < 0.0 {
            return Err(invalid("basic personal amount is negative"));
        }
        if !(0.0..=1.0).contains(&self.dividend_credit_rate) {
            return Err(invalid("dividend credit rate must be between 0 and 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    Federal,
    Provincial(Province),
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Jurisdiction::Federal => write!(f, "federal"),
            Jurisdiction::Provincial(p) => write!(f, "{p}"),
        }
    }
}

/// Every known year of one jurisdiction, plus the rate used to index
/// thresholds past the last known year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionTable {
    pub by_year: BTreeMap<i16, BracketSchedule>,
    pub indexation_rate: f64,
}

impl JurisdictionTable {
    #[must_use]
    pub fn single(year: i16, schedule: BracketSchedule, indexation_rate: f64) -> Self {
        Self {
            by_year: BTreeMap::from([(year, schedule)]),
            indexation_rate,
        }
    }

    /// Schedule in force for `year`
    pub fn schedule_for(
        &self,
        jurisdiction: Jurisdiction,
        year: i16,
    ) -> Result<Cow<'_, BracketSchedule>, ConfigError> {
        if let Some(schedule) = self.by_year.get(&year) {
            return Ok(Cow::Borrowed(schedule));
        }
        let (base_year, base) = self
            .by_year
            .range(..year)
            .next_back()
            .ok_or(ConfigError::MissingTaxTable { jurisdiction, year })?;
        let factor = (1.0 + self.indexation_rate).powi(i32::from(year - base_year));
        Ok(Cow::Owned(base.indexed(factor)))
    }

    pub fn validate(&self, jurisdiction: Jurisdiction) -> Result<(), ConfigError> {
        if self.by_year.is_empty() {
            return Err(ConfigError::InvalidBrackets {
                jurisdiction,
                year: 0,
                reason: "no years defined",
            });
        }
        if self.indexation_rate <= -1.0 {
            return Err(ConfigError::InvalidParameter {
                field: "indexation_rate",
                value: self.indexation_rate,
                reason: "must exceed -100%",
            });
        }
        for (year, schedule) in &self.by_year {
            schedule.validate(jurisdiction, *year)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTables {
    pub federal: JurisdictionTable,
    pub provincial: BTreeMap<Province, JurisdictionTable>,
    /// Share of a realized capital gain included in taxable income
    #[serde(default = "default_inclusion")]
    pub capital_gains_inclusion: f64,
    /// Eligible dividends are taxed at (1 + gross-up) times the cash amount
    #[serde(default = "default_dividend_gross_up")]
    pub dividend_gross_up: f64,
}

fn default_inclusion() -> f64 {
    0.5
}

fn default_dividend_gross_up() -> f64 {
    0.38
}

impl Default for TaxTables {
    fn default() -> Self {
        Self::canada_2025()
    }
}

impl TaxTables {
    /// 2025 federal brackets with Ontario, British Columbia and Alberta
    #[must_use]
    pub fn canada_2025() -> Self {
        const INDEXATION: f64 = 0.02;
        let federal = BracketSchedule::new(
            &[
                (0.0, 0.15),
                (57_375.0, 0.205),
                (114_750.0, 0.26),
                (177_882.0, 0.29),
                (253_414.0, 0.33),
            ],
            16_129.0,
        )
        .with_dividend_credit(0.150_198);
        let ontario = BracketSchedule::new(
            &[
                (0.0, 0.0505),
                (52_886.0, 0.0915),
                (105_775.0, 0.1116),
                (150_000.0, 0.1216),
                (220_000.0, 0.1316),
            ],
            12_747.0,
        )
        .with_dividend_credit(0.10);
        let british_columbia = BracketSchedule::new(
            &[
                (0.0, 0.0506),
                (49_279.0, 0.077),
                (98_560.0, 0.105),
                (113_158.0, 0.1229),
                (137_407.0, 0.147),
                (186_306.0, 0.168),
                (259_829.0, 0.205),
            ],
            12_932.0,
        )
        .with_dividend_credit(0.12);
        let alberta = BracketSchedule::new(
            &[
                (0.0, 0.08),
                (60_000.0, 0.10),
                (151_234.0, 0.12),
                (181_481.0, 0.13),
                (241_974.0, 0.14),
                (362_961.0, 0.15),
            ],
            22_323.0,
        )
        .with_dividend_credit(0.0812);

        Self {
            federal: JurisdictionTable::single(2025, federal, INDEXATION),
            provincial: BTreeMap::from([
                (
                    Province::Ontario,
                    JurisdictionTable::single(2025, ontario, INDEXATION),
                ),
                (
                    Province::BritishColumbia,
                    JurisdictionTable::single(2025, british_columbia, INDEXATION),
                ),
                (
                    Province::Alberta,
                    JurisdictionTable::single(2025, alberta, INDEXATION),
                ),
            ]),
            capital_gains_inclusion: default_inclusion(),
            dividend_gross_up: default_dividend_gross_up(),
        }
    }

    pub fn provincial_table(&self, province: Province) -> Result<&JurisdictionTable, ConfigError> {
        self.provincial
            .get(&province)
            .ok_or(ConfigError::MissingProvincialTable(province))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.federal.validate(Jurisdiction::Federal)?;
        for (province, table) in &self.provincial {
            table.validate(Jurisdiction::Provincial(*province))?;
        }
        if !(0.0..=1.0).contains(&self.capital_gains_inclusion) {
            return Err(ConfigError::InvalidParameter {
                field: "capital_gains_inclusion",
                value: self.capital_gains_inclusion,
                reason: "must be between 0 and 1",
            });
        }
        if !(0.0..=1.0).contains(&self.dividend_gross_up) {
            return Err(ConfigError::InvalidParameter {
                field: "dividend_gross_up",
                value: self.dividend_gross_up,
                reason: "must be between 0 and 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_year_is_borrowed() {
        let tables = TaxTables::canada_2025();
        let schedule = tables
            .federal
            .schedule_for(Jurisdiction::Federal, 2025)
            .unwrap();
        assert!(matches!(schedule, Cow::Borrowed(_)));
    }

    #[test]
    fn test_later_year_is_indexed_from_last_known() {
        let tables = TaxTables::canada_2025();
        let schedule = tables
            .federal
            .schedule_for(Jurisdiction::Federal, 2027)
            .unwrap();
        let expected = 57_375.0 * 1.02_f64.powi(2);
        assert!((schedule.brackets[1].threshold - expected).abs() < 0.01);
        assert!((schedule.brackets[1].rate - 0.205).abs() < 1e-12);
        assert!((schedule.basic_personal_amount - 16_129.0 * 1.0404).abs() < 0.01);
        assert!((schedule.dividend_credit_rate - 0.150_198).abs() < 1e-12);
    }

    #[test]
    fn test_dividend_credit_outside_unit_range_rejected() {
        let schedule = BracketSchedule::new(&[(0.0, 0.15)], 0.0).with_dividend_credit(1.5);
        assert!(schedule.validate(Jurisdiction::Federal, 2025).is_err());
    }

    #[test]
    fn test_year_before_first_table_is_missing() {
        let tables = TaxTables::canada_2025();
        assert_eq!(
            tables.federal.schedule_for(Jurisdiction::Federal, 2020),
            Err(ConfigError::MissingTaxTable {
                jurisdiction: Jurisdiction::Federal,
                year: 2020
            })
        );
    }

    #[test]
    fn test_non_monotonic_brackets_rejected() {
        let schedule = BracketSchedule::new(&[(0.0, 0.1), (50_000.0, 0.2), (40_000.0, 0.3)], 0.0);
        assert!(matches!(
            schedule.validate(Jurisdiction::Federal, 2025),
            Err(ConfigError::InvalidBrackets { year: 2025, .. })
        ));
    }

    #[test]
    fn test_marginal_rate_lookup() {
        let tables = TaxTables::canada_2025();
        let schedule = &tables.federal.by_year[&2025];
        assert!((schedule.marginal_rate(10_000.0) - 0.15).abs() < 1e-12);
        assert!((schedule.marginal_rate(60_000.0) - 0.205).abs() < 1e-12);
        assert!((schedule.marginal_rate(300_000.0) - 0.33).abs() < 1e-12);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(TaxTables::canada_2025().validate().is_ok());
    }
}
