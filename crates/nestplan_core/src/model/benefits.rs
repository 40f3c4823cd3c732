//! Government benefit and registered-plan rules
//!
//! All dollar amounts are in start-year dollars and are indexed by general
//! inflation during a projection.

use serde::{Deserialize, Serialize};

use super::ids::PersonId;
use super::income::{CppEntitlement, OasEntitlement};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OasRules {
    /// Full annual pension at 65 with 40 years of residence
    pub full_annual_amount: f64,
    /// Net income above which the recovery tax applies
    pub clawback_threshold: f64,
    pub recovery_rate: f64,
    /// Increase per year of deferral past 65
    pub deferral_increase: f64,
    /// Permanent increase from age 75
    pub age_75_increase: f64,
    pub earliest_start_age: u8,
    pub latest_start_age: u8,
}

impl Default for OasRules {
    fn default() -> Self {
        Self {
            full_annual_amount: 8_732.0,
            clawback_threshold: 93_454.0,
            recovery_rate: 0.15,
            deferral_increase: 0.072,
            age_75_increase: 0.10,
            earliest_start_age: 65,
            latest_start_age: 70,
        }
    }
}

impl OasRules {
    /// Gross OAS for someone aged `age`, before the recovery tax
    #[must_use]
    pub fn annual_amount(&self, entitlement: &OasEntitlement, age: u8, index_factor: f64) -> f64 {
        if age < entitlement.start_age {
            return 0.0;
        }
        let deferred_years = f64::from(entitlement.start_age.saturating_sub(65));
        let mut amount = self.full_annual_amount
            * entitlement.residence_fraction
            * (1.0 + self.deferral_increase * deferred_years);
        if age >= 75 {
            amount *= 1.0 + self.age_75_increase;
        }
        amount * index_factor
    }

    pub fn validate_entitlement(
        &self,
        person_id: PersonId,
        entitlement: &OasEntitlement,
    ) -> Result<(), ConfigError> {
        if !(self.earliest_start_age..=self.latest_start_age).contains(&entitlement.start_age) {
            return Err(ConfigError::InvalidElection {
                person_id,
                field: "oas.start_age",
                value: f64::from(entitlement.start_age),
                reason: "outside the allowed start ages",
            });
        }
        if !(0.0..=1.0).contains(&entitlement.residence_fraction) {
            return Err(ConfigError::InvalidElection {
                person_id,
                field: "oas.residence_fraction",
                value: entitlement.residence_fraction,
                reason: "must be between 0 and 1",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CppRules {
    /// Reduction per year started before 65
    pub early_reduction: f64,
    /// Increase per year deferred past 65
    pub deferral_increase: f64,
    pub earliest_start_age: u8,
    pub latest_start_age: u8,
}

impl Default for CppRules {
    fn default() -> Self {
        Self {
            early_reduction: 0.072,
            deferral_increase: 0.084,
            earliest_start_age: 60,
            latest_start_age: 70,
        }
    }
}

impl CppRules {
    #[must_use]
    pub fn adjustment_factor(&self, start_age: u8) -> f64 {
        let years_from_65 = f64::from(start_age) - 65.0;
        if years_from_65 < 0.0 {
            1.0 + self.early_reduction * years_from_65
        } else {
            1.0 + self.deferral_increase * years_from_65
        }
    }

    #[must_use]
    pub fn annual_amount(&self, entitlement: &CppEntitlement, age: u8, index_factor: f64) -> f64 {
        if age < entitlement.start_age {
            return 0.0;
        }
        entitlement.amount_at_65 * self.adjustment_factor(entitlement.start_age) * index_factor
    }

    pub fn validate_entitlement(
        &self,
        person_id: PersonId,
        entitlement: &CppEntitlement,
    ) -> Result<(), ConfigError> {
        if !(self.earliest_start_age..=self.latest_start_age).contains(&entitlement.start_age) {
            return Err(ConfigError::InvalidElection {
                person_id,
                field: "cpp.start_age",
                value: f64::from(entitlement.start_age),
                reason: "outside the allowed start ages",
            });
        }
        if entitlement.amount_at_65 < 0.0 {
            return Err(ConfigError::InvalidElection {
                person_id,
                field: "cpp.amount_at_65",
                value: entitlement.amount_at_65,
                reason: "must be non-negative",
            });
        }
        Ok(())
    }
}

/// Pension income splitting search parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PensionSplitRules {
    pub enabled: bool,
    /// Legislated maximum share of eligible income that may be transferred
    pub max_fraction: f64,
    /// Search granularity
    pub step: f64,
    /// Age from which RRIF/LIF withdrawals count as eligible pension income
    pub rrif_eligible_age: u8,
}

impl Default for PensionSplitRules {
    fn default() -> Self {
        Self {
            enabled: true,
            max_fraction: 0.5,
            step: 0.01,
            rrif_eligible_age: 65,
        }
    }
}

impl PensionSplitRules {
    /// Candidate fractions in ascending order, starting at zero
    #[must_use]
    pub fn fractions(&self) -> Vec<f64> {
        if !self.enabled || self.step <= 0.0 || self.max_fraction <= 0.0 {
            return vec![0.0];
        }
        let steps = (self.max_fraction / self.step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|i| (i as f64 * self.step).min(self.max_fraction))
            .collect()
    }
}

/// Annual contribution room accrual
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionRules {
    /// Share of prior-year earned income that becomes RRSP room
    pub rrsp_rate: f64,
    pub rrsp_dollar_limit: f64,
    pub tfsa_annual_limit: f64,
    /// The indexed TFSA limit is rounded to the nearest multiple of this
    pub tfsa_rounding: f64,
    pub tfsa_minimum_age: u8,
}

impl Default for ContributionRules {
    fn default() -> Self {
        Self {
            rrsp_rate: 0.18,
            rrsp_dollar_limit: 32_490.0,
            tfsa_annual_limit: 7_000.0,
            tfsa_rounding: 500.0,
            tfsa_minimum_age: 18,
        }
    }
}

impl ContributionRules {
    #[must_use]
    pub fn tfsa_limit(&self, index_factor: f64) -> f64 {
        let raw = self.tfsa_annual_limit * index_factor;
        if self.tfsa_rounding > 0.0 {
            (raw / self.tfsa_rounding).round() * self.tfsa_rounding
        } else {
            raw
        }
    }

    #[must_use]
    pub fn rrsp_accrual(&self, prior_earned_income: f64, index_factor: f64) -> f64 {
        (prior_earned_income.max(0.0) * self.rrsp_rate).min(self.rrsp_dollar_limit * index_factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenefitRules {
    pub oas: OasRules,
    pub cpp: CppRules,
    pub pension_split: PensionSplitRules,
    pub contributions: ContributionRules,
}

impl BenefitRules {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("oas.recovery_rate", self.oas.recovery_rate),
            ("pension_split.max_fraction", self.pension_split.max_fraction),
            ("contributions.rrsp_rate", self.contributions.rrsp_rate),
        ];
        for (field, value) in checks {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidParameter {
                    field,
                    value,
                    reason: "must be between 0 and 1",
                });
            }
        }
        if self.pension_split.enabled && self.pension_split.step <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "pension_split.step",
                value: self.pension_split.step,
                reason: "must be positive",
            });
        }
        let amounts = [
            ("oas.full_annual_amount", self.oas.full_annual_amount),
            ("oas.clawback_threshold", self.oas.clawback_threshold),
            ("contributions.rrsp_dollar_limit", self.contributions.rrsp_dollar_limit),
            ("contributions.tfsa_annual_limit", self.contributions.tfsa_annual_limit),
        ];
        for (field, value) in amounts {
            if value < 0.0 {
                return Err(ConfigError::NegativeAmount {
                    account_id: None,
                    person_id: None,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpp_early_and_deferred_adjustment() {
        let rules = CppRules::default();
        assert!((rules.adjustment_factor(60) - 0.64).abs() < 1e-9);
        assert!((rules.adjustment_factor(65) - 1.0).abs() < 1e-9);
        assert!((rules.adjustment_factor(70) - 1.42).abs() < 1e-9);
    }

    #[test]
    fn test_cpp_not_paid_before_start_age() {
        let rules = CppRules::default();
        let cpp = CppEntitlement {
            start_age: 67,
            amount_at_65: 10_000.0,
        };
        assert_eq!(rules.annual_amount(&cpp, 66, 1.0), 0.0);
        assert!((rules.annual_amount(&cpp, 67, 1.0) - 11_680.0).abs() < 0.01);
    }

    #[test]
    fn test_oas_deferral_and_age_75_increase() {
        let rules = OasRules {
            full_annual_amount: 8_000.0,
            ..OasRules::default()
        };
        let oas = OasEntitlement {
            start_age: 70,
            residence_fraction: 1.0,
        };
        assert_eq!(rules.annual_amount(&oas, 69, 1.0), 0.0);
        assert!((rules.annual_amount(&oas, 70, 1.0) - 10_880.0).abs() < 0.01);
        assert!((rules.annual_amount(&oas, 75, 1.0) - 11_968.0).abs() < 0.01);
    }

    #[test]
    fn test_split_fractions_are_discrete_and_bounded() {
        let fractions = PensionSplitRules::default().fractions();
        assert_eq!(fractions.len(), 51);
        assert_eq!(fractions[0], 0.0);
        assert!((fractions[50] - 0.5).abs() < 1e-12);

        let disabled = PensionSplitRules {
            enabled: false,
            ..PensionSplitRules::default()
        };
        assert_eq!(disabled.fractions(), vec![0.0]);
    }

    #[test]
    fn test_tfsa_limit_rounds_to_500() {
        let rules = ContributionRules::default();
        assert!((rules.tfsa_limit(1.02) - 7_000.0).abs() < 1e-9);
        assert!((rules.tfsa_limit(1.04) - 7_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_rrsp_accrual_is_capped() {
        let rules = ContributionRules::default();
        assert!((rules.rrsp_accrual(100_000.0, 1.0) - 18_000.0).abs() < 1e-9);
        assert!((rules.rrsp_accrual(500_000.0, 1.0) - 32_490.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_cpp_election_rejected() {
        let rules = CppRules::default();
        let cpp = CppEntitlement {
            start_age: 72,
            amount_at_65: 10_000.0,
        };
        assert!(matches!(
            rules.validate_entitlement(PersonId(1), &cpp),
            Err(ConfigError::InvalidElection { .. })
        ));
    }
}
