//! Income streams and government benefit entitlements

use serde::{Deserialize, Serialize};

/// Kind of an income stream; drives tax treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncomeKind {
    Employment,
    SelfEmployment,
    /// Registered pension plan income; eligible for pension splitting
    Pension,
    Rental,
    /// Canada Pension Plan
    Cpp,
    /// Old Age Security; subject to the recovery tax
    Oas,
    Other {
        taxable: bool,
    },
}

impl IncomeKind {
    #[must_use]
    pub fn is_taxable(self) -> bool {
        match self {
            IncomeKind::Other { taxable } => taxable,
            _ => true,
        }
    }

    /// Earned income generates RRSP room
    #[must_use]
    pub fn is_earned(self) -> bool {
        matches!(self, IncomeKind::Employment | IncomeKind::SelfEmployment)
    }

    #[must_use]
    pub fn is_eligible_pension(self) -> bool {
        matches!(self, IncomeKind::Pension)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            IncomeKind::Employment => "Employment",
            IncomeKind::SelfEmployment => "Self-Employment",
            IncomeKind::Pension => "Pension",
            IncomeKind::Rental => "Rental",
            IncomeKind::Cpp => "CPP",
            IncomeKind::Oas => "OAS",
            IncomeKind::Other { .. } => "Other",
        }
    }
}

/// A point in time expressed either as a calendar year or as the owner's age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timing {
    Year(i16),
    Age(u8),
}

impl Timing {
    /// Calendar year this timing refers to for someone born in `birth_year`
    #[must_use]
    pub fn resolve(self, birth_year: i16) -> i16 {
        match self {
            Timing::Year(year) => year,
            Timing::Age(age) => birth_year.saturating_add(i16::from(age)),
        }
    }
}

/// A recurring annual income stream owned by one person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub name: String,
    pub kind: IncomeKind,
    /// Annual amount in start-year dollars
    pub amount: f64,
    /// First year (inclusive); from the projection start when absent
    #[serde(default)]
    pub start: Option<Timing>,
    /// Last year (inclusive); until death when absent
    #[serde(default)]
    pub end: Option<Timing>,
    /// Grow with general inflation
    #[serde(default)]
    pub indexed: bool,
}

impl IncomeSource {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: IncomeKind, amount: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            amount,
            start: None,
            end: None,
            indexed: false,
        }
    }

    #[must_use]
    pub fn starting(mut self, start: Timing) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn ending(mut self, end: Timing) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    #[must_use]
    pub fn is_active(&self, year: i16, birth_year: i16) -> bool {
        let started = self.start.is_none_or(|t| year >= t.resolve(birth_year));
        let not_ended = self.end.is_none_or(|t| year <= t.resolve(birth_year));
        started && not_ended
    }
}

/// CPP retirement pension election
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CppEntitlement {
    /// Age the pension starts (60..=70)
    pub start_age: u8,
    /// Annual pension if started at 65, in start-year dollars
    pub amount_at_65: f64,
}

/// OAS pension election
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OasEntitlement {
    /// Age the pension starts (65..=70)
    pub start_age: u8,
    /// Fraction of the full pension earned through residence (years / 40)
    #[serde(default = "full_residence")]
    pub residence_fraction: f64,
}

fn full_residence() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_timing_resolves_against_birth_year() {
        assert_eq!(Timing::Age(65).resolve(1960), 2025);
        assert_eq!(Timing::Year(2030).resolve(1960), 2030);
    }

    #[test]
    fn test_income_active_window_is_inclusive() {
        let salary = IncomeSource::new("Salary", IncomeKind::Employment, 90_000.0)
            .starting(Timing::Year(2025))
            .ending(Timing::Age(64));

        assert!(!salary.is_active(2024, 1965));
        assert!(salary.is_active(2025, 1965));
        assert!(salary.is_active(2029, 1965));
        assert!(!salary.is_active(2030, 1965));
    }

    #[test]
    fn test_taxability() {
        assert!(IncomeKind::Rental.is_taxable());
        assert!(!IncomeKind::Other { taxable: false }.is_taxable());
        assert!(IncomeKind::SelfEmployment.is_earned());
        assert!(!IncomeKind::Pension.is_earned());
    }
}
