//! Person Builder DSL
//!
//! ```ignore
//! let alex = PersonBuilder::new("Alex")
//!     .born(1962, 4, 12)
//!     .life_expectancy(92)
//!     .province(Province::BritishColumbia)
//!     .salary(95_000.0, 64)
//!     .cpp(65, 12_000.0)
//!     .oas(67);
//! ```

use jiff::civil::Date;

use crate::model::{
    CppEntitlement, IncomeKind, IncomeSource, OasEntitlement, Person, PersonId, Province, Timing,
};

/// Builder for a household member; ids are assigned by `PlanBuilder`
#[derive(Debug, Clone)]
pub struct PersonBuilder {
    pub(crate) name: String,
    birth_date: Date,
    life_expectancy: u8,
    province: Province,
    cpp: Option<CppEntitlement>,
    oas: Option<OasEntitlement>,
    income_sources: Vec<IncomeSource>,
}

impl PersonBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            birth_date: jiff::civil::date(1960, 1, 1),
            life_expectancy: 90,
            province: Province::Ontario,
            cpp: None,
            oas: None,
            income_sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn born(mut self, year: i16, month: i8, day: i8) -> Self {
        self.birth_date = jiff::civil::date(year, month, day);
        self
    }

    #[must_use]
    pub fn birth_date(mut self, date: Date) -> Self {
        self.birth_date = date;
        self
    }

    #[must_use]
    pub fn life_expectancy(mut self, age: u8) -> Self {
        self.life_expectancy = age;
        self
    }

    #[must_use]
    pub fn province(mut self, province: Province) -> Self {
        self.province = province;
        self
    }

    #[must_use]
    pub fn cpp(mut self, start_age: u8, amount_at_65: f64) -> Self {
        self.cpp = Some(CppEntitlement {
            start_age,
            amount_at_65,
        });
        self
    }

    /// Full-residence OAS starting at `start_age`
    #[must_use]
    pub fn oas(self, start_age: u8) -> Self {
        self.oas_partial(start_age, 1.0)
    }

    #[must_use]
    pub fn oas_partial(mut self, start_age: u8, residence_fraction: f64) -> Self {
        self.oas = Some(OasEntitlement {
            start_age,
            residence_fraction,
        });
        self
    }

    #[must_use]
    pub fn income(mut self, source: IncomeSource) -> Self {
        self.income_sources.push(source);
        self
    }

    /// Indexed employment income through `last_working_age`
    #[must_use]
    pub fn salary(self, amount: f64, last_working_age: u8) -> Self {
        self.income(
            IncomeSource::new("Salary", IncomeKind::Employment, amount)
                .ending(Timing::Age(last_working_age))
                .indexed(),
        )
    }

    /// Registered pension from `start_age`, not indexed
    #[must_use]
    pub fn pension(self, amount: f64, start_age: u8) -> Self {
        self.income(
            IncomeSource::new("Pension", IncomeKind::Pension, amount)
                .starting(Timing::Age(start_age)),
        )
    }

    pub(crate) fn build(self, person_id: PersonId) -> Person {
        Person {
            person_id,
            name: self.name,
            birth_date: self.birth_date,
            life_expectancy: self.life_expectancy,
            province: self.province,
            cpp: self.cpp,
            oas: self.oas,
            income_sources: self.income_sources,
        }
    }
}
