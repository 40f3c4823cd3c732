//! Household and person definitions
//!
//! A household is an ordered set of persons plus the accounts and expenses
//! they share. The first person is the primary person: household-level
//! ages (glide path for shared accounts, fan-chart ages) follow them.

use std::fmt;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::accounts::Account;
use super::expenses::Expense;
use super::ids::PersonId;
use super::income::{CppEntitlement, IncomeSource, OasEntitlement};

/// Province or territory of residence; selects the provincial tax table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Province {
    #[serde(rename = "AB")]
    Alberta,
    #[serde(rename = "BC")]
    BritishColumbia,
    #[serde(rename = "MB")]
    Manitoba,
    #[serde(rename = "NB")]
    NewBrunswick,
    #[serde(rename = "NL")]
    NewfoundlandAndLabrador,
    #[serde(rename = "NS")]
    NovaScotia,
    #[serde(rename = "NT")]
    NorthwestTerritories,
    #[serde(rename = "NU")]
    Nunavut,
    #[serde(rename = "ON")]
    Ontario,
    #[serde(rename = "PE")]
    PrinceEdwardIsland,
    #[serde(rename = "QC")]
    Quebec,
    #[serde(rename = "SK")]
    Saskatchewan,
    #[serde(rename = "YT")]
    Yukon,
}

impl Province {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Province::Alberta => "AB",
            Province::BritishColumbia => "BC",
            Province::Manitoba => "MB",
            Province::NewBrunswick => "NB",
            Province::NewfoundlandAndLabrador => "NL",
            Province::NovaScotia => "NS",
            Province::NorthwestTerritories => "NT",
            Province::Nunavut => "NU",
            Province::Ontario => "ON",
            Province::PrinceEdwardIsland => "PE",
            Province::Quebec => "QC",
            Province::Saskatchewan => "SK",
            Province::Yukon => "YT",
        }
    }
}

impl fmt::Display for Province {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A member of the household
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: PersonId,
    pub name: String,
    pub birth_date: Date,
    /// Age through which the person is modelled as alive
    pub life_expectancy: u8,
    pub province: Province,
    #[serde(default)]
    pub cpp: Option<CppEntitlement>,
    #[serde(default)]
    pub oas: Option<OasEntitlement>,
    /// Employment, pension, rental and other income streams
    #[serde(default)]
    pub income_sources: Vec<IncomeSource>,
}

impl Person {
    #[must_use]
    pub fn birth_year(&self) -> i16 {
        self.birth_date.year()
    }

    /// Age reached during `year` (calendar-year convention)
    #[must_use]
    pub fn age_in(&self, year: i16) -> u8 {
        (i32::from(year) - i32::from(self.birth_year())).clamp(0, i32::from(u8::MAX)) as u8
    }

    /// Last calendar year in which the person is alive
    #[must_use]
    pub fn final_year(&self) -> i16 {
        self.birth_year().saturating_add(i16::from(self.life_expectancy))
    }

    #[must_use]
    pub fn is_alive_in(&self, year: i16) -> bool {
        year >= self.birth_year() && year <= self.final_year()
    }
}

/// The planning unit: persons, shared and individual accounts, expenses,
/// and the projection's time bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    /// First projected calendar year
    pub start_year: i16,
    /// Optional earlier end of the projection; never extends past the
    /// last person's life expectancy.
    #[serde(default)]
    pub end_year_override: Option<i16>,
    pub persons: Vec<Person>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

impl Household {
    /// Last projected calendar year (inclusive)
    #[must_use]
    pub fn end_year(&self) -> i16 {
        let last_alive = self
            .persons
            .iter()
            .map(Person::final_year)
            .max()
            .unwrap_or(self.start_year - 1);
        match self.end_year_override {
            Some(year) => year.min(last_alive),
            None => last_alive,
        }
    }

    /// Number of projected years; zero for an empty horizon
    #[must_use]
    pub fn horizon_years(&self) -> usize {
        let span = i32::from(self.end_year()) - i32::from(self.start_year) + 1;
        span.max(0) as usize
    }

    #[must_use]
    pub fn person(&self, person_id: PersonId) -> Option<&Person> {
        self.persons.iter().find(|p| p.person_id == person_id)
    }

    #[must_use]
    pub fn primary(&self) -> Option<&Person> {
        self.persons.first()
    }

    /// Persons alive in `year`, in household order
    pub fn living_in(&self, year: i16) -> impl Iterator<Item = &Person> {
        self.persons.iter().filter(move |p| p.is_alive_in(year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: u16, birth_year: i16, life_expectancy: u8) -> Person {
        Person {
            person_id: PersonId(id),
            name: format!("Person {id}"),
            birth_date: jiff::civil::date(birth_year, 6, 1),
            life_expectancy,
            province: Province::Ontario,
            cpp: None,
            oas: None,
            income_sources: vec![],
        }
    }

    #[test]
    fn test_age_and_final_year() {
        let p = person(1, 1960, 90);
        assert_eq!(p.age_in(2025), 65);
        assert_eq!(p.final_year(), 2050);
        assert!(p.is_alive_in(2050));
        assert!(!p.is_alive_in(2051));
    }

    #[test]
    fn test_end_year_uses_longest_lived_person() {
        let household = Household {
            start_year: 2025,
            end_year_override: None,
            persons: vec![person(1, 1960, 85), person(2, 1963, 90)],
            accounts: vec![],
            expenses: vec![],
        };
        assert_eq!(household.end_year(), 2053);
        assert_eq!(household.horizon_years(), 29);
    }

    #[test]
    fn test_end_year_override_cannot_extend_horizon() {
        let mut household = Household {
            start_year: 2025,
            end_year_override: Some(2100),
            persons: vec![person(1, 1960, 85)],
            accounts: vec![],
            expenses: vec![],
        };
        assert_eq!(household.end_year(), 2045);

        household.end_year_override = Some(2030);
        assert_eq!(household.end_year(), 2030);
        assert_eq!(household.horizon_years(), 6);
    }

    #[test]
    fn test_empty_horizon_when_everyone_past_life_expectancy() {
        let household = Household {
            start_year: 2025,
            end_year_override: None,
            persons: vec![person(1, 1930, 90)],
            accounts: vec![],
            expenses: vec![],
        };
        assert_eq!(household.horizon_years(), 0);
    }
}
