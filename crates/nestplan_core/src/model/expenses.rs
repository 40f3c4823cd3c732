//! Household expenses

use serde::{Deserialize, Serialize};

/// Spending category; selects the inflation rate applied to an expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Housing,
    Food,
    Transportation,
    Healthcare,
    Travel,
    Leisure,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 7] = [
        ExpenseCategory::Housing,
        ExpenseCategory::Food,
        ExpenseCategory::Transportation,
        ExpenseCategory::Healthcare,
        ExpenseCategory::Travel,
        ExpenseCategory::Leisure,
        ExpenseCategory::Other,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// When an expense occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseKind {
    /// Every year within the (inclusive) window
    Recurring {
        #[serde(default)]
        start_year: Option<i16>,
        #[serde(default)]
        end_year: Option<i16>,
    },
    OneTime {
        year: i16,
    },
    /// Every `every_years` years starting at `start_year`
    Periodic {
        start_year: i16,
        every_years: u16,
        #[serde(default)]
        end_year: Option<i16>,
    },
}

impl ExpenseKind {
    #[must_use]
    pub fn occurs_in(&self, year: i16) -> bool {
        match *self {
            ExpenseKind::Recurring {
                start_year,
                end_year,
            } => start_year.is_none_or(|s| year >= s) && end_year.is_none_or(|e| year <= e),
            ExpenseKind::OneTime { year: y } => y == year,
            ExpenseKind::Periodic {
                start_year,
                every_years,
                end_year,
            } => {
                if year < start_year || end_year.is_some_and(|e| year > e) || every_years == 0 {
                    return false;
                }
                (i32::from(year) - i32::from(start_year)) % i32::from(every_years) == 0
            }
        }
    }
}

/// An annual spending line, in start-year dollars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub name: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    /// Discretionary spending follows the retirement spending curve;
    /// mandatory spending does not.
    #[serde(default)]
    pub discretionary: bool,
    pub kind: ExpenseKind,
}

impl Expense {
    #[must_use]
    pub fn recurring(name: impl Into<String>, amount: f64, category: ExpenseCategory) -> Self {
        Self {
            name: name.into(),
            amount,
            category,
            discretionary: false,
            kind: ExpenseKind::Recurring {
                start_year: None,
                end_year: None,
            },
        }
    }

    #[must_use]
    pub fn one_time(
        name: impl Into<String>,
        amount: f64,
        category: ExpenseCategory,
        year: i16,
    ) -> Self {
        Self {
            name: name.into(),
            amount,
            category,
            discretionary: false,
            kind: ExpenseKind::OneTime { year },
        }
    }

    #[must_use]
    pub fn periodic(
        name: impl Into<String>,
        amount: f64,
        category: ExpenseCategory,
        start_year: i16,
        every_years: u16,
    ) -> Self {
        Self {
            name: name.into(),
            amount,
            category,
            discretionary: false,
            kind: ExpenseKind::Periodic {
                start_year,
                every_years,
                end_year: None,
            },
        }
    }

    #[must_use]
    pub fn discretionary(mut self) -> Self {
        self.discretionary = true;
        self
    }

    #[must_use]
    pub fn between(mut self, start: i16, end: i16) -> Self {
        match &mut self.kind {
            ExpenseKind::Recurring {
                start_year,
                end_year,
            } => {
                *start_year = Some(start);
                *end_year = Some(end);
            }
            ExpenseKind::Periodic {
                start_year,
                end_year,
                ..
            } => {
                *start_year = start;
                *end_year = Some(end);
            }
            ExpenseKind::OneTime { .. } => {}
        }
        self
    }
}
