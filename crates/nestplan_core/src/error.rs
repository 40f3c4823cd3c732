use std::fmt;

use crate::model::{AccountId, AccountKind, AssetClass, Jurisdiction, PersonId, Province};

/// Malformed input detected before or during a run
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyHousehold,
    DuplicatePerson(PersonId),
    DuplicateAccount(AccountId),
    /// An account, income or override references a person that does not exist
    UnknownPerson {
        person_id: PersonId,
        context: &'static str,
    },
    UnknownAccount(AccountId),
    AssetMixNotNormalized {
        account_id: AccountId,
        total: f64,
    },
    NegativeAmount {
        account_id: Option<AccountId>,
        person_id: Option<PersonId>,
        field: &'static str,
        value: f64,
    },
    /// Contribution room given for a kind that does not track room
    RoomNotApplicable {
        account_id: AccountId,
        kind: AccountKind,
    },
    /// Registered accounts must have a single person as owner
    RegisteredAccountNotPersonal {
        account_id: AccountId,
        kind: AccountKind,
    },
    InvalidBrackets {
        jurisdiction: Jurisdiction,
        year: i16,
        reason: &'static str,
    },
    MissingTaxTable {
        jurisdiction: Jurisdiction,
        year: i16,
    },
    MissingProvincialTable(Province),
    InvalidGlidePath(&'static str),
    InvalidMinimumTable(&'static str),
    InvalidDistribution {
        asset_class: AssetClass,
        mean: f64,
        volatility: f64,
        reason: &'static str,
    },
    EmptyHistory,
    /// A scalar parameter outside its allowed range
    InvalidParameter {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    /// A per-person election outside its allowed range
    InvalidElection {
        person_id: PersonId,
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    InvalidStrategy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyHousehold => write!(f, "household has no persons"),
            ConfigError::DuplicatePerson(id) => write!(f, "person {id:?} defined more than once"),
            ConfigError::DuplicateAccount(id) => {
                write!(f, "account {id:?} defined more than once")
            }
            ConfigError::UnknownPerson { person_id, context } => {
                write!(f, "{context} references unknown person {person_id:?}")
            }
            ConfigError::UnknownAccount(id) => write!(f, "unknown account {id:?}"),
            ConfigError::AssetMixNotNormalized { account_id, total } => write!(
                f,
                "asset mix of account {account_id:?} sums to {total}, expected 1.0"
            ),
            ConfigError::NegativeAmount {
                account_id,
                person_id,
                field,
                value,
            } => {
                write!(f, "{field} must be non-negative, got {value}")?;
                if let Some(id) = account_id {
                    write!(f, " (account {id:?})")?;
                }
                if let Some(id) = person_id {
                    write!(f, " (person {id:?})")?;
                }
                Ok(())
            }
            ConfigError::RoomNotApplicable { account_id, kind } => write!(
                f,
                "account {account_id:?} is a {kind}, which has no contribution room"
            ),
            ConfigError::RegisteredAccountNotPersonal { account_id, kind } => write!(
                f,
                "account {account_id:?} is a {kind} and must be owned by one person"
            ),
            ConfigError::InvalidBrackets {
                jurisdiction,
                year,
                reason,
            } => write!(f, "invalid {jurisdiction} brackets for {year}: {reason}"),
            ConfigError::MissingTaxTable { jurisdiction, year } => write!(
                f,
                "no {jurisdiction} tax table for {year} and no earlier year to index from"
            ),
            ConfigError::MissingProvincialTable(province) => {
                write!(f, "no tax tables for province {province}")
            }
            ConfigError::InvalidGlidePath(reason) => write!(f, "invalid glide path: {reason}"),
            ConfigError::InvalidMinimumTable(reason) => {
                write!(f, "invalid minimum withdrawal table: {reason}")
            }
            ConfigError::InvalidDistribution {
                asset_class,
                mean,
                volatility,
                reason,
            } => write!(
                f,
                "invalid {asset_class} return parameters \
                 (mean={mean}, volatility={volatility}): {reason}"
            ),
            ConfigError::EmptyHistory => write!(f, "historical return series is empty"),
            ConfigError::InvalidParameter {
                field,
                value,
                reason,
            } => write!(f, "invalid {field} = {value}: {reason}"),
            ConfigError::InvalidElection {
                person_id,
                field,
                value,
                reason,
            } => write!(f, "person {person_id:?}: invalid {field} = {value}: {reason}"),
            ConfigError::InvalidStrategy(msg) => write!(f, "invalid strategy: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A requested operation would break a hard account constraint
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    NegativeRoom {
        person_id: PersonId,
        kind: AccountKind,
        room: f64,
    },
    RoomExceeded {
        person_id: PersonId,
        kind: AccountKind,
        year: i16,
        requested: f64,
        available: f64,
    },
    Overdraw {
        account_id: AccountId,
        year: i16,
        requested: f64,
        available: f64,
    },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::NegativeRoom {
                person_id,
                kind,
                room,
            } => write!(f, "person {person_id:?} has negative {kind} room ({room})"),
            ConstraintViolation::RoomExceeded {
                person_id,
                kind,
                year,
                requested,
                available,
            } => write!(
                f,
                "{year}: {kind} contribution of {requested:.2} for person {person_id:?} \
                 exceeds room {available:.2}"
            ),
            ConstraintViolation::Overdraw {
                account_id,
                year,
                requested,
                available,
            } => write!(
                f,
                "{year}: withdrawal of {requested:.2} from account {account_id:?} \
                 exceeds balance {available:.2}"
            ),
        }
    }
}

impl std::error::Error for ConstraintViolation {}

/// Failure of a single projection run
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionError {
    Config(ConfigError),
    Constraint(ConstraintViolation),
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionError::Config(e) => write!(f, "configuration error: {e}"),
            ProjectionError::Constraint(e) => write!(f, "constraint violation: {e}"),
        }
    }
}

impl std::error::Error for ProjectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectionError::Config(e) => Some(e),
            ProjectionError::Constraint(e) => Some(e),
        }
    }
}

impl From<ConfigError> for ProjectionError {
    fn from(e: ConfigError) -> Self {
        ProjectionError::Config(e)
    }
}

impl From<ConstraintViolation> for ProjectionError {
    fn from(e: ConstraintViolation) -> Self {
        ProjectionError::Constraint(e)
    }
}

/// Failure of a Monte Carlo batch
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// The plan failed validation before any trial ran
    InvalidPlan(ProjectionError),
    /// A trial failed; the whole batch is aborted
    Projection {
        trial: usize,
        source: ProjectionError,
    },
    /// Monte Carlo simulation was cancelled by user request
    Cancelled,
    InvalidConfig(String),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::InvalidPlan(e) => write!(f, "plan rejected: {e}"),
            SimulationError::Projection { trial, source } => {
                write!(f, "trial {trial} failed: {source}")
            }
            SimulationError::Cancelled => write!(f, "simulation cancelled"),
            SimulationError::InvalidConfig(msg) => {
                write!(f, "invalid simulation configuration: {msg}")
            }
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::InvalidPlan(e) => Some(e),
            SimulationError::Projection { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::InvalidPlan(ProjectionError::Config(e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioError {
    UnknownScenario(String),
    DuplicateScenario(String),
    Projection(ProjectionError),
    Simulation(SimulationError),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::UnknownScenario(name) => write!(f, "unknown scenario '{name}'"),
            ScenarioError::DuplicateScenario(name) => {
                write!(f, "scenario '{name}' defined more than once")
            }
            ScenarioError::Projection(e) => write!(f, "{e}"),
            ScenarioError::Simulation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Projection(e) => Some(e),
            ScenarioError::Simulation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProjectionError> for ScenarioError {
    fn from(e: ProjectionError) -> Self {
        ScenarioError::Projection(e)
    }
}

impl From<ConfigError> for ScenarioError {
    fn from(e: ConfigError) -> Self {
        ScenarioError::Projection(ProjectionError::Config(e))
    }
}

impl From<SimulationError> for ScenarioError {
    fn from(e: SimulationError) -> Self {
        ScenarioError::Simulation(e)
    }
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
