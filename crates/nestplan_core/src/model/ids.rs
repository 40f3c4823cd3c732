//! Unique identifiers for household entities
//!
//! Each entity type has its own ID type so that person and account
//! references cannot be mixed up.

use serde::{Deserialize, Serialize};

/// Unique identifier for a Person within a household
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub u16);

/// Unique identifier for an Account within a household
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u16);
