//! Cardinality and requiredness limiter shared by entities and items

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SdjError;

/// Limiter applied to an item (as a field) or an entity (as a child)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Limiter {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "req")]
    Required,
    /// Exactly one occurrence, not removable by users
    #[serde(rename = "req_user_hide")]
    RequiredHidden,
    #[serde(rename = "sdj_sys")]
    SystemRequired,
    #[serde(rename = "one_none")]
    OneOrNone,
    #[serde(rename = "at_least_one")]
    AtLeastOne,
    /// Children are keyed `sdIndex0`, `sdIndex1`, ... in order
    #[serde(rename = "sdj_index")]
    SequentialIndexed,
}

impl Limiter {
    pub const ALL: [Limiter; 7] = [
        Self::None,
        Self::Required,
        Self::RequiredHidden,
        Self::SystemRequired,
        Self::OneOrNone,
        Self::AtLeastOne,
        Self::SequentialIndexed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Required => "req",
            Self::RequiredHidden => "req_user_hide",
            Self::SystemRequired => "sdj_sys",
            Self::OneOrNone => "one_none",
            Self::AtLeastOne => "at_least_one",
            Self::SequentialIndexed => "sdj_index",
        }
    }

    /// Items carrying a required limiter must be present and valid
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            Self::Required | Self::RequiredHidden | Self::SystemRequired
        )
    }

    /// Checks an occurrence count of a child entity carrying this limiter.
    ///
    /// Returns the violation reason when the count is not allowed.
    pub fn check_count(&self, count: usize) -> Option<&'static str> {
        match self {
            Self::Required if count == 0 => Some("missing required"),
            Self::RequiredHidden if count != 1 => Some("single required hidden"),
            Self::OneOrNone if count > 1 => Some("can only have one or none"),
            // NOTE: enforced as exactly one, matching existing documents.
            // "One or more" would be `count == 0`.
            Self::AtLeastOne if count != 1 => Some("requires one single"),
            _ => None,
        }
    }
}

impl fmt::Display for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Limiter {
    type Err = SdjError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|limiter| limiter.as_str() == s)
            .ok_or_else(|| SdjError::malformed("limiter", format!("unknown limiter '{}'", s)))
    }
}
