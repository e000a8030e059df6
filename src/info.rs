//! `sdInfo` metadata blocks and the id/time stamp used to fill them

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SdjError};
use crate::patterns::{
    is_compact_uuid, is_uuid, EMPTY_COMPACT_UUID, EMPTY_UUID, MIN_NAME_CHARS,
};

/// Source of unique ids and timestamps.
///
/// The engine never reads the clock or a random source directly; everything
/// is stamped through the host's `InfoStamp`.
pub trait InfoStamp: Send + Sync {
    /// A fresh unique id, in the full or the compact (data node) format
    fn unique_id(&self, compact: bool) -> String;

    /// Current time in milliseconds since the epoch
    fn now(&self) -> i64;
}

/// Default stamp backed by v4 uuids and the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStamp;

impl InfoStamp for SystemStamp {
    fn unique_id(&self, compact: bool) -> String {
        let hex = Uuid::new_v4().simple().to_string();
        let widths: &[usize] = if compact { &[5, 4] } else { &[6, 5, 4, 7] };

        let mut parts = Vec::with_capacity(widths.len());
        let mut start = 0;
        for width in widths {
            parts.push(&hex[start..start + width]);
            start += width;
        }
        parts.join("-")
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Name, unique id and created/modified timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Info {
    pub name: String,
    #[serde(rename = "uniqId")]
    pub uniq_id: String,
    pub created: i64,
    pub modified: i64,
}

impl Info {
    /// New info with a fresh unique id
    pub fn new(name: impl Into<String>, stamp: &dyn InfoStamp) -> Self {
        let now = stamp.now();
        Self {
            name: name.into(),
            uniq_id: stamp.unique_id(false),
            created: now,
            modified: now,
        }
    }

    /// New info with a compact unique id, used on data nodes
    pub fn compact(name: impl Into<String>, stamp: &dyn InfoStamp) -> Self {
        let now = stamp.now();
        Self {
            name: name.into(),
            uniq_id: stamp.unique_id(true),
            created: now,
            modified: now,
        }
    }

    /// Info carrying the all-zero id; replaced with a real one on load
    pub fn blank(name: impl Into<String>, compact: bool) -> Self {
        Self {
            name: name.into(),
            uniq_id: if compact { EMPTY_COMPACT_UUID } else { EMPTY_UUID }.to_string(),
            created: 0,
            modified: 0,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.uniq_id == EMPTY_UUID || self.uniq_id == EMPTY_COMPACT_UUID
    }

    pub fn is_valid(&self, compact: bool) -> bool {
        let id_ok = if compact {
            is_compact_uuid(&self.uniq_id)
        } else {
            is_uuid(&self.uniq_id)
        };
        self.name.chars().count() > MIN_NAME_CHARS
            && id_ok
            && self.created >= 0
            && self.modified >= 0
    }

    pub fn verify(&self, subject: &str, compact: bool) -> Result<()> {
        if self.is_valid(compact) {
            Ok(())
        } else {
            Err(SdjError::malformed(
                format!("{}.sdInfo", subject),
                format!("invalid info for '{}'", self.name),
            ))
        }
    }

    /// Same name with a freshly stamped id and timestamps
    pub fn restamp(&self, stamp: &dyn InfoStamp) -> Self {
        Self::new(self.name.clone(), stamp)
    }

    /// Bumps `modified`; never moves it backwards
    pub fn touch(&mut self, now: i64) {
        self.modified = self.modified.max(now);
    }
}
