use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{expiry_format, FileInfo, Role, RoleName};

/// The freshness anchor: a short-lived pointer at the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timestamp {
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    /// Repository-relative path → file info; holds the snapshot entry.
    pub meta: BTreeMap<String, FileInfo>,
}

impl Timestamp {
    /// Info of the current snapshot, keyed by its repository path.
    pub fn info(&self, path: &str) -> Option<&FileInfo> {
        self.meta.get(path)
    }
}

impl Role for Timestamp {
    const NAME: RoleName = RoleName::Timestamp;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}
