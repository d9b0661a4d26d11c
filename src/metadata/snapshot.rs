use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{expiry_format, FileInfo, Role, RoleName};

/// File infos of the root, the mirror list, and the package index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    /// Repository-relative path → file info.
    pub meta: BTreeMap<String, FileInfo>,
}

impl Snapshot {
    pub fn info(&self, path: &str) -> Option<&FileInfo> {
        self.meta.get(path)
    }
}

impl Role for Snapshot {
    const NAME: RoleName = RoleName::Snapshot;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}
