use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{expiry_format, FileInfo, Role, RoleName};

/// Target paths and their expected file infos.
///
/// In this repository format targets metadata lives per package inside the
/// index tarball rather than as one repository-level file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Targets {
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    /// Repository-relative target path → file info.
    pub targets: BTreeMap<String, FileInfo>,
}

impl Targets {
    pub fn lookup(&self, path: &str) -> Option<&FileInfo> {
        self.targets.get(path)
    }
}

impl Role for Targets {
    const NAME: RoleName = RoleName::Targets;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}
