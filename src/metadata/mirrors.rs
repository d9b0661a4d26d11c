use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::metadata::{expiry_format, Role, RoleName};

/// The signed mirror list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mirrors {
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    pub mirrors: Vec<Mirror>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mirror {
    pub urlbase: Url,
    pub content: MirrorContent,
}

/// What a mirror carries. Only full mirrors are recognized; a mirror with an
/// unrecognized content specification is ignored rather than rejected, so
/// the format can grow new mirror kinds without breaking old clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MirrorContent {
    Full,
    Unrecognized(String),
}

impl From<String> for MirrorContent {
    fn from(s: String) -> MirrorContent {
        match s.as_str() {
            "full" => MirrorContent::Full,
            _ => MirrorContent::Unrecognized(s),
        }
    }
}

impl From<MirrorContent> for String {
    fn from(content: MirrorContent) -> String {
        match content {
            MirrorContent::Full => "full".to_owned(),
            MirrorContent::Unrecognized(s) => s,
        }
    }
}

impl Mirrors {
    /// Base URLs of the usable (full) mirrors, in listed order.
    pub fn full_mirrors(&self) -> impl Iterator<Item = &Url> {
        self.mirrors
            .iter()
            .filter(|m| m.content == MirrorContent::Full)
            .map(|m| &m.urlbase)
    }
}

impl Role for Mirrors {
    const NAME: RoleName = RoleName::Mirrors;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}
