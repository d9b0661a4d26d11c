use thiserror::Error;

use crate::crypto::KeyId;

/// Result type for client operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors produced while verifying repository metadata or downloads.
///
/// Every variant names the repository-relative path of the file it concerns,
/// so a failure deep in the update loop can be attributed to a concrete file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The file's expiry timestamp is not in the future.
    #[error("{path}: metadata expired at {expires}")]
    Expired { path: String, expires: String },

    /// A rollback: the file's version is below the trusted version.
    #[error("{path}: version {got} is lower than the trusted version {min}")]
    VersionTooLow { path: String, got: u64, min: u64 },

    /// Fewer distinct valid signatures than the role's threshold.
    #[error("{path}: not enough valid signatures to meet the role threshold")]
    SignaturesMissing { path: String },

    /// More than one valid signature from the same key.
    #[error("{path}: multiple valid signatures from key {keyid}")]
    SignaturesNotUnique { path: String, keyid: KeyId },

    /// A signature names a key ID that is not in the key environment.
    #[error("{path}: signature by unknown key {keyid}")]
    UnknownKey { path: String, keyid: KeyId },

    /// The downloaded bytes do not match the expected length and hashes.
    #[error("{path}: file does not match its expected length and hashes")]
    FileInfoMismatch { path: String },

    /// The download produced more bytes than the declared or hard size bound.
    #[error("{path}: download exceeded the size bound")]
    FileTooLarge { path: String },

    /// Malformed JSON or a payload that violates the role schema.
    #[error("{path}: {detail}")]
    Deserialization { path: String, detail: String },

    /// A metadata file has no entry for the given path.
    #[error("{path}: no entry for this path in the metadata")]
    UnknownTarget { path: String },

    /// The update loop made a full round of attempts without progress.
    #[error("no progress after {} update attempts", .0.len())]
    Loop(Vec<HistoryEvent>),
}

impl VerificationError {
    pub(crate) fn deserialization(path: &str, detail: impl ToString) -> Self {
        VerificationError::Deserialization {
            path: path.to_owned(),
            detail: detail.to_string(),
        }
    }
}

/// One entry in the update loop's verification history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// An iteration ended because a new root was installed.
    RootUpdated,
    /// An iteration ended with a verification failure.
    Verification(VerificationError),
}

/// Transport-level failure; the adapter's native error is kept inside.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct RemoteError(#[from] pub anyhow::Error);

impl RemoteError {
    pub fn new(msg: impl Into<String>) -> Self {
        RemoteError(anyhow::anyhow!(msg.into()))
    }
}

/// Errors surfaced to callers of the update client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The package is not listed in the repository's target metadata.
    #[error("unknown package {0}")]
    InvalidPackage(String),

    /// A file in the local cache does not parse.
    #[error("{path}: cached file is corrupted: {detail}")]
    LocalFileCorrupted { path: String, detail: String },

    /// No trusted root is installed yet.
    #[error("no trusted root installed; bootstrap the client first")]
    BootstrapRequired,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Wrap an I/O error with a short description of the failed operation.
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| ClientError::Io { context, source }
    }

    pub(crate) fn corrupted(path: &str, detail: impl ToString) -> Self {
        ClientError::LocalFileCorrupted {
            path: path.to_owned(),
            detail: detail.to_string(),
        }
    }

    /// True when the failure came from the transport, in which case the
    /// caller may retry against another mirror.
    pub fn is_remote(&self) -> bool {
        matches!(self, ClientError::Remote(_))
    }
}
