//! Client-side verification for package repositories.
//!
//! This crate implements the client half of a secure software-update
//! framework (an instantiation of The Update Framework): it verifies signed
//! repository metadata downloaded from untrusted mirrors against a chain of
//! trust rooted in out-of-band root key fingerprints, keeps a local cache
//! that only ever contains fully-verified files, and downloads packages
//! whose length and hashes are pinned by that metadata.

/// Persistent store of validated metadata and the package index
pub mod cache;

/// Canonical JSON encoding, the input to every signature and fingerprint
pub mod canonical;

/// Public keys, signature verification, and file hashing
pub mod crypto;

/// The update engine: check-for-updates loop, root rotation, package downloads
pub mod engine;

/// Error taxonomy
pub mod error;

/// Repository and cache path layouts
pub mod layout;

/// Typed representations of the five signed role files
pub mod metadata;

/// Mirror selection and download-method decisions
pub mod remote;

/// The byte-range GET abstraction the engine downloads through
pub mod transport;

/// Trust labels and role verification
pub mod trust;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{Client, ClientConfig, UpdateOutcome};
pub use error::{ClientError, HistoryEvent, RemoteError, VerificationError};
pub use layout::{CacheLayout, PackageId, RepoLayout};
