//! Repository and cache layouts.
//!
//! Both layouts are configuration data: the engine never hardcodes a path.
//! Package path templates carry `{name}` and `{version}` placeholders that
//! are expanded per package.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::RoleName;

/// A package identity: name plus version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> PackageId {
        PackageId {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

fn expand(template: &str, pkg: &PackageId) -> String {
    template
        .replace("{name}", &pkg.name)
        .replace("{version}", &pkg.version)
}

/// Server-relative paths of the repository files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoLayout {
    pub root: String,
    pub timestamp: String,
    pub snapshot: String,
    pub mirrors: String,
    /// The compressed package index.
    pub index_tar_gz: String,
    /// The uncompressed package index, when the repository serves one.
    pub index_tar: String,
    /// Template of a package tarball path.
    pub package_tarball: String,
    /// Template of a package's description file on the repository.
    pub package_manifest: String,
    /// Template of a package's target metadata inside the index tarball.
    pub package_targets_in_index: String,
}

impl Default for RepoLayout {
    fn default() -> RepoLayout {
        RepoLayout {
            root: "root.json".to_owned(),
            timestamp: "timestamp.json".to_owned(),
            snapshot: "snapshot.json".to_owned(),
            mirrors: "mirrors.json".to_owned(),
            index_tar_gz: "01/index.tar.gz".to_owned(),
            index_tar: "01/index.tar".to_owned(),
            package_tarball: "{name}-{version}/{name}-{version}.tar.gz".to_owned(),
            package_manifest: "{name}-{version}/{name}.manifest".to_owned(),
            package_targets_in_index: "{name}-{version}/package.json".to_owned(),
        }
    }
}

impl RepoLayout {
    /// Repository path of a role file; targets metadata has no single file.
    pub fn role_path(&self, role: RoleName) -> Option<&str> {
        match role {
            RoleName::Root => Some(&self.root),
            RoleName::Timestamp => Some(&self.timestamp),
            RoleName::Snapshot => Some(&self.snapshot),
            RoleName::Mirrors => Some(&self.mirrors),
            RoleName::Targets => None,
        }
    }

    pub fn package_tarball_path(&self, pkg: &PackageId) -> String {
        expand(&self.package_tarball, pkg)
    }

    pub fn package_manifest_path(&self, pkg: &PackageId) -> String {
        expand(&self.package_manifest, pkg)
    }

    pub fn package_targets_path(&self, pkg: &PackageId) -> String {
        expand(&self.package_targets_in_index, pkg)
    }
}

/// Cache-relative paths of everything the client persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLayout {
    pub root: String,
    pub timestamp: String,
    pub snapshot: String,
    pub mirrors: String,
    /// The uncompressed index tarball, the cache's canonical form.
    pub index_tar: String,
    /// The compressed index as last downloaded, when one was.
    pub index_tar_gz: String,
    /// Binary sidecar mapping tar-internal paths to byte offsets.
    pub tar_index: String,
}

impl Default for CacheLayout {
    fn default() -> CacheLayout {
        CacheLayout {
            root: "root.json".to_owned(),
            timestamp: "timestamp.json".to_owned(),
            snapshot: "snapshot.json".to_owned(),
            mirrors: "mirrors.json".to_owned(),
            index_tar: "01-index.tar".to_owned(),
            index_tar_gz: "01-index.tar.gz".to_owned(),
            tar_index: "01-index.tar.idx".to_owned(),
        }
    }
}

impl CacheLayout {
    pub fn role_path(&self, role: RoleName) -> Option<&str> {
        match role {
            RoleName::Root => Some(&self.root),
            RoleName::Timestamp => Some(&self.timestamp),
            RoleName::Snapshot => Some(&self.snapshot),
            RoleName::Mirrors => Some(&self.mirrors),
            RoleName::Targets => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_templates_expand() {
        let layout = RepoLayout::default();
        let pkg = PackageId::new("lens", "4.19.2");
        assert_eq!(
            layout.package_tarball_path(&pkg),
            "lens-4.19.2/lens-4.19.2.tar.gz"
        );
        assert_eq!(layout.package_manifest_path(&pkg), "lens-4.19.2/lens.manifest");
        assert_eq!(layout.package_targets_path(&pkg), "lens-4.19.2/package.json");
    }

    #[test]
    fn custom_templates_are_data() {
        let mut layout = RepoLayout::default();
        layout.package_tarball = "pool/{name}/{version}.tgz".to_owned();
        let pkg = PackageId::new("aeson", "2.0.0");
        assert_eq!(layout.package_tarball_path(&pkg), "pool/aeson/2.0.0.tgz");
    }
}
