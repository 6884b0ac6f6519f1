//
// Copyright 2026 The Notation Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Trust policy documents and statement selection.
//!
//! Two sibling document flavors exist: [`OciTrustPolicy`], whose statements
//! are selected by registry scope, and [`BlobTrustPolicy`], whose statements
//! are selected by name or through the global statement. Both share
//! [`StatementCore`] and validate every rule when loaded.
//!
//! ```rust,no_run
//! use notation::trustpolicy::{OciTrustPolicy, PolicyTarget, TrustPolicy};
//!
//! # fn main() -> notation::errors::Result<()> {
//! let policy = OciTrustPolicy::from_json(br#"{
//!   "version": "1.0",
//!   "trustPolicies": [{
//!     "name": "wabbit-networks-images",
//!     "registryScopes": ["registry.wabbit-networks.io/software/net-monitor"],
//!     "signatureVerification": { "level": "strict" },
//!     "trustStores": ["ca:wabbit-networks"],
//!     "trustedIdentities": ["x509.subject:C=US,ST=WA,O=wabbit-networks.io"]
//!   }]
//! }"#)?;
//! let statement = policy.statement_for(&PolicyTarget::Artifact(
//!     "registry.wabbit-networks.io/software/net-monitor:v1",
//! ))?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use crate::errors::{IoError, PolicyError, Result};

mod blob;
pub mod identity;
pub mod level;
mod oci;
mod statement;

pub use blob::{BlobStatement, BlobTrustPolicy, BlobTrustPolicyDocument};
pub use identity::TrustedIdentity;
pub use level::{
    LevelName, SignatureVerification, VerificationAction, VerificationLevel, VerificationType,
    VerifyTimestamp,
};
pub use oci::{
    repository_scope, OciStatement, OciTrustPolicy, OciTrustPolicyDocument, WILDCARD_SCOPE,
};
pub use statement::{PolicyStatement, StatementCore, TrustStoreRef};

/// File name of the OCI trust policy.
pub const OCI_POLICY_FILE: &str = "trustpolicy.oci.json";
/// File name the OCI trust policy used before blob policies existed.
pub const LEGACY_OCI_POLICY_FILE: &str = "trustpolicy.json";
/// File name of the blob trust policy.
pub const BLOB_POLICY_FILE: &str = "trustpolicy.blob.json";

/// The only supported document version.
pub const SUPPORTED_VERSION: &str = "1.0";

/// What a statement is selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTarget<'a> {
    /// An artifact reference, `<registry>/<repository>[:tag|@digest]`
    Artifact(&'a str),
    /// A blob, optionally naming the statement to use
    Blob(Option<&'a str>),
}

/// A validated trust policy document.
pub trait TrustPolicy: Send + Sync {
    /// The single statement governing `target`.
    fn statement_for(&self, target: &PolicyTarget<'_>) -> std::result::Result<&PolicyStatement, PolicyError>;
}

pub(crate) fn check_version(version: &str) -> std::result::Result<(), PolicyError> {
    if version != SUPPORTED_VERSION {
        return Err(PolicyError::UnsupportedVersion {
            version: version.to_string(),
        });
    }
    Ok(())
}

fn read_policy_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| IoError::from_io(&e, &format!("trust policy {}", path.display())).into())
}

/// Load the OCI trust policy stored in `dir`, preferring
/// [`OCI_POLICY_FILE`] over [`LEGACY_OCI_POLICY_FILE`].
pub fn load_oci_policy(dir: &Path) -> Result<OciTrustPolicy> {
    let path = dir.join(OCI_POLICY_FILE);
    let path = if path.is_file() {
        path
    } else {
        tracing::debug!(path=?path, "OCI trust policy not found, trying the legacy file name");
        dir.join(LEGACY_OCI_POLICY_FILE)
    };
    Ok(OciTrustPolicy::from_json(&read_policy_file(&path)?)?)
}

/// Load the blob trust policy stored in `dir`.
pub fn load_blob_policy(dir: &Path) -> Result<BlobTrustPolicy> {
    let path = dir.join(BLOB_POLICY_FILE);
    Ok(BlobTrustPolicy::from_json(&read_policy_file(&path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NotationError;
    use serde_json::json;

    fn oci_document() -> serde_json::Value {
        json!({
            "version": "1.0",
            "trustPolicies": [{
                "name": "global",
                "registryScopes": ["*"],
                "signatureVerification": { "level": "strict" },
                "trustStores": ["ca:t"],
                "trustedIdentities": ["x509.subject:CN=t,O=N,ST=W,C=US"],
            }]
        })
    }

    #[test]
    fn wildcard_scope_conflict() {
        let document = json!({
            "version": "1.0",
            "trustPolicies": [
                {
                    "name": "global",
                    "registryScopes": ["*"],
                    "signatureVerification": { "level": "strict" },
                    "trustStores": ["ca:t"],
                    "trustedIdentities": ["*"],
                },
                {
                    "name": "repo",
                    "registryScopes": ["registry.example/repo"],
                    "signatureVerification": { "level": "strict" },
                    "trustStores": ["ca:t"],
                    "trustedIdentities": ["*"],
                },
            ]
        });
        let err = OciTrustPolicy::from_json(&serde_json::to_vec(&document).unwrap()).unwrap_err();
        assert!(matches!(err, PolicyError::WildcardMix { .. }));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_oci_policy(dir.path()).unwrap_err();
        assert!(matches!(err, NotationError::Io(IoError::NotFound(_))));

        std::fs::write(
            dir.path().join(LEGACY_OCI_POLICY_FILE),
            serde_json::to_vec(&oci_document()).unwrap(),
        )
        .unwrap();
        let policy = load_oci_policy(dir.path()).unwrap();
        assert_eq!(policy.statements()[0].name, "global");

        let mut preferred = oci_document();
        preferred["trustPolicies"][0]["name"] = json!("preferred");
        std::fs::write(
            dir.path().join(OCI_POLICY_FILE),
            serde_json::to_vec(&preferred).unwrap(),
        )
        .unwrap();
        let policy = load_oci_policy(dir.path()).unwrap();
        assert_eq!(
            policy
                .statement_for(&PolicyTarget::Artifact("registry.example/repo:v1"))
                .unwrap()
                .name,
            "preferred"
        );
    }

    #[test]
    fn load_blob_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(BLOB_POLICY_FILE), b"{\"version\": \"1.0\"").unwrap();
        let err = load_blob_policy(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "PolicyError");
    }
}
