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

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::descriptor::Digest;
use crate::errors::{NotationError, RegistryError};

/// `ArtifactReference` names an artifact within an OCI registry:
/// `<registry>/<repository>[:<tag>|@<digest>]`.
///
/// Unlike container tooling, the registry is never implied.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactReference {
    pub(crate) oci_reference: oci_client::Reference,
}

impl FromStr for ArtifactReference {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| RegistryError::InvalidReference {
            reference: s.to_string(),
            reason,
        };
        let (host, _) = s
            .split_once('/')
            .ok_or_else(|| invalid("missing registry or repository".to_string()))?;
        let oci_reference = s
            .parse::<oci_client::Reference>()
            .map_err(|e| invalid(e.to_string()))?;
        if oci_reference.registry() != host {
            return Err(invalid(format!(
                "registry {host:?} is not fully qualified"
            ))
            .into());
        }
        if let Some(digest) = oci_reference.digest() {
            digest.parse::<Digest>()?;
        }
        Ok(ArtifactReference { oci_reference })
    }
}

impl ArtifactReference {
    /// Create a Reference with a registry, repository and tag.
    pub fn with_tag(registry: String, repository: String, tag: String) -> Self {
        ArtifactReference {
            oci_reference: oci_client::Reference::with_tag(registry, repository, tag),
        }
    }

    /// Create a Reference with a registry, repository and digest.
    pub fn with_digest(registry: String, repository: String, digest: String) -> Self {
        ArtifactReference {
            oci_reference: oci_client::Reference::with_digest(registry, repository, digest),
        }
    }

    /// The same repository, pointing at `digest`.
    pub fn at_digest(&self, digest: &Digest) -> Self {
        Self::with_digest(
            self.registry().to_string(),
            self.repository().to_string(),
            digest.to_string(),
        )
    }

    /// The same repository, pointing at `tag`.
    pub fn at_tag(&self, tag: &str) -> Self {
        Self::with_tag(
            self.registry().to_string(),
            self.repository().to_string(),
            tag.to_string(),
        )
    }

    /// The address to connect to for this registry.
    ///
    /// Some registries, such as docker.io, use a different address for the
    /// actual registry.
    pub fn resolve_registry(&self) -> &str {
        self.oci_reference.resolve_registry()
    }

    pub fn registry(&self) -> &str {
        self.oci_reference.registry()
    }

    pub fn repository(&self) -> &str {
        self.oci_reference.repository()
    }

    pub fn digest(&self) -> Option<&str> {
        self.oci_reference.digest()
    }

    pub fn tag(&self) -> Option<&str> {
        self.oci_reference.tag()
    }

    /// What to put after `/manifests/`: the digest when known, else the tag.
    pub fn manifest_reference(&self) -> &str {
        self.digest().or(self.tag()).unwrap_or("latest")
    }

    /// `<registry>/<repository>`, the form trust policy scopes match against.
    pub fn repository_scope(&self) -> String {
        format!("{}/{}", self.registry(), self.repository())
    }

    /// The whole reference.
    pub fn whole(&self) -> String {
        self.oci_reference.whole()
    }
}

impl Display for ArtifactReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.oci_reference.fmt(f)
    }
}
