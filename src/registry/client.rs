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

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::index::{ImageIndex, SignatureManifest, MEDIA_TYPE_IMAGE_INDEX};
use super::reference::ArtifactReference;
use crate::descriptor::{Descriptor, Digest};
use crate::errors::{IoError, NotationError, RegistryError, Result};

/// Capabilities that are expected to be provided by a registry client.
///
/// A manifest or blob that does not exist is reported as
/// [`IoError::NotFound`].
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve the tag or digest of `reference` to a manifest descriptor.
    async fn resolve(&self, reference: &ArtifactReference) -> Result<Descriptor>;

    /// Fetch the manifest named by `reference`, refusing bodies larger than
    /// `limit` bytes with [`NotationError::ManifestTooLarge`].
    async fn fetch_manifest(
        &self,
        reference: &ArtifactReference,
        limit: u64,
    ) -> Result<(Descriptor, Vec<u8>)>;

    /// Fetch the blob described by `descriptor`, checking its digest.
    async fn fetch_blob(
        &self,
        repository: &ArtifactReference,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>>;

    async fn push_blob(
        &self,
        repository: &ArtifactReference,
        descriptor: &Descriptor,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Push a manifest under the tag or digest of `reference`.
    async fn push_manifest(
        &self,
        reference: &ArtifactReference,
        media_type: &str,
        body: Vec<u8>,
    ) -> Result<Descriptor>;

    /// Manifests referring to `subject` with the given artifact type, or
    /// `None` when the registry does not implement the Referrers API.
    async fn referrers(
        &self,
        repository: &ArtifactReference,
        subject: &Descriptor,
        artifact_type: &str,
    ) -> Result<Option<Vec<Descriptor>>>;
}

#[derive(Default)]
struct Repository {
    /// Manifests by digest: media type and body
    manifests: HashMap<Digest, (String, Vec<u8>)>,
    tags: HashMap<String, Digest>,
    blobs: HashMap<Digest, Vec<u8>>,
}

/// A registry held in memory.
pub struct InMemoryRegistry {
    repositories: Mutex<HashMap<String, Repository>>,
    referrers_api: bool,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        InMemoryRegistry {
            repositories: Mutex::new(HashMap::new()),
            referrers_api: true,
        }
    }

    /// A registry predating the Referrers API.
    pub fn without_referrers_api() -> Self {
        InMemoryRegistry {
            referrers_api: false,
            ..Self::new()
        }
    }

    /// Store a manifest and tag it, returning its descriptor.
    pub fn put_manifest(
        &self,
        reference: &ArtifactReference,
        media_type: &str,
        body: Vec<u8>,
    ) -> Result<Descriptor> {
        let descriptor = Descriptor::from_bytes(media_type, &body);
        let mut repositories = self.lock()?;
        let repository = repositories
            .entry(reference.repository_scope())
            .or_default();
        if let Some(digest) = reference.digest() {
            if digest.parse::<Digest>()? != descriptor.digest {
                return Err(RegistryError::DigestMismatch {
                    expected: digest.to_string(),
                    actual: descriptor.digest.to_string(),
                }
                .into());
            }
        } else if let Some(tag) = reference.tag() {
            repository
                .tags
                .insert(tag.to_string(), descriptor.digest.clone());
        }
        repository
            .manifests
            .insert(descriptor.digest.clone(), (media_type.to_string(), body));
        Ok(descriptor)
    }

    /// Number of manifests stored in the repository of `reference`.
    pub fn manifest_count(&self, reference: &ArtifactReference) -> usize {
        self.repositories
            .lock()
            .map(|repositories| {
                repositories
                    .get(&reference.repository_scope())
                    .map_or(0, |r| r.manifests.len())
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Repository>>> {
        self.repositories
            .lock()
            .map_err(|_| IoError::TransportFailed("registry lock poisoned".to_string()).into())
    }

    fn lookup(&self, reference: &ArtifactReference) -> Result<(String, Vec<u8>, Digest)> {
        let repositories = self.lock()?;
        let not_found = || IoError::NotFound(reference.whole());
        let repository = repositories
            .get(&reference.repository_scope())
            .ok_or_else(not_found)?;
        let digest = match reference.digest() {
            Some(digest) => digest.parse::<Digest>()?,
            None => repository
                .tags
                .get(reference.manifest_reference())
                .cloned()
                .ok_or_else(not_found)?,
        };
        let (media_type, body) = repository.manifests.get(&digest).ok_or_else(not_found)?;
        Ok((media_type.clone(), body.clone(), digest))
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn resolve(&self, reference: &ArtifactReference) -> Result<Descriptor> {
        let (media_type, body, _) = self.lookup(reference)?;
        Ok(Descriptor::from_bytes(media_type, &body))
    }

    async fn fetch_manifest(
        &self,
        reference: &ArtifactReference,
        limit: u64,
    ) -> Result<(Descriptor, Vec<u8>)> {
        let (media_type, body, _) = self.lookup(reference)?;
        if body.len() as u64 > limit {
            return Err(NotationError::ManifestTooLarge {
                size: body.len() as u64,
                limit,
            });
        }
        Ok((Descriptor::from_bytes(media_type, &body), body))
    }

    async fn fetch_blob(
        &self,
        repository: &ArtifactReference,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>> {
        let repositories = self.lock()?;
        repositories
            .get(&repository.repository_scope())
            .and_then(|r| r.blobs.get(&descriptor.digest))
            .cloned()
            .ok_or_else(|| IoError::NotFound(descriptor.digest.to_string()).into())
    }

    async fn push_blob(
        &self,
        repository: &ArtifactReference,
        descriptor: &Descriptor,
        data: Vec<u8>,
    ) -> Result<()> {
        if !descriptor.digest.verify(&data) {
            return Err(RegistryError::DigestMismatch {
                expected: descriptor.digest.to_string(),
                actual: Digest::sha256_of(&data).to_string(),
            }
            .into());
        }
        self.lock()?
            .entry(repository.repository_scope())
            .or_default()
            .blobs
            .insert(descriptor.digest.clone(), data);
        Ok(())
    }

    async fn push_manifest(
        &self,
        reference: &ArtifactReference,
        media_type: &str,
        body: Vec<u8>,
    ) -> Result<Descriptor> {
        self.put_manifest(reference, media_type, body)
    }

    async fn referrers(
        &self,
        repository: &ArtifactReference,
        subject: &Descriptor,
        artifact_type: &str,
    ) -> Result<Option<Vec<Descriptor>>> {
        if !self.referrers_api {
            return Ok(None);
        }
        let repositories = self.lock()?;
        let Some(repository) = repositories.get(&repository.repository_scope()) else {
            return Ok(Some(Vec::new()));
        };
        let mut referrers: Vec<Descriptor> = repository
            .manifests
            .iter()
            .filter(|(_, (media_type, _))| media_type != MEDIA_TYPE_IMAGE_INDEX)
            .filter_map(|(_, (media_type, body))| {
                let manifest: SignatureManifest = serde_json::from_slice(body).ok()?;
                let matches = manifest.subject.as_ref() == Some(subject)
                    && manifest.artifact_type() == Some(artifact_type);
                matches.then(|| manifest.descriptor(media_type, body))
            })
            .collect();
        referrers.sort_by(|a, b| a.digest.to_string().cmp(&b.digest.to_string()));
        Ok(Some(referrers))
    }
}

/// Decode an image index, the referrers listing and tag schema format.
pub(crate) fn parse_index(body: &[u8]) -> Result<ImageIndex> {
    let index: ImageIndex = serde_json::from_slice(body)?;
    if index.schema_version != 2 {
        return Err(RegistryError::UnsupportedManifest(format!(
            "image index schema version {} is not supported",
            index.schema_version
        ))
        .into());
    }
    Ok(index)
}
