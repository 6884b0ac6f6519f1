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

//! Discovery and attachment of signatures stored next to their subject.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::{parse_index, RegistryClient};
use super::reference::ArtifactReference;
use crate::config::Context;
use crate::crypto::certificate::fingerprint_sha256;
use crate::descriptor::Descriptor;
use crate::errors::{IoError, NotationError, RegistryError, Result};
use crate::sign::SignedEnvelope;

/// Artifact type of signature manifests.
pub const ARTIFACT_TYPE_NOTATION: &str = "application/vnd.cncf.notary.signature";
pub const MEDIA_TYPE_ARTIFACT_MANIFEST: &str = "application/vnd.oci.artifact.manifest.v1+json";
pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Annotation listing the SHA-256 fingerprints of the signing chain.
pub const ANNOTATION_THUMBPRINT: &str = "io.cncf.notary.x509chain.thumbprint#S256";

/// Largest signature envelope accepted.
pub const MAX_SIGNATURE_SIZE: u64 = 32 * 1024 * 1024;
/// Largest manifest accepted.
pub const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024;

/// A manifest holding one signature envelope.
///
/// Both artifact manifests and image manifests whose config media type is
/// the artifact type are understood.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blobs: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl SignatureManifest {
    pub fn artifact_type(&self) -> Option<&str> {
        self.artifact_type
            .as_deref()
            .or_else(|| self.config.as_ref().map(|c| c.media_type.as_str()))
    }

    /// The descriptor of the envelope blob.
    pub fn signature_blob(&self) -> Result<&Descriptor> {
        let blobs = if self.blobs.is_empty() {
            &self.layers
        } else {
            &self.blobs
        };
        match blobs.as_slice() {
            [blob] => Ok(blob),
            _ => Err(RegistryError::UnsupportedManifest(format!(
                "a signature manifest holds exactly one blob, found {}",
                blobs.len()
            ))
            .into()),
        }
    }

    /// The descriptor of this manifest as listed by an index.
    pub(crate) fn descriptor(&self, media_type: &str, body: &[u8]) -> Descriptor {
        let mut descriptor = Descriptor::from_bytes(media_type, body);
        descriptor.artifact_type = self.artifact_type().map(str::to_string);
        descriptor.annotations = self.annotations.clone();
        descriptor
    }
}

/// An image index, as returned by the Referrers API and stored under the
/// tag schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl Default for ImageIndex {
    fn default() -> Self {
        ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_IMAGE_INDEX.to_string()),
            manifests: Vec::new(),
        }
    }
}

/// The tag listing the signatures of `subject` on registries without the
/// Referrers API: `<algorithm>-<hex>`.
pub fn referrers_tag(subject: &Descriptor) -> String {
    format!(
        "{}-{}",
        subject.digest.algorithm(),
        subject.digest.encoded()
    )
}

/// Signatures stored in a registry.
#[derive(Clone)]
pub struct SignatureRepository {
    client: Arc<dyn RegistryClient>,
}

impl SignatureRepository {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        SignatureRepository { client }
    }

    /// Run a registry request under the discovery deadline.
    async fn discover<T>(
        &self,
        ctx: &Context,
        what: &str,
        request: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = ctx.config().discovery_timeout;
        match ctx
            .cancellation()
            .run_until_cancelled(tokio::time::timeout(deadline, request))
            .await
        {
            None => Err(NotationError::Cancelled),
            Some(Err(_)) => Err(IoError::Timeout(format!("{what} after {deadline:?}")).into()),
            Some(Ok(result)) => result,
        }
    }

    /// Resolve a tag or digest reference to the descriptor of its manifest.
    pub async fn resolve(&self, ctx: &Context, reference: &ArtifactReference) -> Result<Descriptor> {
        ctx.check_cancelled()?;
        let descriptor = self
            .discover(ctx, &reference.whole(), self.client.resolve(reference))
            .await?;
        if let Some(digest) = reference.digest() {
            if digest.parse::<crate::descriptor::Digest>()? != descriptor.digest {
                return Err(RegistryError::DigestMismatch {
                    expected: digest.to_string(),
                    actual: descriptor.digest.to_string(),
                }
                .into());
            }
        }
        Ok(descriptor)
    }

    /// Descriptors of the signature manifests attached to `subject`.
    pub async fn list_signatures(
        &self,
        ctx: &Context,
        repository: &ArtifactReference,
        subject: &Descriptor,
    ) -> Result<Vec<Descriptor>> {
        ctx.check_cancelled()?;
        let referrers = self
            .discover(
                ctx,
                "listing referrers",
                self.client
                    .referrers(repository, subject, ARTIFACT_TYPE_NOTATION),
            )
            .await?;
        let listed = match referrers {
            Some(referrers) => referrers,
            None if ctx.config().allow_referrers_tag_fallback => {
                debug!(subject = %subject.digest, "referrers API unsupported, using the tag schema");
                self.tag_index(ctx, repository, subject).await?.manifests
            }
            None => return Err(RegistryError::ReferrersUnsupported.into()),
        };
        let signatures: Vec<Descriptor> = listed
            .into_iter()
            .filter(|d| d.artifact_type.as_deref() == Some(ARTIFACT_TYPE_NOTATION))
            .collect();
        debug!(subject = %subject.digest, count = signatures.len(), "signatures found");
        Ok(signatures)
    }

    async fn tag_index(
        &self,
        ctx: &Context,
        repository: &ArtifactReference,
        subject: &Descriptor,
    ) -> Result<ImageIndex> {
        ctx.config().check_experimental("the referrers tag schema")?;
        let tagged = repository.at_tag(&referrers_tag(subject));
        let fetched = self
            .discover(
                ctx,
                &tagged.whole(),
                self.client.fetch_manifest(&tagged, MAX_MANIFEST_SIZE),
            )
            .await;
        match fetched {
            Ok((_, body)) => parse_index(&body),
            Err(NotationError::Io(IoError::NotFound(_))) => Ok(ImageIndex::default()),
            Err(e) => Err(e),
        }
    }

    /// The envelope referenced by the signature manifest `manifest`, and
    /// the blob descriptor carrying its media type.
    pub async fn fetch_signature(
        &self,
        ctx: &Context,
        repository: &ArtifactReference,
        manifest: &Descriptor,
    ) -> Result<(Vec<u8>, Descriptor)> {
        ctx.check_cancelled()?;
        if manifest.size > MAX_MANIFEST_SIZE {
            return Err(NotationError::ManifestTooLarge {
                size: manifest.size,
                limit: MAX_MANIFEST_SIZE,
            });
        }
        let pinned = repository.at_digest(&manifest.digest);
        let (_, body) = self
            .discover(
                ctx,
                &pinned.whole(),
                self.client.fetch_manifest(&pinned, MAX_MANIFEST_SIZE),
            )
            .await?;
        let signature_manifest: SignatureManifest = serde_json::from_slice(&body)?;
        let blob = signature_manifest.signature_blob()?.clone();
        if blob.size > MAX_SIGNATURE_SIZE {
            return Err(NotationError::SignatureTooLarge {
                size: blob.size,
                limit: MAX_SIGNATURE_SIZE,
            });
        }
        let envelope = self
            .discover(
                ctx,
                &blob.digest.to_string(),
                self.client.fetch_blob(repository, &blob),
            )
            .await?;
        Ok((envelope, blob))
    }

    /// Store `signature` as a referrer of `subject`, returning the
    /// descriptor of the signature manifest.
    pub async fn push_signature(
        &self,
        ctx: &Context,
        repository: &ArtifactReference,
        subject: &Descriptor,
        signature: &SignedEnvelope,
    ) -> Result<Descriptor> {
        ctx.check_cancelled()?;
        let size = signature.bytes.len() as u64;
        if size > MAX_SIGNATURE_SIZE {
            return Err(NotationError::SignatureTooLarge {
                size,
                limit: MAX_SIGNATURE_SIZE,
            });
        }
        // Nothing is uploaded until the registry is known to accept the
        // signature one way or the other.
        let use_tag_index = if ctx.config().allow_referrers_tag_fallback {
            let referrers = self
                .discover(
                    ctx,
                    "listing referrers",
                    self.client
                        .referrers(repository, subject, ARTIFACT_TYPE_NOTATION),
                )
                .await?;
            if referrers.is_none() {
                ctx.config().check_experimental("the referrers tag schema")?;
            }
            referrers.is_none()
        } else {
            false
        };

        let blob = Descriptor::from_bytes(signature.media_type(), &signature.bytes);
        self.client
            .push_blob(repository, &blob, signature.bytes.clone())
            .await?;

        let mut annotations = signature.annotations.clone();
        let thumbprints: Vec<String> = signature
            .certificate_chain
            .iter()
            .map(fingerprint_sha256)
            .collect();
        annotations.insert(
            ANNOTATION_THUMBPRINT.to_string(),
            serde_json::to_string(&thumbprints)?,
        );
        let manifest = SignatureManifest {
            schema_version: None,
            media_type: MEDIA_TYPE_ARTIFACT_MANIFEST.to_string(),
            artifact_type: Some(ARTIFACT_TYPE_NOTATION.to_string()),
            config: None,
            blobs: vec![blob],
            layers: Vec::new(),
            subject: Some(subject.without_annotations()),
            annotations: Some(annotations),
        };
        let body = serde_json::to_vec(&manifest)?;
        let descriptor = manifest.descriptor(MEDIA_TYPE_ARTIFACT_MANIFEST, &body);
        if descriptor.size > MAX_MANIFEST_SIZE {
            return Err(NotationError::ManifestTooLarge {
                size: descriptor.size,
                limit: MAX_MANIFEST_SIZE,
            });
        }
        self.client
            .push_manifest(
                &repository.at_digest(&descriptor.digest),
                MEDIA_TYPE_ARTIFACT_MANIFEST,
                body,
            )
            .await?;
        debug!(subject = %subject.digest, manifest = %descriptor.digest, "signature attached");

        if use_tag_index {
            self.add_to_tag_index(ctx, repository, subject, &descriptor)
                .await?;
        }
        Ok(descriptor)
    }

    async fn add_to_tag_index(
        &self,
        ctx: &Context,
        repository: &ArtifactReference,
        subject: &Descriptor,
        signature: &Descriptor,
    ) -> Result<()> {
        let mut index = self.tag_index(ctx, repository, subject).await?;
        if index.manifests.contains(signature) {
            return Ok(());
        }
        index.manifests.push(signature.clone());
        let tag = referrers_tag(subject);
        self.client
            .push_manifest(
                &repository.at_tag(&tag),
                MEDIA_TYPE_IMAGE_INDEX,
                serde_json::to_vec(&index)?,
            )
            .await?;
        debug!(%tag, "referrers index updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::tests::generate_chain;
    use crate::envelope::EnvelopeFormat;
    use crate::registry::InMemoryRegistry;

    fn repository() -> ArtifactReference {
        "registry.example/app:v1".parse().unwrap()
    }

    fn signature(bytes: &[u8]) -> SignedEnvelope {
        let (root, leaf) = generate_chain();
        SignedEnvelope {
            bytes: bytes.to_vec(),
            format: EnvelopeFormat::Jws,
            certificate_chain: vec![leaf.x509(), root.x509()],
            annotations: BTreeMap::from([("k".to_string(), "v".to_string())]),
        }
    }

    async fn subject(registry: &InMemoryRegistry) -> Descriptor {
        registry
            .push_manifest(&repository(), MEDIA_TYPE_IMAGE_MANIFEST, b"{\"layers\":[]}".to_vec())
            .await
            .unwrap()
    }

    fn context(fallback: bool) -> Context {
        Context::new(Config {
            allow_referrers_tag_fallback: fallback,
            experimental: fallback,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn attach_then_discover_with_referrers() {
        let registry = Arc::new(InMemoryRegistry::new());
        let subject = subject(&registry).await;
        let repo = SignatureRepository::new(registry.clone());
        let ctx = context(false);

        let manifest = repo
            .push_signature(&ctx, &repository(), &subject, &signature(b"envelope"))
            .await
            .unwrap();
        assert_eq!(manifest.media_type, MEDIA_TYPE_ARTIFACT_MANIFEST);
        assert_eq!(manifest.artifact_type.as_deref(), Some(ARTIFACT_TYPE_NOTATION));
        let annotations = manifest.annotations.as_ref().unwrap();
        let thumbprints: Vec<String> =
            serde_json::from_str(&annotations[ANNOTATION_THUMBPRINT]).unwrap();
        assert_eq!(thumbprints.len(), 2);
        assert_eq!(annotations["k"], "v");

        let listed = repo
            .list_signatures(&ctx, &repository(), &subject)
            .await
            .unwrap();
        assert_eq!(listed, vec![manifest.clone()]);

        let (envelope, blob) = repo
            .fetch_signature(&ctx, &repository(), &listed[0])
            .await
            .unwrap();
        assert_eq!(envelope, b"envelope");
        assert_eq!(blob.media_type, EnvelopeFormat::Jws.media_type());
    }

    #[tokio::test]
    async fn tag_schema_requires_opt_in() {
        let registry = Arc::new(InMemoryRegistry::without_referrers_api());
        let subject = subject(&registry).await;
        let repo = SignatureRepository::new(registry.clone());

        let err = repo
            .list_signatures(&context(false), &repository(), &subject)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Registry(RegistryError::ReferrersUnsupported)
        ));

        let gated = Context::new(Config {
            allow_referrers_tag_fallback: true,
            experimental: false,
            ..Default::default()
        })
        .unwrap();
        let err = repo
            .list_signatures(&gated, &repository(), &subject)
            .await
            .unwrap_err();
        assert!(matches!(err, NotationError::ExperimentalDisabled { .. }));

        let ctx = context(true);
        assert!(repo
            .list_signatures(&ctx, &repository(), &subject)
            .await
            .unwrap()
            .is_empty());
        let manifest = repo
            .push_signature(&ctx, &repository(), &subject, &signature(b"envelope"))
            .await
            .unwrap();
        let index = repository().at_tag(&referrers_tag(&subject));
        assert!(registry.resolve(&index).await.is_ok());
        let listed = repo
            .list_signatures(&ctx, &repository(), &subject)
            .await
            .unwrap();
        assert_eq!(listed, vec![manifest]);
    }

    #[tokio::test]
    async fn gated_tag_schema_uploads_nothing() {
        let registry = Arc::new(InMemoryRegistry::without_referrers_api());
        let subject = subject(&registry).await;
        let repo = SignatureRepository::new(registry.clone());
        let gated = Context::new(Config {
            allow_referrers_tag_fallback: true,
            experimental: false,
            ..Default::default()
        })
        .unwrap();
        let before = registry.manifest_count(&repository());

        let envelope = signature(b"envelope");
        let err = repo
            .push_signature(&gated, &repository(), &subject, &envelope)
            .await
            .unwrap_err();
        assert!(matches!(err, NotationError::ExperimentalDisabled { .. }));
        assert_eq!(registry.manifest_count(&repository()), before);
        let blob = Descriptor::from_bytes(envelope.media_type(), &envelope.bytes);
        assert!(registry.fetch_blob(&repository(), &blob).await.is_err());
    }

    #[tokio::test]
    async fn oversized_signatures_are_refused() {
        let registry = Arc::new(InMemoryRegistry::new());
        let subject = subject(&registry).await;
        let repo = SignatureRepository::new(registry.clone());
        let oversized = vec![0u8; MAX_SIGNATURE_SIZE as usize + 1];
        let err = repo
            .push_signature(&context(false), &repository(), &subject, &signature(&oversized))
            .await
            .unwrap_err();
        assert!(matches!(err, NotationError::SignatureTooLarge { .. }));

        let mut manifest = Descriptor::from_bytes(MEDIA_TYPE_ARTIFACT_MANIFEST, b"{}");
        manifest.size = MAX_MANIFEST_SIZE + 1;
        let err = repo
            .fetch_signature(&context(false), &repository(), &manifest)
            .await
            .unwrap_err();
        assert!(matches!(err, NotationError::ManifestTooLarge { .. }));
    }

    #[test]
    fn tag_schema_name() {
        let subject = Descriptor::from_bytes("application/x.test", b"");
        assert_eq!(
            referrers_tag(&subject),
            "sha256-e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
