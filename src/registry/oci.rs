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

//! [`RegistryClient`] backed by [`oci_client::Client`].

use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use oci_client::errors::{OciDistributionError, OciErrorCode};
use oci_client::manifest::OciDescriptor;
use oci_client::secrets::RegistryAuth;
use oci_client::RegistryOperation;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LINK};
use reqwest::{Response, StatusCode};
use tokio::io::AsyncWrite;
use tracing::debug;
use url::Url;

use super::client::{parse_index, RegistryClient};
use super::config::ClientConfig;
use super::index::{
    MEDIA_TYPE_ARTIFACT_MANIFEST, MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST,
    MAX_MANIFEST_SIZE, MAX_SIGNATURE_SIZE,
};
use super::reference::ArtifactReference;
use crate::descriptor::{Descriptor, Digest};
use crate::errors::{IoError, NotationError, RegistryError, Result};

const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

const MANIFEST_MEDIA_TYPES: &[&str] = &[
    MEDIA_TYPE_IMAGE_MANIFEST,
    MEDIA_TYPE_IMAGE_INDEX,
    MEDIA_TYPE_ARTIFACT_MANIFEST,
    MEDIA_TYPE_DOCKER_MANIFEST,
];

/// Registry access through `oci_client`, which also negotiates the
/// registry tokens.
///
/// `oci_client` returns a single page of referrers, so the referrers
/// listing follows `Link` headers itself, presenting the token negotiated
/// by `oci_client`.
pub struct OciRegistryClient {
    registry_client: oci_client::Client,
    http: reqwest::Client,
    config: ClientConfig,
}

impl OciRegistryClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let registry_client =
            oci_client::Client::try_from(oci_client::client::ClientConfig::from(&config))
                .map_err(|e| NotationError::InvalidConfig(e.to_string()))?;
        Ok(OciRegistryClient {
            registry_client,
            http: config.http_client()?,
            config,
        })
    }

    fn registry_auth(&self, reference: &ArtifactReference) -> RegistryAuth {
        self.config.auth(reference.registry())
    }

    /// Negotiate access to the repository of `reference`, returning the
    /// bearer token when the registry issued one.
    async fn authenticate(
        &self,
        reference: &ArtifactReference,
        operation: RegistryOperation,
    ) -> Result<Option<String>> {
        self.registry_client
            .auth(
                &reference.oci_reference,
                &self.registry_auth(reference),
                operation,
            )
            .await
            .map_err(|e| registry_error(e, &reference.whole()))
    }
}

/// Map an `oci_client` failure onto the error kinds callers branch on.
fn registry_error(err: OciDistributionError, what: &str) -> NotationError {
    let status = match &err {
        OciDistributionError::ImageManifestNotFoundError(_) => Some(404),
        OciDistributionError::UnauthorizedError { .. }
        | OciDistributionError::AuthenticationFailure(_) => Some(401),
        OciDistributionError::ServerError { code, .. } => Some(*code),
        OciDistributionError::RegistryError { envelope, .. } => {
            let unknown = envelope.errors.iter().any(|e| {
                matches!(
                    e.code,
                    OciErrorCode::ManifestUnknown
                        | OciErrorCode::BlobUnknown
                        | OciErrorCode::NameUnknown
                )
            });
            unknown.then_some(404)
        }
        OciDistributionError::RequestError(e) if e.is_timeout() => {
            return IoError::Timeout(format!("{what}: {err}")).into()
        }
        OciDistributionError::RequestError(e) => e.status().map(|s| s.as_u16()),
        _ => None,
    };
    match status {
        Some(404) => IoError::NotFound(what.to_string()).into(),
        Some(401 | 403) => IoError::PermissionDenied(format!("{what}: {err}")).into(),
        _ => IoError::TransportFailed(format!("{what}: {err}")).into(),
    }
}

/// Media type a manifest declares about itself.
fn declared_media_type(body: &[u8]) -> Result<String> {
    let manifest: serde_json::Value = serde_json::from_slice(body)?;
    if let Some(media_type) = manifest.get("mediaType").and_then(|v| v.as_str()) {
        return Ok(media_type.to_string());
    }
    if manifest.get("manifests").is_some() {
        Ok(MEDIA_TYPE_IMAGE_INDEX.to_string())
    } else {
        Ok(MEDIA_TYPE_IMAGE_MANIFEST.to_string())
    }
}

/// Collects a blob, refusing anything past `limit` bytes.
struct BoundedBuffer {
    data: Vec<u8>,
    limit: u64,
    overflowed: bool,
}

impl BoundedBuffer {
    fn new(limit: u64) -> Self {
        BoundedBuffer {
            data: Vec::new(),
            limit,
            overflowed: false,
        }
    }
}

impl AsyncWrite for BoundedBuffer {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if (self.data.len() + buf.len()) as u64 > self.limit {
            self.overflowed = true;
            return Poll::Ready(Err(io::Error::other("blob exceeds its declared size")));
        }
        self.data.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find(|link| link.contains("rel=\"next\"") || link.contains("rel=next"))
        .and_then(|link| {
            let start = link.find('<')?;
            let end = link.find('>')?;
            (start < end).then(|| link[start + 1..end].to_string())
        })
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    Some(value.split(';').next().unwrap_or(value).trim())
}

/// Read a referrers page, refusing more than a manifest worth of bytes.
async fn read_page(mut response: Response, url: &str) -> Result<Vec<u8>> {
    let too_large = |size| NotationError::ManifestTooLarge {
        size,
        limit: MAX_MANIFEST_SIZE,
    };
    if let Some(length) = response.content_length() {
        if length > MAX_MANIFEST_SIZE {
            return Err(too_large(length));
        }
    }
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| IoError::from_reqwest(&e, url))?
    {
        body.extend_from_slice(&chunk);
        if body.len() as u64 > MAX_MANIFEST_SIZE {
            return Err(too_large(body.len() as u64));
        }
    }
    Ok(body)
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    async fn resolve(&self, reference: &ArtifactReference) -> Result<Descriptor> {
        let (descriptor, _) = self.fetch_manifest(reference, MAX_MANIFEST_SIZE).await?;
        Ok(descriptor)
    }

    async fn fetch_manifest(
        &self,
        reference: &ArtifactReference,
        limit: u64,
    ) -> Result<(Descriptor, Vec<u8>)> {
        let (body, _) = self
            .registry_client
            .pull_manifest_raw(
                &reference.oci_reference,
                &self.registry_auth(reference),
                MANIFEST_MEDIA_TYPES,
            )
            .await
            .map_err(|e| registry_error(e, &reference.whole()))?;
        let body = body.to_vec();
        if body.len() as u64 > limit {
            return Err(NotationError::ManifestTooLarge {
                size: body.len() as u64,
                limit,
            });
        }
        let descriptor = Descriptor::from_bytes(declared_media_type(&body)?, &body);
        if let Some(digest) = reference.digest() {
            if digest.parse::<Digest>()? != descriptor.digest {
                return Err(RegistryError::DigestMismatch {
                    expected: digest.to_string(),
                    actual: descriptor.digest.to_string(),
                }
                .into());
            }
        }
        Ok((descriptor, body))
    }

    async fn fetch_blob(
        &self,
        repository: &ArtifactReference,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>> {
        if descriptor.size > MAX_SIGNATURE_SIZE {
            return Err(NotationError::SignatureTooLarge {
                size: descriptor.size,
                limit: MAX_SIGNATURE_SIZE,
            });
        }
        self.authenticate(repository, RegistryOperation::Pull)
            .await?;
        let layer = OciDescriptor {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.to_string(),
            size: descriptor.size as i64,
            ..Default::default()
        };
        let mut buffer = BoundedBuffer::new(descriptor.size);
        let pulled = self
            .registry_client
            .pull_blob(&repository.oci_reference, &layer, &mut buffer)
            .await;

        let size_mismatch = || RegistryError::SizeMismatch {
            digest: descriptor.digest.to_string(),
            expected: descriptor.size,
        };
        if buffer.overflowed {
            return Err(size_mismatch().into());
        }
        let data = buffer.data;
        if data.len() as u64 == descriptor.size {
            if !descriptor.digest.verify(&data) {
                return Err(RegistryError::DigestMismatch {
                    expected: descriptor.digest.to_string(),
                    actual: Digest::sha256_of(&data).to_string(),
                }
                .into());
            }
            pulled.map_err(|e| registry_error(e, &descriptor.digest.to_string()))?;
            return Ok(data);
        }
        pulled.map_err(|e| registry_error(e, &descriptor.digest.to_string()))?;
        Err(size_mismatch().into())
    }

    async fn push_blob(
        &self,
        repository: &ArtifactReference,
        descriptor: &Descriptor,
        data: Vec<u8>,
    ) -> Result<()> {
        self.authenticate(repository, RegistryOperation::Push)
            .await?;
        let digest = descriptor.digest.to_string();
        let location = self
            .registry_client
            .push_blob(&repository.oci_reference, &data, &digest)
            .await
            .map_err(|e| registry_error(e, &digest))?;
        debug!(%digest, %location, "blob pushed");
        Ok(())
    }

    async fn push_manifest(
        &self,
        reference: &ArtifactReference,
        media_type: &str,
        body: Vec<u8>,
    ) -> Result<Descriptor> {
        let descriptor = Descriptor::from_bytes(media_type, &body);
        let content_type = HeaderValue::from_str(media_type).map_err(|e| {
            RegistryError::UnsupportedManifest(format!("media type {media_type:?}: {e}"))
        })?;
        self.authenticate(reference, RegistryOperation::Push)
            .await?;
        let location = self
            .registry_client
            .push_manifest_raw(&reference.oci_reference, body, content_type)
            .await
            .map_err(|e| registry_error(e, &reference.whole()))?;
        debug!(manifest = %descriptor.digest, %location, "manifest pushed");
        Ok(descriptor)
    }

    async fn referrers(
        &self,
        repository: &ArtifactReference,
        subject: &Descriptor,
        artifact_type: &str,
    ) -> Result<Option<Vec<Descriptor>>> {
        let token = self
            .authenticate(repository, RegistryOperation::Pull)
            .await?;
        let auth = self.registry_auth(repository);
        let origin = format!(
            "{}://{}",
            self.config.protocol.scheme(repository.registry()),
            repository.resolve_registry()
        );
        let mut page = Url::parse(&format!(
            "{origin}/v2/{}/referrers/{}",
            repository.repository(),
            subject.digest
        ))
        .map_err(|e| IoError::TransportFailed(format!("invalid referrers URL: {e}")))?;
        page.query_pairs_mut()
            .append_pair("artifactType", artifact_type);

        let mut referrers = Vec::new();
        let mut first = true;
        loop {
            let url = page.to_string();
            let mut request = self.http.get(&url).header(ACCEPT, MEDIA_TYPE_IMAGE_INDEX);
            request = match (&token, &auth) {
                (Some(token), _) | (None, RegistryAuth::Bearer(token)) => {
                    request.bearer_auth(token)
                }
                (None, RegistryAuth::Basic(username, password)) => {
                    request.basic_auth(username, Some(password))
                }
                (None, _) => request,
            };
            let response = request
                .send()
                .await
                .map_err(|e| IoError::from_reqwest(&e, &url))?;
            let status = response.status();
            if first && status == StatusCode::NOT_FOUND {
                debug!(%url, "referrers API not supported");
                return Ok(None);
            }
            match status {
                s if s.is_success() => {}
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(IoError::PermissionDenied(format!("{url}: {status}")).into())
                }
                _ => {
                    return Err(RegistryError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    }
                    .into())
                }
            }
            if first && content_type(response.headers()) != Some(MEDIA_TYPE_IMAGE_INDEX) {
                debug!(%url, "referrers API answered something else than an index");
                return Ok(None);
            }
            let next = next_link(response.headers());
            let body = read_page(response, &url).await?;
            referrers.extend(
                parse_index(&body)?
                    .manifests
                    .into_iter()
                    .filter(|d| d.artifact_type.as_deref() == Some(artifact_type)),
            );
            match next {
                Some(next) => {
                    page = page.join(&next).map_err(|e| {
                        IoError::TransportFailed(format!("{url}: invalid Link: {e}"))
                    })?;
                    first = false;
                }
                None => return Ok(Some(referrers)),
            }
        }
    }
}
