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

//! Signing and verification of OCI artifacts and blobs, end to end.
//!
//! OCI signatures are stored next to the artifact they cover, blob
//! signatures are files named `<blob>.<format>.sig`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Context;
use crate::descriptor::Descriptor;
use crate::envelope::EnvelopeFormat;
use crate::errors::{IoError, NotationError, Result};
use crate::registry::{ArtifactReference, SignatureRepository};
use crate::sign::{SignOptions, SignedEnvelope, Signer};
use crate::trustpolicy::PolicyTarget;
use crate::verify::{VerificationOutcome, Verifier, VerifyOptions};

/// What signing an OCI artifact produced.
#[derive(Debug, Clone)]
pub struct SignedArtifact {
    /// The signed manifest
    pub target: Descriptor,
    /// The manifest holding the signature
    pub signature_manifest: Descriptor,
}

/// A verified OCI artifact.
#[derive(Debug)]
pub struct ArtifactVerification {
    pub target: Descriptor,
    /// Outcome of the signature that verified
    pub outcome: VerificationOutcome,
}

fn failure(outcome: VerificationOutcome) -> NotationError {
    outcome
        .into_error()
        .unwrap_or_else(|| NotationError::VerificationFailed("signature verification failed".to_string()))
}

/// Sign the manifest named by `reference` and attach the signature to it.
pub async fn sign_artifact(
    ctx: &Context,
    signer: &Signer,
    repository: &SignatureRepository,
    reference: &ArtifactReference,
    options: &SignOptions,
) -> Result<SignedArtifact> {
    if reference.digest().is_none() {
        warn!(
            reference = %reference,
            "Always sign the artifact using digest(@sha256:...) rather than a tag, tags are mutable"
        );
    }
    let target = repository.resolve(ctx, reference).await?;
    let pinned = reference.at_digest(&target.digest);
    let signature = signer.sign(ctx, &target, options).await?;
    let signature_manifest = repository
        .push_signature(ctx, &pinned, &target, &signature)
        .await?;
    debug!(artifact = %pinned, signature = %signature_manifest.digest, "artifact signed");
    Ok(SignedArtifact {
        target,
        signature_manifest,
    })
}

/// Verify the signatures of the artifact named by `reference`.
///
/// Signatures are tried in turn until one verifies, at most
/// `max_signature_attempts` of them. When none does, the failure of the last
/// one tried is returned.
pub async fn verify_artifact(
    ctx: &Context,
    verifier: &Verifier,
    repository: &SignatureRepository,
    reference: &ArtifactReference,
    options: &VerifyOptions,
) -> Result<ArtifactVerification> {
    if reference.digest().is_none() {
        warn!(
            reference = %reference,
            "Always verify the artifact using digest(@sha256:...) rather than a tag, tags are mutable"
        );
    }
    let target = repository.resolve(ctx, reference).await?;
    let pinned = reference.at_digest(&target.digest);
    let whole = pinned.whole();
    let policy_target = PolicyTarget::Artifact(&whole);
    if let Some(outcome) = verifier.skipped(&policy_target)? {
        debug!(artifact = %whole, "verification skipped by the trust policy");
        return Ok(ArtifactVerification { target, outcome });
    }

    let signatures = repository.list_signatures(ctx, &pinned, &target).await?;
    if signatures.is_empty() {
        return Err(NotationError::NoSignatureFound(whole));
    }
    let max = ctx.config().max_signature_attempts;
    let options = VerifyOptions {
        artifact: Some(target.clone()),
        ..options.clone()
    };
    let mut last_failure = None;
    for (attempt, manifest) in signatures.iter().enumerate() {
        if attempt >= max {
            return Err(NotationError::ExceedMaxSignatures { max });
        }
        let (envelope, blob) = repository.fetch_signature(ctx, &pinned, manifest).await?;
        let outcome = verifier
            .verify(ctx, &policy_target, &blob.media_type, &envelope, &options)
            .await?;
        if outcome.is_success() {
            debug!(artifact = %whole, signature = %manifest.digest, "signature verified");
            return Ok(ArtifactVerification { target, outcome });
        }
        debug!(artifact = %whole, signature = %manifest.digest, "signature did not verify");
        last_failure = Some(failure(outcome));
    }
    Err(last_failure.unwrap_or_else(|| NotationError::NoSignatureFound(whole)))
}

/// Where the signature of `blob` in `format` is stored: `<blob>.<format>.sig`
/// under `directory`.
pub fn blob_signature_path(directory: &Path, blob: &Path, format: EnvelopeFormat) -> Result<PathBuf> {
    let name = blob
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IoError::NotFound(format!("{} is not a file", blob.display())))?;
    Ok(directory.join(format!("{name}.{format}.sig")))
}

/// Sign the content of `blob`, described with `media_type` or
/// `application/octet-stream`.
pub async fn sign_blob<R: Read>(
    ctx: &Context,
    signer: &Signer,
    blob: R,
    media_type: Option<&str>,
    options: &SignOptions,
) -> Result<(Descriptor, SignedEnvelope)> {
    let target = Descriptor::from_reader(blob, media_type)?;
    let signature = signer.sign(ctx, &target, options).await?;
    Ok((target, signature))
}

/// Write `signature` to `path` atomically, replacing any previous file.
pub fn write_blob_signature(path: &Path, signature: &SignedEnvelope) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io = |e: std::io::Error| NotationError::from(IoError::from_io(&e, &path.display().to_string()));
    let mut file = tempfile::NamedTempFile::new_in(directory).map_err(io)?;
    file.write_all(&signature.bytes).map_err(io)?;
    file.persist(path).map_err(|e| io(e.error))?;
    debug!(path = %path.display(), "blob signature written");
    Ok(())
}

/// Blob verification parameters.
#[derive(Debug, Clone, Default)]
pub struct BlobVerifyOptions<'a> {
    /// Format of the signature envelope
    pub format: EnvelopeFormat,
    /// Media type the signed descriptor must carry
    pub media_type: Option<&'a str>,
    /// Statement of the blob trust policy to apply, the global one otherwise
    pub policy_name: Option<&'a str>,
    pub verify: VerifyOptions,
}

/// Verify `signature` over the content of `blob`.
pub async fn verify_blob<R: Read + Send>(
    ctx: &Context,
    verifier: &Verifier,
    blob: R,
    signature: &[u8],
    options: &BlobVerifyOptions<'_>,
) -> Result<VerificationOutcome> {
    let policy_target = PolicyTarget::Blob(options.policy_name);
    let verify = VerifyOptions {
        artifact: None,
        ..options.verify.clone()
    };
    let mut outcome = verifier
        .verify(ctx, &policy_target, options.format.media_type(), signature, &verify)
        .await?;
    if !outcome.is_success() {
        return Err(failure(outcome));
    }

    // skipped verifications carry no payload
    if let Some(payload) = &outcome.payload {
        let signed = &payload.target_artifact;
        let (matches, size) = signed.digest.verify_reader(blob)?;
        if !matches || size != signed.size {
            outcome.error = Some(NotationError::VerificationFailed(format!(
                "the blob does not match the signed digest {}",
                signed.digest
            )));
        } else if let Some(media_type) = options.media_type {
            if signed.media_type != media_type {
                outcome.error = Some(NotationError::VerificationFailed(format!(
                    "the signature covers media type {} instead of {media_type}",
                    signed.media_type
                )));
            }
        }
    }
    if outcome.is_success() {
        Ok(outcome)
    } else {
        Err(failure(outcome))
    }
}
