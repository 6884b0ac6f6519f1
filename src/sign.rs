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

//! Producing signature envelopes over descriptors.
//!
//! A [`Signer`] either drives a [`SigningKey`] through the whole envelope
//! construction, or delegates it to an [`EnvelopeGenerator`] plugin and
//! checks what comes back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use x509_cert::Certificate;

use crate::config::Context;
use crate::crypto::{CertificatePool, KeySpec, SigningKey, VerificationKey};
use crate::descriptor::{Descriptor, Payload, MEDIA_TYPE_PAYLOAD_V1};
use crate::envelope::{
    Envelope, EnvelopeFormat, EnvelopePayload, ExtendedAttribute, SignRequest, SigningScheme,
    UnsignedAttributes, UnsignedEnvelope,
};
use crate::errors::{EnvelopeError, NotationError, Result, SignerError};
use crate::plugin::{Capability, EnvelopeGenerator, GenerateEnvelopeRequest};
use crate::timestamp::{TimestampToken, Timestamper};

/// The timestamp authority to countersign signatures with.
#[derive(Clone)]
pub struct TimestampOptions {
    pub timestamper: Arc<dyn Timestamper>,
    /// Roots the authority certificate must chain to
    pub roots: CertificatePool,
}

/// How to sign.
#[derive(Clone, Default)]
pub struct SignOptions {
    pub format: EnvelopeFormat,
    pub signing_scheme: SigningScheme,
    /// Signature lifetime, counted from the signing time
    pub expiry: Option<Duration>,
    /// Annotations signed together with the target
    pub annotations: BTreeMap<String, String>,
    pub extended_attributes: Vec<ExtendedAttribute>,
    pub signing_agent: Option<String>,
    pub timestamp: Option<TimestampOptions>,
    /// Passed as is to envelope generator plugins
    pub plugin_config: BTreeMap<String, String>,
}

/// A freshly produced envelope.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    pub bytes: Vec<u8>,
    pub format: EnvelopeFormat,
    /// Leaf first
    pub certificate_chain: Vec<Certificate>,
    /// Annotations an envelope generator asked for
    pub annotations: BTreeMap<String, String>,
}

impl SignedEnvelope {
    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }
}

#[derive(Clone)]
enum Backend {
    Key(Arc<dyn SigningKey>),
    EnvelopePlugin {
        plugin: Arc<dyn EnvelopeGenerator>,
        key_id: String,
    },
}

/// Signs descriptors.
#[derive(Clone)]
pub struct Signer {
    backend: Backend,
}

impl Signer {
    pub fn new(key: Arc<dyn SigningKey>) -> Self {
        Signer {
            backend: Backend::Key(key),
        }
    }

    /// Sign with a plugin producing whole envelopes.
    pub fn with_envelope_plugin(
        plugin: Arc<dyn EnvelopeGenerator>,
        key_id: impl Into<String>,
    ) -> Result<Self> {
        let metadata = plugin.metadata();
        metadata.validate()?;
        if !metadata.has_capability(Capability::EnvelopeGenerator) {
            return Err(SignerError::PluginFailed(format!(
                "plugin {} does not support generating envelopes",
                metadata.name
            ))
            .into());
        }
        Ok(Signer {
            backend: Backend::EnvelopePlugin {
                plugin,
                key_id: key_id.into(),
            },
        })
    }

    /// Produce an envelope over `target`.
    pub async fn sign(
        &self,
        ctx: &Context,
        target: &Descriptor,
        options: &SignOptions,
    ) -> Result<SignedEnvelope> {
        ctx.check_cancelled()?;
        let mut payload = Payload::new(target.clone());
        if !options.annotations.is_empty() {
            payload.annotations = Some(options.annotations.clone());
        }
        let payload = EnvelopePayload {
            content_type: MEDIA_TYPE_PAYLOAD_V1.to_string(),
            content: payload.to_canonical_json()?,
        };

        match &self.backend {
            Backend::Key(key) => sign_with_key(ctx, key.as_ref(), payload, options).await,
            Backend::EnvelopePlugin { plugin, key_id } => {
                sign_with_envelope_plugin(ctx, plugin.as_ref(), key_id, target, payload, options)
                    .await
            }
        }
    }
}

fn expiry_of(signing_time: DateTime<Utc>, expiry: Option<Duration>) -> Result<Option<DateTime<Utc>>> {
    expiry
        .map(|duration| {
            TimeDelta::from_std(duration)
                .ok()
                .and_then(|delta| signing_time.checked_add_signed(delta))
                .ok_or_else(|| {
                    SignerError::Refused(format!("expiry of {duration:?} is out of range")).into()
                })
        })
        .transpose()
}

async fn sign_with_key(
    ctx: &Context,
    key: &dyn SigningKey,
    payload: EnvelopePayload,
    options: &SignOptions,
) -> Result<SignedEnvelope> {
    let description = key.describe().await?;
    let leaf = description.certificate_chain.first().ok_or_else(|| {
        SignerError::KeyUnavailable(format!(
            "key {:?} has no certificate chain",
            description.key_id
        ))
    })?;
    let algorithm = KeySpec::from_spki(&leaf.tbs_certificate.subject_public_key_info)
        .and_then(|spec| spec.signature_algorithm())
        .map_err(|e| SignerError::AlgorithmUnsupported(e.to_string()))?;
    if algorithm != description.algorithm {
        return Err(SignerError::AlgorithmUnsupported(format!(
            "key {:?} signs with {} but its certificate requires {algorithm}",
            description.key_id, description.algorithm
        ))
        .into());
    }
    if options.signing_scheme == SigningScheme::X509SigningAuthority && options.timestamp.is_none()
    {
        return Err(SignerError::TimestampFailed(format!(
            "signing scheme {} requires a timestamp authority",
            options.signing_scheme
        ))
        .into());
    }

    let signing_time = Utc::now();
    let request = SignRequest {
        payload,
        signature_algorithm: algorithm,
        signing_scheme: options.signing_scheme,
        signing_time,
        expiry: expiry_of(signing_time, options.expiry)?,
        extended_attributes: options.extended_attributes.clone(),
    };
    let unsigned = UnsignedEnvelope::new(options.format, request).map_err(serialization_failed)?;
    let signing_input = unsigned.signing_input().map_err(serialization_failed)?;

    ctx.check_cancelled()?;
    let signature = key.sign(&signing_input).await?;
    VerificationKey::from_certificate(leaf)
        .and_then(|key| key.verify(algorithm, &signing_input, &signature))
        .map_err(|e| {
            SignerError::KeyUnavailable(format!(
                "signature of key {:?} does not verify with its certificate: {e}",
                description.key_id
            ))
        })?;
    tracing::debug!(key_id = %description.key_id, %algorithm, "payload signed");

    let timestamp_signature = match &options.timestamp {
        Some(timestamp) => Some(countersign(ctx, timestamp, &signature, signing_time).await?),
        None => None,
    };

    let bytes = unsigned
        .seal(
            signature,
            &description.certificate_chain,
            UnsignedAttributes {
                timestamp_signature,
                signing_agent: options.signing_agent.clone(),
            },
        )
        .map_err(serialization_failed)?;
    Ok(SignedEnvelope {
        bytes,
        format: options.format,
        certificate_chain: description.certificate_chain,
        annotations: BTreeMap::new(),
    })
}

fn serialization_failed(err: EnvelopeError) -> NotationError {
    SignerError::EnvelopeSerializationFailed(err.to_string()).into()
}

/// Timestamp `signature` and check the token before embedding it.
async fn countersign(
    ctx: &Context,
    options: &TimestampOptions,
    signature: &[u8],
    signing_time: DateTime<Utc>,
) -> Result<Vec<u8>> {
    ctx.check_cancelled()?;
    let deadline = ctx.config().tsa_timeout;
    let request = async {
        tokio::time::timeout(deadline, options.timestamper.timestamp(signature))
            .await
            .map_err(|_| SignerError::TimestampFailed(format!("no answer within {deadline:?}")))?
            .map_err(|e| SignerError::TimestampFailed(e.to_string()))
    };
    let token_der = ctx
        .cancellation()
        .run_until_cancelled(request)
        .await
        .ok_or(NotationError::Cancelled)??;

    let failed = |e: crate::errors::TimestampError| SignerError::TimestampFailed(e.to_string());
    let token = TimestampToken::parse(&token_der).map_err(failed)?;
    token.verify(signature, &options.roots).map_err(failed)?;
    token
        .check_skew(signing_time, ctx.config().tsa_clock_skew)
        .map_err(failed)?;
    tracing::debug!(gen_time = %token.gen_time(), "signature timestamped");
    Ok(token_der)
}

async fn sign_with_envelope_plugin(
    ctx: &Context,
    plugin: &dyn EnvelopeGenerator,
    key_id: &str,
    target: &Descriptor,
    payload: EnvelopePayload,
    options: &SignOptions,
) -> Result<SignedEnvelope> {
    let name = plugin.metadata().name.clone();
    let failed = |reason: String| -> NotationError {
        SignerError::PluginFailed(format!("plugin {name}: {reason}")).into()
    };

    let signing_time = Utc::now();
    let request = GenerateEnvelopeRequest {
        key_id: key_id.to_string(),
        payload_type: payload.content_type.clone(),
        payload: payload.content,
        signature_envelope_type: options.format.media_type().to_string(),
        expiry: expiry_of(signing_time, options.expiry)?,
        plugin_config: options.plugin_config.clone(),
    };
    ctx.check_cancelled()?;
    let response = plugin.generate_envelope(request).await?;

    if response.signature_envelope_type != options.format.media_type() {
        return Err(failed(format!(
            "returned an envelope of type {:?} instead of {:?}",
            response.signature_envelope_type,
            options.format.media_type()
        )));
    }
    let envelope = Envelope::parse_format(options.format, &response.signature_envelope)
        .map_err(|e| failed(format!("returned an invalid envelope: {e}")))?;
    let content = envelope
        .verify()
        .map_err(|e| failed(format!("returned an envelope that does not verify: {e}")))?;
    let signed = Payload::from_signed_content(
        &content.payload.content_type,
        &content.payload.content,
    )
    .map_err(|e| failed(e.to_string()))?;
    if &signed.target_artifact != target {
        return Err(failed(format!(
            "signed {} instead of {}",
            signed.target_artifact.digest, target.digest
        )));
    }
    let metadata = signed.user_metadata();
    for (key, value) in &options.annotations {
        if metadata.get(key) != Some(value) {
            return Err(failed(format!("dropped the annotation {key:?}")));
        }
    }

    Ok(SignedEnvelope {
        certificate_chain: content.signer_info.certificate_chain.clone(),
        bytes: response.signature_envelope,
        format: options.format,
        annotations: response.annotations,
    })
}
