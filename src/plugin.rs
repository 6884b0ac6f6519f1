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

//! Plugin capabilities.
//!
//! How plugins are discovered and spoken to is up to the host. The core
//! only sees the capabilities a plugin advertises, each one being its own
//! trait:
//! * [`SignatureGenerator`]: signs raw bytes, adapted to a [`SigningKey`]
//!   by [`PluginSigningKey`]
//! * [`EnvelopeGenerator`]: produces complete envelopes
//! * [`TrustedIdentityVerifier`] and [`RevocationCheckVerifier`]: take over
//!   parts of the verification
//!
//! [`PluginCapabilities`] groups the capabilities one plugin instance
//! provides.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_cert::Certificate;

use crate::crypto::{KeyDescription, KeySpec, SignatureAlgorithm, SigningKey};
use crate::envelope::{ExtendedAttribute, SigningScheme};
use crate::errors::{NotationError, Result, SignerError};

/// Extended attribute naming the plugin a signature must be verified with.
pub const VERIFICATION_PLUGIN_ATTRIBUTE: &str = "io.cncf.notary.verificationPlugin";

/// What a plugin can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "SIGNATURE_GENERATOR.RAW")]
    SignatureGenerator,
    #[serde(rename = "SIGNATURE_GENERATOR.ENVELOPE")]
    EnvelopeGenerator,
    #[serde(rename = "SIGNATURE_VERIFIER.TRUSTED_IDENTITY")]
    TrustedIdentityVerifier,
    #[serde(rename = "SIGNATURE_VERIFIER.REVOCATION_CHECK")]
    RevocationCheckVerifier,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::SignatureGenerator => "SIGNATURE_GENERATOR.RAW",
            Capability::EnvelopeGenerator => "SIGNATURE_GENERATOR.ENVELOPE",
            Capability::TrustedIdentityVerifier => "SIGNATURE_VERIFIER.TRUSTED_IDENTITY",
            Capability::RevocationCheckVerifier => "SIGNATURE_VERIFIER.REVOCATION_CHECK",
        };
        f.write_str(name)
    }
}

/// What a plugin says about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub url: String,
    pub capabilities: Vec<Capability>,
}

impl PluginMetadata {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Name, version and at least one capability are mandatory.
    pub fn validate(&self) -> std::result::Result<(), SignerError> {
        let missing = if self.name.trim().is_empty() {
            Some("name")
        } else if self.version.trim().is_empty() {
            Some("version")
        } else if self.capabilities.is_empty() {
            Some("capabilities")
        } else {
            None
        };
        match missing {
            Some(field) => Err(SignerError::PluginFailed(format!(
                "plugin metadata has an empty {field}"
            ))),
            None => Ok(()),
        }
    }
}

/// Common to every plugin.
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;
}

/// Answer to a describe key request.
#[derive(Debug, Clone)]
pub struct DescribeKeyResponse {
    pub key_id: String,
    pub key_spec: KeySpec,
    /// Leaf first
    pub certificate_chain: Vec<Certificate>,
}

/// Answer to a raw signing request.
#[derive(Debug, Clone)]
pub struct GenerateSignatureResponse {
    pub key_id: String,
    pub signature: Vec<u8>,
    pub signing_algorithm: SignatureAlgorithm,
}

/// A plugin signing raw bytes with a key it holds.
#[async_trait]
pub trait SignatureGenerator: Plugin {
    async fn describe_key(&self, key_id: &str) -> Result<DescribeKeyResponse>;

    async fn generate_signature(
        &self,
        key_id: &str,
        algorithm: SignatureAlgorithm,
        payload: &[u8],
    ) -> Result<GenerateSignatureResponse>;
}

/// What the signer asks an envelope generator for.
#[derive(Debug, Clone)]
pub struct GenerateEnvelopeRequest {
    pub key_id: String,
    pub payload_type: String,
    pub payload: Vec<u8>,
    pub signature_envelope_type: String,
    pub expiry: Option<DateTime<Utc>>,
    pub plugin_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GenerateEnvelopeResponse {
    pub signature_envelope: Vec<u8>,
    pub signature_envelope_type: String,
    /// Annotations the plugin wants on the signature manifest
    pub annotations: BTreeMap<String, String>,
}

/// A plugin producing complete signature envelopes.
#[async_trait]
pub trait EnvelopeGenerator: Plugin {
    async fn generate_envelope(
        &self,
        request: GenerateEnvelopeRequest,
    ) -> Result<GenerateEnvelopeResponse>;
}

/// The signature a verification plugin is asked about.
#[derive(Debug, Clone)]
pub struct VerifySignatureRequest {
    pub signing_scheme: SigningScheme,
    pub signing_time: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
    pub authentic_signing_time: Option<DateTime<Utc>>,
    pub certificate_chain: Vec<Certificate>,
    pub extended_attributes: Vec<ExtendedAttribute>,
    pub trusted_identities: Vec<String>,
}

/// Result of one check run by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginVerdict {
    pub success: bool,
    pub reason: String,
}

#[async_trait]
pub trait TrustedIdentityVerifier: Plugin {
    async fn verify_trusted_identity(&self, request: &VerifySignatureRequest)
        -> Result<PluginVerdict>;
}

#[async_trait]
pub trait RevocationCheckVerifier: Plugin {
    async fn check_revocation(&self, request: &VerifySignatureRequest) -> Result<PluginVerdict>;
}

/// The capabilities one plugin instance provides, each behind its own trait.
#[derive(Clone, Default)]
pub struct PluginCapabilities {
    pub signature_generator: Option<Arc<dyn SignatureGenerator>>,
    pub envelope_generator: Option<Arc<dyn EnvelopeGenerator>>,
    pub trusted_identity_verifier: Option<Arc<dyn TrustedIdentityVerifier>>,
    pub revocation_check_verifier: Option<Arc<dyn RevocationCheckVerifier>>,
}

impl fmt::Debug for PluginCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.advertised()).finish()
    }
}

impl PluginCapabilities {
    /// The capabilities present.
    pub fn advertised(&self) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        if self.signature_generator.is_some() {
            capabilities.push(Capability::SignatureGenerator);
        }
        if self.envelope_generator.is_some() {
            capabilities.push(Capability::EnvelopeGenerator);
        }
        if self.trusted_identity_verifier.is_some() {
            capabilities.push(Capability::TrustedIdentityVerifier);
        }
        if self.revocation_check_verifier.is_some() {
            capabilities.push(Capability::RevocationCheckVerifier);
        }
        capabilities
    }

    /// Whether the plugin can take part in verification.
    pub fn is_verifier(&self) -> bool {
        self.trusted_identity_verifier.is_some() || self.revocation_check_verifier.is_some()
    }
}

/// Verification plugins by name.
pub type PluginRegistry = BTreeMap<String, PluginCapabilities>;

/// A [`SignatureGenerator`] used as a [`SigningKey`].
pub struct PluginSigningKey {
    plugin: Arc<dyn SignatureGenerator>,
    key_id: String,
}

impl PluginSigningKey {
    pub fn new(plugin: Arc<dyn SignatureGenerator>, key_id: impl Into<String>) -> Result<Self> {
        let metadata = plugin.metadata();
        metadata.validate()?;
        if !metadata.has_capability(Capability::SignatureGenerator) {
            return Err(SignerError::PluginFailed(format!(
                "plugin {} does not support signing raw signatures",
                metadata.name
            ))
            .into());
        }
        Ok(PluginSigningKey {
            plugin,
            key_id: key_id.into(),
        })
    }

    fn plugin_failed(&self, reason: String) -> NotationError {
        SignerError::PluginFailed(format!("plugin {}: {reason}", self.plugin.metadata().name))
            .into()
    }
}

#[async_trait]
impl SigningKey for PluginSigningKey {
    async fn describe(&self) -> Result<KeyDescription> {
        let response = self.plugin.describe_key(&self.key_id).await?;
        if response.key_id != self.key_id {
            return Err(self.plugin_failed(format!(
                "described key {:?} instead of {:?}",
                response.key_id, self.key_id
            )));
        }
        if response.certificate_chain.is_empty() {
            return Err(self.plugin_failed("returned an empty certificate chain".to_string()));
        }
        let algorithm = response
            .key_spec
            .signature_algorithm()
            .map_err(|e| SignerError::AlgorithmUnsupported(e.to_string()))?;
        Ok(KeyDescription {
            key_id: response.key_id,
            algorithm,
            certificate_chain: response.certificate_chain,
        })
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let description = self.describe().await?;
        let response = self
            .plugin
            .generate_signature(&self.key_id, description.algorithm, payload)
            .await?;
        if response.key_id != self.key_id {
            return Err(self.plugin_failed(format!(
                "signed with key {:?} instead of {:?}",
                response.key_id, self.key_id
            )));
        }
        if response.signing_algorithm != description.algorithm {
            return Err(self.plugin_failed(format!(
                "signed with {} instead of {}",
                response.signing_algorithm, description.algorithm
            )));
        }
        if response.signature.is_empty() {
            return Err(self.plugin_failed("returned an empty signature".to_string()));
        }
        Ok(response.signature)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::tests::*;
    use crate::crypto::LocalSigningKey;

    pub(crate) fn metadata(name: &str, capabilities: Vec<Capability>) -> PluginMetadata {
        PluginMetadata {
            name: name.to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            url: String::new(),
            capabilities,
        }
    }

    /// Signs with an in-memory key, optionally misbehaving.
    pub(crate) struct KeyPlugin {
        pub metadata: PluginMetadata,
        pub key: LocalSigningKey,
        pub chain: Vec<Certificate>,
        pub answer_with_key: Option<String>,
    }

    impl KeyPlugin {
        pub(crate) fn new(leaf: &CertData, chain: Vec<Certificate>) -> Self {
            KeyPlugin {
                metadata: metadata("kms", vec![Capability::SignatureGenerator]),
                key: leaf.signing_key(),
                chain,
                answer_with_key: None,
            }
        }
    }

    impl Plugin for KeyPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }
    }

    #[async_trait]
    impl SignatureGenerator for KeyPlugin {
        async fn describe_key(&self, key_id: &str) -> Result<DescribeKeyResponse> {
            Ok(DescribeKeyResponse {
                key_id: key_id.to_string(),
                key_spec: self.key.key_spec(),
                certificate_chain: self.chain.clone(),
            })
        }

        async fn generate_signature(
            &self,
            key_id: &str,
            algorithm: SignatureAlgorithm,
            payload: &[u8],
        ) -> Result<GenerateSignatureResponse> {
            Ok(GenerateSignatureResponse {
                key_id: self
                    .answer_with_key
                    .clone()
                    .unwrap_or_else(|| key_id.to_string()),
                signature: self.key.sign_bytes(payload)?,
                signing_algorithm: algorithm,
            })
        }
    }

    #[tokio::test]
    async fn plugin_adapts_to_signing_key() {
        let (root, leaf) = generate_chain();
        let plugin = KeyPlugin::new(&leaf, vec![leaf.x509(), root.x509()]);
        let key = PluginSigningKey::new(Arc::new(plugin), "key-1").unwrap();

        let description = key.describe().await.unwrap();
        assert_eq!(description.key_id, "key-1");
        assert_eq!(description.certificate_chain.len(), 2);

        let signature = key.sign(b"payload").await.unwrap();
        crate::crypto::VerificationKey::from_certificate(&leaf.x509())
            .unwrap()
            .verify(description.algorithm, b"payload", &signature)
            .unwrap();
    }

    #[tokio::test]
    async fn mismatched_key_id_is_a_plugin_failure() {
        let (root, leaf) = generate_chain();
        let mut plugin = KeyPlugin::new(&leaf, vec![leaf.x509(), root.x509()]);
        plugin.answer_with_key = Some("key-2".to_string());
        let key = PluginSigningKey::new(Arc::new(plugin), "key-1").unwrap();
        let err = key.sign(b"payload").await.unwrap_err();
        assert!(matches!(
            err,
            NotationError::Signer(SignerError::PluginFailed(_))
        ));
    }

    #[test]
    fn capability_is_required() {
        let (root, leaf) = generate_chain();
        let mut plugin = KeyPlugin::new(&leaf, vec![leaf.x509(), root.x509()]);
        plugin.metadata = metadata("kms", vec![Capability::EnvelopeGenerator]);
        assert!(PluginSigningKey::new(Arc::new(plugin), "key-1").is_err());
    }

    #[test]
    fn metadata_validation() {
        assert!(metadata("kms", vec![Capability::SignatureGenerator])
            .validate()
            .is_ok());
        assert!(metadata("", vec![Capability::SignatureGenerator])
            .validate()
            .is_err());
        assert!(metadata("kms", vec![]).validate().is_err());
    }

    #[test]
    fn capability_names() {
        let parsed: PluginMetadata = serde_json::from_value(serde_json::json!({
            "name": "kms",
            "version": "1.0.0",
            "capabilities": ["SIGNATURE_GENERATOR.RAW", "SIGNATURE_VERIFIER.REVOCATION_CHECK"]
        }))
        .unwrap();
        assert!(parsed.has_capability(Capability::SignatureGenerator));
        assert!(parsed.has_capability(Capability::RevocationCheckVerifier));
        assert!(!parsed.has_capability(Capability::EnvelopeGenerator));
        assert_eq!(
            Capability::TrustedIdentityVerifier.to_string(),
            "SIGNATURE_VERIFIER.TRUSTED_IDENTITY"
        );
    }
}
