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

//! The errors that can be raised by notation-rs
//!
//! Errors are grouped in families. Callers are expected to match on the
//! variants, never on the rendered messages.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotationError>;

/// Errors raised while loading, validating or evaluating a trust policy
/// document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("no applicable trust policy for {target:?}")]
    NoApplicablePolicy { target: String },

    #[error("registry scope {scope:?} is present in multiple trust policy statements, one registry scope value can only be associated with one statement")]
    DuplicateScope { scope: String },

    #[error("trust policy statement {statement:?} uses the wildcard registry scope '*', a wildcard scope cannot be used in conjunction with other scope values")]
    WildcardMix { statement: String },

    #[error("multiple trust policy statements use the same name {name:?}, statement names must be unique")]
    DuplicateName { name: String },

    #[error("trust policy statement {statement:?} has zero registry scopes, it must specify registry scopes with at least one value")]
    EmptyScopes { statement: String },

    #[error("registry scope {scope:?} of trust policy statement {statement:?} is not valid: {reason}")]
    MalformedScope {
        statement: String,
        scope: String,
        reason: String,
    },

    #[error("trust policy statement {statement:?} is either missing trust stores or trusted identities, both must be specified")]
    EmptyTrustStore { statement: String },

    #[error("trust policy statement {statement:?} uses an unsupported trust store reference {reference:?}: {reason}")]
    MalformedTrustStoreRef {
        statement: String,
        reference: String,
        reason: String,
    },

    #[error("trust policy statement {statement:?} has an empty trusted identity")]
    EmptyTrustedIdentity { statement: String },

    #[error("trust policy statement {statement:?} has an invalid trusted identity {identity:?}: {reason}")]
    MalformedTrustedIdentity {
        statement: String,
        identity: String,
        reason: String,
    },

    #[error("distinguished name {dn:?} is missing the mandatory attribute(s) {}", .missing.join(", "))]
    MissingDNAttribute { dn: String, missing: Vec<String> },

    #[error("trust policy statement {statement:?} has an invalid signature verification: {reason}")]
    InvalidVerification { statement: String, reason: String },

    #[error("trust policy has version {version:?}, only version \"1.0\" is supported")]
    UnsupportedVersion { version: String },

    #[error("trust policy has more than one global statement ({first:?}, {second:?})")]
    MultipleGlobal { first: String, second: String },

    #[error("trust policy document is malformed: {reason}")]
    Malformed { reason: String },
}

/// Errors raised by the signature envelope codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed signature envelope: {0}")]
    Malformed(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature is invalid: {0}")]
    IntegrityFailed(String),

    #[error("signature envelope does not carry a certificate chain")]
    MissingCertChain,

    #[error("critical header {0:?} is not understood")]
    InvalidCritical(String),

    #[error("signature envelope media type {0:?} is not supported")]
    UnsupportedMediaType(String),

    #[error("failed to serialize the signature envelope: {0}")]
    SerializationFailed(String),
}

/// Errors raised while reading certificates and building chains.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("certificate chain cannot be built: {0}")]
    Unbuildable(String),

    #[error("certificate {subject:?} expired at {not_after}")]
    Expired { subject: String, not_after: String },

    #[error("certificate {subject:?} is not valid until {not_before}")]
    NotYetValid { subject: String, not_before: String },

    #[error("certificate {subject:?} has invalid key usage: {reason}")]
    BadKeyUsage { subject: String, reason: String },

    #[error("malformed certificate: {0}")]
    Malformed(String),
}

/// Errors raised by the revocation pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevocationError {
    #[error("certificate {subject:?} with serial number {serial} is revoked")]
    Revoked { subject: String, serial: String },

    #[error("revocation status of certificate {subject:?} is unavailable: {reason}")]
    Unavailable { subject: String, reason: String },

    #[error("issuer of {what} does not match the issuer of certificate {subject:?}")]
    IssuerMismatch { subject: String, what: String },

    #[error("failed to parse revocation data: {0}")]
    ParseFailed(String),
}

/// Input/output errors, classified so that callers can react to the cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transport failed: {0}")]
    TransportFailed(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),
}

impl IoError {
    /// Classify a filesystem error, `what` names the object being accessed.
    pub fn from_io(err: &std::io::Error, what: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(what.to_string()),
            std::io::ErrorKind::PermissionDenied => IoError::PermissionDenied(what.to_string()),
            std::io::ErrorKind::TimedOut => IoError::Timeout(what.to_string()),
            _ => IoError::TransportFailed(format!("{what}: {err}")),
        }
    }

    /// Classify an HTTP client error.
    pub fn from_reqwest(err: &reqwest::Error, what: &str) -> Self {
        if err.is_timeout() {
            IoError::Timeout(format!("{what}: {err}"))
        } else {
            IoError::TransportFailed(format!("{what}: {err}"))
        }
    }
}

/// Errors raised while producing a signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing key is unavailable: {0}")]
    KeyUnavailable(String),

    #[error("signing request refused: {0}")]
    Refused(String),

    #[error("timestamping failed: {0}")]
    TimestampFailed(String),

    #[error("plugin failed: {0}")]
    PluginFailed(String),

    #[error("signature algorithm is not supported: {0}")]
    AlgorithmUnsupported(String),

    #[error("envelope serialization failed: {0}")]
    EnvelopeSerializationFailed(String),
}

/// Errors raised while requesting or verifying an RFC 3161 timestamp.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("failed to parse timestamp token: {0}")]
    ParseError(String),

    #[error("failed to verify timestamp signature: {0}")]
    SignatureVerificationError(String),

    #[error("timestamp message imprint does not match the signature: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("timestamp response indicates failure status: {0}")]
    ResponseFailure(String),

    #[error("no timestamp token in response")]
    NoToken,

    #[error("timestamp authority certificate chain is invalid: {0}")]
    InvalidChain(String),

    #[error("timestamp {gen_time} is outside the accepted clock skew of {skew_secs}s from {local_time}")]
    ClockSkew {
        gen_time: String,
        local_time: String,
        skew_secs: u64,
    },

    #[error("no clock skew bound is configured for timestamp tokens")]
    SkewUnset,
}

/// Errors raised while reading or managing trust stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustStoreError {
    #[error("trust store name {name:?} is invalid, it must match [a-zA-Z0-9_.-]+")]
    InvalidName { name: String },

    #[error("unsupported trust store type {0:?}, supported types are \"ca\", \"signingAuthority\" and \"tsa\"")]
    InvalidKind(String),

    #[error("trust store {store:?} does not contain any certificate")]
    Empty { store: String },

    #[error("file {file:?} of trust store {store:?} is invalid: {reason}")]
    InvalidCertificate {
        store: String,
        file: String,
        reason: String,
    },

    #[error("certificate file {file:?} already exists in trust store {store:?}")]
    AlreadyExists { store: String, file: String },
}

/// Errors raised while talking to an OCI registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("registry does not support the referrers API")]
    ReferrersUnsupported,

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("unsupported manifest: {0}")]
    UnsupportedManifest(String),

    #[error("content digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("content {digest} does not have its declared size of {expected} bytes")]
    SizeMismatch { digest: String, expected: u64 },
}

#[derive(Error, Debug)]
pub enum NotationError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),

    #[error("{feature} has been marked as experimental and not enabled by default. To use it, please set NOTATION_EXPERIMENTAL=1 in your environment")]
    ExperimentalDisabled { feature: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("signature blob of {size} bytes exceeds the maximum allowed size of {limit} bytes")]
    SignatureTooLarge { size: u64, limit: u64 },

    #[error("manifest of {size} bytes exceeds the maximum allowed size of {limit} bytes")]
    ManifestTooLarge { size: u64, limit: u64 },

    #[error("no signature is associated with {0:?}, make sure the artifact was signed successfully")]
    NoSignatureFound(String),

    #[error("signature evaluation stopped, the configured limit of {max} signatures to verify per artifact exceeded")]
    ExceedMaxSignatures { max: usize },

    #[error("signature expired on {expiry}")]
    SignatureExpired { expiry: String },

    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid digest {digest:?}: {reason}")]
    InvalidDigest { digest: String, reason: String },

    #[error("failed to process JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotationError {
    /// The stable kind tag of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            NotationError::Policy(_) => "PolicyError",
            NotationError::Envelope(_) => "EnvelopeError",
            NotationError::Chain(_) => "ChainError",
            NotationError::Revocation(_) => "RevocationError",
            NotationError::Io(_) => "IOError",
            NotationError::Signer(_) => "SignerError",
            NotationError::Registry(_) => "RegistryError",
            NotationError::Timestamp(_) => "TimestampError",
            NotationError::TrustStore(_) => "TrustStoreError",
            NotationError::ExperimentalDisabled { .. } => "ExperimentalDisabled",
            NotationError::Cancelled => "Cancelled",
            NotationError::SignatureTooLarge { .. } => "SignatureTooLarge",
            NotationError::ManifestTooLarge { .. } => "ManifestTooLarge",
            NotationError::NoSignatureFound(_) => "NoSignatureFound",
            NotationError::ExceedMaxSignatures { .. } => "ExceedMaxSignatures",
            NotationError::SignatureExpired { .. } => "SignatureExpired",
            NotationError::VerificationFailed(_) => "VerificationFailed",
            NotationError::InvalidConfig(_) => "InvalidConfig",
            NotationError::InvalidDigest { .. } => "InvalidDigest",
            NotationError::Json(_) => "JsonError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dn_attributes_are_listed() {
        let err = PolicyError::MissingDNAttribute {
            dn: "CN=x,L=S".to_string(),
            missing: vec!["C".to_string(), "ST".to_string(), "O".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "distinguished name \"CN=x,L=S\" is missing the mandatory attribute(s) C, ST, O"
        );
    }

    #[test]
    fn kinds_are_stable() {
        let err: NotationError = RevocationError::ParseFailed("bad".into()).into();
        assert_eq!(err.kind(), "RevocationError");
        let err: NotationError = IoError::Timeout("referrers".into()).into();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn io_errors_are_classified() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            IoError::from_io(&err, "x509/ca/t"),
            IoError::NotFound("x509/ca/t".to_string())
        );
    }
}
