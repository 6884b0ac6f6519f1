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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use x509_cert::Certificate;

use crate::config::Context;
use crate::crypto::certificate::{not_after, subject_string, verify_validity_at};
use crate::crypto::{CertificatePool, ChainPurpose};
use crate::descriptor::Payload;
use crate::envelope::{Envelope, SignerInfo, SigningScheme};
use crate::errors::{ChainError, NotationError, Result, TimestampError};
use crate::plugin::{PluginCapabilities, PluginRegistry, VerifySignatureRequest, VERIFICATION_PLUGIN_ATTRIBUTE};
use crate::revocation::RevocationValidator;
use crate::timestamp::TimestampToken;
use crate::trustpolicy::{
    PolicyStatement, PolicyTarget, TrustPolicy, VerificationAction, VerificationType,
    VerifyTimestamp,
};
use crate::truststore::{StoreKind, TrustStore};

use super::models::{VerificationOutcome, VerifyOptions};

/// Keep cancellation out of the per-type outcomes.
fn split<T>(result: Result<T>) -> Result<Result<T>> {
    match result {
        Err(NotationError::Cancelled) => Err(NotationError::Cancelled),
        other => Ok(other),
    }
}

/// What authenticity and timestamp verification established.
struct SigningContext {
    /// Signing chain, leaf to root
    path: Vec<Certificate>,
    authentic_signing_time: Option<DateTime<Utc>>,
    /// Timestamp authority chain, leaf to root
    tsa_path: Option<Vec<Certificate>>,
}

/// Runs the verification of a signature against a trust policy.
///
/// The checks run in a fixed order: integrity, authenticity, authentic
/// timestamp, expiry and revocation. The level of the statement governing
/// the target decides whether a failing check stops verification, is only
/// logged, or is not run at all.
pub struct Verifier {
    policy: Arc<dyn TrustPolicy>,
    trust_store: Arc<dyn TrustStore>,
    revocation: Arc<dyn RevocationValidator>,
    plugins: PluginRegistry,
}

impl Verifier {
    pub fn new(
        policy: Arc<dyn TrustPolicy>,
        trust_store: Arc<dyn TrustStore>,
        revocation: Arc<dyn RevocationValidator>,
    ) -> Self {
        Verifier {
            policy,
            trust_store,
            revocation,
            plugins: PluginRegistry::new(),
        }
    }

    /// Verification plugins signatures may name.
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// An empty successful outcome when the policy skips verification of
    /// `target`, there is no need to look for signatures then.
    pub fn skipped(&self, target: &PolicyTarget<'_>) -> Result<Option<VerificationOutcome>> {
        let statement = self.policy.statement_for(target)?;
        Ok(statement
            .level
            .is_skip()
            .then(|| VerificationOutcome::new(statement.name.clone(), statement.level)))
    }

    /// Verify the envelope `raw` of `media_type` found for `target`.
    ///
    /// Errors are reserved for problems unrelated to the signature itself:
    /// no applicable policy, cancellation. A signature that does not verify
    /// yields a failed [`VerificationOutcome`].
    pub async fn verify(
        &self,
        ctx: &Context,
        target: &PolicyTarget<'_>,
        media_type: &str,
        raw: &[u8],
        options: &VerifyOptions,
    ) -> Result<VerificationOutcome> {
        ctx.check_cancelled()?;
        let statement = self.policy.statement_for(target)?;
        let mut outcome = VerificationOutcome::new(statement.name.clone(), statement.level);
        if statement.level.is_skip() {
            debug!(statement = %statement.name, "signature verification skipped");
            return Ok(outcome);
        }

        debug!("verifying integrity");
        let (envelope, payload) = match integrity(media_type, raw) {
            Ok(verified) => verified,
            Err(e) => {
                outcome.record(VerificationType::Integrity, Some(e));
                return Ok(outcome);
            }
        };
        outcome.record(VerificationType::Integrity, None);

        let completed = self
            .run_checks(ctx, statement, &envelope, &mut outcome)
            .await?;
        if completed && outcome.is_success() {
            outcome.error = check_options(&payload, options).err();
        }
        outcome.envelope = Some(envelope);
        outcome.payload = Some(payload);
        Ok(outcome)
    }

    /// Returns whether every check ran, `false` after an enforced failure.
    async fn run_checks(
        &self,
        ctx: &Context,
        statement: &PolicyStatement,
        envelope: &Envelope,
        outcome: &mut VerificationOutcome,
    ) -> Result<bool> {
        let signer_info = &envelope.content().signer_info;
        let plugin = match self.verification_plugin(signer_info) {
            Ok(plugin) => plugin,
            Err(e) => {
                // the signature cannot be verified without its plugin
                outcome.record(VerificationType::Authenticity, Some(e));
                return Ok(false);
            }
        };
        let mut signing = SigningContext {
            path: signer_info.certificate_chain.clone(),
            authentic_signing_time: None,
            tsa_path: None,
        };
        let now = Utc::now();

        ctx.check_cancelled()?;
        if should_run(outcome, VerificationType::Authenticity) {
            let result = split(self.authenticity(statement, signer_info, plugin).await)?;
            let error = match result {
                Ok(path) => {
                    signing.path = path;
                    None
                }
                Err(e) => Some(e),
            };
            if !outcome.record(VerificationType::Authenticity, error) {
                return Ok(false);
            }
        }

        ctx.check_cancelled()?;
        if should_run(outcome, VerificationType::AuthenticTimestamp) {
            let error = match self.authentic_timestamp(statement, signer_info, now) {
                Ok(Some((gen_time, tsa_path))) => {
                    signing.authentic_signing_time = Some(gen_time);
                    signing.tsa_path = Some(tsa_path);
                    None
                }
                Ok(None) => None,
                Err(e) => Some(e),
            };
            if !outcome.record(VerificationType::AuthenticTimestamp, error) {
                return Ok(false);
            }
        }
        if signing.authentic_signing_time.is_none()
            && signer_info.signed_attributes.signing_scheme == SigningScheme::X509SigningAuthority
        {
            signing.authentic_signing_time = Some(signer_info.signed_attributes.signing_time);
        }

        ctx.check_cancelled()?;
        if should_run(outcome, VerificationType::Expiry) {
            let error = signer_info
                .signed_attributes
                .expiry
                .filter(|expiry| now > *expiry)
                .map(|expiry| NotationError::SignatureExpired {
                    expiry: expiry.to_rfc3339(),
                });
            if !outcome.record(VerificationType::Expiry, error) {
                return Ok(false);
            }
        }

        ctx.check_cancelled()?;
        if should_run(outcome, VerificationType::Revocation) {
            let result = split(self.revocation(ctx, statement, signer_info, plugin, &signing).await)?;
            if !outcome.record(VerificationType::Revocation, result.err()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn verification_plugin(&self, signer_info: &SignerInfo) -> Result<Option<&PluginCapabilities>> {
        let attribute = signer_info
            .signed_attributes
            .extended_attributes
            .iter()
            .find(|a| a.key == VERIFICATION_PLUGIN_ATTRIBUTE);
        let Some(attribute) = attribute else {
            return Ok(None);
        };
        let name = attribute.value.as_str().ok_or_else(|| {
            NotationError::VerificationFailed(format!(
                "{VERIFICATION_PLUGIN_ATTRIBUTE} must be a string"
            ))
        })?;
        match self.plugins.get(name) {
            Some(plugin) if plugin.is_verifier() => Ok(Some(plugin)),
            Some(_) => Err(NotationError::VerificationFailed(format!(
                "plugin {name} cannot verify signatures"
            ))),
            None => Err(NotationError::VerificationFailed(format!(
                "the signature requires the verification plugin {name}, which is not installed"
            ))),
        }
    }

    fn pool(&self, statement: &PolicyStatement, kind: StoreKind) -> Result<CertificatePool> {
        let mut pool = CertificatePool::default();
        for store in statement.trust_stores_of(kind) {
            pool.extend(self.trust_store.certificates(kind, &store.name)?);
        }
        Ok(pool)
    }

    async fn authenticity(
        &self,
        statement: &PolicyStatement,
        signer_info: &SignerInfo,
        plugin: Option<&PluginCapabilities>,
    ) -> Result<Vec<Certificate>> {
        let kind = match signer_info.signed_attributes.signing_scheme {
            SigningScheme::X509 => StoreKind::Ca,
            SigningScheme::X509SigningAuthority => StoreKind::SigningAuthority,
        };
        let pool = self.pool(statement, kind)?;
        if pool.is_empty() {
            return Err(ChainError::Unbuildable(format!(
                "trust policy statement {:?} has no trust store of type {kind} for signing scheme {}",
                statement.name, signer_info.signed_attributes.signing_scheme
            ))
            .into());
        }
        let path = pool.verify_chain(
            &signer_info.certificate_chain,
            ChainPurpose::CodeSigning,
            None,
        )?;
        let leaf = path
            .first()
            .ok_or_else(|| ChainError::Unbuildable("the certificate path is empty".to_string()))?;

        match plugin.and_then(|p| p.trusted_identity_verifier.as_ref()) {
            Some(verifier) => {
                let verdict = verifier
                    .verify_trusted_identity(&plugin_request(statement, signer_info))
                    .await?;
                if !verdict.success {
                    return Err(NotationError::VerificationFailed(verdict.reason));
                }
            }
            None => {
                if !statement.trusts_identity(leaf) {
                    return Err(NotationError::VerificationFailed(format!(
                        "signing certificate {:?} does not match any trusted identity of trust policy statement {:?}",
                        subject_string(leaf),
                        statement.name
                    )));
                }
            }
        }
        debug!(subject = subject_string(leaf), "signing certificate is trusted");
        Ok(path)
    }

    /// The timestamp time and authority chain, when a token was checked.
    fn authentic_timestamp(
        &self,
        statement: &PolicyStatement,
        signer_info: &SignerInfo,
        now: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, Vec<Certificate>)>> {
        let chain = &signer_info.certificate_chain;
        let attributes = &signer_info.signed_attributes;
        let authority = attributes.signing_scheme == SigningScheme::X509SigningAuthority;
        let token = signer_info.unsigned_attributes.timestamp_signature.as_deref();

        let token = match token {
            None if authority => {
                return Err(TimestampError::NoToken.into());
            }
            Some(token)
                if authority
                    || statement.level.verify_timestamp == VerifyTimestamp::Always
                    || chain.iter().any(|cert| not_after(cert) < now) =>
            {
                token
            }
            token => {
                if token.is_some() {
                    debug!("no certificate of the signing chain expired, timestamp not checked");
                }
                for cert in chain {
                    verify_validity_at(cert, now)?;
                }
                if let Some(leaf) = signer_info.leaf() {
                    verify_validity_at(leaf, attributes.signing_time)?;
                }
                return Ok(None);
            }
        };

        let token = TimestampToken::parse(token)?;
        let roots = self.pool(statement, StoreKind::Tsa)?;
        if roots.is_empty() {
            return Err(TimestampError::InvalidChain(format!(
                "trust policy statement {:?} has no trust store of type tsa",
                statement.name
            ))
            .into());
        }
        let tsa_path = token.verify(&signer_info.signature, &roots)?;
        let (earliest, latest) = token.validity()?;
        for cert in chain {
            verify_validity_at(cert, earliest)?;
            verify_validity_at(cert, latest)?;
        }
        debug!(gen_time = %token.gen_time(), "signing time is authentic");
        Ok(Some((token.gen_time(), tsa_path)))
    }

    async fn revocation(
        &self,
        ctx: &Context,
        statement: &PolicyStatement,
        signer_info: &SignerInfo,
        plugin: Option<&PluginCapabilities>,
        signing: &SigningContext,
    ) -> Result<()> {
        if let Some(verifier) = plugin.and_then(|p| p.revocation_check_verifier.as_ref()) {
            let verdict = verifier
                .check_revocation(&plugin_request(statement, signer_info))
                .await?;
            return if verdict.success {
                Ok(())
            } else {
                Err(NotationError::VerificationFailed(verdict.reason))
            };
        }
        self.revocation
            .check_chain(ctx, &signing.path, signing.authentic_signing_time)
            .await?;
        if let Some(tsa_path) = &signing.tsa_path {
            self.revocation.check_chain(ctx, tsa_path, None).await?;
        }
        Ok(())
    }
}

fn should_run(outcome: &VerificationOutcome, check: VerificationType) -> bool {
    if outcome.level.action(check) == VerificationAction::Skip {
        debug!(%check, "verification skipped");
        false
    } else {
        debug!(%check, "verifying");
        true
    }
}

fn integrity(media_type: &str, raw: &[u8]) -> Result<(Envelope, Payload)> {
    let envelope = Envelope::parse(media_type, raw)?;
    let content = envelope.verify()?;
    let payload =
        Payload::from_signed_content(&content.payload.content_type, &content.payload.content)?;
    Ok((envelope, payload))
}

/// The signed payload must be about the expected artifact and carry the
/// requested annotations.
fn check_options(payload: &Payload, options: &VerifyOptions) -> Result<()> {
    if let Some(artifact) = &options.artifact {
        if &payload.target_artifact != artifact {
            return Err(NotationError::VerificationFailed(format!(
                "the signature covers {} instead of {}",
                payload.target_artifact.digest, artifact.digest
            )));
        }
    }
    let metadata = payload.user_metadata();
    for (key, value) in &options.user_metadata {
        if metadata.get(key) != Some(value) {
            return Err(NotationError::VerificationFailed(format!(
                "unable to find the metadata {key}={value} in the signature"
            )));
        }
    }
    Ok(())
}

fn plugin_request(statement: &PolicyStatement, signer_info: &SignerInfo) -> VerifySignatureRequest {
    let attributes = &signer_info.signed_attributes;
    VerifySignatureRequest {
        signing_scheme: attributes.signing_scheme,
        signing_time: attributes.signing_time,
        expiry: attributes.expiry,
        authentic_signing_time: (attributes.signing_scheme == SigningScheme::X509SigningAuthority)
            .then_some(attributes.signing_time),
        certificate_chain: signer_info.certificate_chain.clone(),
        extended_attributes: attributes.extended_attributes.clone(),
        trusted_identities: statement
            .trusted_identities
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}
