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

use chrono::{DateTime, Utc};
use x509_cert::Certificate;

use super::certificate::{
    is_ca, is_self_issued, path_len_constraint, subject_string, verify_code_signing_leaf,
    verify_timestamping_leaf, verify_validity_at,
};
use super::verification_key::verify_certificate_signature;
use crate::errors::ChainError;

/// Longest chain accepted, leaf and root included.
const MAX_CHAIN_LENGTH: usize = 10;

/// What the leaf of a chain must be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPurpose {
    CodeSigning,
    Timestamping,
}

/// A collection of trusted root certificates.
#[derive(Default, Debug, Clone)]
pub struct CertificatePool {
    trusted_roots: Vec<Certificate>,
}

impl CertificatePool {
    /// Builds a `CertificatePool` instance using the provided list of [`Certificate`].
    ///
    /// Duplicates collapse by DER equality.
    pub fn from_certificates<R>(trusted_roots: R) -> CertificatePool
    where
        R: IntoIterator<Item = Certificate>,
    {
        let mut pool = CertificatePool::default();
        pool.extend(trusted_roots);
        pool
    }

    pub fn extend<R>(&mut self, trusted_roots: R)
    where
        R: IntoIterator<Item = Certificate>,
    {
        for root in trusted_roots {
            if !self.trusted_roots.contains(&root) {
                self.trusted_roots.push(root);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trusted_roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.trusted_roots.len()
    }

    pub fn roots(&self) -> &[Certificate] {
        &self.trusted_roots
    }

    /// Whether `cert` is one of the trusted roots.
    pub fn contains(&self, cert: &Certificate) -> bool {
        self.trusted_roots.contains(cert)
    }

    /// Build the path from `chain[0]` to a trusted root, using `chain[1..]` as
    /// untrusted intermediates, and return it leaf first, root last.
    ///
    /// Every issuer on the path must be a CA allowed to sign certificates and
    /// must honor its path length constraint. The leaf must carry the usages
    /// `purpose` requires. When `at` is set, every certificate of the path
    /// must be valid at that time.
    pub fn verify_chain(
        &self,
        chain: &[Certificate],
        purpose: ChainPurpose,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Certificate>, ChainError> {
        let leaf = chain
            .first()
            .ok_or_else(|| ChainError::Unbuildable("the certificate chain is empty".into()))?;
        match purpose {
            ChainPurpose::CodeSigning => verify_code_signing_leaf(leaf)?,
            ChainPurpose::Timestamping => verify_timestamping_leaf(leaf)?,
        }

        let intermediates = &chain[1..];
        let mut path = vec![leaf.clone()];
        loop {
            let current = path.last().cloned().ok_or_else(|| {
                ChainError::Unbuildable("the certificate path is empty".to_string())
            })?;
            if self.contains(&current) {
                break;
            }
            if path.len() >= MAX_CHAIN_LENGTH {
                return Err(ChainError::Unbuildable(format!(
                    "the certificate chain is longer than {MAX_CHAIN_LENGTH} certificates"
                )));
            }

            let issuer = find_issuer(&current, &self.trusted_roots, &path)
                .or_else(|| find_issuer(&current, intermediates, &path))
                .ok_or_else(|| {
                    ChainError::Unbuildable(format!(
                        "certificate {:?} is not issued by a trusted root",
                        subject_string(&current)
                    ))
                })?;
            check_issuer(&issuer, path.len())?;
            path.push(issuer);
        }

        if let Some(at) = at {
            for cert in &path {
                verify_validity_at(cert, at)?;
            }
        }
        Ok(path)
    }
}

fn find_issuer(
    cert: &Certificate,
    candidates: &[Certificate],
    path: &[Certificate],
) -> Option<Certificate> {
    candidates
        .iter()
        .filter(|candidate| !path.contains(candidate))
        .filter(|candidate| candidate.tbs_certificate.subject == cert.tbs_certificate.issuer)
        .find(|candidate| verify_certificate_signature(cert, candidate).is_ok())
        .cloned()
}

/// `issued_below` is the number of certificates below the issuer, the leaf
/// included.
fn check_issuer(issuer: &Certificate, issued_below: usize) -> Result<(), ChainError> {
    if !is_ca(issuer)? {
        return Err(ChainError::BadKeyUsage {
            subject: subject_string(issuer),
            reason: "the certificate issues other certificates but is not a CA".to_string(),
        });
    }
    if let Some(max) = path_len_constraint(issuer)? {
        let intermediates_below = issued_below.saturating_sub(1);
        if intermediates_below > max as usize {
            return Err(ChainError::Unbuildable(format!(
                "path length constraint of {:?} exceeded: {intermediates_below} intermediate certificates below, {max} allowed",
                subject_string(issuer)
            )));
        }
    }
    Ok(())
}

/// Check that `chain` is ordered: every certificate is issued and signed by
/// the next one, and the last is self-signed or left to the trust store.
pub fn verify_chain_order(chain: &[Certificate]) -> Result<(), ChainError> {
    for pair in chain.windows(2) {
        let (child, parent) = (&pair[0], &pair[1]);
        if child.tbs_certificate.issuer != parent.tbs_certificate.subject {
            return Err(ChainError::Unbuildable(format!(
                "certificate {:?} is not issued by {:?}",
                subject_string(child),
                subject_string(parent)
            )));
        }
        verify_certificate_signature(child, parent)?;
    }
    if let Some(last) = chain.last() {
        if is_self_issued(last) && chain.len() > 1 {
            verify_certificate_signature(last, last)?;
        }
    }
    Ok(())
}
