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

//! The part of a trust policy statement shared by OCI and blob documents.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::TrustedIdentity;
use super::level::{SignatureVerification, VerificationLevel};
use crate::errors::PolicyError;
use crate::truststore::{is_valid_name, StoreKind};

/// A `<kind>:<name>` entry of `trustStores`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustStoreRef {
    pub kind: StoreKind,
    pub name: String,
}

impl TrustStoreRef {
    pub fn parse(statement: &str, reference: &str) -> Result<Self, PolicyError> {
        let malformed = |reason: String| PolicyError::MalformedTrustStoreRef {
            statement: statement.to_string(),
            reference: reference.to_string(),
            reason,
        };
        let (kind, name) = reference
            .split_once(':')
            .ok_or_else(|| malformed("a trust store reference has the form <kind>:<name>".into()))?;
        let kind = kind.parse::<StoreKind>().map_err(|e| malformed(e.to_string()))?;
        if !is_valid_name(name) {
            return Err(malformed(format!(
                "trust store name {name:?} must match [a-zA-Z0-9_.-]+"
            )));
        }
        Ok(TrustStoreRef {
            kind,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for TrustStoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Fields common to every statement flavor, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementCore {
    pub name: String,
    pub signature_verification: SignatureVerification,
    #[serde(default)]
    pub trust_stores: Vec<String>,
    #[serde(default)]
    pub trusted_identities: Vec<String>,
}

/// A validated statement, ready for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub name: String,
    pub level: VerificationLevel,
    pub trust_stores: Vec<TrustStoreRef>,
    pub trusted_identities: Vec<TrustedIdentity>,
}

impl PolicyStatement {
    /// The trust stores of `kind` the statement references.
    pub fn trust_stores_of(&self, kind: StoreKind) -> impl Iterator<Item = &TrustStoreRef> {
        self.trust_stores.iter().filter(move |r| r.kind == kind)
    }

    /// Whether any trusted identity matches the subject of `leaf`.
    pub fn trusts_identity(&self, leaf: &x509_cert::Certificate) -> bool {
        self.trusted_identities.iter().any(|id| id.matches(leaf))
    }
}

impl StatementCore {
    /// Validate the statement and resolve its level, stores and identities.
    pub fn validate(&self) -> Result<PolicyStatement, PolicyError> {
        let statement = self.name.as_str();
        if statement.trim().is_empty() {
            return Err(PolicyError::Malformed {
                reason: "a trust policy statement is missing a name, every statement requires a name".to_string(),
            });
        }

        let level = self.signature_verification.resolve(statement)?;
        if level.is_skip() {
            if !self.trust_stores.is_empty() || !self.trusted_identities.is_empty() {
                return Err(PolicyError::InvalidVerification {
                    statement: statement.to_string(),
                    reason: "the \"skip\" level cannot be configured with trust stores or trusted identities, remove them".to_string(),
                });
            }
            return Ok(PolicyStatement {
                name: self.name.clone(),
                level,
                trust_stores: Vec::new(),
                trusted_identities: Vec::new(),
            });
        }

        if self.trust_stores.is_empty() || self.trusted_identities.is_empty() {
            return Err(PolicyError::EmptyTrustStore {
                statement: statement.to_string(),
            });
        }

        let mut trust_stores: Vec<TrustStoreRef> = Vec::new();
        for reference in &self.trust_stores {
            let reference = TrustStoreRef::parse(statement, reference)?;
            if !trust_stores.contains(&reference) {
                trust_stores.push(reference);
            }
        }
        let has_signing_store = trust_stores
            .iter()
            .any(|r| matches!(r.kind, StoreKind::Ca | StoreKind::SigningAuthority));
        if !has_signing_store {
            let reference = trust_stores
                .first()
                .map(|r| r.to_string())
                .unwrap_or_default();
            return Err(PolicyError::MalformedTrustStoreRef {
                statement: statement.to_string(),
                reference,
                reason: "a \"tsa\" trust store must be accompanied by a \"ca\" or \"signingAuthority\" trust store".to_string(),
            });
        }

        let trusted_identities = self
            .trusted_identities
            .iter()
            .map(|identity| TrustedIdentity::parse(statement, identity))
            .collect::<Result<Vec<_>, _>>()?;
        if trusted_identities.len() > 1 && trusted_identities.contains(&TrustedIdentity::Any) {
            return Err(PolicyError::MalformedTrustedIdentity {
                statement: statement.to_string(),
                identity: "*".to_string(),
                reason: "the wildcard identity cannot be used in conjunction with other values".to_string(),
            });
        }

        Ok(PolicyStatement {
            name: self.name.clone(),
            level,
            trust_stores,
            trusted_identities,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::trustpolicy::level::LevelName;
    use rstest::rstest;

    pub(crate) fn core(name: &str, level: &str) -> StatementCore {
        StatementCore {
            name: name.to_string(),
            signature_verification: SignatureVerification::new(level),
            trust_stores: vec!["ca:acme".to_string()],
            trusted_identities: vec!["*".to_string()],
        }
    }

    #[test]
    fn valid_statement() {
        let statement = StatementCore {
            trust_stores: vec![
                "ca:acme".to_string(),
                "tsa:timestamps".to_string(),
                "ca:acme".to_string(),
            ],
            trusted_identities: vec!["x509.subject:C=US,ST=WA,O=Acme".to_string()],
            ..core("s", "strict")
        }
        .validate()
        .unwrap();
        assert_eq!(statement.level.name, LevelName::Strict);
        assert_eq!(statement.trust_stores.len(), 2);
        assert_eq!(statement.trust_stores_of(StoreKind::Tsa).count(), 1);
    }

    #[test]
    fn skip_level() {
        let statement = StatementCore {
            trust_stores: vec![],
            trusted_identities: vec![],
            ..core("s", "skip")
        };
        assert!(statement.validate().unwrap().level.is_skip());
        assert!(matches!(
            core("s", "skip").validate(),
            Err(PolicyError::InvalidVerification { .. })
        ));
    }

    #[rstest]
    #[case(vec![], vec!["*"])]
    #[case(vec!["ca:acme"], vec![])]
    fn stores_and_identities_go_together(
        #[case] stores: Vec<&str>,
        #[case] identities: Vec<&str>,
    ) {
        let statement = StatementCore {
            trust_stores: stores.into_iter().map(String::from).collect(),
            trusted_identities: identities.into_iter().map(String::from).collect(),
            ..core("s", "strict")
        };
        assert!(matches!(
            statement.validate(),
            Err(PolicyError::EmptyTrustStore { .. })
        ));
    }

    #[rstest]
    #[case("acme")]
    #[case("root:acme")]
    #[case("ca:")]
    #[case("ca:a/b")]
    #[case("tsa:timestamps")]
    fn malformed_store_references(#[case] reference: &str) {
        let statement = StatementCore {
            trust_stores: vec![reference.to_string()],
            ..core("s", "strict")
        };
        assert!(matches!(
            statement.validate(),
            Err(PolicyError::MalformedTrustStoreRef { .. })
        ));
    }

    #[test]
    fn wildcard_identity_stands_alone() {
        let statement = StatementCore {
            trusted_identities: vec![
                "*".to_string(),
                "x509.subject:C=US,ST=WA,O=Acme".to_string(),
            ],
            ..core("s", "strict")
        };
        assert!(matches!(
            statement.validate(),
            Err(PolicyError::MalformedTrustedIdentity { .. })
        ));
    }

    #[test]
    fn missing_name() {
        assert!(matches!(
            core(" ", "strict").validate(),
            Err(PolicyError::Malformed { .. })
        ));
    }
}
