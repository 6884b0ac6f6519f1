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

//! Trust policies for artifacts stored in OCI registries.

use std::collections::HashMap;

use oci_client::Reference;
use serde::{Deserialize, Serialize};

use super::statement::{PolicyStatement, StatementCore};
use super::{check_version, PolicyTarget, TrustPolicy};
use crate::errors::PolicyError;

/// The registry scope matching every repository.
pub const WILDCARD_SCOPE: &str = "*";

/// An OCI trust policy statement, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OciStatement {
    #[serde(flatten)]
    pub core: StatementCore,

    #[serde(default)]
    pub registry_scopes: Vec<String>,

    /// Only meaningful in blob documents, rejected here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_policy: Option<bool>,
}

/// An OCI trust policy document, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OciTrustPolicyDocument {
    pub version: String,
    #[serde(default)]
    pub trust_policies: Vec<OciStatement>,
}

/// The `<host>/<repository>` of an artifact reference, host lowercased.
pub fn repository_scope(reference: &str) -> Result<String, String> {
    let parsed = Reference::try_from(reference).map_err(|e| e.to_string())?;
    Ok(format!(
        "{}/{}",
        parsed.registry().to_ascii_lowercase(),
        parsed.repository()
    ))
}

/// Validate an explicit scope, returning its normalized form.
fn normalize_scope(statement: &str, scope: &str) -> Result<String, PolicyError> {
    let malformed = |reason: &str| PolicyError::MalformedScope {
        statement: statement.to_string(),
        scope: scope.to_string(),
        reason: reason.to_string(),
    };
    if scope.contains("://") {
        return Err(malformed("a registry scope must not carry a scheme"));
    }
    let (host, path) = scope
        .split_once('/')
        .ok_or_else(|| malformed("a registry scope has the form <registry>/<repository>"))?;
    if host.is_empty() || path.is_empty() {
        return Err(malformed("a registry scope has the form <registry>/<repository>"));
    }

    let parsed = Reference::try_from(scope).map_err(|e| malformed(&e.to_string()))?;
    if parsed.tag().is_some() || parsed.digest().is_some() {
        return Err(malformed("a registry scope cannot carry a tag or a digest"));
    }
    if !parsed.registry().eq_ignore_ascii_case(host) || parsed.repository() != path {
        return Err(malformed(
            "a registry scope must name a fully qualified repository",
        ));
    }
    Ok(format!("{}/{}", host.to_ascii_lowercase(), path))
}

/// A validated OCI trust policy.
#[derive(Debug, Clone)]
pub struct OciTrustPolicy {
    statements: Vec<PolicyStatement>,
    /// Normalized explicit scope to statement index
    scopes: HashMap<String, usize>,
    wildcard: Option<usize>,
}

impl OciTrustPolicy {
    /// Validate `document`. Every rule is checked at load time so that
    /// lookups never meet an ambiguous document.
    pub fn new(document: OciTrustPolicyDocument) -> Result<Self, PolicyError> {
        check_version(&document.version)?;
        if document.trust_policies.is_empty() {
            return Err(PolicyError::Malformed {
                reason: "trust policy document has zero statements, it must specify at least one"
                    .to_string(),
            });
        }

        let mut statements = Vec::with_capacity(document.trust_policies.len());
        let mut names: Vec<&str> = Vec::new();
        let mut scopes: HashMap<String, usize> = HashMap::new();
        let mut wildcard: Option<usize> = None;

        for (index, statement) in document.trust_policies.iter().enumerate() {
            let name = statement.core.name.as_str();
            if names.contains(&name) {
                return Err(PolicyError::DuplicateName {
                    name: name.to_string(),
                });
            }
            names.push(name);

            if statement.global_policy.is_some() {
                return Err(PolicyError::Malformed {
                    reason: format!(
                        "trust policy statement {name:?} sets \"globalPolicy\", which is only supported in blob trust policies"
                    ),
                });
            }
            if statement.registry_scopes.is_empty() {
                return Err(PolicyError::EmptyScopes {
                    statement: name.to_string(),
                });
            }

            let has_wildcard = statement
                .registry_scopes
                .iter()
                .any(|s| s == WILDCARD_SCOPE);
            if has_wildcard {
                if statement.registry_scopes.len() > 1 {
                    return Err(PolicyError::WildcardMix {
                        statement: name.to_string(),
                    });
                }
                if wildcard.is_some() {
                    return Err(PolicyError::DuplicateScope {
                        scope: WILDCARD_SCOPE.to_string(),
                    });
                }
                wildcard = Some(index);
            } else {
                for scope in &statement.registry_scopes {
                    let normalized = normalize_scope(name, scope)?;
                    if scopes.insert(normalized, index).is_some() {
                        return Err(PolicyError::DuplicateScope {
                            scope: scope.to_string(),
                        });
                    }
                }
            }

            statements.push(statement.core.validate()?);
        }

        // the wildcard cannot coexist with explicit scopes anywhere
        if let Some(index) = wildcard {
            if !scopes.is_empty() {
                return Err(PolicyError::WildcardMix {
                    statement: statements[index].name.clone(),
                });
            }
        }

        Ok(OciTrustPolicy {
            statements,
            scopes,
            wildcard,
        })
    }

    /// Parse and validate a JSON document.
    pub fn from_json(data: &[u8]) -> Result<Self, PolicyError> {
        let document: OciTrustPolicyDocument =
            serde_json::from_slice(data).map_err(|e| PolicyError::Malformed {
                reason: e.to_string(),
            })?;
        Self::new(document)
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// The statement governing `reference`: the one naming its repository,
    /// or else the wildcard one.
    pub fn statement_for_reference(&self, reference: &str) -> Result<&PolicyStatement, PolicyError> {
        let no_policy = || PolicyError::NoApplicablePolicy {
            target: reference.to_string(),
        };
        let scope = repository_scope(reference).map_err(|_| no_policy())?;
        let index = self
            .scopes
            .get(&scope)
            .copied()
            .or(self.wildcard)
            .ok_or_else(no_policy)?;
        tracing::debug!(
            reference,
            statement = self.statements[index].name,
            "trust policy statement selected"
        );
        Ok(&self.statements[index])
    }
}

impl TrustPolicy for OciTrustPolicy {
    fn statement_for(&self, target: &PolicyTarget<'_>) -> Result<&PolicyStatement, PolicyError> {
        match target {
            PolicyTarget::Artifact(reference) => self.statement_for_reference(reference),
            PolicyTarget::Blob(name) => Err(PolicyError::NoApplicablePolicy {
                target: name.unwrap_or("blob").to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn document(statements: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ "version": "1.0", "trustPolicies": statements })).unwrap()
    }

    fn statement(name: &str, scopes: &[&str]) -> serde_json::Value {
        json!({
            "name": name,
            "registryScopes": scopes,
            "signatureVerification": { "level": "strict" },
            "trustStores": ["ca:acme"],
            "trustedIdentities": ["*"],
        })
    }

    #[test]
    fn explicit_scopes() {
        let policy = OciTrustPolicy::from_json(&document(json!([
            statement("wabbit", &["registry.wabbit-networks.io/software/net-monitor"]),
            statement("acme", &["registry.acme-rockets.io/software/a", "localhost:5000/b"]),
        ])))
        .unwrap();

        let selected = policy
            .statement_for_reference("registry.acme-rockets.io/software/a:v1")
            .unwrap();
        assert_eq!(selected.name, "acme");
        let selected = policy
            .statement_for_reference("localhost:5000/b@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
            .unwrap();
        assert_eq!(selected.name, "acme");
        assert_eq!(
            policy
                .statement_for(&PolicyTarget::Artifact(
                    "registry.wabbit-networks.io/software/net-monitor:v1"
                ))
                .unwrap()
                .name,
            "wabbit"
        );

        // repository paths are case sensitive
        assert!(matches!(
            policy.statement_for_reference("registry.acme-rockets.io/software/c:v1"),
            Err(PolicyError::NoApplicablePolicy { .. })
        ));
    }

    #[test]
    fn wildcard_scope() {
        let policy =
            OciTrustPolicy::from_json(&document(json!([statement("everything", &["*"])]))).unwrap();
        assert_eq!(
            policy
                .statement_for_reference("registry.example/repo:tag")
                .unwrap()
                .name,
            "everything"
        );
    }

    #[test]
    fn wildcard_cannot_mix() {
        let err = OciTrustPolicy::from_json(&document(json!([
            statement("global", &["*"]),
            statement("repo", &["registry.example/repo"]),
        ])))
        .unwrap_err();
        assert_eq!(
            err,
            PolicyError::WildcardMix {
                statement: "global".to_string()
            }
        );

        let err = OciTrustPolicy::from_json(&document(json!([statement(
            "mixed",
            &["*", "registry.example/repo"]
        )])))
        .unwrap_err();
        assert!(matches!(err, PolicyError::WildcardMix { .. }));
    }

    #[rstest]
    #[case(json!([statement("a", &["registry.example/repo"]), statement("b", &["registry.example/repo"])]))]
    #[case(json!([statement("a", &["*"]), statement("b", &["*"])]))]
    fn duplicate_scopes(#[case] statements: serde_json::Value) {
        assert!(matches!(
            OciTrustPolicy::from_json(&document(statements)),
            Err(PolicyError::DuplicateScope { .. })
        ));
    }

    #[test]
    fn duplicate_names() {
        assert!(matches!(
            OciTrustPolicy::from_json(&document(json!([
                statement("a", &["registry.example/one"]),
                statement("a", &["registry.example/two"]),
            ]))),
            Err(PolicyError::DuplicateName { .. })
        ));
    }

    #[rstest]
    #[case("registry.example")]
    #[case("https://registry.example/repo")]
    #[case("registry.example/repo:v1")]
    #[case("registry.example/repo@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")]
    #[case("registry.example/Repo")]
    fn malformed_scopes(#[case] scope: &str) {
        assert!(matches!(
            OciTrustPolicy::from_json(&document(json!([statement("a", &[scope])]))),
            Err(PolicyError::MalformedScope { .. })
        ));
    }

    #[test]
    fn document_rules() {
        assert!(matches!(
            OciTrustPolicy::from_json(&document(json!([statement("a", &[])]))),
            Err(PolicyError::EmptyScopes { .. })
        ));
        assert!(matches!(
            OciTrustPolicy::from_json(&document(json!([]))),
            Err(PolicyError::Malformed { .. })
        ));
        assert!(matches!(
            OciTrustPolicy::from_json(br#"{"version": "2.0", "trustPolicies": []}"#),
            Err(PolicyError::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            OciTrustPolicy::from_json(b"{"),
            Err(PolicyError::Malformed { .. })
        ));

        let mut global = statement("a", &["*"]);
        global["globalPolicy"] = json!(true);
        assert!(matches!(
            OciTrustPolicy::from_json(&document(json!([global]))),
            Err(PolicyError::Malformed { .. })
        ));
    }
}
