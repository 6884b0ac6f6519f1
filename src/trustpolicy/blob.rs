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

//! Trust policies for blobs signed into detached signature files.

use serde::{Deserialize, Serialize};

use super::statement::{PolicyStatement, StatementCore};
use super::{check_version, PolicyTarget, TrustPolicy};
use crate::errors::PolicyError;

/// A blob trust policy statement, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobStatement {
    #[serde(flatten)]
    pub core: StatementCore,

    #[serde(default)]
    pub global_policy: bool,

    /// Only meaningful in OCI documents, rejected here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_scopes: Option<Vec<String>>,
}

/// A blob trust policy document, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobTrustPolicyDocument {
    pub version: String,
    #[serde(default)]
    pub trust_policies: Vec<BlobStatement>,
}

/// A validated blob trust policy.
#[derive(Debug, Clone)]
pub struct BlobTrustPolicy {
    statements: Vec<PolicyStatement>,
    global: Option<usize>,
}

impl BlobTrustPolicy {
    pub fn new(document: BlobTrustPolicyDocument) -> Result<Self, PolicyError> {
        check_version(&document.version)?;
        if document.trust_policies.is_empty() {
            return Err(PolicyError::Malformed {
                reason: "trust policy document has zero statements, it must specify at least one"
                    .to_string(),
            });
        }

        let mut statements: Vec<PolicyStatement> =
            Vec::with_capacity(document.trust_policies.len());
        let mut global: Option<usize> = None;

        for (index, statement) in document.trust_policies.iter().enumerate() {
            let name = statement.core.name.as_str();
            if statements.iter().any(|s| s.name == name) {
                return Err(PolicyError::DuplicateName {
                    name: name.to_string(),
                });
            }
            if statement.registry_scopes.is_some() {
                return Err(PolicyError::Malformed {
                    reason: format!(
                        "trust policy statement {name:?} sets \"registryScopes\", which is only supported in OCI trust policies"
                    ),
                });
            }
            if statement.global_policy {
                if let Some(first) = global {
                    return Err(PolicyError::MultipleGlobal {
                        first: statements[first].name.clone(),
                        second: name.to_string(),
                    });
                }
                global = Some(index);
            }
            statements.push(statement.core.validate()?);
        }

        Ok(BlobTrustPolicy { statements, global })
    }

    pub fn from_json(data: &[u8]) -> Result<Self, PolicyError> {
        let document: BlobTrustPolicyDocument =
            serde_json::from_slice(data).map_err(|e| PolicyError::Malformed {
                reason: e.to_string(),
            })?;
        Self::new(document)
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// The statement called `name`, or the global one when no name is given.
    pub fn statement_for_name(&self, name: Option<&str>) -> Result<&PolicyStatement, PolicyError> {
        let found = match name {
            Some(name) => self.statements.iter().find(|s| s.name == name),
            None => self.global.map(|index| &self.statements[index]),
        };
        found.ok_or_else(|| PolicyError::NoApplicablePolicy {
            target: match name {
                Some(name) => format!("blob policy {name:?}"),
                None => "blob (no global policy statement)".to_string(),
            },
        })
    }
}

impl TrustPolicy for BlobTrustPolicy {
    fn statement_for(&self, target: &PolicyTarget<'_>) -> Result<&PolicyStatement, PolicyError> {
        match target {
            PolicyTarget::Blob(name) => self.statement_for_name(*name),
            PolicyTarget::Artifact(reference) => Err(PolicyError::NoApplicablePolicy {
                target: reference.to_string(),
            }),
        }
    }
}
