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

//! Verification levels, per-check actions and their overrides.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

/// The checks run on a signature, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationType {
    Integrity,
    Authenticity,
    AuthenticTimestamp,
    Expiry,
    Revocation,
}

impl VerificationType {
    pub const ALL: [VerificationType; 5] = [
        VerificationType::Integrity,
        VerificationType::Authenticity,
        VerificationType::AuthenticTimestamp,
        VerificationType::Expiry,
        VerificationType::Revocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationType::Integrity => "integrity",
            VerificationType::Authenticity => "authenticity",
            VerificationType::AuthenticTimestamp => "authenticTimestamp",
            VerificationType::Expiry => "expiry",
            VerificationType::Revocation => "revocation",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VerificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("verification type {s:?} is not supported"))
    }
}

/// What a failed check leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationAction {
    /// The failure fails the verification
    Enforce,
    /// The failure is reported and the verification goes on
    Log,
    /// The check does not run
    Skip,
}

impl VerificationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationAction::Enforce => "enforce",
            VerificationAction::Log => "log",
            VerificationAction::Skip => "skip",
        }
    }
}

impl fmt::Display for VerificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enforce" => Ok(VerificationAction::Enforce),
            "log" => Ok(VerificationAction::Log),
            "skip" => Ok(VerificationAction::Skip),
            _ => Err(format!("verification action {s:?} is not supported")),
        }
    }
}

/// Level presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LevelName {
    Strict,
    Permissive,
    Audit,
    Skip,
}

impl LevelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelName::Strict => "strict",
            LevelName::Permissive => "permissive",
            LevelName::Audit => "audit",
            LevelName::Skip => "skip",
        }
    }

    /// Preset actions, indexed like [`VerificationType::ALL`].
    fn actions(&self) -> [VerificationAction; 5] {
        use VerificationAction::{Enforce, Log, Skip};
        match self {
            LevelName::Strict => [Enforce, Enforce, Enforce, Enforce, Enforce],
            LevelName::Permissive => [Enforce, Enforce, Log, Log, Log],
            LevelName::Audit => [Enforce, Log, Log, Log, Log],
            LevelName::Skip => [Skip, Skip, Skip, Skip, Skip],
        }
    }
}

impl FromStr for LevelName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(LevelName::Strict),
            "permissive" => Ok(LevelName::Permissive),
            "audit" => Ok(LevelName::Audit),
            "skip" => Ok(LevelName::Skip),
            _ => Err(format!("verification level {s:?} is not supported, supported levels are \"strict\", \"permissive\", \"audit\" and \"skip\"")),
        }
    }
}

/// When the timestamp countersignature is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerifyTimestamp {
    /// Every time a token is present or required
    #[default]
    Always,
    /// Only when a certificate of the signing chain has expired
    AfterCertExpiry,
}

impl FromStr for VerifyTimestamp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(VerifyTimestamp::Always),
            "afterCertExpiry" => Ok(VerifyTimestamp::AfterCertExpiry),
            _ => Err(format!("verifyTimestamp value {s:?} is not supported, supported values are \"always\" and \"afterCertExpiry\"")),
        }
    }
}

/// The `signatureVerification` object of a trust policy statement, as
/// written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerification {
    pub level: String,

    #[serde(rename = "override", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_timestamp: Option<String>,
}

impl SignatureVerification {
    pub fn new(level: &str) -> Self {
        SignatureVerification {
            level: level.to_string(),
            ..Default::default()
        }
    }

    pub fn with_override(mut self, check: &str, action: &str) -> Self {
        self.overrides.insert(check.to_string(), action.to_string());
        self
    }

    /// Resolve the preset and its overrides into the action of every check.
    ///
    /// `integrity` cannot be overridden and `skip` cannot be mixed with
    /// other actions.
    pub fn resolve(&self, statement: &str) -> Result<VerificationLevel, PolicyError> {
        let invalid = |reason: String| PolicyError::InvalidVerification {
            statement: statement.to_string(),
            reason,
        };

        let name = self.level.parse::<LevelName>().map_err(invalid)?;
        let mut actions = name.actions();

        if name == LevelName::Skip && !self.overrides.is_empty() {
            return Err(invalid(
                "verification level \"skip\" cannot be overridden".to_string(),
            ));
        }
        for (check, action) in &self.overrides {
            let check = check.parse::<VerificationType>().map_err(invalid)?;
            let action = action.parse::<VerificationAction>().map_err(invalid)?;
            if check == VerificationType::Integrity {
                return Err(invalid(
                    "\"integrity\" verification can not be overridden".to_string(),
                ));
            }
            if action == VerificationAction::Skip {
                return Err(invalid(format!(
                    "{check:?} cannot be set to \"skip\", \"skip\" applies to every verification through the \"skip\" level"
                )));
            }
            actions[check.index()] = action;
        }

        let verify_timestamp = match &self.verify_timestamp {
            Some(value) => value.parse::<VerifyTimestamp>().map_err(invalid)?,
            None => VerifyTimestamp::default(),
        };

        Ok(VerificationLevel {
            name,
            actions,
            verify_timestamp,
        })
    }
}

/// Resolved `signatureVerification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationLevel {
    pub name: LevelName,
    actions: [VerificationAction; 5],
    pub verify_timestamp: VerifyTimestamp,
}

impl VerificationLevel {
    pub fn preset(name: LevelName) -> Self {
        VerificationLevel {
            name,
            actions: name.actions(),
            verify_timestamp: VerifyTimestamp::default(),
        }
    }

    pub fn action(&self, check: VerificationType) -> VerificationAction {
        self.actions[check.index()]
    }

    pub fn is_skip(&self) -> bool {
        self.name == LevelName::Skip
    }
}
