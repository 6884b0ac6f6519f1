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

use std::collections::BTreeMap;

use tracing::warn;

use crate::descriptor::{Descriptor, Payload};
use crate::envelope::Envelope;
use crate::errors::NotationError;
use crate::trustpolicy::{VerificationAction, VerificationLevel, VerificationType};

/// The aggregated decision about a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
}

/// The outcome of one verification type.
#[derive(Debug)]
pub struct ValidationResult {
    pub check: VerificationType,
    /// What the policy level dictated for this check
    pub action: VerificationAction,
    pub error: Option<NotationError>,
}

impl ValidationResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Single line description of a failure.
    pub fn summary(&self) -> Option<String> {
        self.error.as_ref().map(|e| {
            format!(
                "{} validation failed with {}: {e}",
                self.check,
                e.kind()
            )
        })
    }
}

/// What verifying one signature produced.
#[derive(Debug)]
pub struct VerificationOutcome {
    /// Name of the trust policy statement applied
    pub statement: String,
    pub level: VerificationLevel,
    /// One entry per verification type run, in order
    pub results: Vec<ValidationResult>,
    /// The envelope, once parsed
    pub envelope: Option<Envelope>,
    /// The signed payload, once its integrity is established
    pub payload: Option<Payload>,
    /// Failure of a check outside of the verification levels
    pub error: Option<NotationError>,
}

impl VerificationOutcome {
    pub fn new(statement: impl Into<String>, level: VerificationLevel) -> Self {
        VerificationOutcome {
            statement: statement.into(),
            level,
            results: Vec::new(),
            envelope: None,
            payload: None,
            error: None,
        }
    }

    /// Record the result of `check`. Returns whether verification goes on:
    /// an enforced failure stops it.
    pub(crate) fn record(&mut self, check: VerificationType, error: Option<NotationError>) -> bool {
        let action = self.level.action(check);
        let result = ValidationResult {
            check,
            action,
            error,
        };
        let go_on = match (&result.error, action) {
            (Some(_), VerificationAction::Enforce) => false,
            (Some(_), _) => {
                if let Some(summary) = result.summary() {
                    warn!("Warning: {summary}");
                }
                true
            }
            (None, _) => true,
        };
        self.results.push(result);
        go_on
    }

    pub fn verdict(&self) -> Verdict {
        if self.error.is_none() && self.failure().is_none() {
            Verdict::Success
        } else {
            Verdict::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        self.verdict() == Verdict::Success
    }

    /// The enforced check that failed.
    pub fn failure(&self) -> Option<&ValidationResult> {
        self.results
            .iter()
            .find(|r| r.is_failure() && r.action == VerificationAction::Enforce)
    }

    /// Checks that failed but were only logged.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results
            .iter()
            .filter(|r| r.is_failure() && r.action == VerificationAction::Log)
    }

    pub fn result(&self, check: VerificationType) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.check == check)
    }

    /// The error to report for a failed outcome.
    pub fn into_error(mut self) -> Option<NotationError> {
        if let Some(error) = self.error.take() {
            return Some(error);
        }
        let index = self
            .results
            .iter()
            .position(|r| r.is_failure() && r.action == VerificationAction::Enforce)?;
        self.results.swap_remove(index).error
    }
}

/// Checks applied on top of the trust policy.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// The artifact the signature must cover
    pub artifact: Option<Descriptor>,
    /// Annotations the signed payload must carry
    pub user_metadata: BTreeMap<String, String>,
}
