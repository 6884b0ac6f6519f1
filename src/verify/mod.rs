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

//! Verification of one signature envelope against a trust policy.
//!
//! [`Verifier`] applies the statement governing a target and returns a
//! [`VerificationOutcome`] holding one result per verification type.

mod models;
pub use models::{ValidationResult, Verdict, VerificationOutcome, VerifyOptions};

mod verifier;
pub use verifier::Verifier;

#[cfg(test)]
pub(crate) use verifier::tests as verifier_tests;
