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

//! Operation settings and the context every sign/verify entry point receives.
//!
//! A [`Context`] is a read-only snapshot: it is built once by the host,
//! cloned into each operation and never mutated afterwards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::errors::{NotationError, Result};

/// Name of the environment variable gating experimental features.
pub const EXPERIMENTAL_ENV: &str = "NOTATION_EXPERIMENTAL";

const EXPERIMENTAL_ENABLED: &str = "1";

/// Default limit on the number of signatures evaluated per artifact.
pub const DEFAULT_MAX_SIGNATURE_ATTEMPTS: usize = 100;

fn default_ocsp_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_crl_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_tsa_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_discovery_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_signature_attempts() -> usize {
    DEFAULT_MAX_SIGNATURE_ATTEMPTS
}

/// Tunables of a single operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Deadline of a single OCSP exchange
    #[serde(with = "duration_secs")]
    pub ocsp_timeout: Duration,

    /// Deadline of a single CRL download
    #[serde(with = "duration_secs")]
    pub crl_timeout: Duration,

    /// Deadline of a timestamp request
    #[serde(with = "duration_secs")]
    pub tsa_timeout: Duration,

    /// Deadline of each registry request made while discovering signatures
    #[serde(with = "duration_secs")]
    pub discovery_timeout: Duration,

    /// Directory holding the revocation cache. `None` keeps the cache in memory.
    pub revocation_cache_root: Option<PathBuf>,

    /// Accepted distance between a timestamp token `genTime` and the local
    /// signing time. When unset, signing with a timestamp authority fails.
    #[serde(with = "duration_secs_opt")]
    pub tsa_clock_skew: Option<Duration>,

    /// Maximum number of signatures evaluated per artifact
    pub max_signature_attempts: usize,

    /// Allow the `sha256-<hex>` tag schema when the registry lacks the
    /// referrers API
    pub allow_referrers_tag_fallback: bool,

    /// Whether experimental features are enabled
    pub experimental: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ocsp_timeout: default_ocsp_timeout(),
            crl_timeout: default_crl_timeout(),
            tsa_timeout: default_tsa_timeout(),
            discovery_timeout: default_discovery_timeout(),
            revocation_cache_root: None,
            tsa_clock_skew: None,
            max_signature_attempts: default_max_signature_attempts(),
            allow_referrers_tag_fallback: false,
            experimental: false,
        }
    }
}

impl Config {
    /// Default settings, with the experimental gate read from the environment.
    pub fn from_env() -> Self {
        Config {
            experimental: experimental_enabled_in_env(),
            ..Default::default()
        }
    }

    /// Reject settings no operation can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_signature_attempts == 0 {
            return Err(NotationError::InvalidConfig(
                "max signature attempts must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    /// Fails with [`NotationError::ExperimentalDisabled`] unless experimental
    /// features are enabled.
    pub fn check_experimental(&self, feature: &str) -> Result<()> {
        if self.experimental {
            tracing::warn!(
                "Caution: {feature} is experimental and may not be fully tested or completed and may be deprecated"
            );
            Ok(())
        } else {
            Err(NotationError::ExperimentalDisabled {
                feature: feature.to_string(),
            })
        }
    }
}

/// Whether the process environment enables experimental features.
pub fn experimental_enabled_in_env() -> bool {
    std::env::var(EXPERIMENTAL_ENV)
        .map(|v| v == EXPERIMENTAL_ENABLED)
        .unwrap_or(false)
}

/// The snapshot handed to every operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    config: Arc<Config>,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Context {
            config: Arc::new(config),
            cancellation: CancellationToken::new(),
        })
    }

    /// Attach a cancellation token owned by the host.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns [`NotationError::Cancelled`] once the host cancelled the operation.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            Err(NotationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.ocsp_timeout, Duration::from_secs(2));
        assert_eq!(config.crl_timeout, Duration::from_secs(5));
        assert_eq!(config.max_signature_attempts, 100);
        assert!(config.tsa_clock_skew.is_none());
        assert!(!config.allow_referrers_tag_fallback);
    }

    #[test]
    fn deserialize_partial_document() {
        let config: Config = serde_json::from_str(
            r#"{"crlTimeout": 9, "tsaClockSkew": 30, "maxSignatureAttempts": 3}"#,
        )
        .unwrap();
        assert_eq!(config.crl_timeout, Duration::from_secs(9));
        assert_eq!(config.tsa_clock_skew, Some(Duration::from_secs(30)));
        assert_eq!(config.max_signature_attempts, 3);
        assert_eq!(config.ocsp_timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_signature_attempts_is_rejected() {
        let config = Config {
            max_signature_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            Context::new(config),
            Err(NotationError::InvalidConfig(_))
        ));
    }

    #[test]
    #[serial]
    fn experimental_gate_requires_literal_one() {
        std::env::set_var(EXPERIMENTAL_ENV, "true");
        assert!(!Config::from_env().experimental);
        let err = Config::from_env()
            .check_experimental("OCI layout")
            .unwrap_err();
        assert!(matches!(err, NotationError::ExperimentalDisabled { .. }));

        std::env::set_var(EXPERIMENTAL_ENV, "1");
        assert!(Config::from_env().check_experimental("OCI layout").is_ok());
        std::env::remove_var(EXPERIMENTAL_ENV);
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let ctx = Context::default().with_cancellation(token.clone());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(NotationError::Cancelled)));
    }
}
