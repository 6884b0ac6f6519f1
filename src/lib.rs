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

//! This crate signs and verifies OCI artifacts and arbitrary blobs following
//! the [Notary Project](https://notaryproject.dev/) specifications.
//!
//! Signatures are JWS or COSE envelopes produced with an X.509 certificate
//! chain, optionally countersigned by an RFC 3161 timestamping authority.
//! Verification is driven by a trust policy document, naming the trust
//! stores and the identities trusted for a set of artifacts, and by a
//! verification level deciding which checks are enforced, logged or skipped.
//!
//! # Signing and verifying an OCI artifact
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use notation::{
//!     artifact::{sign_artifact, verify_artifact},
//!     registry::{ClientConfig, OciRegistryClient, SignatureRepository},
//!     revocation::{open_cache, HttpFetcher, RevocationChecker},
//!     sign::{SignOptions, Signer},
//!     trustpolicy::load_oci_policy,
//!     truststore::X509TrustStore,
//!     verify::{Verifier, VerifyOptions},
//!     Config, Context,
//! };
//!
//! let ctx = Context::new(Config::default())?;
//! let client = OciRegistryClient::new(ClientConfig::default())?;
//! let repository = SignatureRepository::new(Arc::new(client));
//! let reference = "registry.example/app@sha256:...".parse()?;
//!
//! let signer = Signer::new(signing_key);
//! sign_artifact(&ctx, &signer, &repository, &reference, &SignOptions::default()).await?;
//!
//! let verifier = Verifier::new(
//!     Arc::new(load_oci_policy(config_dir)?),
//!     Arc::new(X509TrustStore::new(config_dir.join("truststore"))),
//!     Arc::new(RevocationChecker::new(
//!         Arc::new(HttpFetcher::new()),
//!         open_cache(ctx.config().revocation_cache_root.as_deref()),
//!     )),
//! );
//! let verified = verify_artifact(&ctx, &verifier, &repository, &reference, &VerifyOptions::default()).await?;
//! println!("verified by {}", verified.outcome.statement);
//! ```
//!
//! Blobs are handled the same way through [`artifact::sign_blob`] and
//! [`artifact::verify_blob`], their signatures living in detached
//! `<blob>.<format>.sig` files.
//!
//! # Feature flags
//!
//! - `rustls-tls` (default): TLS through rustls for the registry, the
//!   timestamping authorities and the revocation endpoints.
//! - `native-tls`: TLS through the platform library instead.

pub mod artifact;
pub mod config;
pub mod crypto;
pub mod descriptor;
pub mod envelope;
pub mod errors;
pub mod plugin;
pub mod registry;
pub mod revocation;
pub mod sign;
pub mod timestamp;
pub mod trustpolicy;
pub mod truststore;
pub mod verify;

pub use config::{Config, Context};
pub use descriptor::{Descriptor, Digest, Payload};
pub use errors::{NotationError, Result};
