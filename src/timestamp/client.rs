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

//! Client for requesting RFC 3161 timestamps from a Timestamp Authority.

use std::time::Duration;

use async_trait::async_trait;
use cmpv2::status::PkiStatus;
use reqwest::Client;
use sha2::{Digest, Sha256};
use x509_cert::der::asn1::{Int, OctetString};
use x509_cert::der::{Decode, Encode};
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_tsp::{MessageImprint, TimeStampReq, TimeStampResp, TspVersion};

use crate::errors::TimestampError;

const TIMESTAMP_QUERY_MEDIA_TYPE: &str = "application/timestamp-query";
const USER_AGENT: &str = concat!("notation-rs/", env!("CARGO_PKG_VERSION"));

/// Something able to timestamp a signature.
#[async_trait]
pub trait Timestamper: Send + Sync {
    /// Return a DER encoded RFC 3161 token whose message imprint is the
    /// SHA-256 of `signature`.
    async fn timestamp(&self, signature: &[u8]) -> Result<Vec<u8>, TimestampError>;
}

/// Generates a random nonce suitable for RFC 3161 timestamp requests.
///
/// The nonce is 8 random bytes encoded as a positive INTEGER: a 0x00 byte
/// is prepended when the high bit is set.
fn generate_positive_nonce_bytes() -> Vec<u8> {
    use rand::Rng;
    let nonce_random: [u8; 8] = rand::thread_rng().r#gen();

    if nonce_random[0] & 0x80 != 0 {
        let mut padded = vec![0x00];
        padded.extend_from_slice(&nonce_random);
        padded
    } else {
        nonce_random.to_vec()
    }
}

/// Build the DER of a timestamp request for `signature`.
pub(crate) fn timestamp_request(signature: &[u8]) -> Result<Vec<u8>, TimestampError> {
    let failed = |what: &str, e: x509_cert::der::Error| {
        TimestampError::ParseError(format!("failed to build timestamp request, {what}: {e}"))
    };

    let message_imprint = MessageImprint {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::ID_SHA_256,
            parameters: None,
        },
        hashed_message: OctetString::new(Sha256::digest(signature).to_vec())
            .map_err(|e| failed("message imprint", e))?,
    };
    let nonce = Int::new(&generate_positive_nonce_bytes()).map_err(|e| failed("nonce", e))?;

    TimeStampReq {
        version: TspVersion::V1,
        message_imprint,
        req_policy: None,
        nonce: Some(nonce),
        // the authority certificate is needed to verify the token
        cert_req: true,
        extensions: None,
    }
    .to_der()
    .map_err(|e| failed("encoding", e))
}

/// Extract the token out of a DER `TimeStampResp`.
pub(crate) fn token_from_response(response: &[u8]) -> Result<Vec<u8>, TimestampError> {
    let response = TimeStampResp::from_der(response)
        .map_err(|e| TimestampError::ParseError(format!("invalid TimeStampResp: {e}")))?;

    match response.status.status {
        PkiStatus::Accepted | PkiStatus::GrantedWithMods => {}
        status => {
            return Err(TimestampError::ResponseFailure(format!("{status:?}")));
        }
    }

    response
        .time_stamp_token
        .ok_or(TimestampError::NoToken)?
        .to_der()
        .map_err(|e| TimestampError::ParseError(format!("failed to encode the token: {e}")))
}

/// [`Timestamper`] talking to a Timestamp Authority over HTTP.
pub struct HttpTimestamper {
    url: String,
    client: Client,
}

impl HttpTimestamper {
    /// Creates a new TSA client for the given URL, each request is bounded
    /// by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Timestamper for HttpTimestamper {
    async fn timestamp(&self, signature: &[u8]) -> Result<Vec<u8>, TimestampError> {
        let request = timestamp_request(signature)?;

        tracing::debug!("Sending timestamp request to TSA: {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, TIMESTAMP_QUERY_MEDIA_TYPE)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .body(request)
            .send()
            .await
            .map_err(|e| TimestampError::ResponseFailure(format!("TSA request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TimestampError::ResponseFailure(format!(
                "TSA returned error status: {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            TimestampError::ResponseFailure(format!("failed to read TSA response: {e}"))
        })?;
        token_from_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_positive() {
        for _ in 0..100 {
            let nonce = generate_positive_nonce_bytes();
            match nonce.len() {
                8 => assert_eq!(nonce[0] & 0x80, 0),
                9 => {
                    assert_eq!(nonce[0], 0x00);
                    assert_ne!(nonce[1] & 0x80, 0);
                }
                n => panic!("unexpected nonce length {n}"),
            }
        }
    }

    #[test]
    fn request_layout() {
        let der = timestamp_request(b"signature").unwrap();
        let request = TimeStampReq::from_der(&der).unwrap();
        assert!(matches!(request.version, TspVersion::V1));
        assert!(request.cert_req);
        assert!(request.nonce.is_some());
        assert_eq!(
            request.message_imprint.hashed_message.as_bytes(),
            Sha256::digest(b"signature").as_slice()
        );
    }

    #[test]
    fn garbage_response() {
        assert!(matches!(
            token_from_response(b"garbage"),
            Err(TimestampError::ParseError(_))
        ));
    }
}
