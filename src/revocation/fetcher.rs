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

//! Retrieval of revocation data.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::errors::IoError;

const USER_AGENT: &str = concat!("notation-rs/", env!("CARGO_PKG_VERSION"));

/// Largest CRL or OCSP response accepted.
pub const MAX_RESPONSE_SIZE: usize = 32 * 1024 * 1024;

/// Turns a URL into bytes. Implementations do not cache.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, IoError>;

    /// POST `body`, used for OCSP requests too long for a GET URL.
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, IoError> {
        let _ = (content_type, body, timeout);
        Err(IoError::TransportFailed(format!(
            "{url}: POST is not supported by this fetcher"
        )))
    }
}

/// [`Fetcher`] over plain HTTP(S).
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: Client::new(),
        }
    }

    /// Use a preconfigured client, proxies and TLS settings included.
    pub fn with_client(client: Client) -> Self {
        HttpFetcher { client }
    }

    async fn read(response: reqwest::Response, url: &str) -> Result<Vec<u8>, IoError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IoError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(IoError::TransportFailed(format!(
                "{url}: unexpected status {status}"
            )));
        }
        if let Some(length) = response.content_length() {
            if length > MAX_RESPONSE_SIZE as u64 {
                return Err(IoError::TransportFailed(format!(
                    "{url}: response of {length} bytes exceeds the {MAX_RESPONSE_SIZE} bytes limit"
                )));
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| IoError::from_reqwest(&e, url))?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(IoError::TransportFailed(format!(
                "{url}: response exceeds the {MAX_RESPONSE_SIZE} bytes limit"
            )));
        }
        Ok(body.to_vec())
    }
}

fn check_scheme(url: &str) -> Result<(), IoError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| IoError::TransportFailed(format!("{url}: invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(IoError::TransportFailed(format!(
            "{url}: unsupported scheme {scheme:?}"
        ))),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, IoError> {
        check_scheme(url)?;
        tracing::debug!(url, "fetching revocation data");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| IoError::from_reqwest(&e, url))?;
        Self::read(response, url).await
    }

    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, IoError> {
        check_scheme(url)?;
        tracing::debug!(url, "posting revocation request");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| IoError::from_reqwest(&e, url))?;
        Self::read(response, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_http_urls() {
        let fetcher = HttpFetcher::new();
        let err = fetcher
            .get("ldap://ldap.example/cn=crl", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, IoError::TransportFailed(_)));
        let err = fetcher
            .get("not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, IoError::TransportFailed(_)));
    }
}
