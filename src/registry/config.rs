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

//! Connection settings of [`OciRegistryClient`](super::OciRegistryClient),
//! mapped onto their `oci_client` counterparts.

use std::collections::HashMap;

use oci_client::secrets::RegistryAuth;

use crate::errors::{NotationError, Result};

/// Credentials presented to one registry.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    /// No credentials, anonymous tokens are still requested when challenged
    #[default]
    Anonymous,
    /// Username and password, exchanged for a token when the registry asks
    Basic(String, String),
    /// A token obtained out of band
    Bearer(String),
}

impl From<&Auth> for RegistryAuth {
    fn from(auth: &Auth) -> Self {
        match auth {
            Auth::Anonymous => RegistryAuth::Anonymous,
            Auth::Basic(username, password) => {
                RegistryAuth::Basic(username.clone(), password.clone())
            }
            Auth::Bearer(token) => RegistryAuth::Bearer(token.clone()),
        }
    }
}

/// Whether registries are reached over plain HTTP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientProtocol {
    /// Every registry over HTTP
    Http,
    /// Every registry over HTTPS
    #[default]
    Https,
    /// HTTPS, except for the listed registry hosts
    HttpsExcept(Vec<String>),
}

impl ClientProtocol {
    /// URL scheme used for `registry`.
    pub(crate) fn scheme(&self, registry: &str) -> &'static str {
        match self {
            ClientProtocol::Http => "http",
            ClientProtocol::Https => "https",
            ClientProtocol::HttpsExcept(insecure) if insecure.iter().any(|r| r == registry) => {
                "http"
            }
            ClientProtocol::HttpsExcept(_) => "https",
        }
    }
}

impl From<ClientProtocol> for oci_client::client::ClientProtocol {
    fn from(protocol: ClientProtocol) -> Self {
        match protocol {
            ClientProtocol::Http => oci_client::client::ClientProtocol::Http,
            ClientProtocol::Https => oci_client::client::ClientProtocol::Https,
            ClientProtocol::HttpsExcept(insecure) => {
                oci_client::client::ClientProtocol::HttpsExcept(insecure)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateEncoding {
    Der,
    Pem,
}

impl From<CertificateEncoding> for oci_client::client::CertificateEncoding {
    fn from(encoding: CertificateEncoding) -> Self {
        match encoding {
            CertificateEncoding::Der => oci_client::client::CertificateEncoding::Der,
            CertificateEncoding::Pem => oci_client::client::CertificateEncoding::Pem,
        }
    }
}

/// An additional root of trust for registry TLS connections.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Certificate {
    pub encoding: CertificateEncoding,
    pub data: Vec<u8>,
}

impl From<&Certificate> for oci_client::client::Certificate {
    fn from(cert: &Certificate) -> Self {
        oci_client::client::Certificate {
            encoding: cert.encoding.clone().into(),
            data: cert.data.clone(),
        }
    }
}

impl TryFrom<&Certificate> for reqwest::Certificate {
    type Error = NotationError;

    fn try_from(cert: &Certificate) -> Result<Self> {
        let parsed = match cert.encoding {
            CertificateEncoding::Der => reqwest::Certificate::from_der(&cert.data),
            CertificateEncoding::Pem => reqwest::Certificate::from_pem(&cert.data),
        };
        parsed.map_err(|e| NotationError::InvalidConfig(format!("extra root certificate: {e}")))
    }
}

/// How to reach registries and which credentials to present.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub protocol: ClientProtocol,

    /// Skip hostname verification
    #[cfg(feature = "native-tls")]
    pub accept_invalid_hostnames: bool,

    /// Skip certificate verification altogether
    pub accept_invalid_certificates: bool,

    /// Roots trusted on top of the platform ones, for registries serving
    /// self-issued certificates
    pub extra_root_certificates: Vec<Certificate>,

    pub https_proxy: Option<String>,
    pub http_proxy: Option<String>,
    /// Comma separated hosts bypassing the proxies
    pub no_proxy: Option<String>,

    /// Credentials by registry host. Other registries are accessed
    /// anonymously.
    pub credentials: HashMap<String, Auth>,
}

impl ClientConfig {
    /// Credentials for `registry`.
    pub(crate) fn auth(&self, registry: &str) -> RegistryAuth {
        self.credentials
            .get(registry)
            .map(RegistryAuth::from)
            .unwrap_or(RegistryAuth::Anonymous)
    }

    /// A plain HTTP client honouring the same TLS and proxy settings, for
    /// the requests `oci_client` does not cover.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        let invalid = |e: reqwest::Error| NotationError::InvalidConfig(e.to_string());
        let no_proxy = || {
            self.no_proxy
                .as_deref()
                .and_then(reqwest::NoProxy::from_string)
        };
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("notation-rs/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(self.accept_invalid_certificates);
        #[cfg(feature = "native-tls")]
        {
            builder = builder.danger_accept_invalid_hostnames(self.accept_invalid_hostnames);
        }
        for cert in &self.extra_root_certificates {
            builder = builder.add_root_certificate(cert.try_into()?);
        }
        if let Some(proxy) = &self.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy).map_err(invalid)?.no_proxy(no_proxy()));
        }
        if let Some(proxy) = &self.http_proxy {
            builder = builder.proxy(reqwest::Proxy::http(proxy).map_err(invalid)?.no_proxy(no_proxy()));
        }
        builder.build().map_err(invalid)
    }
}

impl From<&ClientConfig> for oci_client::client::ClientConfig {
    fn from(config: &ClientConfig) -> Self {
        oci_client::client::ClientConfig {
            protocol: config.protocol.clone().into(),
            accept_invalid_certificates: config.accept_invalid_certificates,
            #[cfg(feature = "native-tls")]
            accept_invalid_hostnames: config.accept_invalid_hostnames,
            extra_root_certificates: config
                .extra_root_certificates
                .iter()
                .map(|c| c.into())
                .collect(),
            https_proxy: config.https_proxy.clone(),
            http_proxy: config.http_proxy.clone(),
            no_proxy: config.no_proxy.clone(),
            ..Default::default()
        }
    }
}
