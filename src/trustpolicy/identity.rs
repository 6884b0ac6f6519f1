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

//! Trusted identities and distinguished name matching.

use std::fmt;

use x509_cert::Certificate;

use crate::crypto::certificate::name_attributes;
use crate::errors::PolicyError;

/// Prefix of identities naming a certificate subject.
pub const X509_SUBJECT_PREFIX: &str = "x509.subject";

/// Attributes every trusted subject must name.
const MANDATORY_ATTRIBUTES: [&str; 3] = ["C", "ST", "O"];

/// An entry of `trustedIdentities`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustedIdentity {
    /// `*`, any identity
    Any,
    /// `x509.subject:<DN>`, attribute type and value pairs
    Subject(Vec<(String, String)>),
}

impl TrustedIdentity {
    /// Parse an identity of `statement`.
    pub fn parse(statement: &str, identity: &str) -> Result<Self, PolicyError> {
        let malformed = |reason: &str| PolicyError::MalformedTrustedIdentity {
            statement: statement.to_string(),
            identity: identity.to_string(),
            reason: reason.to_string(),
        };

        if identity.trim().is_empty() {
            return Err(PolicyError::EmptyTrustedIdentity {
                statement: statement.to_string(),
            });
        }
        if identity == "*" {
            return Ok(TrustedIdentity::Any);
        }
        let (prefix, dn) = identity
            .split_once(':')
            .ok_or_else(|| malformed("an identity must be \"*\" or have the form \"x509.subject:<DN>\""))?;
        if prefix.trim() != X509_SUBJECT_PREFIX {
            return Err(malformed(&format!(
                "identity prefix {:?} is not supported, use {X509_SUBJECT_PREFIX:?}",
                prefix.trim()
            )));
        }

        let attributes = parse_distinguished_name(dn).map_err(|reason| malformed(&reason))?;
        let missing: Vec<String> = MANDATORY_ATTRIBUTES
            .iter()
            .filter(|required| !attributes.iter().any(|(t, _)| t == *required))
            .map(|required| required.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PolicyError::MissingDNAttribute {
                dn: dn.trim().to_string(),
                missing,
            });
        }
        for (i, (attr_type, _)) in attributes.iter().enumerate() {
            if attributes[..i].iter().any(|(t, _)| t == attr_type) {
                return Err(malformed(&format!(
                    "attribute {attr_type:?} is repeated, distinguished name attributes must be unique"
                )));
            }
        }
        Ok(TrustedIdentity::Subject(attributes))
    }

    /// Whether the subject of `leaf` is this identity.
    pub fn matches(&self, leaf: &Certificate) -> bool {
        match self {
            TrustedIdentity::Any => true,
            TrustedIdentity::Subject(trusted) => {
                is_subset_dn(trusted, &name_attributes(&leaf.tbs_certificate.subject))
            }
        }
    }
}

impl fmt::Display for TrustedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustedIdentity::Any => f.write_str("*"),
            TrustedIdentity::Subject(attributes) => {
                write!(f, "{X509_SUBJECT_PREFIX}:")?;
                for (i, (attr_type, value)) in attributes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{attr_type}={value}")?;
                }
                Ok(())
            }
        }
    }
}

/// Every attribute of `subset` is present, with the same value, in `set`.
pub fn is_subset_dn(subset: &[(String, String)], set: &[(String, String)]) -> bool {
    subset.iter().all(|(attr_type, value)| {
        set.iter()
            .any(|(t, v)| t.eq_ignore_ascii_case(attr_type) && v == value)
    })
}

/// Parse a RFC 4514 distinguished name into its attributes, in written
/// order. Multi-valued RDNs are flattened.
pub fn parse_distinguished_name(dn: &str) -> Result<Vec<(String, String)>, String> {
    let dn = dn.trim();
    if dn.is_empty() {
        return Err("the distinguished name is empty".to_string());
    }

    let mut attributes = Vec::new();
    for component in split_unescaped(dn, &[',', '+']) {
        let (attr_type, value) = split_unescaped(&component, &['='])
            .split_first()
            .map(|(t, rest)| (t.clone(), rest.join("=")))
            .ok_or_else(|| format!("invalid attribute {component:?}"))?;
        if !component.contains('=') {
            return Err(format!("attribute {:?} has no value", component.trim()));
        }
        let attr_type = attr_type.trim().to_ascii_uppercase();
        if attr_type.is_empty()
            || !attr_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(format!("invalid attribute type {attr_type:?}"));
        }
        let value = unescape(value.trim_start())?;
        attributes.push((attr_type, value));
    }
    Ok(attributes)
}

/// Split `s` on unescaped `separators`, escapes are kept.
fn split_unescaped(s: &str, separators: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if separators.contains(&c) {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Resolve `\<char>` and `\<hex><hex>` escapes. Unescaped trailing spaces
/// are dropped.
fn unescape(value: &str) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut trailing_spaces = 0;
    let raw = value.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\\' => {
                let next = *raw
                    .get(i + 1)
                    .ok_or_else(|| format!("value {value:?} ends with an escape"))?;
                let hex_pair = raw
                    .get(i + 1..i + 3)
                    .and_then(|pair| std::str::from_utf8(pair).ok())
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok());
                match hex_pair {
                    Some(byte) => {
                        bytes.push(byte);
                        i += 3;
                    }
                    None => {
                        bytes.push(next);
                        i += 2;
                    }
                }
                trailing_spaces = 0;
            }
            b' ' => {
                bytes.push(b' ');
                trailing_spaces += 1;
                i += 1;
            }
            other => {
                bytes.push(other);
                trailing_spaces = 0;
                i += 1;
            }
        }
    }
    bytes.truncate(bytes.len() - trailing_spaces);
    String::from_utf8(bytes).map_err(|_| format!("value {value:?} is not valid UTF-8"))
}
