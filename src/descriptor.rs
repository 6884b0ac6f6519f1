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

//! Content descriptors and the payload a signature covers.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::{Digest as _, Sha256};

use crate::errors::{EnvelopeError, IoError, NotationError, Result};

/// Media type of the signed payload.
pub const MEDIA_TYPE_PAYLOAD_V1: &str = "application/vnd.cncf.notary.payload.v1+json";

/// Media type assigned to blobs when the caller does not provide one.
pub const DEFAULT_BLOB_MEDIA_TYPE: &str = "application/octet-stream";

/// A content digest: `<algorithm>:<hex>`.
///
/// The algorithm is compared case-sensitively, the hex digits are not.
#[derive(Clone, Debug, SerializeDisplay, DeserializeFromStr)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    /// SHA-256 digest of `data`.
    pub fn sha256_of(data: &[u8]) -> Self {
        Digest {
            algorithm: "sha256".to_string(),
            encoded: hex::encode(Sha256::digest(data)),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The hex encoded value, as written by the producer.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Decoded digest bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.encoded).map_err(|e| NotationError::InvalidDigest {
            digest: self.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check `data` hashes to this digest.
    pub fn verify(&self, data: &[u8]) -> bool {
        let computed = match self.algorithm.as_str() {
            "sha256" => hex::encode(Sha256::digest(data)),
            "sha384" => hex::encode(sha2::Sha384::digest(data)),
            "sha512" => hex::encode(sha2::Sha512::digest(data)),
            _ => return false,
        };
        computed.eq_ignore_ascii_case(&self.encoded)
    }

    /// Hash `reader` with the algorithm of this digest, returning whether it
    /// matches along with the number of bytes read.
    pub fn verify_reader<R: Read>(&self, mut reader: R) -> Result<(bool, u64)> {
        fn hash<H: sha2::Digest + std::io::Write, R: Read>(
            mut hasher: H,
            reader: &mut R,
        ) -> Result<(String, u64)> {
            let size = std::io::copy(reader, &mut hasher)
                .map_err(|e| NotationError::from(IoError::from_io(&e, "blob")))?;
            Ok((hex::encode(hasher.finalize()), size))
        }
        let (computed, size) = match self.algorithm.as_str() {
            "sha256" => hash(Sha256::new(), &mut reader)?,
            "sha384" => hash(sha2::Sha384::new(), &mut reader)?,
            "sha512" => hash(sha2::Sha512::new(), &mut reader)?,
            _ => return Ok((false, 0)),
        };
        Ok((computed.eq_ignore_ascii_case(&self.encoded), size))
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.encoded.eq_ignore_ascii_case(&other.encoded)
    }
}

impl Eq for Digest {}

impl Hash for Digest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.algorithm.hash(state);
        self.encoded.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| NotationError::InvalidDigest {
            digest: s.to_string(),
            reason: reason.to_string(),
        };
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| invalid("missing algorithm separator"))?;
        let expected_len = match algorithm {
            "sha256" => 64,
            "sha384" => 96,
            "sha512" => 128,
            _ => return Err(invalid("unsupported digest algorithm")),
        };
        if encoded.len() != expected_len {
            return Err(invalid("invalid encoded length"));
        }
        if !encoded.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("encoded value is not hex"));
        }
        Ok(Digest {
            algorithm: algorithm.to_string(),
            encoded: encoded.to_string(),
        })
    }
}

/// Identifies content by media type, digest and size.
///
/// Only those three fields participate in equality.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.media_type == other.media_type
            && self.digest == other.digest
            && self.size == other.size
    }
}

impl Eq for Descriptor {}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Descriptor {
            media_type: media_type.into(),
            digest,
            size,
            urls: None,
            annotations: None,
            artifact_type: None,
        }
    }

    /// Describe in-memory content.
    pub fn from_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, Digest::sha256_of(data), data.len() as u64)
    }

    /// Describe a blob by streaming it through SHA-256.
    ///
    /// `media_type` defaults to `application/octet-stream`.
    pub fn from_reader<R: Read>(mut reader: R, media_type: Option<&str>) -> Result<Self> {
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut reader, &mut hasher)
            .map_err(|e| NotationError::from(IoError::from_io(&e, "blob")))?;
        Ok(Self::new(
            media_type.unwrap_or(DEFAULT_BLOB_MEDIA_TYPE),
            Digest {
                algorithm: "sha256".to_string(),
                encoded: hex::encode(hasher.finalize()),
            },
            size,
        ))
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        };
        self
    }

    /// The descriptor without its annotations.
    pub fn without_annotations(&self) -> Self {
        Descriptor {
            annotations: None,
            ..self.clone()
        }
    }
}

/// The object a signature covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub target_artifact: Descriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Payload {
    pub fn new(target_artifact: Descriptor) -> Self {
        Payload {
            target_artifact,
            annotations: None,
        }
    }

    /// Canonical JSON bytes: sorted keys, no insignificant whitespace.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_vec(&canonicalize(value))?)
    }

    /// Parse the payload of an envelope, checking its content type.
    pub fn from_signed_content(content_type: &str, content: &[u8]) -> Result<Self> {
        if content_type != MEDIA_TYPE_PAYLOAD_V1 {
            return Err(EnvelopeError::Malformed(format!(
                "payload content type {content_type:?} not supported"
            ))
            .into());
        }
        serde_json::from_slice(content).map_err(|e| {
            EnvelopeError::Malformed(format!(
                "failed to unmarshal the payload content to Payload: {e}"
            ))
            .into()
        })
    }

    /// Annotations signed together with the artifact.
    pub fn user_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.target_artifact.annotations.clone().unwrap_or_default();
        if let Some(extra) = &self.annotations {
            metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        metadata
    }
}

/// Rebuild every object with its keys in lexicographic order.
pub(crate) fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
