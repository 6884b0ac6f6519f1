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

//! Set of structs and traits used to store and discover signatures in OCI
//! registries.

pub mod client;
pub use client::{InMemoryRegistry, RegistryClient};

pub mod config;
pub use config::{Auth, Certificate, CertificateEncoding, ClientConfig, ClientProtocol};

pub mod index;
pub use index::{
    referrers_tag, ImageIndex, SignatureManifest, SignatureRepository, ANNOTATION_THUMBPRINT,
    ARTIFACT_TYPE_NOTATION, MAX_MANIFEST_SIZE, MAX_SIGNATURE_SIZE, MEDIA_TYPE_ARTIFACT_MANIFEST,
    MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST,
};

pub mod oci;
pub use oci::OciRegistryClient;

pub mod reference;
pub use reference::ArtifactReference;
