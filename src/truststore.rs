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

//! Named collections of trusted X.509 certificates.
//!
//! A store is addressed by its [`StoreKind`] and a name. The
//! [`X509TrustStore`] reads them lazily from a directory laid out as
//! `<root>/x509/<kind>/<name>/<file>`, [`InMemoryTrustStore`] holds them in
//! memory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use x509_cert::Certificate;

use crate::crypto::certificate::{
    is_ca, is_self_issued, read_certificate_file, read_certificates, subject_string,
};
use crate::crypto::verification_key::verify_certificate_signature;
use crate::errors::{IoError, NotationError, Result, TrustStoreError};

/// Directory, beneath the trust store root, holding the X.509 stores.
pub const X509_DIR: &str = "x509";

/// The role of the certificates of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
    /// Roots of `notary.x509` signing chains
    Ca,
    /// Roots of `notary.x509.signingAuthority` signing chains
    SigningAuthority,
    /// Roots of timestamp authority chains
    Tsa,
}

impl StoreKind {
    pub const ALL: [StoreKind; 3] = [StoreKind::Ca, StoreKind::SigningAuthority, StoreKind::Tsa];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Ca => "ca",
            StoreKind::SigningAuthority => "signingAuthority",
            StoreKind::Tsa => "tsa",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = TrustStoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StoreKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TrustStoreError::InvalidKind(s.to_string()))
    }
}

/// Whether `name` is acceptable as a store or certificate file name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn check_name(name: &str) -> std::result::Result<(), TrustStoreError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(TrustStoreError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Source of trusted certificates.
pub trait TrustStore: Send + Sync {
    /// The certificates of the store `name` of the given kind.
    ///
    /// A missing or empty store is an error: a policy referencing it can
    /// never be satisfied.
    fn certificates(&self, kind: StoreKind, name: &str) -> Result<Vec<Certificate>>;
}

/// Every certificate of a store must be a CA or a self-signed leaf.
fn validate_store_certificate(
    store: &str,
    file: &str,
    cert: &Certificate,
) -> std::result::Result<(), TrustStoreError> {
    let invalid = |reason: String| TrustStoreError::InvalidCertificate {
        store: store.to_string(),
        file: file.to_string(),
        reason,
    };
    let ca = is_ca(cert).unwrap_or(false);
    if ca {
        return Ok(());
    }
    if is_self_issued(cert) && verify_certificate_signature(cert, cert).is_ok() {
        return Ok(());
    }
    Err(invalid(format!(
        "certificate with subject {:?} is not a CA certificate or self-signed signing certificate",
        subject_string(cert)
    )))
}

/// Directory backed trust store.
#[derive(Debug, Clone)]
pub struct X509TrustStore {
    root: PathBuf,
}

impl X509TrustStore {
    /// `root` is the trust store directory, the one containing `x509/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        X509TrustStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a store on disk.
    pub fn store_path(&self, kind: StoreKind, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(X509_DIR).join(kind.as_str()).join(name))
    }

    /// Copy the certificate file at `path` into a store, creating the store
    /// when needed. Returns the location of the new file.
    pub fn add_certificate(&self, kind: StoreKind, name: &str, path: &Path) -> Result<PathBuf> {
        let store = format!("{kind}:{name}");
        let dir = self.store_path(kind, name)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_valid_name(n))
            .ok_or_else(|| TrustStoreError::InvalidName {
                name: path.display().to_string(),
            })?
            .to_string();

        let data = std::fs::read(path)
            .map_err(|e| IoError::from_io(&e, &path.display().to_string()))?;
        let certificates =
            read_certificates(&data).map_err(|e| TrustStoreError::InvalidCertificate {
                store: store.clone(),
                file: file_name.clone(),
                reason: e.to_string(),
            })?;
        for cert in &certificates {
            validate_store_certificate(&store, &file_name, cert)?;
        }

        let destination = dir.join(&file_name);
        if destination.exists() {
            return Err(TrustStoreError::AlreadyExists {
                store,
                file: file_name,
            }
            .into());
        }
        std::fs::create_dir_all(&dir)
            .map_err(|e| IoError::from_io(&e, &dir.display().to_string()))?;
        std::fs::write(&destination, &data)
            .map_err(|e| IoError::from_io(&e, &destination.display().to_string()))?;
        tracing::debug!(store, file = %destination.display(), "certificate added");
        Ok(destination)
    }

    /// Certificate files of the stores selected by `kind` and `name`, a
    /// `None` filter selects everything. Missing stores are not an error.
    pub fn list_certificates(
        &self,
        kind: Option<StoreKind>,
        name: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        if let Some(name) = name {
            check_name(name)?;
        }
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => StoreKind::ALL.to_vec(),
        };

        let mut files = Vec::new();
        for kind in kinds {
            let kind_dir = self.root.join(X509_DIR).join(kind.as_str());
            let stores = match name {
                Some(name) => vec![kind_dir.join(name)],
                None => list_dir(&kind_dir)?
                    .into_iter()
                    .filter(|path| path.is_dir())
                    .collect(),
            };
            for store in stores {
                files.extend(list_dir(&store)?.into_iter().filter(|path| path.is_file()));
            }
        }
        Ok(files)
    }

    /// Remove one certificate file from a store.
    pub fn delete_certificate(&self, kind: StoreKind, name: &str, file: &str) -> Result<()> {
        check_name(file)?;
        let path = self.store_path(kind, name)?.join(file);
        std::fs::remove_file(&path)
            .map_err(|e| IoError::from_io(&e, &path.display().to_string()))?;
        tracing::debug!(file = %path.display(), "certificate deleted");
        Ok(())
    }

    /// Remove a whole store.
    pub fn delete_store(&self, kind: StoreKind, name: &str) -> Result<()> {
        let path = self.store_path(kind, name)?;
        std::fs::remove_dir_all(&path)
            .map_err(|e| IoError::from_io(&e, &path.display().to_string()))?;
        tracing::debug!(store = %path.display(), "trust store deleted");
        Ok(())
    }
}

/// Entries of `dir`, sorted. A missing directory has no entries.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IoError::from_io(&e, &dir.display().to_string()).into()),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| IoError::from_io(&e, &dir.display().to_string()))?;
    paths.sort();
    Ok(paths)
}

impl TrustStore for X509TrustStore {
    fn certificates(&self, kind: StoreKind, name: &str) -> Result<Vec<Certificate>> {
        let store = format!("{kind}:{name}");
        let dir = self.store_path(kind, name)?;
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| IoError::from_io(&e, &format!("trust store {store:?}")))?;

        let mut certificates: Vec<Certificate> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| IoError::from_io(&e, &dir.display().to_string()))?;
            let path = entry.path();
            let file = entry.file_name().to_string_lossy().to_string();
            let file_type = entry
                .file_type()
                .map_err(|e| IoError::from_io(&e, &path.display().to_string()))?;
            if !file_type.is_file() {
                return Err(TrustStoreError::InvalidCertificate {
                    store,
                    file,
                    reason: "not a regular file".to_string(),
                }
                .into());
            }

            let file_certificates = read_certificate_file(&path).map_err(|e| match e {
                NotationError::Chain(e) => TrustStoreError::InvalidCertificate {
                    store: store.clone(),
                    file: file.clone(),
                    reason: e.to_string(),
                }
                .into(),
                other => other,
            })?;
            for cert in file_certificates {
                validate_store_certificate(&store, &file, &cert)?;
                if !certificates.contains(&cert) {
                    certificates.push(cert);
                }
            }
        }

        if certificates.is_empty() {
            return Err(TrustStoreError::Empty { store }.into());
        }
        tracing::debug!(
            store,
            count = certificates.len(),
            "trust store certificates loaded"
        );
        Ok(certificates)
    }
}

/// Trust store held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrustStore {
    stores: HashMap<(StoreKind, String), Vec<Certificate>>,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `certificates` to a store, duplicates collapse.
    pub fn add(
        &mut self,
        kind: StoreKind,
        name: &str,
        certificates: impl IntoIterator<Item = Certificate>,
    ) -> &mut Self {
        let store = self.stores.entry((kind, name.to_string())).or_default();
        for cert in certificates {
            if !store.contains(&cert) {
                store.push(cert);
            }
        }
        self
    }

    pub fn with(
        mut self,
        kind: StoreKind,
        name: &str,
        certificates: impl IntoIterator<Item = Certificate>,
    ) -> Self {
        self.add(kind, name, certificates);
        self
    }
}

impl TrustStore for InMemoryTrustStore {
    fn certificates(&self, kind: StoreKind, name: &str) -> Result<Vec<Certificate>> {
        match self.stores.get(&(kind, name.to_string())) {
            Some(certificates) if !certificates.is_empty() => Ok(certificates.clone()),
            Some(_) => Err(TrustStoreError::Empty {
                store: format!("{kind}:{name}"),
            }
            .into()),
            None => Err(IoError::NotFound(format!("trust store \"{kind}:{name}\"")).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::certificate::to_pem;
    use crate::crypto::tests::*;
    use rstest::rstest;

    fn write_cert(dir: &Path, file: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(file);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[rstest]
    #[case("ca", Some(StoreKind::Ca))]
    #[case("signingAuthority", Some(StoreKind::SigningAuthority))]
    #[case("tsa", Some(StoreKind::Tsa))]
    #[case("CA", None)]
    #[case("signingauthority", None)]
    fn store_kinds(#[case] input: &str, #[case] expected: Option<StoreKind>) {
        assert_eq!(input.parse::<StoreKind>().ok(), expected);
    }

    #[rstest]
    #[case("acme-rockets", true)]
    #[case("v1.0_test", true)]
    #[case("", false)]
    #[case("..", false)]
    #[case("a/b", false)]
    #[case("with space", false)]
    fn names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_name(name), valid);
    }

    #[test]
    fn directory_store() {
        let root = tempfile::tempdir().unwrap();
        let (ca, leaf) = generate_chain();
        let store = X509TrustStore::new(root.path());
        let dir = store.store_path(StoreKind::Ca, "acme").unwrap();
        std::fs::create_dir_all(&dir).unwrap();

        // PEM and DER side by side, the duplicate collapses
        write_cert(&dir, "root.pem", to_pem(&ca.x509()).unwrap().as_bytes());
        write_cert(&dir, "root.der", &ca.der());

        let certificates = store.certificates(StoreKind::Ca, "acme").unwrap();
        assert_eq!(certificates, vec![ca.x509()]);

        // a code signing leaf that is not self-signed does not belong here
        write_cert(&dir, "leaf.crt", &leaf.der());
        assert!(matches!(
            store.certificates(StoreKind::Ca, "acme"),
            Err(NotationError::TrustStore(
                TrustStoreError::InvalidCertificate { .. }
            ))
        ));
    }

    #[test]
    fn self_signed_leaf_is_accepted() {
        let root = tempfile::tempdir().unwrap();
        let leaf = generate_certificate(None, CertGenerationOptions::default()).unwrap();
        let store = X509TrustStore::new(root.path());
        let dir = store.store_path(StoreKind::Ca, "t").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        write_cert(&dir, "t.crt", &leaf.der());
        assert_eq!(store.certificates(StoreKind::Ca, "t").unwrap().len(), 1);
    }

    #[test]
    fn missing_empty_and_unreadable_stores_are_fatal() {
        let root = tempfile::tempdir().unwrap();
        let store = X509TrustStore::new(root.path());
        assert!(matches!(
            store.certificates(StoreKind::Ca, "missing"),
            Err(NotationError::Io(IoError::NotFound(_)))
        ));

        let dir = store.store_path(StoreKind::Tsa, "empty").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        assert!(matches!(
            store.certificates(StoreKind::Tsa, "empty"),
            Err(NotationError::TrustStore(TrustStoreError::Empty { .. }))
        ));

        write_cert(&dir, "garbage.pem", b"garbage");
        assert!(matches!(
            store.certificates(StoreKind::Tsa, "empty"),
            Err(NotationError::TrustStore(
                TrustStoreError::InvalidCertificate { .. }
            ))
        ));

        assert!(matches!(
            store.certificates(StoreKind::Ca, "../escape"),
            Err(NotationError::TrustStore(TrustStoreError::InvalidName { .. }))
        ));
    }

    #[test]
    fn manage_certificates() {
        let root = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        let (ca, _) = generate_chain();
        let store = X509TrustStore::new(root.path());
        let file = write_cert(input.path(), "root.crt", &ca.der());

        let added = store.add_certificate(StoreKind::Ca, "acme", &file).unwrap();
        assert!(added.ends_with("x509/ca/acme/root.crt"));
        assert!(matches!(
            store.add_certificate(StoreKind::Ca, "acme", &file),
            Err(NotationError::TrustStore(TrustStoreError::AlreadyExists { .. }))
        ));
        store
            .add_certificate(StoreKind::Tsa, "timestamps", &file)
            .unwrap();

        assert_eq!(store.list_certificates(None, None).unwrap().len(), 2);
        assert_eq!(
            store
                .list_certificates(Some(StoreKind::Ca), None)
                .unwrap(),
            vec![added.clone()]
        );
        assert!(store
            .list_certificates(Some(StoreKind::SigningAuthority), Some("acme"))
            .unwrap()
            .is_empty());

        store
            .delete_certificate(StoreKind::Ca, "acme", "root.crt")
            .unwrap();
        assert!(matches!(
            store.delete_certificate(StoreKind::Ca, "acme", "root.crt"),
            Err(NotationError::Io(IoError::NotFound(_)))
        ));
        store.delete_store(StoreKind::Tsa, "timestamps").unwrap();
        assert!(store.list_certificates(None, None).unwrap().is_empty());
    }

    #[test]
    fn add_requires_a_certificate() {
        let root = tempfile::tempdir().unwrap();
        let input = tempfile::tempdir().unwrap();
        let store = X509TrustStore::new(root.path());
        let file = write_cert(input.path(), "empty.pem", b"");
        assert!(matches!(
            store.add_certificate(StoreKind::Ca, "acme", &file),
            Err(NotationError::TrustStore(
                TrustStoreError::InvalidCertificate { .. }
            ))
        ));
        assert!(matches!(
            store.add_certificate(StoreKind::Ca, "bad name", &file),
            Err(NotationError::TrustStore(TrustStoreError::InvalidName { .. }))
        ));
    }

    #[test]
    fn in_memory_store() {
        let (ca, _) = generate_chain();
        let store = InMemoryTrustStore::new().with(StoreKind::Ca, "acme", [ca.x509(), ca.x509()]);
        assert_eq!(store.certificates(StoreKind::Ca, "acme").unwrap().len(), 1);
        assert!(matches!(
            store.certificates(StoreKind::Tsa, "acme"),
            Err(NotationError::Io(IoError::NotFound(_)))
        ));
    }
}
