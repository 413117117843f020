use chrono::{NaiveDate, NaiveDateTime};
use openssl::error::ErrorStack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::verify::{X509VerifyFlags, X509VerifyParam};
use openssl::x509::{X509PurposeId, X509Ref, X509VerifyResult, X509};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::util::{canonical_name, fingerprint_sha256};

/// The fixed set of root stores a batch can be validated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StoreName {
    #[serde(rename = "CCADBTLS")]
    CcadbTls,
    #[serde(rename = "CCADBSMIME")]
    CcadbSmime,
    #[serde(rename = "GOOGLESERVICES")]
    GoogleServices,
    #[serde(rename = "APPLE")]
    Apple,
    #[serde(rename = "MICROSOFTWINDOWS")]
    MicrosoftWindows,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl StoreName {
    pub const ALL: [StoreName; 6] = [
        StoreName::CcadbTls,
        StoreName::CcadbSmime,
        StoreName::GoogleServices,
        StoreName::Apple,
        StoreName::MicrosoftWindows,
        StoreName::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::CcadbTls => "CCADBTLS",
            StoreName::CcadbSmime => "CCADBSMIME",
            StoreName::GoogleServices => "GOOGLESERVICES",
            StoreName::Apple => "APPLE",
            StoreName::MicrosoftWindows => "MICROSOFTWINDOWS",
            StoreName::Custom => "CUSTOM",
        }
    }

    /// File (or directory) name used for this store inside a roots directory.
    pub fn default_file_name(&self) -> Option<&'static str> {
        match self {
            StoreName::CcadbTls => Some("IncludedRootsDistrustTLSSSLPEM.csv"),
            StoreName::CcadbSmime => Some("IncludedRootsDistrustSMIMEPEM.csv"),
            StoreName::GoogleServices => Some("google_services_root.pem"),
            StoreName::Apple => Some("apple_roots.pem"),
            StoreName::MicrosoftWindows => Some("windows"),
            StoreName::Custom => None,
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw root material handed over by whatever acquired it.
#[derive(Clone, Debug)]
pub enum TrustMaterial {
    /// One or more PEM texts, each holding at least one certificate.
    Pems(Vec<String>),
    /// A PEM bundle on disk.
    PemFile(PathBuf),
    /// A directory of DER-encoded certificate files.
    DerDir(PathBuf),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum KeyUsagePolicy {
    /// Accept any extended key usage (lower bound on trust).
    #[default]
    Any,
    /// Require the TLS server purpose along the path.
    ServerAuth,
}

/// Batch-wide verification settings baked into every compiled store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyContext {
    pub as_of: NaiveDate,
    pub key_usage: KeyUsagePolicy,
}

impl VerifyContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of, key_usage: KeyUsagePolicy::Any }
    }

    /// Seconds since the epoch at 00:00:00 UTC of the "as of" day.
    pub fn instant(&self) -> i64 {
        NaiveDateTime::from(self.as_of).and_utc().timestamp()
    }
}

/// An immutable, named set of trust anchors compiled for one verification context.
pub struct TrustStore {
    name: StoreName,
    store: X509Store,
    by_subject: HashMap<String, Vec<X509>>,
    fingerprints: HashSet<String>,
    context: VerifyContext,
}

impl TrustStore {
    pub fn load(
        name: StoreName,
        material: &TrustMaterial,
        context: &VerifyContext,
    ) -> Result<Self, StoreError> {
        let anchors = match material {
            TrustMaterial::Pems(pems) => anchors_from_pems(pems)?,
            TrustMaterial::PemFile(path) => anchors_from_pem_file(path)?,
            TrustMaterial::DerDir(dir) => anchors_from_der_dir(dir)?,
        };
        Self::from_anchors(name, anchors, context)
    }

    pub fn from_anchors(
        name: StoreName,
        anchors: Vec<X509>,
        context: &VerifyContext,
    ) -> Result<Self, StoreError> {
        let mut fingerprints = HashSet::new();
        let mut by_subject: HashMap<String, Vec<X509>> = HashMap::new();
        let mut builder = X509StoreBuilder::new()?;
        for anchor in anchors {
            // Older OpenSSL refuses a certificate already present in the store.
            if !fingerprints.insert(fingerprint_sha256(&anchor)?) {
                continue;
            }
            let subject = canonical_name(anchor.subject_name());
            builder.add_cert(anchor.clone())?;
            by_subject.entry(subject).or_default().push(anchor);
        }
        if fingerprints.is_empty() {
            return Err(StoreError::Empty(name.to_string()));
        }
        compile_params(&mut builder, context)?;
        Ok(Self {
            name,
            store: builder.build(),
            by_subject,
            fingerprints,
            context: *context,
        })
    }

    pub fn name(&self) -> StoreName {
        self.name
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn x509_store(&self) -> &X509Store {
        &self.store
    }

    pub fn context(&self) -> &VerifyContext {
        &self.context
    }

    /// True when `cert` itself is one of the anchors.
    pub fn contains(&self, cert: &X509Ref) -> bool {
        fingerprint_sha256(cert)
            .map(|fp| self.fingerprints.contains(&fp))
            .unwrap_or(false)
    }

    /// True when some anchor could have issued `cert` (name and key identifier
    /// match). Names are compared in canonical form, not by their encoding.
    pub fn issues(&self, cert: &X509Ref) -> bool {
        self.by_subject
            .get(&canonical_name(cert.issuer_name()))
            .map(|cands| cands.iter().any(|a| a.issued(cert) == X509VerifyResult::OK))
            .unwrap_or(false)
    }
}

impl fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustStore")
            .field("name", &self.name)
            .field("anchors", &self.fingerprints.len())
            .field("context", &self.context)
            .finish()
    }
}

fn compile_params(builder: &mut X509StoreBuilder, context: &VerifyContext) -> Result<(), ErrorStack> {
    let mut param = X509VerifyParam::new()?;
    // Every certificate in a store is an anchor, self-signed or not.
    param.set_flags(X509VerifyFlags::PARTIAL_CHAIN)?;
    param.set_time(context.instant() as _);
    builder.set_param(&param)?;
    if context.key_usage == KeyUsagePolicy::ServerAuth {
        builder.set_purpose(X509PurposeId::SSL_SERVER)?;
    }
    Ok(())
}

fn anchors_from_pems(pems: &[String]) -> Result<Vec<X509>, StoreError> {
    let mut anchors = Vec::new();
    for (i, pem) in pems.iter().enumerate() {
        let certs = X509::stack_from_pem(pem.as_bytes()).map_err(|source| StoreError::Parse {
            what: format!("#{}", i),
            source,
        })?;
        if certs.is_empty() {
            return Err(StoreError::Empty(format!("root entry #{}", i)));
        }
        anchors.extend(certs);
    }
    Ok(anchors)
}

fn anchors_from_pem_file(path: &Path) -> Result<Vec<X509>, StoreError> {
    let data = fs::read(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    let certs = X509::stack_from_pem(&data).map_err(|source| StoreError::Parse {
        what: path.display().to_string(),
        source,
    })?;
    if certs.is_empty() {
        return Err(StoreError::Empty(path.display().to_string()));
    }
    Ok(certs)
}

fn anchors_from_der_dir(dir: &Path) -> Result<Vec<X509>, StoreError> {
    let io_err = |source| StoreError::Io { path: dir.to_path_buf(), source };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut anchors = Vec::with_capacity(paths.len());
    for path in paths {
        let data = fs::read(&path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
        let cert = X509::from_der(&data).map_err(|source| StoreError::Parse {
            what: path.display().to_string(),
            source,
        })?;
        anchors.push(cert);
    }
    Ok(anchors)
}

/// Registry of every configured store for one batch. A store that failed to
/// load is kept as `None` so callers can tell "unavailable" from "absent".
#[derive(Debug)]
pub struct TrustPools {
    context: VerifyContext,
    stores: BTreeMap<StoreName, Option<TrustStore>>,
}

impl TrustPools {
    pub fn builder(context: VerifyContext) -> TrustPoolsBuilder {
        TrustPoolsBuilder { context, stores: BTreeMap::new() }
    }

    pub fn context(&self) -> &VerifyContext {
        &self.context
    }

    /// True when no store is usable; the batch must not run.
    pub fn is_empty(&self) -> bool {
        self.stores.values().all(Option::is_none)
    }

    pub fn available(&self) -> impl Iterator<Item = &TrustStore> {
        self.stores.values().filter_map(Option::as_ref)
    }

    pub fn unavailable(&self) -> impl Iterator<Item = StoreName> + '_ {
        self.stores
            .iter()
            .filter(|(_, s)| s.is_none())
            .map(|(name, _)| *name)
    }
}

pub struct TrustPoolsBuilder {
    context: VerifyContext,
    stores: BTreeMap<StoreName, Option<TrustStore>>,
}

impl TrustPoolsBuilder {
    /// Load one store. On failure the store is recorded as unavailable and the
    /// error is returned for reporting; it never poisons the other stores.
    pub fn load(&mut self, name: StoreName, material: &TrustMaterial) -> Result<usize, StoreError> {
        match TrustStore::load(name, material, &self.context) {
            Ok(store) => {
                let n = store.len();
                info!(store = %name, anchors = n, "loaded root store");
                self.stores.insert(name, Some(store));
                Ok(n)
            }
            Err(e) => {
                warn!(store = %name, error = %e, "root store unavailable");
                self.stores.insert(name, None);
                Err(e)
            }
        }
    }

    pub fn insert(&mut self, store: TrustStore) {
        debug!(store = %store.name(), anchors = store.len(), "registered root store");
        self.stores.insert(store.name(), Some(store));
    }

    /// Record a store whose material could not even be obtained.
    pub fn mark_unavailable(&mut self, name: StoreName) {
        self.stores.insert(name, None);
    }

    pub fn build(self) -> TrustPools {
        TrustPools { context: self.context, stores: self.stores }
    }
}
