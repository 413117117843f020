use anyhow::{bail, Context, Result};
use openssl::x509::X509;
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::rootstores::StoreName;

const CCADB_TLS_URL: &str =
    "https://ccadb.my.salesforce-sites.com/mozilla/IncludedRootsDistrustTLSSSLPEMCSV?TrustBitsInclude=Websites";
const CCADB_SMIME_URL: &str =
    "https://ccadb.my.salesforce-sites.com/mozilla/IncludedRootsDistrustSMIMEPEMCSV?TrustBitsInclude=Email";
const GOOGLE_SERVICES_URL: &str = "https://pki.goog/roots.pem";

/// Stores that can be fetched from public sources, with where to get them.
pub const SOURCES: [(StoreName, &str); 3] = [
    (StoreName::CcadbTls, CCADB_TLS_URL),
    (StoreName::CcadbSmime, CCADB_SMIME_URL),
    (StoreName::GoogleServices, GOOGLE_SERVICES_URL),
];

/// Download every public root store into `dir` under the names
/// `validate --roots-dir` looks for. Returns the files written.
pub fn fetch_root_stores(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    let client = Client::builder()
        .user_agent("cert-validator/0.1")
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    let mut written = Vec::new();
    for (store, url) in SOURCES {
        let Some(name) = store.default_file_name() else { continue };
        let bytes = download(&client, url)?;
        check_material(store, &bytes).with_context(|| format!("unexpected content from {}", url))?;
        let path = dir.join(name);
        fs::write(&path, &bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(store = %store, path = %path.display(), bytes = bytes.len(), "fetched root store");
        written.push(path);
    }
    Ok(written)
}

fn download(client: &Client, url: &str) -> Result<Vec<u8>> {
    let resp = client.get(url).send().with_context(|| format!("GET {} failed", url))?;
    if !resp.status().is_success() {
        bail!("{}: HTTP {}", url, resp.status());
    }
    Ok(resp.bytes()?.to_vec())
}

/// Cheap sanity check so an HTML error page never lands where roots belong.
pub(crate) fn check_material(store: StoreName, bytes: &[u8]) -> Result<()> {
    match store {
        StoreName::GoogleServices => {
            let certs = X509::stack_from_pem(bytes)?;
            if certs.is_empty() {
                bail!("no certificates in PEM bundle");
            }
        }
        _ => {
            if !bytes.windows(10).any(|w| w == b"-----BEGIN") {
                bail!("no PEM blocks in CSV export");
            }
        }
    }
    Ok(())
}
