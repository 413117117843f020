use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info};

use crate::chain::CertificateChain;

/// Read chains from a CSV with a header line, an integer id in column 0 and
/// a list of PEM strings in column 1. The list may use single quotes.
pub fn load_chains_csv(path: &Path) -> Result<Vec<CertificateChain>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;

    let mut chains = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read row {} of {}", row + 1, path.display()))?;
        let (Some(id), Some(list)) = (record.get(0), record.get(1)) else {
            bail!("row {} of {} needs an id and a chain column", row + 1, path.display());
        };
        let id: i32 = id
            .trim()
            .parse()
            .with_context(|| format!("row {}: invalid id {:?}", row + 1, id))?;
        let chain = parse_pem_list(list).with_context(|| format!("row {} (id {})", row + 1, id))?;
        chains.push(CertificateChain { id, chain });
    }
    info!(path = %path.display(), chains = chains.len(), "loaded input chains");
    Ok(chains)
}

/// Parse `['-----BEGIN ...', ...]` or its JSON equivalent. PEM line breaks
/// may be escaped (`\n`) or literal.
pub fn parse_pem_list(list: &str) -> Result<Vec<String>> {
    let pems: Vec<String> =
        serde_json::from_str(&to_json_list(list)).context("chain column is not a list of strings")?;
    Ok(pems)
}

// Quotes become `"`; raw line breaks are escaped inside strings only, so
// whitespace between elements stays valid JSON.
fn to_json_list(list: &str) -> String {
    let mut out = String::with_capacity(list.len());
    let mut in_string = false;
    let mut chars = list.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                in_string = !in_string;
                out.push('"');
            }
            '\\' if in_string => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => {}
            _ => out.push(c),
        }
    }
    out
}

/// Read a CCADB "included roots" CSV export. Column 0 holds a PEM wrapped in
/// single quotes, column 1 an optional distrust date (`YYYY.MM.DD`). Roots
/// distrusted before `as_of` are left out.
pub fn load_ccadb_roots(path: &Path, as_of: NaiveDate) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open CCADB file {}", path.display()))?;

    let mut roots = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to parse CCADB file {}", path.display()))?;
        let pem = record.get(0).unwrap_or_default().replace('\'', "");
        if pem.trim().is_empty() {
            continue;
        }
        let distrusted = record
            .get(1)
            .filter(|d| !d.trim().is_empty())
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y.%m.%d").ok());
        if let Some(date) = distrusted {
            if date < as_of {
                debug!(path = %path.display(), %date, "skipping distrusted root");
                continue;
            }
        }
        roots.push(pem);
    }
    Ok(roots)
}
