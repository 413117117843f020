use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{BatchError, FailureKind, VerifyError};
use crate::rootstores::{StoreName, TrustPools};

/// One leaf-to-anchor path, identified by its fingerprint sequence.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct VerifiedPath(Vec<String>);

impl VerifiedPath {
    pub fn new(fingerprints: Vec<String>) -> Self {
        Self(fingerprints)
    }

    pub fn fingerprints(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Outcome of validating one chain against one store.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PerStoreResult {
    pub is_valid: bool,
    #[serde(rename = "root_store_error")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(serialize_with = "serialize_paths")]
    pub valid_chains: Vec<VerifiedPath>,
}

impl PerStoreResult {
    /// Record a path unless an identical fingerprint sequence is already present.
    pub fn add_path(&mut self, path: VerifiedPath) -> bool {
        if self.valid_chains.contains(&path) {
            return false;
        }
        self.valid_chains.push(path);
        true
    }

    pub fn mark_valid(&mut self) {
        self.is_valid = true;
        self.error = None;
        self.error_kind = None;
    }

    pub fn record_verify_error(&mut self, err: &VerifyError) {
        self.record_error(err.to_string(), err.kind());
    }

    /// Keep the first meaningful error. A leaf that could not be parsed is the
    /// weakest explanation and gives way to any real verification failure.
    pub fn record_error(&mut self, message: String, kind: FailureKind) {
        if self.is_valid {
            return;
        }
        let replace = match self.error_kind {
            None => true,
            Some(FailureKind::InvalidLeaf) => kind != FailureKind::InvalidLeaf,
            Some(_) => false,
        };
        if replace {
            self.error = Some(message);
            self.error_kind = Some(kind);
        }
    }

    /// Render the paths as `[["FP", "FP"], ["FP"]]`.
    pub fn render_chains(&self) -> String {
        render_paths(&self.valid_chains)
    }
}

fn render_paths(paths: &[VerifiedPath]) -> String {
    let inner = paths
        .iter()
        .map(|p| {
            let fps = p
                .fingerprints()
                .iter()
                .map(|fp| format!("\"{}\"", fp))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{}]", fps)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", inner)
}

fn serialize_paths<S: Serializer>(paths: &[VerifiedPath], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&render_paths(paths))
}

/// Aggregate for one chain across every available store.
#[derive(Clone, Debug, Serialize)]
pub struct ChainValidationResult {
    pub id: i32,
    #[serde(rename = "generic_error")]
    pub error: Option<String>,
    #[serde(rename = "root_stores")]
    pub stores: BTreeMap<StoreName, PerStoreResult>,
    #[serde(rename = "leaf_cert_index")]
    pub leaf_index: usize,
    #[serde(rename = "all_valid_leaves_index")]
    pub valid_leaf_indices: BTreeSet<usize>,
}

impl ChainValidationResult {
    /// A fresh record with one (invalid, error-free) entry per available store.
    pub fn new(id: i32, pools: &TrustPools) -> Self {
        let stores = pools
            .available()
            .map(|s| (s.name(), PerStoreResult::default()))
            .collect();
        Self {
            id,
            error: None,
            stores,
            leaf_index: 0,
            valid_leaf_indices: BTreeSet::new(),
        }
    }

    /// A record for a chain that could not be evaluated at all.
    pub fn failed(id: i32, pools: &TrustPools, message: &str, kind: FailureKind) -> Self {
        let mut result = Self::new(id, pools);
        result.error = Some(message.to_string());
        for entry in result.stores.values_mut() {
            entry.record_error(message.to_string(), kind);
        }
        result
    }

    pub fn is_valid_in(&self, name: StoreName) -> bool {
        self.stores.get(&name).map(|r| r.is_valid).unwrap_or(false)
    }
}

/// Receive exactly `expected` results, placing each at its input position.
/// Returns an error instead of blocking forever if every producer is gone.
pub fn collect(
    rx: &Receiver<(usize, ChainValidationResult)>,
    expected: usize,
) -> Result<Vec<ChainValidationResult>, BatchError> {
    let mut slots: Vec<Option<ChainValidationResult>> = vec![None; expected];
    for received in 0..expected {
        let (pos, result) = rx
            .recv()
            .map_err(|_| BatchError::ResultsLost { expected, received })?;
        debug!(id = result.id, received = received + 1, expected, "collected result");
        if let Some(slot) = slots.get_mut(pos) {
            *slot = Some(result);
        }
    }
    let results: Vec<ChainValidationResult> = slots.into_iter().flatten().collect();
    if results.len() != expected {
        return Err(BatchError::ResultsLost { expected, received: results.len() });
    }
    Ok(results)
}

/// Persist results as JSON Lines, one record per chain.
pub fn write_json_lines(path: &Path, results: &[ChainValidationResult]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for r in results {
        serde_json::to_writer(&mut out, r)
            .with_context(|| format!("failed to serialize result for chain {}", r.id))?;
        out.write_all(b"\n")?;
    }
    out.flush()
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    info!(path = %path.display(), records = results.len(), "wrote results");
    Ok(())
}
