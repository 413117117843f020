use openssl::x509::X509;
use tracing::debug;

use crate::error::{CertError, FailureKind};
use crate::result::ChainValidationResult;
use crate::rootstores::TrustPools;
use crate::util::{certificate_from_pem, fingerprint_sha256, is_ca, subject_cn};
use crate::validate::{verify, ExplorationBudget};

/// One input record: an id and its certificates in whatever order the scan
/// produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateChain {
    pub id: i32,
    pub chain: Vec<String>,
}

#[derive(Debug)]
pub struct ParsedCert {
    pub cert: X509,
    pub fingerprint: String,
    pub is_ca: bool,
}

impl ParsedCert {
    pub fn from_pem(text: &str) -> Result<Self, CertError> {
        let (cert, der) = certificate_from_pem(text)?;
        let fingerprint = fingerprint_sha256(&cert).map_err(CertError::Der)?;
        Ok(Self { is_ca: is_ca(&der), cert, fingerprint })
    }
}

/// Every element of a chain, parsed once. Elements that fail to parse keep
/// their error so each position can still be reported on.
#[derive(Debug)]
pub struct ParsedChain {
    elements: Vec<Result<ParsedCert, CertError>>,
}

/// A leaf and the intermediate working set assembled for it.
#[derive(Debug)]
pub struct CandidatePath<'a> {
    pub leaf_index: usize,
    pub leaf: &'a ParsedCert,
    pub intermediates: Vec<usize>,
    pub pool: Vec<X509>,
}

impl ParsedChain {
    pub fn parse(chain: &CertificateChain) -> Self {
        let elements = chain
            .chain
            .iter()
            .map(|text| ParsedCert::from_pem(text))
            .collect();
        Self { elements }
    }

    /// Positions that may hold the leaf: anything not positively known to be
    /// a CA. Falls back to position 0 when every element is a CA.
    pub fn leaf_candidates(&self) -> Vec<usize> {
        let candidates: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| !matches!(e, Ok(c) if c.is_ca))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() && !self.elements.is_empty() {
            return vec![0];
        }
        candidates
    }

    /// Build the intermediate working set for the leaf at `leaf_index`.
    /// Copies of the leaf, unparsable elements and non-CA elements are left
    /// out; repeated certificates are only added once.
    pub fn assemble(&self, leaf_index: usize) -> Result<CandidatePath<'_>, &CertError> {
        let leaf = match &self.elements[leaf_index] {
            Ok(c) => c,
            Err(e) => return Err(e),
        };

        let mut intermediates = Vec::new();
        let mut pool: Vec<X509> = Vec::new();
        let mut seen = vec![leaf.fingerprint.as_str()];
        for (i, element) in self.elements.iter().enumerate() {
            if i == leaf_index {
                continue;
            }
            match element {
                Err(e) => debug!(index = i, error = %e, "skipping unparsable intermediate"),
                Ok(c) if !c.is_ca => {
                    debug!(index = i, subject = ?subject_cn(&c.cert), "skipping non-CA intermediate")
                }
                Ok(c) if seen.contains(&c.fingerprint.as_str()) => {
                    debug!(index = i, fingerprint = %c.fingerprint, "skipping repeated certificate")
                }
                Ok(c) => {
                    seen.push(c.fingerprint.as_str());
                    intermediates.push(i);
                    pool.push(c.cert.clone());
                }
            }
        }
        Ok(CandidatePath { leaf_index, leaf, intermediates, pool })
    }
}

/// Validate one chain against every available store, trying each leaf
/// candidate in turn and merging what they find.
pub fn validate_chain(
    chain: &CertificateChain,
    pools: &TrustPools,
    max_explorations: usize,
) -> ChainValidationResult {
    if chain.chain.is_empty() {
        debug!(id = chain.id, "empty chain");
        return ChainValidationResult::failed(
            chain.id,
            pools,
            "chain has no certificates",
            FailureKind::InvalidLeaf,
        );
    }

    let parsed = ParsedChain::parse(chain);
    let candidates = parsed.leaf_candidates();
    let mut result = ChainValidationResult::new(chain.id, pools);
    let mut parsed_leaves = 0;

    for &leaf_index in &candidates {
        let candidate = match parsed.assemble(leaf_index) {
            Ok(c) => c,
            Err(e) => {
                debug!(id = chain.id, leaf = leaf_index, error = %e, "leaf candidate unparsable");
                let message = format!("leaf certificate #{}: {}", leaf_index, e);
                for entry in result.stores.values_mut() {
                    entry.record_error(message.clone(), FailureKind::InvalidLeaf);
                }
                continue;
            }
        };
        parsed_leaves += 1;
        debug!(
            id = chain.id,
            leaf = candidate.leaf_index,
            intermediates = ?candidate.intermediates,
            "trying leaf candidate"
        );

        let mut budget = ExplorationBudget::new(max_explorations);
        for store in pools.available() {
            let entry = result.stores.entry(store.name()).or_default();
            match verify(&candidate.leaf.cert, &candidate.pool, store, &mut budget) {
                Ok(paths) => {
                    for path in paths {
                        let depth = path.len();
                        if entry.add_path(path) {
                            debug!(id = chain.id, store = %store.name(), depth, "new path");
                        }
                    }
                    entry.mark_valid();
                    result.valid_leaf_indices.insert(leaf_index);
                }
                Err(e) => {
                    debug!(id = chain.id, leaf = leaf_index, store = %store.name(), error = %e, "no valid path");
                    entry.record_verify_error(&e);
                }
            }
        }
        if budget.exhausted() {
            debug!(id = chain.id, leaf = leaf_index, explored = budget.spent(), "exploration cap reached");
        }
    }

    if parsed_leaves == 0 {
        result.error = Some("chain has no valid leaf certificate".to_string());
    }
    result.leaf_index = result
        .valid_leaf_indices
        .first()
        .copied()
        .unwrap_or(candidates[0]);
    debug!(
        id = chain.id,
        leaf = result.leaf_index,
        valid_leaves = ?result.valid_leaf_indices,
        "validated certificate chain"
    );
    result
}
