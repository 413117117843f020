use openssl::stack::Stack;
use openssl::x509::{X509Ref, X509StoreContext, X509VerifyResult, X509};
use tracing::trace;

use crate::error::{FailureKind, VerifyError};
use crate::result::VerifiedPath;
use crate::rootstores::TrustStore;
use crate::util::{fingerprint_sha256, format_name_human};

/// Cap on explored intermediate arrangements per (chain, leaf) pair.
pub const MAX_EXPLORED_ARRANGEMENTS: usize = 250_000;

/// Work counter shared by every store tried for one leaf candidate.
#[derive(Debug)]
pub struct ExplorationBudget {
    limit: usize,
    spent: usize,
}

impl ExplorationBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, spent: 0 }
    }

    /// Consume one unit; false once the cap is reached.
    pub fn spend(&mut self) -> bool {
        if self.spent >= self.limit {
            return false;
        }
        self.spent += 1;
        true
    }

    pub fn exhausted(&self) -> bool {
        self.spent >= self.limit
    }

    pub fn spent(&self) -> usize {
        self.spent
    }
}

/// Verify `leaf` against `store` with exactly the given intermediates.
/// Time and purpose come from the store's verification context.
pub fn verify_path(
    leaf: &X509Ref,
    intermediates: &[&X509Ref],
    store: &TrustStore,
) -> Result<VerifiedPath, VerifyError> {
    let mut stack: Stack<X509> = Stack::new()?;
    for c in intermediates {
        stack.push((*c).to_owned()).map_err(VerifyError::Pool)?;
    }

    let mut ctx = X509StoreContext::new()?;
    let outcome = ctx.init(store.x509_store(), leaf, &stack, |c| {
        if c.verify_cert()? {
            let mut fps = Vec::new();
            if let Some(chain) = c.chain() {
                for cert in chain {
                    fps.push(fingerprint_sha256(cert)?);
                }
            }
            return Ok(Ok(VerifiedPath::new(fps)));
        }
        let err = c.error();
        let subject = c
            .current_cert()
            .map(|cc| {
                let subj = format_name_human(cc.subject_name().entries());
                if subj.is_empty() { "<unknown subject>".to_string() } else { subj }
            })
            .unwrap_or_else(|| "<unknown certificate>".to_string());
        Ok(Err(VerifyError::Rejected {
            kind: FailureKind::from_raw(err.as_raw()),
            reason: err.error_string().to_string(),
            depth: c.error_depth(),
            subject,
        }))
    })?;
    outcome
}

/// Find every distinct path from `leaf` to an anchor of `store` using
/// certificates from `pool`.
///
/// One verification with the whole pool comes first. Alternative paths are
/// then surfaced by walking the issuer graph over the pool and re-verifying
/// each arrangement that reaches an anchor with only its own intermediates.
/// If the whole-pool call fails but an arrangement verifies, the arrangement
/// wins; otherwise the whole-pool error is returned.
pub fn verify(
    leaf: &X509Ref,
    pool: &[X509],
    store: &TrustStore,
    budget: &mut ExplorationBudget,
) -> Result<Vec<VerifiedPath>, VerifyError> {
    trace!(store = %store.name(), as_of = %store.context().as_of, pool = pool.len(), "verifying leaf");
    let all: Vec<&X509Ref> = pool.iter().map(|c| c.as_ref()).collect();
    let base = verify_path(leaf, &all, store);

    let mut found = Vec::new();
    if let Ok(path) = &base {
        found.push(path.clone());
    }

    let mut explorer = Explorer { leaf, pool, store, budget, found: &mut found };
    explorer.walk(leaf, &mut Vec::new());

    match base {
        Err(e) if found.is_empty() => Err(e),
        _ => Ok(found),
    }
}

struct Explorer<'a> {
    leaf: &'a X509Ref,
    pool: &'a [X509],
    store: &'a TrustStore,
    budget: &'a mut ExplorationBudget,
    found: &'a mut Vec<VerifiedPath>,
}

impl Explorer<'_> {
    fn walk(&mut self, current: &X509Ref, path: &mut Vec<usize>) {
        if !self.budget.spend() {
            return;
        }

        if self.store.contains(current) || self.store.issues(current) {
            let pool = self.pool;
            let intermediates: Vec<&X509Ref> = path.iter().map(|&i| pool[i].as_ref()).collect();
            match verify_path(self.leaf, &intermediates, self.store) {
                Ok(p) if !self.found.contains(&p) => self.found.push(p),
                Ok(_) => {}
                Err(e) => trace!(store = %self.store.name(), arrangement = ?path, error = %e, "arrangement rejected"),
            }
        }

        let pool = self.pool;
        for (i, cand) in pool.iter().enumerate() {
            if path.contains(&i) || cand.issued(current) != X509VerifyResult::OK {
                continue;
            }
            path.push(i);
            self.walk(cand, path);
            path.pop();
            if self.budget.exhausted() {
                return;
            }
        }
    }
}
