use super::*;
use crate::chain::{validate_chain, ParsedChain};
use crate::error::FailureKind;
use crate::util::fingerprint_sha256;
use crate::validate::MAX_EXPLORED_ARRANGEMENTS;

#[test]
fn leaf_candidates_skip_known_cas() {
    let p = pki();
    let parsed = ParsedChain::parse(&chain_of(1, &[&p.root, &p.int, &p.leaf]));
    assert_eq!(parsed.leaf_candidates(), vec![2]);

    let parsed = ParsedChain::parse(&CertificateChain {
        id: 2,
        chain: vec![pem(&p.leaf), GARBAGE.to_string(), pem(&p.int)],
    });
    assert_eq!(parsed.leaf_candidates(), vec![0, 1]);
}

#[test]
fn all_ca_chain_falls_back_to_first_position() {
    let p = pki();
    let parsed = ParsedChain::parse(&chain_of(1, &[&p.int, &p.root]));
    assert_eq!(parsed.leaf_candidates(), vec![0]);
}

#[test]
fn assemble_keeps_only_distinct_cas() {
    let p = pki();
    let other_leaf = build_cert("other.example.com", false, leaf_validity(), Some((&p.int, &p.int_key)), &gen_key());
    let parsed = ParsedChain::parse(&CertificateChain {
        id: 1,
        chain: vec![
            pem(&p.leaf),
            pem(&p.int),
            GARBAGE.to_string(),
            pem(&p.leaf),
            pem(&other_leaf),
            pem(&p.int),
            pem(&p.root),
        ],
    });

    let candidate = parsed.assemble(0).unwrap();
    assert_eq!(candidate.leaf_index, 0);
    assert_eq!(candidate.intermediates, vec![1, 6]);
    assert_eq!(candidate.pool.len(), 2);

    assert!(parsed.assemble(2).is_err());
}

#[test]
fn reversed_chain_finds_leaf_at_end() {
    let p = pki();
    let pools = pools_with(StoreName::CcadbTls, vec![p.root.clone()], mid_2023());

    let result = validate_chain(&chain_of(7, &[&p.root, &p.int, &p.leaf]), &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert_eq!(result.id, 7);
    assert!(result.error.is_none());
    assert_eq!(result.leaf_index, 2);
    assert_eq!(result.valid_leaf_indices.iter().copied().collect::<Vec<_>>(), vec![2]);

    let entry = &result.stores[&StoreName::CcadbTls];
    assert!(entry.is_valid);
    assert!(entry.error.is_none());
    assert_eq!(entry.valid_chains.len(), 1);
    assert_eq!(entry.valid_chains[0].fingerprints()[0], fingerprint_sha256(&p.leaf).unwrap());
}

#[test]
fn unparsable_element_is_skipped() {
    let p = pki();
    let pools = pools_with(StoreName::Custom, vec![p.root.clone()], mid_2023());

    let chain = CertificateChain { id: 1, chain: vec![pem(&p.leaf), pem(&p.int), GARBAGE.to_string()] };
    let result = validate_chain(&chain, &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert!(result.is_valid_in(StoreName::Custom));
    assert_eq!(result.leaf_index, 0);
    assert!(result.stores[&StoreName::Custom].error.is_none());

    let chain = CertificateChain { id: 2, chain: vec![GARBAGE.to_string(), pem(&p.leaf), pem(&p.int)] };
    let result = validate_chain(&chain, &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert!(result.is_valid_in(StoreName::Custom));
    assert_eq!(result.leaf_index, 1);
    assert!(result.error.is_none());
}

#[test]
fn repeated_leaf_is_valid_at_both_positions() {
    let p = pki();
    let pools = pools_with(StoreName::Custom, vec![p.root.clone()], mid_2023());

    let result = validate_chain(&chain_of(1, &[&p.leaf, &p.leaf, &p.int]), &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert_eq!(result.valid_leaf_indices.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(result.leaf_index, 0);
    assert_eq!(result.stores[&StoreName::Custom].valid_chains.len(), 1);
}

#[test]
fn repeated_intermediates_collapse() {
    let p = pki();
    let pools = pools_with(StoreName::Custom, vec![p.root.clone()], mid_2023());

    let result = validate_chain(&chain_of(1, &[&p.leaf, &p.int, &p.int]), &pools, MAX_EXPLORED_ARRANGEMENTS);
    let entry = &result.stores[&StoreName::Custom];
    assert!(entry.is_valid);
    assert_eq!(entry.valid_chains.len(), 1);
    assert_eq!(entry.valid_chains[0].len(), 3);
}

#[test]
fn empty_chain_fails_every_store() {
    let p = pki();
    let pools = pools_with(StoreName::Custom, vec![p.root.clone()], mid_2023());

    let result = validate_chain(&CertificateChain { id: 3, chain: vec![] }, &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert!(result.error.is_some());
    assert!(result.valid_leaf_indices.is_empty());
    let entry = &result.stores[&StoreName::Custom];
    assert!(!entry.is_valid);
    assert_eq!(entry.error_kind, Some(FailureKind::InvalidLeaf));
}

#[test]
fn chain_of_garbage_has_generic_error() {
    let p = pki();
    let pools = pools_with(StoreName::Custom, vec![p.root.clone()], mid_2023());

    let chain = CertificateChain { id: 4, chain: vec![GARBAGE.to_string(), GARBAGE.to_string()] };
    let result = validate_chain(&chain, &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert_eq!(result.error.as_deref(), Some("chain has no valid leaf certificate"));
    assert_eq!(result.leaf_index, 0);
    let entry = &result.stores[&StoreName::Custom];
    assert!(!entry.is_valid);
    assert!(entry.error.as_deref().unwrap_or_default().starts_with("leaf certificate #0"));
}

#[test]
fn stores_are_judged_independently() {
    let p = pki();
    let unrelated = build_cert("Unrelated Root", true, ca_validity(), None, &gen_key());
    let mut builder = TrustPools::builder(mid_2023());
    builder.insert(TrustStore::from_anchors(StoreName::CcadbTls, vec![p.root.clone()], &mid_2023()).unwrap());
    builder.insert(TrustStore::from_anchors(StoreName::Apple, vec![unrelated], &mid_2023()).unwrap());
    let pools = builder.build();

    let result = validate_chain(&chain_of(1, &[&p.leaf, &p.int]), &pools, MAX_EXPLORED_ARRANGEMENTS);
    assert!(result.is_valid_in(StoreName::CcadbTls));
    assert!(!result.is_valid_in(StoreName::Apple));
    let apple = &result.stores[&StoreName::Apple];
    assert!(apple.valid_chains.is_empty());
    assert_eq!(apple.error_kind, Some(FailureKind::UnknownAuthority));
    assert_eq!(result.valid_leaf_indices.len(), 1);
}
