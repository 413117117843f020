use super::*;
use crate::input::{load_ccadb_roots, load_chains_csv, parse_pem_list};
use std::fs;

fn python_list(pems: &[String]) -> String {
    let items: Vec<String> = pems.iter().map(|p| format!("'{}'", p.replace('\n', "\\n"))).collect();
    format!("[{}]", items.join(", "))
}

#[test]
fn pem_list_accepts_single_quotes() {
    let list = python_list(&["-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".to_string()]);
    let pems = parse_pem_list(&list).unwrap();
    assert_eq!(pems.len(), 1);
    assert!(pems[0].starts_with("-----BEGIN CERTIFICATE-----\n"));

    assert!(parse_pem_list("[]").unwrap().is_empty());
    assert!(parse_pem_list("not a list").is_err());
}

#[test]
fn pem_list_allows_line_breaks_between_elements() {
    let pems = parse_pem_list("['a',\n 'b']").unwrap();
    assert_eq!(pems, vec!["a".to_string(), "b".to_string()]);

    let pems = parse_pem_list("[\r\n  'x\r\ny',\n  \"z\"\n]").unwrap();
    assert_eq!(pems, vec!["x\ny".to_string(), "z".to_string()]);
}

#[test]
fn loads_chain_csv() {
    let p = pki();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chains.csv");

    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(["id", "chain"]).unwrap();
    writer.write_record(["1", python_list(&[pem(&p.leaf), pem(&p.int)]).as_str()]).unwrap();
    writer.write_record(["2", "[]"]).unwrap();
    writer.flush().unwrap();

    let chains = load_chains_csv(&path).unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].id, 1);
    assert_eq!(chains[0].chain, vec![pem(&p.leaf), pem(&p.int)]);
    assert!(chains[1].chain.is_empty());
}

#[test]
fn chain_csv_with_literal_line_breaks() {
    let p = pki();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chains.csv");

    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(["id", "chain"]).unwrap();
    writer.write_record(["5", format!("['{}']", pem(&p.leaf)).as_str()]).unwrap();
    writer.flush().unwrap();

    let chains = load_chains_csv(&path).unwrap();
    assert_eq!(chains[0].chain, vec![pem(&p.leaf)]);
}

#[test]
fn bad_id_is_reported_with_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chains.csv");
    fs::write(&path, "id,chain\nabc,[]\n").unwrap();

    let err = load_chains_csv(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("row 1"), "{:#}", err);
}

#[test]
fn missing_input_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_chains_csv(&dir.path().join("absent.csv")).is_err());
}

#[test]
fn ccadb_roots_respect_distrust_date() {
    let p = pki();
    let other = build_cert("Other Root", true, ca_validity(), None, &gen_key());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("IncludedRootsDistrustTLSSSLPEM.csv");

    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(["PEM", "Distrust for TLS After Date"]).unwrap();
    writer.write_record([format!("'{}'", pem(&p.root)), String::new()]).unwrap();
    writer.write_record([format!("'{}'", pem(&other)), "2023.03.01".to_string()]).unwrap();
    writer.flush().unwrap();

    let roots = load_ccadb_roots(&path, day(2023, 6, 1)).unwrap();
    assert_eq!(roots, vec![pem(&p.root)]);

    let roots = load_ccadb_roots(&path, day(2023, 1, 1)).unwrap();
    assert_eq!(roots.len(), 2);

    // The surviving PEMs feed straight into a store.
    let store = TrustStore::load(
        StoreName::CcadbTls,
        &crate::rootstores::TrustMaterial::Pems(roots),
        &mid_2023(),
    )
    .unwrap();
    assert_eq!(store.len(), 2);
}
