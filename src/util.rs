use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509NameEntries, X509NameRef, X509Ref, X509};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::error::CertError;

/// Decode one text-encoded chain element into a certificate. The block must be
/// labelled CERTIFICATE; anything else is rejected rather than guessed at.
pub fn certificate_from_pem(text: &str) -> Result<(X509, Vec<u8>), CertError> {
    let (_, pem) = parse_x509_pem(text.as_bytes()).map_err(|_| CertError::NotPem)?;
    if pem.label != "CERTIFICATE" {
        return Err(CertError::WrongBlockType(pem.label));
    }
    let cert = X509::from_der(&pem.contents).map_err(CertError::Der)?;
    Ok((cert, pem.contents))
}

/// True when the basic constraints extension marks the certificate as a CA.
/// Unreadable extensions count as "not a CA".
pub fn is_ca(der: &[u8]) -> bool {
    match X509Certificate::from_der(der) {
        Ok((_, parsed)) => parsed
            .basic_constraints()
            .ok()
            .flatten()
            .map(|bc| bc.value.ca)
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Render a compact single-line subject snippet; used in error messages.
pub fn format_name_human(entries: X509NameEntries<'_>) -> String {
    let mut parts: Vec<(Nid, String)> = Vec::new();
    for e in entries {
        let nid = e.object().nid();
        if let Ok(val) = e.data().as_utf8() {
            match nid {
                Nid::COMMONNAME | Nid::ORGANIZATIONNAME | Nid::COUNTRYNAME => {
                    parts.push((nid, val.to_string()))
                }
                _ => {}
            }
        }
    }

    let mut out = String::new();
    for nid in [Nid::COMMONNAME, Nid::ORGANIZATIONNAME, Nid::COUNTRYNAME] {
        for (n, v) in parts.iter() {
            if *n == nid {
                if !out.is_empty() {
                    out.push_str(", ");
                }
                let label = match nid {
                    Nid::COMMONNAME => "CN",
                    Nid::ORGANIZATIONNAME => "O",
                    _ => "C",
                };
                out.push_str(&format!("{}={}", label, v));
            }
        }
    }
    out
}

/// Return the SHA-256 fingerprint as contiguous uppercase hex.
pub fn fingerprint_sha256(cert: &X509Ref) -> Result<String, ErrorStack> {
    let d = cert.digest(MessageDigest::sha256())?;
    Ok(d.iter().map(|b| format!("{:02X}", b)).collect())
}

/// Convenience: extract Subject Common Name (CN) if present.
pub fn subject_cn(cert: &X509Ref) -> Option<String> {
    for e in cert.subject_name().entries() {
        if e.object().nid() == Nid::COMMONNAME {
            if let Ok(s) = e.data().as_utf8() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Encoding-independent form of a distinguished name, close to the one OpenSSL
/// compares names by: values in UTF-8, lower-cased, inner whitespace collapsed.
/// PrintableString and UTF8String spellings of one name map to the same key.
pub fn canonical_name(name: &X509NameRef) -> String {
    let mut out = String::new();
    for e in name.entries() {
        let value = match e.data().as_utf8() {
            Ok(v) => v.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            Err(_) => String::from_utf8_lossy(e.data().as_slice()).into_owned(),
        };
        out.push_str(&format!("/{}={}", e.object().nid().as_raw(), value));
    }
    out
}
