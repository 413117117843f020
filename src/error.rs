use openssl::error::ErrorStack;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single chain element could not be turned into a certificate.
#[derive(Debug, Error)]
pub enum CertError {
    #[error("failed to parse PEM block")]
    NotPem,
    #[error("expected CERTIFICATE block, found {0}")]
    WrongBlockType(String),
    #[error("failed to parse certificate: {0}")]
    Der(#[source] ErrorStack),
}

/// A trust store that could not be loaded. Never fatal for the batch.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse root certificate {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: ErrorStack,
    },
    #[error("no root certificates in {0}")]
    Empty(String),
    #[error("failed to build certificate store: {0}")]
    Backend(#[from] ErrorStack),
}

/// Coarse classification of a path-verification failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownAuthority,
    ExpiredOrNotYetValid,
    NotAuthorizedToSign,
    TooManyIntermediates,
    UnhandledCriticalExtension,
    InvalidSignature,
    SelfSigned,
    InvalidLeaf,
    Other,
}

impl FailureKind {
    /// Map an OpenSSL `X509_V_ERR_*` code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            // UNABLE_TO_GET_ISSUER_CERT, UNABLE_TO_GET_ISSUER_CERT_LOCALLY,
            // UNABLE_TO_VERIFY_LEAF_SIGNATURE
            2 | 20 | 21 => FailureKind::UnknownAuthority,
            // CERT_NOT_YET_VALID, CERT_HAS_EXPIRED,
            // ERROR_IN_CERT_NOT_BEFORE_FIELD, ERROR_IN_CERT_NOT_AFTER_FIELD
            9 | 10 | 13 | 14 => FailureKind::ExpiredOrNotYetValid,
            // INVALID_CA, KEYUSAGE_NO_CERTSIGN
            24 | 32 => FailureKind::NotAuthorizedToSign,
            // CERT_CHAIN_TOO_LONG, PATH_LENGTH_EXCEEDED, PROXY_PATH_LENGTH_EXCEEDED
            22 | 25 | 38 => FailureKind::TooManyIntermediates,
            // UNHANDLED_CRITICAL_EXTENSION
            34 => FailureKind::UnhandledCriticalExtension,
            // UNABLE_TO_DECRYPT_CERT_SIGNATURE, UNABLE_TO_DECODE_ISSUER_PUBLIC_KEY,
            // CERT_SIGNATURE_FAILURE
            4 | 6 | 7 => FailureKind::InvalidSignature,
            // DEPTH_ZERO_SELF_SIGNED_CERT, SELF_SIGNED_CERT_IN_CHAIN
            18 | 19 => FailureKind::SelfSigned,
            _ => FailureKind::Other,
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            FailureKind::UnknownAuthority => "Signed by unknown authority",
            FailureKind::ExpiredOrNotYetValid => "Expired/Not yet valid",
            FailureKind::NotAuthorizedToSign => "Not authorized to sign other certificates",
            FailureKind::TooManyIntermediates => "Too many intermediate certificates",
            FailureKind::UnhandledCriticalExtension => "Unhandled critical extension",
            FailureKind::InvalidSignature => "Invalid signature",
            FailureKind::SelfSigned => "Self-signed",
            FailureKind::InvalidLeaf => "No valid leaf certificate",
            FailureKind::Other => "Other errors",
        }
    }
}

/// Outcome of a failed path validation against one trust store.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("{reason} (depth {depth} on {subject})")]
    Rejected {
        kind: FailureKind,
        reason: String,
        depth: u32,
        subject: String,
    },
    #[error("failed to append intermediate certificate: {0}")]
    Pool(#[source] ErrorStack),
    #[error("verification error: {0}")]
    Backend(#[from] ErrorStack),
}

impl VerifyError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VerifyError::Rejected { kind, .. } => *kind,
            _ => FailureKind::Other,
        }
    }
}

/// Conditions that stop a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no root certificates loaded")]
    NoTrustStores,
    #[error("result channel closed after {received} of {expected} results")]
    ResultsLost { expected: usize, received: usize },
}
