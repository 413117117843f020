use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::rootstores::KeyUsagePolicy;

/// Top-level CLI with subcommands.
#[derive(Parser, Debug)]
#[command(
    name = "cert-validator",
    version,
    about = "Validate scanned X.509 chains against several root stores"
)]
pub struct Cli {
    /// Verbosity: -v for info, -vv for debug (default: warnings only)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs as JSON to this file instead of the terminal
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a batch of chains
    Validate(ValidateArgs),
    /// Download the public root stores into a directory
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Input CSV (header, then `id,chain` rows)
    #[arg(short = 'i', long = "input-csv", required = true)]
    pub input_csv: PathBuf,

    /// Output file (JSON Lines); will be created/overwritten
    #[arg(short = 'o', long = "output", required = true)]
    pub output: PathBuf,

    /// Date the certificates were collected (YYYYMMDD)
    #[arg(short = 'd', long = "scan-date", required = true, value_parser = parse_scan_date)]
    pub scan_date: NaiveDate,

    /// Directory holding root stores under their default file names
    #[arg(long = "roots-dir")]
    pub roots_dir: Option<PathBuf>,

    /// CCADB TLS roots CSV export
    #[arg(long = "ccadb-tls-csv")]
    pub ccadb_tls_csv: Option<PathBuf>,

    /// CCADB S/MIME roots CSV export
    #[arg(long = "ccadb-smime-csv")]
    pub ccadb_smime_csv: Option<PathBuf>,

    /// Google services roots (PEM bundle)
    #[arg(long = "google-services-pem")]
    pub google_services_pem: Option<PathBuf>,

    /// Apple roots (PEM bundle)
    #[arg(long = "apple-pem")]
    pub apple_pem: Option<PathBuf>,

    /// Microsoft Windows roots (directory of DER files)
    #[arg(long = "windows-der-dir")]
    pub windows_der_dir: Option<PathBuf>,

    /// Additional custom root store (PEM bundle)
    #[arg(long = "root-ca-file")]
    pub root_ca_file: Option<PathBuf>,

    /// Worker threads (default: available parallelism)
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Cap on explored intermediate arrangements per chain and leaf
    #[arg(long = "max-explorations", default_value_t = crate::validate::MAX_EXPLORED_ARRANGEMENTS)]
    pub max_explorations: usize,

    /// Key usage policy applied along each path
    #[arg(long = "key-usage", value_enum, default_value_t = KeyUsagePolicy::Any)]
    pub key_usage: KeyUsagePolicy,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Destination directory; created if missing
    #[arg(long = "dir", required = true)]
    pub dir: PathBuf,
}

fn parse_scan_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|e| format!("incorrect scan date {:?} (use YYYYMMDD): {}", s, e))
}
