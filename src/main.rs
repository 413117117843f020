use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod chain;
mod cli;
mod error;
mod fetch;
mod input;
mod orchestrator;
mod print;
mod result;
mod rootstores;
mod util;
mod validate;

use crate::cli::{Cli, Command, FetchArgs, ValidateArgs};
use crate::error::BatchError;
use crate::fetch::fetch_root_stores;
use crate::input::{load_ccadb_roots, load_chains_csv};
use crate::orchestrator::{validate_batch, ValidationOptions};
use crate::print::print_summary;
use crate::result::write_json_lines;
use crate::rootstores::{StoreName, TrustMaterial, TrustPools, VerifyContext};

/// Entry point wiring CLI, logging, root store loading, validation and output.

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match &cli.command {
        Command::Validate(args) => run_validate(args)?,
        Command::Fetch(args) => run_fetch(args)?,
    }

    Ok(())
}

fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            fmt().json().with_env_filter(filter).with_writer(Mutex::new(file)).init();
        }
        None => fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(?args, "inputs");
    let context = VerifyContext { as_of: args.scan_date, key_usage: args.key_usage };

    // Stores first: a configuration with no usable store must stop before any chain is read.
    let pools = load_pools(args, context);
    if pools.is_empty() {
        return Err(BatchError::NoTrustStores.into());
    }

    let chains = load_chains_csv(&args.input_csv)?;
    if chains.is_empty() {
        bail!("no certificate chain to validate in {}", args.input_csv.display());
    }

    let mut options = ValidationOptions::default();
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    options.max_explorations = args.max_explorations;

    let start = Instant::now();
    let results = validate_batch(chains, &pools, &options)?;
    info!(elapsed = ?start.elapsed(), "validation time");

    write_json_lines(&args.output, &results)?;
    print_summary(&results, &pools)?;
    Ok(())
}

// Load every store the arguments point at; failures only make that store unavailable.
fn load_pools(args: &ValidateArgs, context: VerifyContext) -> TrustPools {
    let mut builder = TrustPools::builder(context);
    for name in StoreName::ALL {
        let Some(path) = store_path(args, name) else { continue };
        let material = match name {
            StoreName::CcadbTls | StoreName::CcadbSmime => {
                match load_ccadb_roots(&path, context.as_of) {
                    Ok(pems) => TrustMaterial::Pems(pems),
                    Err(e) => {
                        warn!(store = %name, error = %format!("{:#}", e), "root store unavailable");
                        builder.mark_unavailable(name);
                        continue;
                    }
                }
            }
            StoreName::MicrosoftWindows => TrustMaterial::DerDir(path),
            _ => TrustMaterial::PemFile(path),
        };
        // Already logged by the builder.
        let _ = builder.load(name, &material);
    }
    builder.build()
}

fn store_path(args: &ValidateArgs, name: StoreName) -> Option<PathBuf> {
    let explicit = match name {
        StoreName::CcadbTls => &args.ccadb_tls_csv,
        StoreName::CcadbSmime => &args.ccadb_smime_csv,
        StoreName::GoogleServices => &args.google_services_pem,
        StoreName::Apple => &args.apple_pem,
        StoreName::MicrosoftWindows => &args.windows_der_dir,
        StoreName::Custom => &args.root_ca_file,
    };
    explicit.clone().or_else(|| {
        let path = args.roots_dir.as_ref()?.join(name.default_file_name()?);
        path.exists().then_some(path)
    })
}

fn run_fetch(args: &FetchArgs) -> Result<()> {
    let written = fetch_root_stores(&args.dir)?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
