use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::error::FailureKind;
use crate::result::ChainValidationResult;
use crate::rootstores::TrustPools;

pub fn print_bold(stdout: &mut StandardStream, text: &str) -> Result<()> {
    stdout.set_color(ColorSpec::new().set_bold(true))?;
    write!(stdout, "{}", text)?;
    stdout.reset()?;
    Ok(())
}

// Per-store tallies: how many chains validated, and why the others did not.
pub fn print_summary(results: &[ChainValidationResult], pools: &TrustPools) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let total = results.len();
    print_bold(
        &mut stdout,
        &format!("--- Validation summary ({} chains, as of {}) ---", total, pools.context().as_of),
    )?;
    writeln!(&mut stdout)?;

    for store in pools.available() {
        let name = store.name();
        let valid = results.iter().filter(|r| r.is_valid_in(name)).count();
        let mut kinds: BTreeMap<FailureKind, usize> = BTreeMap::new();
        for r in results {
            if let Some(kind) = r.stores.get(&name).and_then(|s| s.error_kind) {
                *kinds.entry(kind).or_default() += 1;
            }
        }

        let color = if valid == total { Color::Green } else if valid == 0 { Color::Red } else { Color::Yellow };
        stdout.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(&mut stdout, "{:<18}", name.as_str())?;
        stdout.reset()?;
        writeln!(&mut stdout, " valid {}/{} ({} anchors)", valid, total, store.len())?;
        for (kind, n) in kinds {
            writeln!(&mut stdout, "  - {}: {}", kind.summary(), n)?;
        }
    }

    let unavailable: Vec<&str> = pools.unavailable().map(|n| n.as_str()).collect();
    if !unavailable.is_empty() {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(&mut stdout, "unavailable stores (skipped): {}", unavailable.join(", "))?;
        stdout.reset()?;
    }

    let generic = results.iter().filter(|r| r.error.is_some()).count();
    if generic > 0 {
        writeln!(&mut stdout, "chains without a usable leaf: {}", generic)?;
    }
    Ok(())
}
