//! `cafcheck`: authenticate a CAF file and check folios against it.
//!
//! ```text
//! cafcheck <caf.xml> [folio ...] [--type N] [--mark]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sii_caf::caf::{CachedCafValidator, CafValidator, OracleError};
use sii_caf::config::load_config;

/// Authenticate a CAF file and check folios against its range.
#[derive(Parser, Debug)]
#[command(name = "cafcheck", version, long_about = None)]
struct Args {
    /// Path to the CAF XML file
    path: PathBuf,

    /// Folios to check against the authorized range
    folios: Vec<u64>,

    /// DTE type to look up (defaults to the CAF's own type)
    #[arg(short = 't', long = "type")]
    dte_type: Option<u32>,

    /// Mark authorized folios as used; a folio already marked is rejected
    #[arg(short, long)]
    mark: bool,
}

/// Check a folio for the CAF's own issuer and mark it used when authorized.
async fn claim_folio(
    validator: &CachedCafValidator,
    rut: &str,
    dte_type: u32,
    folio: u64,
) -> Result<bool, OracleError> {
    if !validator.validate_folio_for(rut, dte_type, folio).await? {
        return Ok(false);
    }
    validator.mark_folio_used(rut, dte_type, folio).await?;
    Ok(true)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let settings = load_config()?;

    let xml = tokio::fs::read(&args.path).await?;
    let cache = settings.build_cache()?;
    let validator = CachedCafValidator::with_config(cache, settings.validator_config())
        .with_used_folios(settings.build_used_folio_store()?);

    let result = validator.validate_caf(&xml).await?;
    let Some(caf) = result.caf() else {
        println!("INVALID {}: {}", args.path.display(), result.details());
        return Ok(ExitCode::FAILURE);
    };

    println!("VALID {}: {}", args.path.display(), result.details());
    println!("  RUT:        {}", caf.rut);
    println!("  DTE type:   {}", caf.dte_type);
    println!("  folios:     {} ({} total)", caf.range(), caf.available_folios());
    println!("  issued on:  {}", caf.issued_on.date_naive());
    println!("  expires on: {}", caf.expires_on.date_naive());
    println!("  sha256:     {}", caf.fingerprint());

    let dte_type = args.dte_type.unwrap_or(caf.dte_type.code());
    let mut rejected = false;

    for folio in args.folios {
        let checked = if args.mark {
            claim_folio(&validator, &caf.rut, dte_type, folio).await
        } else {
            validator.validate_folio(folio, dte_type).await
        };

        match checked {
            Ok(true) if args.mark => println!("folio {} authorized and marked used", folio),
            Ok(true) => println!("folio {} authorized", folio),
            Ok(false) => {
                println!("folio {} outside the authorized range", folio);
                rejected = true;
            }
            Err(e) if e.is_folio_used() => {
                println!("folio {} already used", folio);
                rejected = true;
            }
            Err(e) => {
                error!("Folio {} could not be checked: {}", folio, e);
                rejected = true;
            }
        }
    }

    info!("Finished checking {}", args.path.display());
    Ok(if rejected {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
