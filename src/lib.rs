pub mod cli;
pub mod data;
pub mod decode;
pub mod dedup;
pub mod error;
pub mod io_utils;
pub mod ledger;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod table;

use std::{env, fs::File, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};
use rusqlite::{Connection, OpenFlags};

use crate::{
    cli::{Cli, Commands, IngestArgs, LedgerArgs, TargetArgs},
    ledger::LedgerStore,
    pipeline::Pipeline,
    profile::{DEFAULT_FAILURE_LEDGER, DEFAULT_SUCCESS_LEDGER, TargetProfile},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_stager", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&args),
        Commands::Ledger(args) => handle_ledger(&args),
    }
}

fn handle_ingest(args: &IngestArgs) -> Result<()> {
    let profile = resolve_ingest_profile(args)?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Importing '{}' files from {:?} into '{}' ({:?})",
        args.extension, args.source, profile.target_table, args.database
    );
    debug!("Resolved profile: {profile:?}");

    let files = io_utils::list_source_files(&args.source, &args.extension)?;
    if files.is_empty() {
        info!("No '{}' files found in {:?}", args.extension, args.source);
    }

    let mut pipeline = Pipeline::open(&args.database, &profile)
        .with_context(|| format!("Preparing database {:?}", args.database))?
        .with_source_format(args.delimiter, encoding);
    let summary = pipeline.run(&files);
    drop(pipeline);

    if !summary.files.is_empty() {
        print!("{}", table::render_summary(&summary));
    }
    let failed = summary.failed_files();
    if failed.is_empty() {
        println!("\nAll files imported successfully.");
    } else {
        println!("\nThe following files failed to import:");
        for name in &failed {
            println!(" - {name}");
        }
    }
    info!(
        "Run finished: {} file(s), {} row(s) inserted, {} failure(s)",
        summary.files.len(),
        summary.rows_inserted(),
        failed.len()
    );

    if let Some(path) = &args.report {
        let file = File::create(path).with_context(|| format!("Creating report {path:?}"))?;
        serde_json::to_writer_pretty(file, &summary).context("Writing run report JSON")?;
        info!("Run report written to {path:?}");
    }

    if args.strict && !failed.is_empty() {
        return Err(anyhow!("{} file(s) failed to import", failed.len()));
    }
    Ok(())
}

fn handle_ledger(args: &LedgerArgs) -> Result<()> {
    let (success, failure) = match load_profile(&args.target)? {
        Some(profile) => (profile.success_ledger, profile.failure_ledger),
        None => (
            args.target
                .success_ledger
                .clone()
                .unwrap_or_else(|| DEFAULT_SUCCESS_LEDGER.to_string()),
            args.target
                .failure_ledger
                .clone()
                .unwrap_or_else(|| DEFAULT_FAILURE_LEDGER.to_string()),
        ),
    };
    let ledger = LedgerStore::new(&success, &failure)?;
    // Listing never creates the database or its ledger tables.
    let conn = Connection::open_with_flags(&args.database, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Opening database {:?}", args.database))?;
    if args.failures {
        let entries = ledger
            .failures(&conn)
            .with_context(|| format!("Reading ledger '{}'", ledger.failure_table()))?;
        info!("{} failure(s) recorded in '{}'", entries.len(), ledger.failure_table());
        print!("{}", table::render_failures(&entries));
    } else {
        let entries = ledger
            .successes(&conn)
            .with_context(|| format!("Reading ledger '{}'", ledger.success_table()))?;
        info!("{} file(s) recorded in '{}'", entries.len(), ledger.success_table());
        print!("{}", table::render_successes(&entries));
    }
    Ok(())
}

/// Loads the profile file (if any) and applies the shared table/ledger overrides.
fn load_profile(args: &TargetArgs) -> Result<Option<TargetProfile>> {
    let mut profile = match (&args.profile, &args.table) {
        (Some(path), _) => TargetProfile::load(path)
            .with_context(|| format!("Loading profile from {path:?}"))?,
        (None, Some(table)) => TargetProfile::new(table.clone()),
        (None, None) => return Ok(None),
    };
    if let Some(table) = &args.table {
        profile.target_table = table.clone();
    }
    if let Some(success) = &args.success_ledger {
        profile.success_ledger = success.clone();
    }
    if let Some(failure) = &args.failure_ledger {
        profile.failure_ledger = failure.clone();
    }
    Ok(Some(profile))
}

fn resolve_ingest_profile(args: &IngestArgs) -> Result<TargetProfile> {
    let mut profile = load_profile(&args.target)?
        .ok_or_else(|| anyhow!("Either --profile or --table must be provided"))?;
    if let Some(key) = &args.key_column {
        profile.key_column = Some(key.clone());
    }
    if !args.date_columns.is_empty() {
        profile.date_columns = args.date_columns.clone();
    }
    if !args.nullable_date_columns.is_empty() {
        profile.nullable_date_columns = args.nullable_date_columns.clone();
    }
    if !args.datetime_columns.is_empty() {
        profile.datetime_columns = args.datetime_columns.clone();
    }
    profile.validate()?;
    Ok(profile)
}
