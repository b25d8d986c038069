//! Cache command - inspect and clear cached resolutions

use crate::cache::{format_bytes, Fingerprint, ResolutionRecord};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::commands::build_manager;
use crate::config::Config;
use crate::error::{DepcacheError, DepcacheResult};
use crate::manager::{CallOptions, DependencyManager};
use chrono::Utc;
use console::style;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> DepcacheResult<()> {
    let manager = build_manager(config);
    let opts = CallOptions::new();

    match args.action {
        CacheAction::List { format } => list_entries(&manager, &opts, format).await,
        CacheAction::Info => show_info(&manager, &opts).await,
        CacheAction::Gc { days, dry_run } => gc_entries(&manager, &opts, days, dry_run).await,
        CacheAction::Clear {
            fingerprint,
            module,
            yes,
        } => match (fingerprint, module) {
            (Some(fp), _) => clear_fingerprint(&manager, &opts, &fp).await,
            (None, Some(module)) => clear_module(&manager, &opts, &module).await,
            (None, None) => clear_all(&manager, &opts, yes).await,
        },
    }
}

/// List all cached resolutions
async fn list_entries(
    manager: &DependencyManager,
    opts: &CallOptions,
    format: OutputFormat,
) -> DepcacheResult<()> {
    let records = manager.cache_entries(opts).await?;

    if records.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("No cached resolutions found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&records),
        OutputFormat::Json => print_entry_json(&records)?,
        OutputFormat::Plain => {
            for record in &records {
                println!("{}", record.fingerprint);
            }
        }
    }

    Ok(())
}

fn print_entry_table(records: &[ResolutionRecord]) {
    println!(
        "{:<14} {:<24} {:<10} {:<22} {:<18}",
        "FINGERPRINT", "MODULE", "PACKAGES", "SOLVER", "CREATED"
    );
    println!("{}", "-".repeat(90));

    for record in records {
        let solver = format!("{} {}", record.solver.name, record.solver.version);
        let created = record.created_at.format("%Y-%m-%d %H:%M").to_string();

        println!(
            "{:<14} {:<24} {:<10} {:<22} {:<18}",
            record.fingerprint.short(),
            record.module,
            record.packages.len(),
            solver,
            created
        );
    }

    println!();
    println!("Total: {} resolution(s)", records.len());
}

fn print_entry_json(records: &[ResolutionRecord]) -> DepcacheResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        fingerprint: &'a str,
        module: &'a str,
        packages: Vec<String>,
        solver: String,
        created_at: String,
    }

    let entries: Vec<EntryJson<'_>> = records
        .iter()
        .map(|r| EntryJson {
            fingerprint: r.fingerprint.as_str(),
            module: &r.module,
            packages: r.packages.iter().map(|p| p.to_string()).collect(),
            solver: format!("{} {}", r.solver.name, r.solver.version),
            created_at: r.created_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

/// Show cache location and usage
async fn show_info(manager: &DependencyManager, opts: &CallOptions) -> DepcacheResult<()> {
    let stats = manager.cache_stats(opts).await?;

    println!("Cache directory: {}", manager.cache_dir(opts).display());
    println!("Entries:         {}", stats.entries);
    println!("Size:            {}", format_bytes(stats.total_bytes));

    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("Oldest:          {}", oldest.format("%Y-%m-%d %H:%M"));
        println!("Newest:          {}", newest.format("%Y-%m-%d %H:%M"));
    }

    Ok(())
}

/// Remove resolutions older than `days`
async fn gc_entries(
    manager: &DependencyManager,
    opts: &CallOptions,
    days: u32,
    dry_run: bool,
) -> DepcacheResult<()> {
    let records = manager.cache_entries(opts).await?;
    let stale: Vec<&ResolutionRecord> = records
        .iter()
        .filter(|r| r.is_older_than_days(days))
        .collect();

    if stale.is_empty() {
        println!("No resolutions older than {} days.", days);
        return Ok(());
    }

    println!(
        "Found {} resolution(s) older than {} days:",
        stale.len(),
        days
    );
    for record in &stale {
        let age_days = (Utc::now() - record.created_at).num_days();
        println!(
            "  {} {} {} ({} days old)",
            style("•").red(),
            record.fingerprint.short(),
            record.module,
            age_days
        );
    }

    if dry_run {
        println!();
        println!("Dry run - nothing removed.");
        return Ok(());
    }

    let removed = manager.prune_dependency_cache(days, opts).await?;
    println!();
    println!("{} removed {} resolution(s)", style("✓").green(), removed);

    Ok(())
}

async fn clear_fingerprint(
    manager: &DependencyManager,
    opts: &CallOptions,
    value: &str,
) -> DepcacheResult<()> {
    let fingerprint = Fingerprint::parse(value).ok_or_else(|| {
        DepcacheError::User(format!(
            "Invalid fingerprint '{}': expected 64 hex characters",
            value
        ))
    })?;

    let removed = manager
        .invalidate_dependency_cache(Some(&fingerprint), opts)
        .await?;
    if removed == 0 {
        println!("No cached resolution for {}.", fingerprint.short());
    } else {
        println!("{} removed {}", style("✓").green(), fingerprint.short());
    }
    Ok(())
}

async fn clear_module(
    manager: &DependencyManager,
    opts: &CallOptions,
    module: &str,
) -> DepcacheResult<()> {
    let removed = manager.invalidate_module_cache(module, opts).await?;
    println!(
        "{} removed {} resolution(s) for {}",
        style("✓").green(),
        removed,
        module
    );
    Ok(())
}

/// Clear every cached resolution
async fn clear_all(
    manager: &DependencyManager,
    opts: &CallOptions,
    skip_confirm: bool,
) -> DepcacheResult<()> {
    let records = manager.cache_entries(opts).await?;

    if records.is_empty() {
        println!("No cached resolutions to clear.");
        return Ok(());
    }

    println!("This will remove {} cached resolution(s):", records.len());
    for record in &records {
        println!(
            "  {} {} {}",
            style("•").red(),
            record.fingerprint.short(),
            record.module
        );
    }
    println!();

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = manager.invalidate_dependency_cache(None, opts).await?;
    println!("{} cleared {} resolution(s)", style("✓").green(), removed);

    Ok(())
}
