//! CLI command implementations

pub mod cache;
pub mod config;
pub mod refresh;
pub mod resolve;
pub mod upgrade;

pub use cache::execute as cache;
pub use config::execute as config;
pub use refresh::execute as refresh;
pub use resolve::execute as resolve;
pub use upgrade::execute as upgrade;

use crate::cli::args::{DiscoveryArgs, OutputFormat};
use crate::config::Config;
use crate::diagnostics::{DiagnosticSink, FanoutSink, JsonlSink, TracingSink};
use crate::discovery::discover_requirement_files;
use crate::error::{DepcacheError, DepcacheResult};
use crate::manager::{DependencyManager, ManagerConfig};
use crate::resolver::{create_resolver, Pin};
use console::style;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Module name used when neither --module nor a file gives one
const DEFAULT_MODULE: &str = "cli";

/// Build the manager every command talks to
pub(crate) fn build_manager(config: &Config) -> DependencyManager {
    let resolver = create_resolver(&config.resolver);
    DependencyManager::new(resolver, ManagerConfig::from_config(config))
        .with_diagnostics(diagnostics_sink(config))
}

/// Tracing, plus a JSON lines file when `general.diagnostics_log` is set
fn diagnostics_sink(config: &Config) -> Arc<dyn DiagnosticSink> {
    match config.general.diagnostics_log {
        Some(ref path) => Arc::new(FanoutSink::new(vec![
            Arc::new(TracingSink),
            Arc::new(JsonlSink::new(path.clone())),
        ])),
        None => Arc::new(TracingSink),
    }
}

/// Module name and requirement text from packages and an optional file
///
/// Returns `None` when neither was given, so the caller can discover files.
pub(crate) async fn module_input(
    packages: &[String],
    requirements: Option<&Path>,
    module: Option<&str>,
) -> DepcacheResult<Option<(String, String)>> {
    if packages.is_empty() && requirements.is_none() {
        return Ok(None);
    }

    let mut text = packages.join("\n");
    if let Some(path) = requirements {
        text.push('\n');
        text.push_str(&read_requirements(path).await?);
    }

    let module = module
        .map(str::to_string)
        .or_else(|| requirements.and_then(module_name))
        .unwrap_or_else(|| DEFAULT_MODULE.to_string());

    Ok(Some((module, text)))
}

/// Discovered requirement files, read into module name -> text
pub(crate) async fn discover_modules(
    args: &DiscoveryArgs,
) -> DepcacheResult<BTreeMap<String, String>> {
    let files = discover_requirement_files(&args.search_dirs, &args.pattern)?;
    if files.is_empty() {
        return Err(DepcacheError::User(format!(
            "No requirements files matching '{}' found. Pass packages or --requirements FILE",
            args.pattern
        )));
    }

    let mut modules = BTreeMap::new();
    for (module, path) in files {
        modules.insert(module, read_requirements(&path).await?);
    }
    Ok(modules)
}

pub(crate) async fn read_requirements(path: &Path) -> DepcacheResult<String> {
    fs::read_to_string(path)
        .await
        .map_err(|e| DepcacheError::io(format!("reading {}", path.display()), e))
}

/// Module name derived from a requirements file name
pub(crate) fn module_name(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

pub(crate) fn print_pins(pins: &[Pin], format: OutputFormat) -> DepcacheResult<()> {
    match format {
        OutputFormat::Table => print_pin_table(pins),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(pins)?),
        OutputFormat::Plain => {
            for pin in pins {
                println!("{}=={}", pin.name, pin.version);
            }
        }
    }
    Ok(())
}

fn print_pin_table(pins: &[Pin]) {
    if pins.is_empty() {
        println!("Nothing to pin.");
        return;
    }

    println!("{:<40} {:<20}", "PACKAGE", "VERSION");
    println!("{}", "-".repeat(60));
    for pin in pins {
        println!("{:<40} {:<20}", pin.name, pin.version);
    }
    println!();
    println!("Total: {} package(s)", pins.len());
}

/// One line per module, then an error if any module failed
pub(crate) fn report_outcomes(
    outcomes: &BTreeMap<String, DepcacheResult<Vec<Pin>>>,
    summary: &str,
) -> DepcacheResult<()> {
    for (module, outcome) in outcomes {
        match outcome {
            Ok(pins) => println!(
                "  {} {} ({} package(s))",
                style("✓").green(),
                module,
                pins.len()
            ),
            Err(e) => println!("  {} {}: {}", style("✗").red(), module, e),
        }
    }

    let failed = outcomes.values().filter(|o| o.is_err()).count();
    println!();
    println!("{}", summary);

    if failed > 0 {
        return Err(DepcacheError::User(format!(
            "{} module(s) failed to resolve",
            failed
        )));
    }
    Ok(())
}
