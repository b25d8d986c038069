//! Refresh command - bulk re-resolve requirement files

use crate::cli::args::RefreshArgs;
use crate::cli::commands::{
    build_manager, discover_modules, module_name, read_requirements, report_outcomes,
};
use crate::config::Config;
use crate::error::DepcacheResult;
use crate::manager::{CallOptions, DependencyManager};
use std::collections::BTreeMap;

/// Execute the refresh command
pub async fn execute(args: RefreshArgs, config: &Config) -> DepcacheResult<()> {
    let modules = if args.requirements.is_empty() {
        discover_modules(&args.discovery).await?
    } else {
        let mut modules = BTreeMap::new();
        for path in &args.requirements {
            let content = read_requirements(path).await?;

            // Two files with the same stem stay distinct modules
            let name = match module_name(path) {
                Some(name) if !modules.contains_key(&name) => name,
                _ => path.display().to_string(),
            };
            modules.insert(name, content);
        }
        modules
    };

    refresh_modules(&build_manager(config), modules).await
}

/// Force re-resolution of every module and print the outcome
pub(crate) async fn refresh_modules(
    manager: &DependencyManager,
    modules: BTreeMap<String, String>,
) -> DepcacheResult<()> {
    let report = manager
        .re_resolve_dependencies(modules, &CallOptions::new())
        .wait()
        .await?;

    report_outcomes(
        &report.outcomes,
        &format!(
            "Refreshed {} of {} module(s) with {} solver run(s)",
            report.succeeded(),
            report.outcomes.len(),
            report.resolutions
        ),
    )
}
