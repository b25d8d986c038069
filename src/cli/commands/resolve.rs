//! Resolve command - pin requirements, using the cache when possible

use crate::cli::args::ResolveArgs;
use crate::cli::commands::{
    build_manager, discover_modules, module_input, print_pins, report_outcomes,
};
use crate::config::Config;
use crate::error::DepcacheResult;
use crate::manager::CallOptions;
use std::collections::BTreeMap;

/// Execute the resolve command
///
/// Without packages or --requirements, every discovered requirements file
/// is resolved as its own module.
pub async fn execute(args: ResolveArgs, config: &Config) -> DepcacheResult<()> {
    let manager = build_manager(config);
    let opts = CallOptions::new();

    let input = module_input(
        &args.packages,
        args.requirements.as_deref(),
        args.module.as_deref(),
    )
    .await?;

    if let Some((module, text)) = input {
        let pins = manager
            .resolve_module_dependencies(&module, &text, &opts)
            .await?;
        return print_pins(&pins, args.format);
    }

    let modules = discover_modules(&args.discovery).await?;
    let mut outcomes = BTreeMap::new();
    for (module, text) in &modules {
        let outcome = manager
            .resolve_module_dependencies(module, text, &opts)
            .await;
        outcomes.insert(module.clone(), outcome);
    }

    let resolved = outcomes.values().filter(|o| o.is_ok()).count();
    report_outcomes(
        &outcomes,
        &format!("Resolved {} of {} module(s)", resolved, outcomes.len()),
    )
}
