//! Upgrade command - re-resolve a module past its cached pins

use crate::cli::args::UpgradeArgs;
use crate::cli::commands::refresh::refresh_modules;
use crate::cli::commands::{build_manager, discover_modules, module_input, print_pins};
use crate::config::Config;
use crate::error::DepcacheResult;
use crate::manager::CallOptions;
use std::collections::BTreeMap;

/// Execute the upgrade command
///
/// The cached entry is bypassed and overwritten, so later `resolve` calls
/// see the newly pinned versions. Without input this upgrades every
/// discovered requirements file.
pub async fn execute(args: UpgradeArgs, config: &Config) -> DepcacheResult<()> {
    let manager = build_manager(config);

    let input = module_input(
        &args.packages,
        args.requirements.as_deref(),
        args.module.as_deref(),
    )
    .await?;

    let Some((module, text)) = input else {
        let modules = discover_modules(&args.discovery).await?;
        return refresh_modules(&manager, modules).await;
    };

    let report = manager
        .re_resolve_dependencies(BTreeMap::from([(module, text)]), &CallOptions::new())
        .wait()
        .await?;

    for outcome in report.outcomes.into_values() {
        print_pins(&outcome?, args.format)?;
    }
    Ok(())
}
