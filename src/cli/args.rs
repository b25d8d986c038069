//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// depcache - Dependency resolution cache
///
/// Resolves Python requirement sets through pip-compile and caches the
/// pinned result by a fingerprint of the normalized requirements.
#[derive(Parser, Debug)]
#[command(name = "depcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEPCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Resolution cache directory
    #[arg(long, global = true, env = "DEPCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum concurrent solver invocations for bulk refresh
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Solver executable (default: pip-compile)
    #[arg(long, global = true, env = "DEPCACHE_SOLVER")]
    pub solver: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve one module's requirements, using the cache when possible
    Resolve(ResolveArgs),

    /// Re-resolve requirement files, bypassing cached results
    Refresh(RefreshArgs),

    /// Re-resolve one module to pick up newer releases
    Upgrade(UpgradeArgs),

    /// Inspect or clear the resolution cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Requirement specifiers (e.g. "requests>=2.25.0")
    pub packages: Vec<String>,

    /// Read requirements from a file
    #[arg(short, long)]
    pub requirements: Option<PathBuf>,

    /// Module name recorded with the cache entry
    #[arg(short, long)]
    pub module: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

/// Arguments for the refresh command
#[derive(Parser, Debug)]
pub struct RefreshArgs {
    /// Requirement files, one module each (discovered when omitted)
    #[arg(short, long = "requirements", num_args = 1..)]
    pub requirements: Vec<PathBuf>,

    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

/// Arguments for the upgrade command
#[derive(Parser, Debug)]
pub struct UpgradeArgs {
    /// Requirement specifiers to upgrade
    pub packages: Vec<String>,

    /// Read requirements from a file
    #[arg(short, long)]
    pub requirements: Option<PathBuf>,

    /// Module name recorded with the cache entry
    #[arg(short, long)]
    pub module: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

/// Where to look for requirement files when none are named
#[derive(Args, Debug, Clone)]
pub struct DiscoveryArgs {
    /// File name pattern to search for
    #[arg(short, long, default_value = crate::discovery::DEFAULT_PATTERN)]
    pub pattern: String,

    /// Directories to search
    #[arg(long, num_args = 1.., default_value = ".")]
    pub search_dirs: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached resolutions
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show cache directory and usage
    Info,

    /// Remove resolutions older than N days
    Gc {
        /// Age threshold in days
        #[arg(long)]
        days: u32,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear cached resolutions (all by default)
    Clear {
        /// Remove only this fingerprint
        #[arg(long, conflicts_with = "module")]
        fingerprint: Option<String>,

        /// Remove only entries recorded for this module
        #[arg(long)]
        module: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_resolve() {
        let cli = Cli::parse_from([
            "depcache",
            "resolve",
            "requests>=2.25.0",
            "packaging>=20.0",
            "--module",
            "mymodule",
        ]);
        match cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.packages, vec!["requests>=2.25.0", "packaging>=20.0"]);
                assert_eq!(args.module.as_deref(), Some("mymodule"));
                assert!(args.requirements.is_none());
            }
            _ => panic!("expected Resolve command"),
        }
    }

    #[test]
    fn cli_parses_refresh_files() {
        let cli = Cli::parse_from(["depcache", "refresh", "-r", "a.txt", "b.txt", "-j", "2"]);
        assert_eq!(cli.jobs, Some(2));
        match cli.command {
            Commands::Refresh(args) => {
                assert_eq!(
                    args.requirements,
                    vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
                );
            }
            _ => panic!("expected Refresh command"),
        }
    }

    #[test]
    fn cli_refresh_defaults_to_discovery() {
        let cli = Cli::parse_from(["depcache", "refresh"]);
        match cli.command {
            Commands::Refresh(args) => {
                assert!(args.requirements.is_empty());
                assert_eq!(args.discovery.pattern, "requirements.txt");
                assert_eq!(args.discovery.search_dirs, vec![PathBuf::from(".")]);
            }
            _ => panic!("expected Refresh command"),
        }
    }

    #[test]
    fn cli_parses_discovery_flags() {
        let cli = Cli::parse_from([
            "depcache",
            "resolve",
            "-p",
            "requirements*.txt",
            "--search-dirs",
            "services",
            "libs",
        ]);
        match cli.command {
            Commands::Resolve(args) => {
                assert!(args.packages.is_empty());
                assert_eq!(args.discovery.pattern, "requirements*.txt");
                assert_eq!(
                    args.discovery.search_dirs,
                    vec![PathBuf::from("services"), PathBuf::from("libs")]
                );
            }
            _ => panic!("expected Resolve command"),
        }
    }

    #[test]
    fn cli_parses_upgrade() {
        let cli = Cli::parse_from(["depcache", "upgrade", "requests", "-m", "api"]);
        match cli.command {
            Commands::Upgrade(args) => {
                assert_eq!(args.packages, vec!["requests"]);
                assert_eq!(args.module.as_deref(), Some("api"));
            }
            _ => panic!("expected Upgrade command"),
        }
    }

    #[test]
    fn cli_parses_global_cache_dir() {
        let cli = Cli::parse_from(["depcache", "cache", "info", "--cache-dir", "/tmp/x"]);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheArgs {
                action: CacheAction::Info
            })
        ));
    }

    #[test]
    fn cli_clear_targets_conflict() {
        assert!(Cli::try_parse_from([
            "depcache",
            "cache",
            "clear",
            "--fingerprint",
            "abc",
            "--module",
            "m",
        ])
        .is_err());
    }

    #[test]
    fn cli_parses_config_default_action() {
        let cli = Cli::parse_from(["depcache", "config"]);
        match cli.command {
            Commands::Config(args) => assert!(args.action.is_none()),
            _ => panic!("expected Config command"),
        }
    }
}
