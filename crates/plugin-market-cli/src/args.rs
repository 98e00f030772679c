use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "plugin-market")]
#[command(about = "Validate, resolve and install packages from a plugin marketplace")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Marketplace root (default: $PLUGIN_MARKET_ROOT or current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate one package, or every package with --all
    Validate {
        /// Package name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Validate every package in the plugins directory
        #[arg(long)]
        all: bool,
    },

    /// Install a package into a project (default: current directory)
    Install {
        /// Package name
        name: String,

        /// Target project directory
        target: Option<PathBuf>,

        /// Install into the home directory
        #[arg(short, long, conflicts_with = "target")]
        global: bool,

        /// Show what would be written without writing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove an installed package from a project
    Uninstall {
        /// Package name
        name: String,

        /// Target project directory
        target: Option<PathBuf>,

        /// Uninstall from the home directory
        #[arg(short, long, conflicts_with = "target")]
        global: bool,

        /// Show what would be removed without removing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// List packages in the marketplace index
    List,

    /// Search the index by name, description, category or keyword
    Search {
        /// Search query (case-insensitive)
        query: String,
    },

    /// Check index against disk, validate packages and resolve capabilities
    Verify,

    /// Show capability bindings for the registry, or for a project's installed packages
    Capabilities {
        /// Target project directory
        target: Option<PathBuf>,

        /// Use the home directory as target
        #[arg(short, long, conflicts_with = "target")]
        global: bool,
    },

    /// Show packages installed in a project
    Status {
        /// Target project directory
        target: Option<PathBuf>,

        /// Use the home directory as target
        #[arg(short, long, conflicts_with = "target")]
        global: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., install.plugin_root)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., install.exclude)
        key: String,

        /// Value to set (e.g., "*.bak,drafts/**" or "[*.bak, drafts/**]")
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn validate_requires_name_or_all() {
        assert!(Cli::try_parse_from(["plugin-market", "validate"]).is_err());
        assert!(Cli::try_parse_from(["plugin-market", "validate", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["plugin-market", "validate", "x", "--all"]).is_err());
    }

    #[test]
    fn install_takes_positional_target() {
        let cli =
            Cli::try_parse_from(["plugin-market", "install", "docs", "/tmp/p", "--dry-run"]).unwrap();
        match cli.command {
            Some(Commands::Install {
                name,
                target,
                global,
                dry_run,
            }) => {
                assert_eq!(name, "docs");
                assert_eq!(target, Some(PathBuf::from("/tmp/p")));
                assert!(!global);
                assert!(dry_run);
            }
            _ => panic!("expected install"),
        }
    }
}
