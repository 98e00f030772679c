use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use plugin_market_core::config::Config;
use plugin_market_core::plugin::resolver::{resolve, unresolved, CapabilityBinding};
use plugin_market_core::report::{degraded_notice, report, Report};
use plugin_market_core::{validate, Installer, MarketError, Marketplace, Result};

mod args;
use args::{Cli, Commands, ConfigAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let root = resolve_root(cli.root);
    let quiet = cli.quiet;
    let detailed = !matches!(
        cli.command,
        Some(Commands::Validate { .. })
            | Some(Commands::Install { .. })
            | Some(Commands::List)
            | Some(Commands::Verify)
    );

    let result = match cli.command {
        Some(Commands::Validate { name, all }) => handle_validate(&root, name.as_deref(), all),
        Some(Commands::Install {
            name,
            target,
            global,
            dry_run,
        }) => handle_install(&root, &name, target.as_deref(), global, dry_run, quiet),
        Some(Commands::Uninstall {
            name,
            target,
            global,
            dry_run,
        }) => handle_uninstall(&root, &name, target.as_deref(), global, dry_run, quiet),
        Some(Commands::List) => handle_list(&root),
        Some(Commands::Search { query }) => handle_search(&root, &query),
        Some(Commands::Verify) => handle_verify(&root),
        Some(Commands::Capabilities { target, global }) => {
            handle_capabilities(&root, target.as_deref(), global)
        }
        Some(Commands::Status { target, global }) => {
            handle_status(&root, target.as_deref(), global)
        }
        Some(Commands::Config { action }) => handle_config(action, &root),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(0)
        }
        None => {
            Cli::command().print_help().ok();
            Ok(0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(failure_code(&e, detailed))
        }
    }
}

/// validate, install, list and verify exit 1 on any failure; the other
/// commands report the error's own code
fn failure_code(error: &MarketError, detailed: bool) -> u8 {
    if detailed {
        error.exit_code() as u8
    } else {
        1
    }
}

/// `RUST_LOG` wins; otherwise warn, info with -v, error with -q
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn resolve_root(cli_root: Option<PathBuf>) -> PathBuf {
    if let Some(root) = cli_root {
        return root;
    }

    if let Ok(root) = std::env::var("PLUGIN_MARKET_ROOT") {
        return PathBuf::from(root);
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "plugin-market", &mut io::stdout());
}

fn print_report(report: &Report) {
    for line in report.text.lines() {
        let colored = if let Some(rest) = line.strip_prefix("[PASS]") {
            format!("{}{}", "[PASS]".green(), rest)
        } else if let Some(rest) = line.strip_prefix("[FAIL]") {
            format!("{}{}", "[FAIL]".red().bold(), rest)
        } else if let Some(rest) = line.strip_prefix("[DRIFT]") {
            format!("{}{}", "[DRIFT]".red(), rest)
        } else if let Some(rest) = line.strip_prefix("[ORPHAN]") {
            format!("{}{}", "[ORPHAN]".yellow(), rest)
        } else if let Some(rest) = line.strip_prefix("[DEGRADED]") {
            format!("{}{}", "[DEGRADED]".yellow(), rest)
        } else if let Some(rest) = line.strip_prefix("  error:") {
            format!("  {}{}", "error:".red(), rest)
        } else if let Some(rest) = line.strip_prefix("  warning:") {
            format!("  {}{}", "warning:".yellow(), rest)
        } else {
            line.to_string()
        };
        println!("{}", colored);
    }
}

fn print_degraded(bindings: &[CapabilityBinding]) {
    let mut degraded = unresolved(bindings).peekable();
    if degraded.peek().is_none() {
        return;
    }
    println!();
    for binding in degraded {
        println!("{}", degraded_notice(binding).yellow());
    }
}

fn handle_validate(root: &Path, name: Option<&str>, all: bool) -> Result<u8> {
    let market = Marketplace::open(root)?;

    let results = match (name, all) {
        (_, true) => market.validate_all()?,
        (Some(name), false) => vec![market.validate(name)?],
        (None, false) => Vec::new(),
    };

    let report = report(&results, &[]);
    print_report(&report);
    Ok(report.exit_code as u8)
}

fn handle_verify(root: &Path) -> Result<u8> {
    let market = Marketplace::open(root)?;
    let report = market.verify()?.report();
    print_report(&report);
    Ok(report.exit_code as u8)
}

fn handle_install(
    root: &Path,
    name: &str,
    target: Option<&Path>,
    global: bool,
    dry_run: bool,
    quiet: bool,
) -> Result<u8> {
    let market = Marketplace::open(root)?;
    let package_dir = market.package_dir(name)?;
    let target_dir = Installer::resolve_target(target, global)?;
    let installer = Installer::new(market.config());

    // Show why a package is refused, and stop before printing anything else
    let validation = validate(&package_dir);
    if !validation.passed() {
        let errors = validation.errors.len();
        let name = validation.package_name.clone();
        print_report(&report(&[validation], &[]));
        return Err(MarketError::InvalidPackage { name, errors });
    }

    if !quiet {
        println!();
        println!("Package: {}", name.cyan());
        println!("Target: {}", target_dir.display());
        if dry_run {
            println!("{}", "(dry run)".yellow());
        }
        println!();
        println!("Installing...");
    }

    let on_file = |status: &str, path: &str| {
        if quiet {
            return;
        }
        let status_str = match status {
            "NEW" => format!("[{}]", status).green(),
            "UPDATE" => format!("[{}]", status).cyan(),
            "SKIP" => format!("[{}]", status).yellow(),
            "DEL" => format!("[{}]", status).red(),
            _ => format!("[{}]", status).normal(),
        };
        println!("  {} {}", status_str, path);
    };

    let outcome = installer.install(&package_dir, &target_dir, dry_run, Some(&on_file))?;

    if !quiet {
        println!();
        println!("Summary:");
        println!("  Written: {}", outcome.written);
        println!("  Unchanged: {}", outcome.unchanged);
        println!("  Removed: {}", outcome.removed);
    }

    if !dry_run {
        let set = installer.installation_set(&target_dir)?;
        print_degraded(&resolve(&set));
    }

    println!();
    println!(
        "{} {} {}",
        "Installation complete:".green(),
        outcome.package,
        outcome.destination.display()
    );

    Ok(0)
}

fn handle_uninstall(
    root: &Path,
    name: &str,
    target: Option<&Path>,
    global: bool,
    dry_run: bool,
    quiet: bool,
) -> Result<u8> {
    let config = Config::load(root)?;
    let target_dir = Installer::resolve_target(target, global)?;
    let installer = Installer::new(&config);

    println!();
    println!("Package: {}", name.cyan());
    println!("Target: {}", target_dir.display());
    if dry_run {
        println!("{}", "(dry run)".yellow());
    }
    println!();

    let on_file = |status: &str, path: &str| {
        if !quiet {
            println!("  {} {}", format!("[{}]", status).red(), path);
        }
    };

    let outcome = installer.uninstall(name, &target_dir, dry_run, Some(&on_file))?;

    println!();
    println!("Removed: {}", outcome.removed);
    if outcome.missing > 0 {
        println!(
            "{} {} recorded file(s) were already gone",
            "Note:".yellow(),
            outcome.missing
        );
    }

    if !dry_run {
        let set = installer.installation_set(&target_dir)?;
        print_degraded(&resolve(&set));
    }

    Ok(0)
}

fn handle_list(root: &Path) -> Result<u8> {
    let market = Marketplace::open(root)?;
    let index = market.index();

    println!();
    if let Some(name) = &index.name {
        match &index.owner {
            Some(owner) => println!("{} ({})", name.bold(), owner),
            None => println!("{}", name.bold()),
        }
        if let Some(description) = &index.description {
            println!("{}", description.dimmed());
        }
        println!();
    }

    if index.is_empty() {
        println!("No packages in index.");
        return Ok(0);
    }

    for entry in &index.entries {
        let category = entry
            .category
            .as_deref()
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();
        println!("  {}{}", entry.name.cyan(), category.dimmed());
        if let Some(description) = &entry.description {
            println!("    {}", description);
        }
    }

    println!();
    println!("Total: {} package(s)", index.len());
    Ok(0)
}

fn handle_search(root: &Path, query: &str) -> Result<u8> {
    let market = Marketplace::open(root)?;
    let matches = market.index().search(query);

    println!();
    if matches.is_empty() {
        println!("No packages match '{}'.", query);
        return Ok(0);
    }

    for entry in &matches {
        println!(
            "  {} {}",
            entry.name.cyan(),
            entry.description.as_deref().unwrap_or_default()
        );
        if !entry.keywords.is_empty() {
            println!("    {}", entry.keywords.join(", ").dimmed());
        }
    }

    println!();
    println!("Found: {}", matches.len());
    Ok(0)
}

fn handle_capabilities(root: &Path, target: Option<&Path>, global: bool) -> Result<u8> {
    let set = if target.is_some() || global {
        let target_dir = Installer::resolve_target(target, global)?;
        let installer = Installer::new(&Config::load(root)?);
        println!();
        println!("Target: {}", target_dir.display());
        installer.installation_set(&target_dir)?
    } else {
        Marketplace::open(root)?.registry_set()?
    };

    let bindings = resolve(&set);
    println!();
    if bindings.is_empty() {
        println!("No capabilities consumed ({} package(s)).", set.len());
        return Ok(0);
    }

    for binding in &bindings {
        let provider = match &binding.provider {
            Some(provider) => provider.green().to_string(),
            None => "unresolved".yellow().to_string(),
        };
        print!(
            "  {} -> {}: {}",
            binding.consumer.cyan(),
            binding.capability,
            provider
        );
        if !binding.alternates.is_empty() {
            print!(" (also: {})", binding.alternates.join(", ").dimmed());
        }
        println!();
    }

    print_degraded(&bindings);
    Ok(0)
}

fn handle_status(root: &Path, target: Option<&Path>, global: bool) -> Result<u8> {
    let config = Config::load(root)?;
    let installer = Installer::new(&config);
    let target_dir = Installer::resolve_target(target, global)?;

    println!();
    println!("Target: {}", target_dir.display());
    println!("Plugin root: {}", installer.plugin_root(&target_dir).display());
    println!();

    let record = installer.installed(&target_dir)?;
    if record.packages.is_empty() {
        println!("No packages installed.");
        return Ok(0);
    }

    println!("Installed packages:");
    for (name, package) in &record.packages {
        println!(
            "  {} {} ({} files, {})",
            name.cyan(),
            package.version,
            package.files.len(),
            package.installed_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    Ok(0)
}

fn handle_config(action: ConfigAction, root: &Path) -> Result<u8> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(root)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(MarketError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(root)?;
            config.set(&key, &value)?;
            config.save(root)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(root)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            println!("{}", Config::path(root).display());
        }
        ConfigAction::Init => {
            let path = Config::init(root)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(0)
}
