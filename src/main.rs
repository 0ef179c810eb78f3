//! odoo-venv CLI
//!
//! Entry point for the `odoo-venv` command-line tool.

use clap::{Args, Parser, Subcommand};
use odoo_venv::config::{
    default_presets_path, expand_home, merge, split_csv, EffectiveConfig, PresetStore, RawPreset,
};
use odoo_venv::migration::{load_user_presets, migrate_file, MigrationRegistry};
use odoo_venv::provision::{ProvisionError, ProvisionRequest, ProvisionResult, Provisioner};
use odoo_venv::{ShellRunner, UvBackend};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "odoo-venv")]
#[command(about = "Create Python virtual environments for Odoo development", version)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a virtual environment for an Odoo version
    Create(CreateArgs),

    /// Inspect presets
    Presets {
        #[command(subcommand)]
        action: PresetsCommands,
    },

    /// Upgrade the preset file to the current schema
    Migrate {
        /// Preset file (default: ~/.local/share/odoo-venv/presets.toml)
        #[arg(long)]
        presets_file: Option<PathBuf>,

        /// Report pending migrations without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum PresetsCommands {
    /// List available presets
    List {
        #[arg(long)]
        presets_file: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration for a list of presets
    Show {
        /// Presets to merge, in order (common is always included)
        #[arg(value_delimiter = ',')]
        names: Vec<String>,

        #[arg(long)]
        presets_file: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// Odoo version, e.g. 17.0
    odoo_version: String,

    /// Python version (default: from presets or the Odoo version)
    #[arg(long, short = 'p')]
    python_version: Option<String>,

    /// Virtual environment directory
    #[arg(long, default_value = ".venv")]
    venv_dir: PathBuf,

    /// Odoo source directory (default: ~/code/odoo/odoo/<version>)
    #[arg(long)]
    odoo_dir: Option<PathBuf>,

    /// Addons paths (comma-separated)
    #[arg(long)]
    addons_path: Option<String>,

    /// Install Odoo in editable mode
    #[arg(long, overrides_with = "no_install_odoo")]
    install_odoo: bool,
    #[arg(long, hide = true, overrides_with = "install_odoo")]
    no_install_odoo: bool,

    /// Install Odoo's requirements.txt
    #[arg(long, overrides_with = "no_install_odoo_requirements")]
    install_odoo_requirements: bool,
    #[arg(long, hide = true, overrides_with = "install_odoo_requirements")]
    no_install_odoo_requirements: bool,

    /// Install requirements.txt found in addons paths
    #[arg(long, overrides_with = "no_install_addons_dirs_requirements")]
    install_addons_dirs_requirements: bool,
    #[arg(long, hide = true, overrides_with = "install_addons_dirs_requirements")]
    no_install_addons_dirs_requirements: bool,

    /// Install external Python dependencies of addon manifests
    #[arg(long, overrides_with = "no_install_addons_manifests_requirements")]
    install_addons_manifests_requirements: bool,
    #[arg(long, hide = true, overrides_with = "install_addons_manifests_requirements")]
    no_install_addons_manifests_requirements: bool,

    /// Packages to leave out (comma-separated)
    #[arg(long)]
    ignore: Option<String>,

    /// Additional requirements (comma-separated)
    #[arg(long)]
    extra_requirement: Option<String>,

    /// Additional requirements file
    #[arg(long)]
    extra_requirements_file: Option<String>,

    /// Presets to apply, in order (repeatable or comma-separated)
    #[arg(long, value_delimiter = ',')]
    preset: Vec<String>,

    /// Preset file (default: ~/.local/share/odoo-venv/presets.toml)
    #[arg(long)]
    presets_file: Option<PathBuf>,

    /// Print what would be done without doing it
    #[arg(long)]
    dry_run: bool,
}

impl CreateArgs {
    /// Options given on the command line, as the last merge layer.
    fn overrides(&self) -> RawPreset {
        RawPreset {
            python_version: self.python_version.clone(),
            install_odoo: flag_pair(self.install_odoo, self.no_install_odoo),
            install_odoo_requirements: flag_pair(
                self.install_odoo_requirements,
                self.no_install_odoo_requirements,
            ),
            install_addons_dirs_requirements: flag_pair(
                self.install_addons_dirs_requirements,
                self.no_install_addons_dirs_requirements,
            ),
            install_addons_manifests_requirements: flag_pair(
                self.install_addons_manifests_requirements,
                self.no_install_addons_manifests_requirements,
            ),
            extra_requirements_file: self.extra_requirements_file.clone(),
            addons_path: self.addons_path.as_deref().map(split_csv),
            extra_requirement: self.extra_requirement.as_deref().map(split_csv),
            ignore: self.ignore.as_deref().map(split_csv),
            ..Default::default()
        }
    }
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Create(args) => run_create(args),
        Commands::Presets { action } => match action {
            PresetsCommands::List { presets_file, json } => run_presets_list(presets_file, json),
            PresetsCommands::Show {
                names,
                presets_file,
                json,
            } => run_presets_show(names, presets_file, json),
        },
        Commands::Migrate { presets_file, dry_run } => run_migrate(presets_file, dry_run),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "odoo_venv=debug" } else { "odoo_venv=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn presets_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.map(|p| expand_home(&p)).or_else(default_presets_path)
}

/// Initialize and migrate the user preset file, then load the layered store.
fn load_presets(path: Option<&Path>, dry_run: bool) -> ProvisionResult<PresetStore> {
    match path {
        Some(path) => Ok(load_user_presets(path, &MigrationRegistry::builtin(), dry_run)?),
        None => Ok(PresetStore::builtin()?),
    }
}

fn run_create(args: CreateArgs) -> ProvisionResult<()> {
    let path = presets_path(args.presets_file.clone());
    let store = load_presets(path.as_deref(), args.dry_run)?;
    let config = merge(&store, &args.preset, &args.overrides())?;
    tracing::debug!("Merged layers: {}", config.layers().join(", "));

    let odoo_dir = match &args.odoo_dir {
        Some(dir) => expand_home(dir),
        None => expand_home(&PathBuf::from("~/code/odoo/odoo").join(&args.odoo_version)),
    };
    let request = ProvisionRequest {
        odoo_version: args.odoo_version.clone(),
        odoo_dir,
        venv_dir: expand_home(&args.venv_dir),
        python_version: args.python_version.clone(),
        dry_run: args.dry_run,
    };

    let backend = UvBackend::new(args.dry_run);
    let report = Provisioner::new(&backend, &ShellRunner).run(&request, &config)?;

    println!(
        "Environment ready at {} (Python {}, {} requirement(s){})",
        request.venv_dir.display(),
        report.python_version,
        report.requirements.len(),
        if report.odoo_installed { ", Odoo installed" } else { "" }
    );
    Ok(())
}

fn run_presets_list(presets_file: Option<PathBuf>, json: bool) -> ProvisionResult<()> {
    let path = presets_path(presets_file);
    let store = load_presets(path.as_deref(), false)?;

    if json {
        let items: Vec<_> = store
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "description": p.description(),
                    "origin": p.origin,
                    "commands": p.commands.len(),
                })
            })
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    if store.is_empty() {
        println!("No presets defined.");
        return Ok(());
    }
    let width = store.names().iter().map(|n| n.len()).max().unwrap_or(0);
    for preset in store.iter() {
        println!(
            "{:width$}  {}",
            preset.name,
            preset.description().unwrap_or(""),
            width = width
        );
    }
    Ok(())
}

fn run_presets_show(names: Vec<String>, presets_file: Option<PathBuf>, json: bool) -> ProvisionResult<()> {
    let path = presets_path(presets_file);
    let store = load_presets(path.as_deref(), false)?;
    let config = merge(&store, &names, &RawPreset::default())?;

    if json {
        print_json(&config)?;
    } else {
        print_config(&config);
    }
    Ok(())
}

fn run_migrate(presets_file: Option<PathBuf>, dry_run: bool) -> ProvisionResult<()> {
    let Some(path) = presets_path(presets_file) else {
        println!("No preset file location (HOME is not set)");
        return Ok(());
    };
    if !path.exists() {
        println!("No preset file at {}", path.display());
        return Ok(());
    }

    let report = migrate_file(&path, &MigrationRegistry::builtin(), dry_run)?;
    if report.applied.is_empty() {
        println!("{} is up to date", path.display());
    } else if dry_run {
        println!("Would migrate {} to {}", path.display(), report.applied.join(" -> "));
    } else {
        println!("Migrated {} to {}", path.display(), report.applied.join(" -> "));
        if let Some(backup) = &report.backup {
            println!("Backup: {}", backup);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> ProvisionResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ProvisionError::Io(e.into()))?;
    println!("{}", json);
    Ok(())
}

fn print_config(config: &EffectiveConfig) {
    println!("Layers: {}", config.layers().join(" > "));
    if let Some(description) = &config.description {
        println!("description: {}", description);
    }
    if let Some(python) = &config.python_version {
        println!("python_version: {}", python);
    }
    println!("install_odoo: {}", config.install_odoo);
    println!("install_odoo_requirements: {}", config.install_odoo_requirements);
    println!("install_addons_dirs_requirements: {}", config.install_addons_dirs_requirements);
    println!(
        "install_addons_manifests_requirements: {}",
        config.install_addons_manifests_requirements
    );
    if let Some(file) = &config.extra_requirements_file {
        println!("extra_requirements_file: {}", file);
    }
    for (label, list) in [
        ("addons_path", &config.addons_path),
        ("extra_requirement", &config.extra_requirement),
        ("ignore", &config.ignore),
    ] {
        if !list.is_empty() {
            println!("{}: {}", label, list.join(", "));
        }
    }
    for command in &config.extra_commands {
        let when = if command.when.is_always() {
            String::new()
        } else {
            format!(" when {}", command.when)
        };
        println!(
            "[{}] {} ({}): {}{}",
            command.stage, command.name, command.origin, command.command, when
        );
    }
}
