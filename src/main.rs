// Service Access - command line front end
//
// Prints credentials from a service access file for use in shell scripts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serviceaccess::config::AccessConfig;
use serviceaccess::permissions;
use serviceaccess::{CredentialStore, Environment, Lookup, RetryPolicy};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Service Access - read permission-checked credential files
#[derive(Parser, Debug)]
#[command(name = "serviceaccess")]
#[command(version)]
#[command(about = "Read credentials from a service access file", long_about = None)]
struct Cli {
    /// YAML file with defaults (services_file, tag, retry)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug information to stderr
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print credentials from one section
    Get {
        /// Service access file (default: $DES_SERVICES, then ~/.desservices.ini)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Section to read
        #[arg(short, long)]
        section: Option<String>,

        /// Tag used to read the section from $DES_<TAG>_SECTION
        #[arg(short, long)]
        tag: Option<String>,

        /// Retry opening the file (5 attempts, 30 seconds apart)
        #[arg(long, default_value = "false")]
        retry: bool,

        /// Print the section as a JSON object
        #[arg(long, default_value = "false", conflicts_with = "template")]
        json: bool,

        /// Print values instead of masking them
        #[arg(long, default_value = "false")]
        show: bool,

        /// Output template, e.g. "%(user)s:%(passwd)s"
        template: Option<String>,
    },

    /// Check the permissions of a service access file
    Check {
        /// Service access file (default: $DES_SERVICES, then ~/.desservices.ini)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the sections of a service access file
    Sections {
        /// Service access file (default: $DES_SERVICES, then ~/.desservices.ini)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// `RUST_LOG` picks the filter (default `warn`); `--verbose` raises the
/// default level to `debug` on top of it.
fn init_logging(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        filter = filter.add_directive(LevelFilter::DEBUG.into());
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AccessConfig> {
    match path {
        Some(path) => AccessConfig::from_file(path)
            .with_context(|| format!("Failed to load config from: {}", path.display())),
        None => Ok(AccessConfig::default()),
    }
}

fn resolve_file(file: Option<PathBuf>, config: &AccessConfig, env: &Environment) -> Result<PathBuf> {
    let lookup = Lookup {
        file: file.or_else(|| config.services_path(env)),
        ..Lookup::default()
    };
    Ok(lookup.resolve_file(env)?)
}

#[allow(clippy::too_many_arguments)]
fn run_get(
    config: &AccessConfig,
    file: Option<PathBuf>,
    section: Option<String>,
    tag: Option<String>,
    retry: bool,
    json: bool,
    show: bool,
    template: Option<String>,
) -> Result<()> {
    let env = Environment::from_process();
    let lookup = Lookup {
        file: file.or_else(|| config.services_path(&env)),
        section,
        tag: tag.or_else(|| config.tag.clone()),
    };

    let policy = if retry {
        RetryPolicy::automount()
    } else {
        config.retry_policy()
    };

    let section = lookup.resolve_section(&env)?;
    let path = lookup.resolve_file(&env)?;

    let store = CredentialStore::open_with_retry(&path, &policy)
        .with_context(|| format!("Failed to open service access file: {}", path.display()))?;
    let creds = store.section(&section)?;

    if let Some(template) = template {
        println!("{}", creds.render_template(&template)?);
    } else if json {
        let sorted: std::collections::BTreeMap<_, _> = creds.entries().iter().collect();
        println!("{}", serde_json::to_string_pretty(&sorted)?);
    } else {
        let mut keys: Vec<&String> = creds.entries().keys().collect();
        keys.sort();
        println!("[{}]", creds.section());
        for key in keys {
            let value = creds.get(key).unwrap_or_default();
            if show {
                println!("{} = {}", key, value);
            } else {
                println!("{} = {}", key, "*".repeat(value.len().min(8)));
            }
        }
    }

    Ok(())
}

fn run_check(config: &AccessConfig, file: Option<PathBuf>) -> Result<()> {
    let env = Environment::from_process();
    let path = resolve_file(file, config, &env)?;

    let metadata = std::fs::metadata(&path)
        .with_context(|| format!("Failed to read metadata of: {}", path.display()))?;
    let faults = permissions::file_faults(&metadata);

    if faults.is_empty() {
        println!("✓ {}: permissions ok", path.display());
        Ok(())
    } else {
        println!("✗ {}: faulty permissions", path.display());
        for fault in &faults {
            println!("   ❌ {}", fault);
        }
        println!("   💡 Fix with: chmod 640 {}", path.display());
        Err(anyhow::anyhow!("{} permission fault(s)", faults.len()))
    }
}

fn run_sections(config: &AccessConfig, file: Option<PathBuf>) -> Result<()> {
    let env = Environment::from_process();
    let path = resolve_file(file, config, &env)?;

    let store = CredentialStore::open(&path)
        .with_context(|| format!("Failed to open service access file: {}", path.display()))?;

    for name in store.section_names() {
        println!("{}", name);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Get {
            file,
            section,
            tag,
            retry,
            json,
            show,
            template,
        } => run_get(&config, file, section, tag, retry, json, show, template),
        Commands::Check { file } => run_check(&config, file),
        Commands::Sections { file } => run_sections(&config, file),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
