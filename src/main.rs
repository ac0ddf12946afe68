//! kvlookup CLI Entry Point
//!
//! Subcommands:
//! - `lookup` - Look up entities in the key-value store
//! - `validate` - Validate an options file
//! - `profile` - Save and list named option profiles
//! - `serve` - Host server mode (JSON-RPC over stdio)
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kvlookup::config::{self, ConfigLocation};
use kvlookup::store::redis::RespConnector;
use kvlookup::{
    host, validate_options, Entity, ErrorEnvelope, Lookup, LookupError, Metadata, OptionError,
    RawOptions, Result, SuccessEnvelope,
};

/// kvlookup - Enrich entities from a Redis-compatible key-value store
#[derive(Parser)]
#[command(name = "kvlookup")]
#[command(about = "Look up entities in a Redis-compatible key-value store and summarize the results")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more entities
    Lookup {
        /// Named profile to start from (defaults to the configured default profile)
        #[arg(long)]
        profile: Option<String>,

        #[command(flatten)]
        options: OptionArgs,

        /// Entity values to look up
        #[arg(required = true)]
        entities: Vec<String>,
    },

    /// Validate a JSON options file
    Validate {
        #[arg(long)]
        options: PathBuf,
    },

    /// Manage named profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },

    /// Start the host server (JSON-RPC over stdio)
    Serve,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Save a profile
    Save {
        name: String,

        /// Save to `.kvlookup/config.json` (default)
        #[arg(long, conflicts_with = "global")]
        local: bool,

        /// Save to the per-user config file
        #[arg(long)]
        global: bool,

        /// Prompt for the store password
        #[arg(long)]
        prompt_password: bool,

        /// Read the password from this environment variable at lookup time
        #[arg(long, conflicts_with = "prompt_password")]
        password_env: Option<String>,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// List saved profiles
    List,
}

/// Options that can be given on the command line; they override profile values
#[derive(Args)]
struct OptionArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    database: Option<u32>,

    #[arg(long)]
    password: Option<String>,

    /// Connect over TLS
    #[arg(long)]
    tls: bool,

    /// Key template, `{{entity}}` is replaced by the entity value
    #[arg(long)]
    key: Option<String>,

    /// Stored values are plain strings rather than JSON
    #[arg(long)]
    plain: bool,

    /// Comma-separated summary tag paths, e.g. `Org:org,asn`
    #[arg(long)]
    summary_tags: Option<String>,

    /// Prefer a table view of structured details
    #[arg(long)]
    table: bool,
}

impl OptionArgs {
    fn apply(self, mut raw: RawOptions) -> RawOptions {
        if let Some(host) = self.host {
            raw.host = host;
        }
        if let Some(port) = self.port {
            raw.port = Some(i64::from(port));
        }
        if let Some(database) = self.database {
            raw.database = Some(i64::from(database));
        }
        if self.password.is_some() {
            raw.password = self.password;
        }
        if let Some(key) = self.key {
            raw.key = key;
        }
        if let Some(tags) = self.summary_tags {
            raw.summary_tags = tags;
        }
        raw.enable_tls |= self.tls;
        raw.view_as_table |= self.table;
        if self.plain {
            raw.is_json = false;
        }
        raw
    }
}

#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    errors: Vec<OptionError>,
}

#[derive(Serialize)]
struct SavedProfile {
    name: String,
    location: &'static str,
}

#[derive(Serialize)]
struct ProfileView {
    name: String,
    host: String,
    port: Option<i64>,
    database: Option<i64>,
    key: String,
    tls: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();

    let code = match cli.command {
        Commands::Lookup { profile, options, entities } => {
            report("lookup", run_lookup(profile.as_deref(), options, entities).await)
        }
        Commands::Validate { options } => report("validate", run_validate(&options)),
        Commands::Profile { action: ProfileCommand::List } => report("profile", run_profile_list()),
        Commands::Profile {
            action: ProfileCommand::Save { name, local: _, global, prompt_password, password_env, options },
        } => {
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            report("profile", run_profile_save(name, location, prompt_password, password_env, options))
        }
        Commands::Serve => match host::serve().await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "Host server failed");
                1
            }
        },
    };

    std::process::exit(code);
}

/// Print the envelope for `result` and return the process exit code
///
/// Exit code 2 means the command succeeded but some entities failed.
fn report<T: Serialize>(command: &str, result: Result<(T, Metadata)>) -> i32 {
    match result {
        Ok((data, meta)) => {
            let code = if meta.failed > 0 { 2 } else { 0 };
            print_json(&SuccessEnvelope::new(command, data, meta));
            code
        }
        Err(e) => {
            print_json(&ErrorEnvelope::from_error(command, &e));
            1
        }
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Could not serialize output"),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Profile options to start from: the named profile, else the default profile if one is set
fn base_options(profile: Option<&str>) -> Result<RawOptions> {
    if profile.is_some() {
        return config::resolve_profile(profile);
    }
    let registry = config::load_with_precedence()?;
    if registry.default.is_some() {
        registry.resolve(None)
    } else {
        Ok(RawOptions::default())
    }
}

async fn run_lookup(
    profile: Option<&str>,
    args: OptionArgs,
    entities: Vec<String>,
) -> Result<(kvlookup::BatchOutcome, Metadata)> {
    let options = args.apply(base_options(profile)?).into_options()?;
    let entities: Vec<Entity> = entities.into_iter().map(Entity::new).collect();

    let start = Instant::now();
    let mut lookup = Lookup::new(RespConnector::new());
    let outcome = lookup.lookup_all(&entities, &options).await;
    lookup.shutdown().await;
    let batch = outcome?;

    let meta = Metadata::for_batch(elapsed_ms(start), entities.len(), batch.hits(), batch.failures.len());
    Ok((batch, meta))
}

fn run_validate(path: &Path) -> Result<(ValidationReport, Metadata)> {
    let start = Instant::now();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| LookupError::config_error(format!("Could not read options file: {e}")))?;
    let raw: RawOptions = serde_json::from_str(&contents)
        .map_err(|e| LookupError::config_error(format!("Invalid options file: {e}")))?;

    let errors = validate_options(&raw);
    Ok((ValidationReport { valid: errors.is_empty(), errors }, Metadata::new(elapsed_ms(start))))
}

fn run_profile_save(
    name: String,
    location: ConfigLocation,
    prompt_password: bool,
    password_env: Option<String>,
    args: OptionArgs,
) -> Result<(SavedProfile, Metadata)> {
    let start = Instant::now();
    let mut options = args.apply(RawOptions::default());

    if prompt_password {
        let password = dialoguer::Password::new()
            .with_prompt("Store password")
            .allow_empty_password(true)
            .interact()
            .map_err(|e| LookupError::config_error(format!("Could not read password: {e}")))?;
        options.password = Some(password).filter(|p| !p.is_empty());
    }

    let errors = validate_options(&options);
    if let Some(first) = errors.first() {
        return Err(LookupError::invalid_input(format!("{}: {}", first.key, first.message)));
    }

    config::save_profile(&name, options, password_env, location)?;

    let location = match location {
        ConfigLocation::Local => "local",
        ConfigLocation::Global => "global",
    };
    Ok((SavedProfile { name, location }, Metadata::new(elapsed_ms(start))))
}

fn run_profile_list() -> Result<(Vec<ProfileView>, Metadata)> {
    let start = Instant::now();
    let profiles = config::list_profiles()?
        .into_iter()
        .map(|(name, options)| ProfileView {
            name,
            host: options.host,
            port: options.port,
            database: options.database,
            key: options.key,
            tls: options.enable_tls,
        })
        .collect();
    Ok((profiles, Metadata::new(elapsed_ms(start))))
}
