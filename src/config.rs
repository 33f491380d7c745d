//! Process configuration: environment variables with CLI overrides,
//! mirroring `config.go`'s viper-backed `Configuration` struct
//! (`spec.md` §6, §9 "global mutable state").

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

/// Resolved process configuration: the merge of CLI args, environment
/// variables, and defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub mds_port: u16,
    pub prometheus_port: u16,
    pub pubsub_enabled: bool,
    pub persistent_storage_enabled: bool,
    pub prometheus_enabled: bool,
    pub data_dir: PathBuf,
    pub database_url: String,
    /// Assigned on first boot and persisted under `data_dir`
    /// (`spec.md` §6 "UUID: assigned on first boot, persisted").
    pub uuid: Uuid,
}

/// Command-line overrides. Any flag left unset falls back to its
/// environment variable, then to a hardcoded default.
#[derive(Parser, Debug)]
#[command(author, version, about = "Metadata service for a distributed object-storage fabric")]
pub struct Args {
    /// Host to bind to (overrides MDS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// RPC listen port (overrides MDS_PORT)
    #[arg(long)]
    pub mds_port: Option<u16>,

    /// Metrics listen port (overrides PROMETHEUS_PORT)
    #[arg(long)]
    pub prometheus_port: Option<u16>,

    /// Enable publish/subscribe fan-out (overrides PUBSUB_ENABLED)
    #[arg(long)]
    pub pubsub_enabled: Option<bool>,

    /// Enable write-through persistence to the durable KV store
    /// (overrides PERSISTENT_STORAGE_ENABLED)
    #[arg(long)]
    pub persistent_storage_enabled: Option<bool>,

    /// Enable the Prometheus metrics endpoint (overrides PROMETHEUS_ENABLED)
    #[arg(long)]
    pub prometheus_enabled: Option<bool>,

    /// Directory for persisted state and the instance UUID (overrides
    /// MDS_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let host = args.host.unwrap_or_else(|| env_or("MDS_HOST", "0.0.0.0"));
        let mds_port = args.mds_port.map(Ok).unwrap_or_else(|| parse_env("MDS_PORT", 7070))?;
        let prometheus_port = args
            .prometheus_port
            .map(Ok)
            .unwrap_or_else(|| parse_env("PROMETHEUS_PORT", 9090))?;
        let pubsub_enabled = args
            .pubsub_enabled
            .map(Ok)
            .unwrap_or_else(|| parse_env("PUBSUB_ENABLED", true))?;
        let persistent_storage_enabled = args
            .persistent_storage_enabled
            .map(Ok)
            .unwrap_or_else(|| parse_env("PERSISTENT_STORAGE_ENABLED", false))?;
        let prometheus_enabled = args
            .prometheus_enabled
            .map(Ok)
            .unwrap_or_else(|| parse_env("PROMETHEUS_ENABLED", true))?;
        let data_dir = args
            .data_dir
            .unwrap_or_else(|| PathBuf::from(env_or("MDS_DATA_DIR", "./data")));

        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory `{}`", data_dir.display()))?;
        let uuid = load_or_create_uuid(&data_dir)?;
        let database_url = format!("sqlite://{}/mds.db", data_dir.display());

        let cfg = Self {
            host,
            mds_port,
            prometheus_port,
            pubsub_enabled,
            persistent_storage_enabled,
            prometheus_enabled,
            data_dir,
            database_url,
            uuid,
        };

        Ok((cfg, args.migrate))
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|err| anyhow::anyhow!("parsing {key} value `{value}`: {err}")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {key}")),
    }
}

/// Reads `<data_dir>/instance.uuid`, creating and persisting a fresh
/// v4 UUID on first boot. Mirrors `LoadConfig` in `config.go`, which
/// generates a UUID once and writes the config file back so subsequent
/// boots reuse it.
fn load_or_create_uuid(data_dir: &PathBuf) -> Result<Uuid> {
    let path = data_dir.join("instance.uuid");
    if let Ok(contents) = fs::read_to_string(&path) {
        if let Ok(uuid) = Uuid::parse_str(contents.trim()) {
            return Ok(uuid);
        }
    }
    let uuid = Uuid::new_v4();
    fs::write(&path, uuid.to_string())
        .with_context(|| format!("writing instance uuid to `{}`", path.display()))?;
    Ok(uuid)
}
