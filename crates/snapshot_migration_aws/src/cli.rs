use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use snapshot_migration_core::config::{MigrationConfig, ValidationError};
use snapshot_migration_core::contract::SnapshotKind;
use snapshot_migration_core::telemetry::LogLevel;

pub const DEFAULT_STORE_PATH: &str = "snapshot_progress.json";

#[derive(Debug, Parser)]
#[command(
    name = "rds_snapshot_encryptor",
    about = "Replace unencrypted RDS snapshots with KMS-encrypted copies",
    long_about = "Copies every unencrypted manual RDS snapshot to an encrypted twin,\n\
                  waits for the copy to become available, then deletes the original.\n\
                  Progress is persisted so an interrupted run can be resumed."
)]
pub struct Cli {
    /// Named AWS profile
    #[arg(long, global = true, env = "SNAPSHOT_ENCRYPTOR_PROFILE")]
    pub profile: Option<String>,
    /// AWS region override
    #[arg(long, global = true, env = "SNAPSHOT_ENCRYPTOR_REGION")]
    pub region: Option<String>,
    /// JSON migration config file
    #[arg(long, global = true, env = "SNAPSHOT_ENCRYPTOR_CONFIG")]
    pub config: Option<PathBuf>,
    /// Progress store file
    #[arg(long, global = true, env = "SNAPSHOT_ENCRYPTOR_STORE", default_value = DEFAULT_STORE_PATH)]
    pub store: PathBuf,
    /// Also append log lines to this file
    #[arg(long, global = true, env = "SNAPSHOT_ENCRYPTOR_LOG_FILE")]
    pub log_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "SNAPSHOT_ENCRYPTOR_LOG_LEVEL",
        default_value = "info",
        value_parser = parse_log_level
    )]
    pub log_level: LogLevel,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print unencrypted snapshots eligible for migration
    List {
        #[arg(long, value_enum, default_value_t = KindFilter::All)]
        kind: KindFilter,
    },
    /// Encrypt snapshots and delete their unencrypted sources
    Migrate {
        #[arg(long, value_enum, default_value_t = KindFilter::All)]
        kind: KindFilter,
        /// Migrate only these snapshot ids instead of scanning
        #[arg(long = "snapshot", value_name = "ID")]
        snapshots: Vec<String>,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Continue every unfinished job in the progress store
    Resume {
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Delete sources of encrypted copies that already exist
    Adopt {
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(value_name = "ENCRYPTED_ID", required = true)]
        target_ids: Vec<String>,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Print every progress record
    Status,
    /// Drop one progress record so the snapshot can be migrated again
    Forget { source_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindFilter {
    Instance,
    Cluster,
    All,
}

impl KindFilter {
    pub fn kinds(self) -> Vec<SnapshotKind> {
        match self {
            Self::Instance => vec![SnapshotKind::Instance],
            Self::Cluster => vec![SnapshotKind::Cluster],
            Self::All => SnapshotKind::ALL.to_vec(),
        }
    }

    pub fn single(self) -> Option<SnapshotKind> {
        match self {
            Self::Instance => Some(SnapshotKind::Instance),
            Self::Cluster => Some(SnapshotKind::Cluster),
            Self::All => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Instance,
    Cluster,
}

impl From<KindArg> for SnapshotKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Instance => SnapshotKind::Instance,
            KindArg::Cluster => SnapshotKind::Cluster,
        }
    }
}

/// Flags that override the config file for a single run.
#[derive(Debug, Clone, Default, Args)]
pub struct TuningArgs {
    #[arg(long, env = "SNAPSHOT_ENCRYPTOR_KEY_ALIAS")]
    pub key_alias: Option<String>,
    #[arg(long, env = "SNAPSHOT_ENCRYPTOR_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,
    #[arg(long, env = "SNAPSHOT_ENCRYPTOR_WORKERS")]
    pub workers: Option<usize>,
    #[arg(long, env = "SNAPSHOT_ENCRYPTOR_MAX_WAIT_SECS")]
    pub max_wait_secs: Option<u64>,
}

impl TuningArgs {
    pub fn apply(&self, config: &mut MigrationConfig) {
        if let Some(alias) = &self.key_alias {
            config.key_alias = alias.clone();
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_ms = secs.saturating_mul(1_000);
        }
        if let Some(workers) = self.workers {
            config.worker_threads = workers;
        }
        if let Some(secs) = self.max_wait_secs {
            config.max_wait_ms = Some(secs.saturating_mul(1_000));
        }
    }
}

impl Command {
    pub fn tuning(&self) -> Option<&TuningArgs> {
        match self {
            Self::Migrate { tuning, .. } | Self::Resume { tuning } | Self::Adopt { tuning, .. } => {
                Some(tuning)
            }
            Self::List { .. } | Self::Status | Self::Forget { .. } => None,
        }
    }
}

impl Cli {
    /// Config file values (or defaults), overridden by command flags, then
    /// validated.
    pub fn migration_config(&self) -> Result<MigrationConfig, ValidationError> {
        let mut config = match &self.config {
            Some(path) => MigrationConfig::from_json_file(path)?,
            None => MigrationConfig::default(),
        };
        if let Some(tuning) = self.command.tuning() {
            tuning.apply(&mut config);
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    LogLevel::parse(raw).ok_or_else(|| format!("unknown log level '{raw}'"))
}
