use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use parquet_etl::aws::{make_s3_client, S3Store};
use parquet_etl::config::{
    default_local_source, EtlConfig, DEFAULT_BUCKET, DEFAULT_ENTITY, DEFAULT_OUTPUT_ROOT, DEFAULT_REGION,
    DEFAULT_SOURCE_KEY, RETENTION_DAYS,
};
use parquet_etl::logging::{init_logging, LogFormat};
use parquet_etl::{pipeline, trigger, Source};

#[derive(Parser, Debug)]
#[command(name = "etl")]
#[command(author, version, about = "CSV to partitioned S3 Parquet ETL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "ETL_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once from a local file (or the source key with --remote)
    Run {
        #[command(flatten)]
        storage: StorageArgs,

        /// CSV to ingest [default: <download dir>/<entity>.csv]
        #[arg(long, env = "ETL_SOURCE_PATH", conflicts_with = "remote")]
        source_path: Option<PathBuf>,

        /// Read the source from object storage instead of the local disk
        #[arg(long)]
        remote: bool,

        /// Skip the retention sweep
        #[arg(long)]
        no_sweep: bool,
    },

    /// Handle one on-demand invocation and print the JSON result
    Invoke {
        #[command(flatten)]
        storage: StorageArgs,

        /// Event payload file, `-` for stdin [default: empty object]
        #[arg(long)]
        event: Option<PathBuf>,

        /// Run the retention sweep after publishing
        #[arg(long)]
        sweep: bool,
    },
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Destination bucket
    #[arg(long, env = "ETL_BUCKET", default_value = DEFAULT_BUCKET)]
    bucket: String,

    #[arg(long, env = "ETL_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long, env = "ETL_S3_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "ETL_S3_PATH_STYLE")]
    force_path_style: bool,

    /// Dataset name used in keys and file names
    #[arg(long, env = "ETL_ENTITY", default_value = DEFAULT_ENTITY)]
    entity: String,

    #[arg(long, env = "ETL_OUTPUT_ROOT", default_value = DEFAULT_OUTPUT_ROOT)]
    output_root: String,

    #[arg(long, env = "ETL_SOURCE_BUCKET", default_value = DEFAULT_BUCKET)]
    source_bucket: String,

    #[arg(long, env = "ETL_SOURCE_KEY", default_value = DEFAULT_SOURCE_KEY)]
    source_key: String,

    /// Metadata `source` tag [default: depends on the source]
    #[arg(long, env = "ETL_SOURCE_TAG")]
    source_tag: Option<String>,

    #[arg(long, env = "ETL_RETENTION_DAYS", default_value_t = RETENTION_DAYS)]
    retention_days: i64,

    /// Follow continuation tokens when listing for the sweep
    #[arg(long, env = "ETL_PAGINATE_LISTING")]
    paginate_listing: bool,
}

impl StorageArgs {
    fn into_config(self, local_source: Option<PathBuf>, sweep: bool) -> EtlConfig {
        let local_source = local_source.unwrap_or_else(|| default_local_source(&self.entity));
        EtlConfig {
            bucket: self.bucket,
            region: self.region,
            endpoint: self.endpoint,
            force_path_style: self.force_path_style,
            entity: self.entity,
            output_root: self.output_root,
            source_bucket: self.source_bucket,
            source_key: self.source_key,
            local_source,
            source_tag: self.source_tag,
            retention_days: self.retention_days,
            sweep,
            paginate_listing: self.paginate_listing,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_format) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Run {
            storage,
            source_path,
            remote,
            no_sweep,
        } => {
            let config = storage.into_config(source_path, !no_sweep);
            let source = if remote {
                Source::Remote {
                    bucket: config.source_bucket.clone(),
                    key: config.source_key.clone(),
                }
            } else {
                Source::Local(config.local_source.clone())
            };
            run_standalone(&config, &source).await
        }
        Command::Invoke { storage, event, sweep } => {
            let config = storage.into_config(None, sweep);
            match invoke(&config, event).await {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::FAILURE,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Invocation failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run_standalone(config: &EtlConfig, source: &Source) -> ExitCode {
    let now = Utc::now();
    info!("ETL: {} CSV -> S3 Parquet", config.entity);
    info!("Date/time: {}", now.format("%Y-%m-%d %H:%M:%S"));
    info!("Destination bucket: {}", config.bucket);
    info!("Region: {}", config.region);

    let store = S3Store::new(make_s3_client(config).await);
    match pipeline::run(&store, config, source, now).await {
        Ok(summary) => {
            info!("ETL completed successfully");
            info!("Records processed: {}", summary.records);
            info!("Source file: {}", summary.origin);
            info!("Destination: s3://{}/{}", config.bucket, summary.key);
            info!("Console: {}", summary.console_url(&config.bucket));
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.is_abort() {
                error!(error = %e, "ETL aborted");
            }
            ExitCode::FAILURE
        }
    }
}

async fn invoke(config: &EtlConfig, event: Option<PathBuf>) -> Result<bool> {
    let payload = match event {
        None => serde_json::Value::Object(Default::default()),
        Some(path) => {
            let raw = if path.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read event from stdin")?;
                buf
            } else {
                tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read event file {}", path.display()))?
            };
            serde_json::from_str(&raw).context("Event payload is not valid JSON")?
        }
    };

    let store = S3Store::new(make_s3_client(config).await);
    let response = trigger::handle(&store, config, &payload, Utc::now()).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.is_success())
}
