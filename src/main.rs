use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use binlog_pump::checkpoint::CheckpointManager;
use binlog_pump::clickhouse::ClickHouseClient;
use binlog_pump::config::{
    parse_list, AppConfig, Config, ConversionPolicy, PumpConfig, SinkConfig, SourceConfig,
};
use binlog_pump::convert::{EventConverter, MutationPolicy};
use binlog_pump::filter::TableFilter;
use binlog_pump::mysql::MysqlBinlogSource;
use binlog_pump::writer::Writer;
use binlog_pump::{Error, Pumper, Result};

#[derive(Parser, Debug)]
#[command(name = "binlog-pump")]
#[command(about = "MySQL to ClickHouse CDC replicator", long_about = None)]
struct Args {
    /// Dry mode - run the pipeline but perform no sink writes
    #[arg(long)]
    dry: bool,

    /// Path of the resume checkpoint file
    #[arg(long, value_name = "FILE", default_value = "binlog-pump.checkpoint")]
    checkpoint_file: PathBuf,

    /// server_id to register with when reading the binlog
    #[arg(long, default_value_t = 1)]
    src_server_id: u32,

    /// Host to be used when reading from src
    #[arg(long, default_value = "127.0.0.1")]
    src_host: String,

    /// Port to be used when reading from src
    #[arg(long, default_value_t = 3306)]
    src_port: u16,

    /// Username to be used when reading from src
    #[arg(long, default_value = "root")]
    src_user: String,

    /// Password to be used when reading from src
    #[arg(long, default_value = "")]
    src_password: String,

    /// Comma-separated list of schemas to replicate
    #[arg(long, default_value = "")]
    src_only_schemas: String,

    /// Comma-separated list of tables to replicate (bare or schema.table)
    #[arg(long, default_value = "")]
    src_only_tables: String,

    /// Wait for new records instead of stopping at the end of the binlog
    #[arg(long)]
    src_wait: bool,

    /// Resume reading from the persisted checkpoint position
    #[arg(long)]
    src_resume: bool,

    /// Host to be used when writing to dst
    #[arg(long, default_value = "127.0.0.1")]
    dst_host: String,

    /// ClickHouse HTTP port to be used when writing to dst
    #[arg(long, default_value_t = 8123)]
    dst_port: u16,

    /// Username to be used when writing to dst
    #[arg(long, default_value = "default")]
    dst_user: String,

    /// Password to be used when writing to dst
    #[arg(long, default_value = "")]
    dst_password: String,

    /// Fixed destination schema (per-event source schema when unset)
    #[arg(long)]
    dst_schema: Option<String>,

    /// Fixed destination table (per-event source table when unset)
    #[arg(long)]
    dst_table: Option<String>,

    /// Staged-event count that triggers a flush
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Flush a partial batch after this many milliseconds
    #[arg(long, default_value_t = 1000)]
    flush_interval_ms: u64,

    /// Sleep between polls while waiting for new records
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,

    /// How to handle UPDATE/DELETE records: insert-only or materialize-all
    #[arg(long, default_value = "insert-only")]
    mutation_policy: String,

    /// How to handle unconvertible records: skip or abort
    #[arg(long, default_value = "skip")]
    on_conversion_error: String,

    /// Enable JSON output for logs
    #[arg(short, long)]
    json_logs: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting binlog-pump");

    let config = build_config(args)?;
    info!(
        src_host = %config.source.host,
        src_port = config.source.port,
        server_id = config.source.server_id,
        dst = %config.sink.endpoint(),
        blocking = config.source.blocking,
        resume = config.source.resume,
        dry = config.app.dry,
        "Configuration summary"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, draining and shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let checkpoints = CheckpointManager::new(&config.app.checkpoint_file);
    let resume_from = if config.source.resume {
        checkpoints.load().await?.map(|c| c.position)
    } else {
        None
    };

    let filter = TableFilter::new(
        config.source.only_schemas.clone(),
        config.source.only_tables.clone(),
    );
    let converter = EventConverter::new(
        config.sink.schema.clone(),
        config.sink.table.clone(),
        config.pump.mutation_policy,
    );

    let reader = MysqlBinlogSource::connect(
        &config.source,
        resume_from,
        filter.clone(),
        Duration::from_millis(config.pump.poll_interval_ms),
    )
    .await?;

    let sink = ClickHouseClient::new(&config.sink)?;
    let writer = Writer::new(sink, converter.clone(), config.app.dry);

    let mut pumper = Pumper::new(
        reader,
        writer,
        filter,
        converter,
        checkpoints,
        config.pump.clone(),
        shutdown_rx,
    );

    match pumper.run().await {
        Ok(summary) => {
            info!(
                records_seen = summary.records_seen,
                events_pumped = summary.events_pumped,
                "Replication finished"
            );
            Ok(())
        }
        Err(e) => {
            error!("Replication failed: {}", e);
            Err(e)
        }
    }
}

fn build_config(args: Args) -> Result<Config> {
    let mutation_policy = match args.mutation_policy.as_str() {
        "insert-only" => MutationPolicy::InsertOnly,
        "materialize-all" => MutationPolicy::MaterializeAll,
        other => {
            return Err(Error::Config(format!(
                "unknown mutation policy '{}' (expected insert-only or materialize-all)",
                other
            )))
        }
    };

    let on_conversion_error = match args.on_conversion_error.as_str() {
        "skip" => ConversionPolicy::Skip,
        "abort" => ConversionPolicy::Abort,
        other => {
            return Err(Error::Config(format!(
                "unknown conversion error policy '{}' (expected skip or abort)",
                other
            )))
        }
    };

    Ok(Config {
        app: AppConfig {
            dry: args.dry,
            checkpoint_file: args.checkpoint_file,
        },
        source: SourceConfig {
            host: args.src_host,
            port: args.src_port,
            user: args.src_user,
            password: args.src_password,
            server_id: args.src_server_id,
            only_schemas: parse_list(&args.src_only_schemas),
            only_tables: parse_list(&args.src_only_tables),
            blocking: args.src_wait,
            resume: args.src_resume,
        },
        sink: SinkConfig {
            host: args.dst_host,
            port: args.dst_port,
            user: args.dst_user,
            password: args.dst_password,
            schema: args.dst_schema,
            table: args.dst_table,
        },
        pump: PumpConfig {
            batch_size: args.batch_size,
            flush_interval_ms: args.flush_interval_ms,
            poll_interval_ms: args.poll_interval_ms,
            mutation_policy,
            on_conversion_error,
        },
    })
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("binlog_pump=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("binlog_pump=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
