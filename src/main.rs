use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use regex::Regex;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eventgate::config::{EventGateConfig, LogFormat};
use eventgate::gate::errormap::ErrorEventConfig;
use eventgate::gate::{EventGate, GateConfig};
use eventgate::producer::memory::InMemoryProducer;
use eventgate::producer::Dispatcher;
use eventgate::routes::{build_router, AppState};
use eventgate::streams::StreamAuthorizer;
use eventgate::validation::{SchemaFetcher, ValidatorCache, ValidatorCacheConfig};

#[derive(Parser)]
#[command(name = "eventgate", version, about = "HTTP event intake service")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true, default_value = "eventgate.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve,
    /// Resolve and compile every configured precache schema, then exit.
    Precache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = EventGateConfig::from_file(&cli.config).await?;
    init_tracing(&config.observability.log_format, &config.observability.log_level);

    let validator_cache = Arc::new(build_validator_cache(&config)?);
    for uri in &config.schema.extra_meta_schema_uris {
        info!(uri, "preloading meta-schema");
        validator_cache.preload_meta_schema(uri).await?;
    }
    precache(&config, &validator_cache).await?;

    match cli.command {
        Command::Precache => Ok(()),
        Command::Serve => serve(config, validator_cache).await,
    }
}

fn init_tracing(format: &LogFormat, level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

fn build_validator_cache(
    config: &EventGateConfig,
) -> Result<ValidatorCache, Box<dyn std::error::Error>> {
    let meta_schema_id_regex = config
        .schema
        .meta_schema_id_regex
        .as_deref()
        .map(Regex::new)
        .transpose()?;

    Ok(ValidatorCache::new(
        SchemaFetcher::new(),
        ValidatorCacheConfig {
            base_uris: config.schema.base_uris.clone(),
            default_extension: config.schema.file_extension.clone(),
            allow_absolute_schema_uris: config.schema.allow_absolute_uris,
            meta_schema_id_regex,
        },
    ))
}

async fn precache(
    config: &EventGateConfig,
    validator_cache: &ValidatorCache,
) -> Result<(), Box<dyn std::error::Error>> {
    for schema_ref in &config.schema.precache_uris {
        info!(schema_ref, "precaching schema");
        validator_cache.schema_for(schema_ref).await?;
    }
    Ok(())
}

async fn serve(
    config: EventGateConfig,
    validator_cache: Arc<ValidatorCache>,
) -> Result<(), Box<dyn std::error::Error>> {
    let authorizer = Arc::new(StreamAuthorizer::new(
        config.streams.config_uri.clone(),
        config.streams.config_title_field.clone(),
    ));
    authorizer.reload().await?;

    let guaranteed = Arc::new(InMemoryProducer::new());
    let hasty = config
        .producer
        .hasty_enabled
        .then(|| Arc::new(InMemoryProducer::new()) as Arc<dyn eventgate::producer::Producer>);
    let dispatcher = Arc::new(Dispatcher::new(guaranteed, hasty));

    let error_event = match (&config.streams.error_schema_uri, &config.streams.error_stream) {
        (Some(schema_uri), Some(stream)) => Some(ErrorEventConfig {
            schema_uri_field: config
                .schema
                .uri_field
                .first()
                .cloned()
                .unwrap_or_else(|| "meta.schema_uri".to_string()),
            stream_field: config
                .streams
                .field
                .first()
                .cloned()
                .unwrap_or_else(|| "meta.stream".to_string()),
            error_schema_uri: schema_uri.clone(),
            error_stream: stream.clone(),
            emitter_id: "eventgate".to_string(),
        }),
        _ => None,
    };

    let gate = EventGate::new(
        validator_cache,
        authorizer.clone(),
        dispatcher,
        GateConfig {
            schema_uri_field_paths: config.schema.uri_field.clone(),
            stream_field_paths: config.streams.field.clone(),
            topic_prefix: config.streams.topic_prefix.clone(),
            error_event,
            background_deadline: Duration::from_secs(config.producer.background_deadline_secs),
            id_field_paths: config.fields.id_field.clone(),
            dt_field_paths: config.fields.dt_field.clone(),
            key_field_paths: config.fields.key_field.clone(),
            partition_field_paths: config.fields.partition_field.clone(),
        },
    );

    spawn_reload_signal_task(gate.clone());

    let state = AppState {
        gate: gate.clone(),
        strict: config.streams.strict,
    };
    let router = build_router(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "eventgate listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gate.wait_for_background_tasks().await;
    Ok(())
}

/// Reloads the stream config and validator cache on every SIGHUP, for the
/// lifetime of the process.
fn spawn_reload_signal_task(gate: EventGate) {
    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGHUP handler: {e}");
                return;
            }
        };
        loop {
            hangup.recv().await;
            if let Err(e) = gate.reload().await {
                error!("reload failed: {e}");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining in-flight requests");
}
