//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::Instrument;

use crate::core::cli::{self, Commands};
use crate::core::config::{AppConfig, BackendType, BrokerConfig, StreamConfig};
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::broker::{BrokerSink, MemoryBrokerSink, RedisBrokerSink};
use crate::data::stream::{MemoryStreamSource, RedisStreamSource, StreamSource};
use crate::domain::metrics::{InvocationResult, MetricsBridge};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub source: Arc<dyn StreamSource>,
    pub broker: Arc<dyn BrokerSink>,
    pub bridge: MetricsBridge,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.json_logs, cli_config.debug);
        tracing::trace!(command = ?command, "Parsed command");

        let config = AppConfig::load(&cli_config)?;

        match command.unwrap_or(Commands::Run) {
            Commands::Run => Self::run_once(config).await,
            Commands::Poll { interval_secs } => {
                let app = Self::init(config).await?;
                app.poll(Duration::from_secs(interval_secs)).await
            }
            Commands::Check => Self::check(config).await,
        }
    }

    /// Build backends and the bridge from a loaded config
    pub async fn init(config: AppConfig) -> Result<Self> {
        let (source, broker) = tokio::try_join!(
            Self::connect_source(&config.stream),
            Self::connect_broker(&config.broker),
        )?;

        tracing::debug!(
            stream = source.backend_name(),
            broker = broker.backend_name(),
            "Backends initialized"
        );

        let bridge = Self::bridge_for(&config, source.clone(), broker.clone());

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            source,
            broker,
            bridge,
        })
    }

    /// Wire a bridge over already-connected backends
    pub fn bridge_for(
        config: &AppConfig,
        source: Arc<dyn StreamSource>,
        broker: Arc<dyn BrokerSink>,
    ) -> MetricsBridge {
        MetricsBridge::new(source, broker, &config.filtering, config.bridge_settings())
    }

    async fn connect_source(config: &StreamConfig) -> Result<Arc<dyn StreamSource>> {
        match config.backend {
            BackendType::Memory => Ok(Arc::new(MemoryStreamSource::new())),
            BackendType::Redis => {
                let url = config
                    .url
                    .as_deref()
                    .context("stream.url is required for the redis backend")?;
                let source = RedisStreamSource::new(url, &config.name)
                    .await
                    .context("Failed to initialize stream source")?;
                Ok(Arc::new(source))
            }
        }
    }

    async fn connect_broker(config: &BrokerConfig) -> Result<Arc<dyn BrokerSink>> {
        match config.backend {
            BackendType::Memory => Ok(Arc::new(MemoryBrokerSink::new())),
            BackendType::Redis => {
                let url = config
                    .url
                    .as_deref()
                    .context("broker.url is required for the redis backend")?;
                let broker = RedisBrokerSink::new(url, config.batch_size, config.retries)
                    .await
                    .context("Failed to initialize broker")?;
                Ok(Arc::new(broker))
            }
        }
    }

    /// One invocation inside a span carrying a fresh invocation id
    pub async fn invoke(&self) -> InvocationResult {
        let invocation_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("invocation", invocation_id = %invocation_id);
        self.bridge.invoke().instrument(span).await
    }

    async fn run_once(config: AppConfig) -> Result<()> {
        let result = match Self::init(config).await {
            Ok(app) => app.invoke().await,
            Err(e) => {
                tracing::error!(error = %e, "Client initialization failed");
                InvocationResult::failed(format!("client_init_failed: {e:#}"), 0)
            }
        };

        print_result(&result)?;
        if result.is_error() {
            anyhow::bail!(
                "Invocation failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    /// Repeat invocations until a shutdown signal arrives.
    ///
    /// A signal during an invocation lets it finish before the loop exits.
    async fn poll(&self, interval: Duration) -> Result<()> {
        self.shutdown.install_signal_handlers();
        tracing::info!(
            interval_secs = interval.as_secs(),
            stream = %self.config.stream.name,
            topic = %self.config.broker.topic,
            "Polling started"
        );

        loop {
            let result = self.invoke().await;
            print_result(&result)?;

            if self.shutdown.pause(interval).await {
                break;
            }
        }

        tracing::info!("Polling stopped");
        Ok(())
    }

    async fn check(config: AppConfig) -> Result<()> {
        let app = Self::init(config).await?;
        app.source
            .health_check()
            .await
            .context("Stream source health check failed")?;

        println!(
            "stream: {} ({}) ok",
            app.source.backend_name(),
            app.config.stream.name
        );
        println!(
            "broker: {} ({}) ok",
            app.broker.backend_name(),
            app.config.broker.topic
        );
        Ok(())
    }

    fn init_logging(json: bool, debug: bool) {
        let default_filter = if debug {
            format!("info,{}=debug", APP_NAME_LOWER)
        } else {
            format!("info,{}=info", APP_NAME_LOWER)
        };

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        // stdout carries the invocation result, logs go to stderr
        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_env_filter(filter);

        if json {
            builder.json().init();
        } else {
            builder.with_ansi(true).compact().init();
        }
    }
}

fn print_result(result: &InvocationResult) -> Result<()> {
    let line = serde_json::to_string(result).context("Failed to serialize invocation result")?;
    println!("{line}");
    Ok(())
}
