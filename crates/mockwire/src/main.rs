use anyhow::Context;
use clap::{Parser, ValueEnum};
use mockwire::config::MockwireConfig;
use mockwire::hook::MockwireServer;
use mockwire::{HandlerRegistry, Interceptor, InterceptorOptions, UnhandledPolicy};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Mockwire - mock REST and GraphQL endpoints in front of a real upstream
#[derive(Parser, Debug)]
#[command(name = "mockwire")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (YAML, or JSON with a .json extension)
    #[arg(short, long, env = "MOCKWIRE_CONFIG")]
    config: Option<String>,

    /// Listen host (overrides the config file)
    #[arg(long, env = "MOCKWIRE_HOST")]
    host: Option<String>,

    /// Listen port (overrides the config file)
    #[arg(short, long, env = "MOCKWIRE_PORT")]
    port: Option<u16>,

    /// Upstream base URL for bypassed requests
    #[arg(short, long, env = "MOCKWIRE_UPSTREAM")]
    upstream: Option<String>,

    /// What to do with requests no handler answers
    #[arg(long, value_enum, env = "MOCKWIRE_ON_UNHANDLED")]
    on_unhandled: Option<UnhandledPolicy>,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

/// `info` unless the directives (normally `RUST_LOG`) say otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn init_tracing(format: LogFormat) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(directives.as_deref());
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = match &args.config {
        Some(path) => MockwireConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => MockwireConfig::default(),
    };
    if let Some(host) = args.host {
        config.listen.host = host;
    }
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(upstream) = args.upstream {
        config.upstream = Some(upstream);
    }
    if let Some(policy) = args.on_unhandled {
        config.on_unhandled = policy;
    }
    config.validate()?;

    let handlers = config.build_handlers()?;
    info!("Loaded {} handler(s)", handlers.len());
    let interceptor = Arc::new(Interceptor::with_options(
        Arc::new(HandlerRegistry::new(handlers)),
        InterceptorOptions {
            on_unhandled: config.on_unhandled,
            ..Default::default()
        },
    ));

    let upstream = config
        .upstream
        .as_deref()
        .map(url::Url::parse)
        .transpose()
        .context("Invalid upstream URL")?;
    let server = Arc::new(MockwireServer::new(interceptor, upstream)?);

    let listener = TcpListener::bind((config.listen.host.as_str(), config.listen.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.listen.host, config.listen.port
            )
        })?;

    let serving = tokio::spawn(Arc::clone(&server).serve(listener));
    tokio::signal::ctrl_c().await.ok();
    server.shutdown();
    serving.await??;
    Ok(())
}
