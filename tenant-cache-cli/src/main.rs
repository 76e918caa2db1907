use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tenant_cache::{
    CacheConfig, CacheKey, CacheService, ConnectionState, LoggingConfig, TenantScope, init_tracing,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tenant-cache-cli")]
#[command(about = "Inspect and invalidate the tenant cache", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// External cache URL (overrides the configuration file)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report the external cache connection state
    Status,
    /// Print the cached JSON value of a key
    Get(KeyArgs),
    /// Store a JSON value under a key
    Set {
        #[command(flatten)]
        key: KeyArgs,
        /// JSON value
        value: String,
        /// Time to live in seconds
        #[arg(long, default_value = "3600")]
        ttl: u64,
    },
    /// Delete a single key
    Invalidate(KeyArgs),
    /// Delete a namespace's entries for every tenant, plus the global entry
    InvalidateAll {
        namespace: String,
        /// Only entries with this qualifier
        #[arg(short, long)]
        qualifier: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
struct KeyArgs {
    /// Key namespace, e.g. `lookup`
    namespace: String,
    /// Tenant (center) id; omit for the global entry
    #[arg(short, long)]
    tenant: Option<i64>,
    /// Key qualifier, e.g. a lookup table name
    #[arg(short, long)]
    qualifier: Option<String>,
}

impl KeyArgs {
    fn key(&self) -> Result<CacheKey> {
        let scope = TenantScope::from(self.tenant);
        let key = match &self.qualifier {
            Some(qualifier) => CacheKey::qualified(&self.namespace, scope, qualifier)?,
            None => CacheKey::new(&self.namespace, scope)?,
        };
        Ok(key)
    }
}

/// Configuration file if given, else defaults with human-readable logs
fn load_config(args: &Args) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CacheConfig {
            logging: LoggingConfig {
                format: "pretty".to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
    };
    if let Some(url) = &args.redis_url {
        config = config.with_redis_url(url.clone());
    }
    Ok(config)
}

/// Wait until the connection attempt settles or the connect timeout passes
async fn settle(service: &CacheService, config: &CacheConfig) -> ConnectionState {
    let deadline = Instant::now() + config.external.connect_timeout() + Duration::from_millis(100);
    while service.state() == ConnectionState::Connecting && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    service.state()
}

fn describe(state: ConnectionState) -> String {
    match state {
        ConnectionState::Ready => state.to_string().green().to_string(),
        ConnectionState::Connecting => state.to_string().yellow().to_string(),
        ConnectionState::Disabled | ConnectionState::Unavailable => {
            state.to_string().red().to_string()
        }
    }
}

async fn execute(command: &Command, service: &CacheService) -> Result<String> {
    let response = match command {
        Command::Status => {
            let stats = service.stats();
            format!(
                "external: {}\nbackend:  {}\ndegraded: {}",
                describe(service.state()),
                service.selector().current_backend().name(),
                stats.degraded_ops
            )
        }
        Command::Get(key) => {
            let key = key.key()?;
            match service.get::<Value>(&key).await {
                Some(value) => serde_json::to_string_pretty(&value)?,
                None => "(nil)".dimmed().to_string(),
            }
        }
        Command::Set { key, value, ttl } => {
            let key = key.key()?;
            let value: Value = serde_json::from_str(value).context("Value must be valid JSON")?;
            if service.set(&key, &value, *ttl).await {
                "OK".green().to_string()
            } else {
                return Err(anyhow::anyhow!("Write to {} was dropped", key));
            }
        }
        Command::Invalidate(key) => {
            let key = key.key()?;
            if service.invalidate_key(&key).await {
                format!("{} {}", "Invalidated".green(), key)
            } else {
                return Err(anyhow::anyhow!("Invalidation of {} failed", key));
            }
        }
        Command::InvalidateAll {
            namespace,
            qualifier,
        } => {
            let ok = match qualifier {
                Some(qualifier) => {
                    service
                        .invalidate_all_tenants_qualified(namespace, qualifier)
                        .await
                }
                None => service.invalidate_all_tenants(namespace).await,
            };
            if ok {
                format!("{} every tenant of {}", "Invalidated".green(), namespace)
            } else {
                return Err(anyhow::anyhow!("Invalidation of {} failed", namespace));
            }
        }
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Command output is emitted through tracing
    init_tracing(&config.logging)?;

    let service = CacheService::new(&config);
    let state = settle(&service, &config).await;
    if state != ConnectionState::Ready && !matches!(args.command, Command::Status) {
        warn!(
            "External cache is {}; this command only affects this process's local store",
            state
        );
    }

    let start = Instant::now();
    match execute(&args.command, &service).await {
        Ok(output) => {
            info!("{}", output);
            info!("{}", format!("({:.2?})", start.elapsed()).dimmed());
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    }
}
