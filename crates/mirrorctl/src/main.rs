use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{KeySerializer, KeyType};
use mirror_client::{MirrorClientConfig, MirrorQueryClient};
use mirror_service::{MirrorServer, MirrorService, ServiceConfig};
use range_index::{key_prefix, EndRange, FieldKind, RangeNumber};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format = std::env::var("MIRROR_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .flatten_event(true)
                .with_writer(std::io::stderr)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .init();
        }
    });
}

#[derive(Parser)]
#[command(name = "mirrorctl")]
#[command(about = "Mirror replica and query utility", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, Args)]
struct Target {
    /// Load-balanced mirror service address. Defaults to MIRROR_SERVICE_ADDRESS.
    #[arg(short, long)]
    service: Option<String>,
    /// Key type of the mirrored topic (string, int, long).
    #[arg(long, default_value = "string")]
    key_type: KeyType,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mirror replica described by a YAML file
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Read the value stored under one key
    Get {
        #[command(flatten)]
        target: Target,
        key: String,
    },
    /// Read the values of several keys
    List {
        #[command(flatten)]
        target: Target,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Read every value of the topic
    All {
        #[command(flatten)]
        target: Target,
    },
    /// Read the values of a key whose range field lies in [from, to]
    Range {
        #[command(flatten)]
        target: Target,
        key: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Show which replica owns each partition
    Partitions {
        #[command(flatten)]
        target: Target,
    },
    /// Print the range index key for a key and field value
    Index {
        key: String,
        #[arg(allow_negative_numbers = true)]
        value: String,
        /// Range field type (int or long).
        #[arg(long, default_value = "long")]
        kind: FieldKind,
        /// Render the value as the inclusive lower scan bound.
        #[arg(long, conflicts_with = "upper")]
        lower: bool,
        /// Render the value as the exclusive upper scan bound.
        #[arg(long)]
        upper: bool,
    },
}

fn client_config(target: &Target) -> Result<MirrorClientConfig> {
    let config = match &target.service {
        Some(address) => MirrorClientConfig::new(address.clone()),
        None => MirrorClientConfig::from_env().context(
            "no --service given and MIRROR_SERVICE_ADDRESS is not usable",
        )?,
    };
    Ok(config)
}

async fn connect(target: &Target) -> Result<MirrorQueryClient<str, Value>> {
    let config = client_config(target)?;
    let serializer: Arc<dyn KeySerializer<str>> = Arc::new(target.key_type);
    MirrorQueryClient::connect(&config, serializer)
        .await
        .with_context(|| format!("cannot load partition mapping from {}", config.service_address))
}

fn print_values(values: &[Value]) -> Result<()> {
    if values.is_empty() {
        println!("(no values)");
    }
    for value in values {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

fn render_index(key: &str, value: &str, kind: FieldKind, end: Option<EndRange>) -> Result<String> {
    let padded = match end {
        Some(end) => kind.pad_boundary(value, end)?,
        None => {
            let number = match kind {
                FieldKind::Int => RangeNumber::Int(
                    value
                        .parse()
                        .with_context(|| format!("'{value}' is not an int"))?,
                ),
                FieldKind::Long => RangeNumber::Long(
                    value
                        .parse()
                        .with_context(|| format!("'{value}' is not a long"))?,
                ),
            };
            number.pad_zero()
        }
    };
    Ok(format!("{}{}", key_prefix(key), padded))
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Serve { config } => {
            let config = ServiceConfig::load(&config)?;
            let service = MirrorService::from_config(&config)?;
            info!(topic = %config.topic, listen = %config.listen, "starting mirror replica");
            MirrorServer::new(service, config.listen.clone()).run().await?;
        }
        Commands::Get { target, key } => {
            let client = connect(&target).await?;
            match client.get(&key).await? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("Key {} does not exist", key),
            }
        }
        Commands::List { target, keys } => {
            let client = connect(&target).await?;
            let values = client.get_list(keys.iter().map(String::as_str)).await?;
            print_values(&values)?;
        }
        Commands::All { target } => {
            let client = connect(&target).await?;
            print_values(&client.get_all().await?)?;
        }
        Commands::Range {
            target,
            key,
            from,
            to,
        } => {
            let client = connect(&target).await?;
            print_values(&client.get_range(&key, &from, &to).await?)?;
        }
        Commands::Partitions { target } => {
            let client = connect(&target).await?;
            println!("Partition\tHost");
            for (partition, host) in client.router().table().to_snapshot() {
                println!("{}\t{}", partition, host);
            }
        }
        Commands::Index {
            key,
            value,
            kind,
            lower,
            upper,
        } => {
            let end = match (lower, upper) {
                (true, _) => Some(EndRange::Inclusive),
                (_, true) => Some(EndRange::Exclusive),
                _ => None,
            };
            println!("{}", render_index(&key, &value, kind, end)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command))
}
