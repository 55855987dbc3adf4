use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cnpj_proxy::proxy::models::LookupResponse;
use cnpj_proxy::{cnpj, config, proxy};

#[derive(Parser)]
#[command(name = "cnpj-proxy")]
#[command(about = "Caching, rate-limited proxy for CNPJ registry lookups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start proxy server in foreground
    Start,
    /// Validate a CNPJ and print it formatted
    Check {
        cnpj: String,
    },
    /// Look up a CNPJ once through the registry and print the record
    Lookup {
        cnpj: String,
    },
    /// Print the effective configuration
    Config,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Start) | None => {
            let config = config::load_config()?;
            proxy::start_server(config.to_proxy_config()).await?;
        }
        Some(Commands::Check { cnpj: raw }) => match cnpj::validate(&raw) {
            Ok(valid) => println!("{} is valid", valid.formatted()),
            Err(reason) => anyhow::bail!("{}: {}", cnpj::format(&raw), reason),
        },
        Some(Commands::Lookup { cnpj: raw }) => {
            let config = config::load_config()?;
            let service = proxy::LookupService::from_config(&config.to_proxy_config())?;

            let valid = cnpj::validate(&raw).with_context(|| format!("Cannot look up {:?}", raw))?;
            let outcome = service
                .resolve(&valid)
                .await
                .with_context(|| format!("Lookup for {} failed", valid.formatted()))?;

            let response = LookupResponse::new(outcome.record, outcome.cached);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Some(Commands::Config) => {
            let config = config::load_config()?;
            println!("Config file: {}", config::get_config_path()?.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
