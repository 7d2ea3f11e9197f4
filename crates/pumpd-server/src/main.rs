use clap::Parser;
use pumpd_core::config::{Config, WarnLevel};
use pumpd_core::Core;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pumpd",
    about = "Session-managed remote control for a networked pump actuator",
    version
)]
struct Cli {
    /// Path to the YAML config (created with defaults if missing)
    #[arg(long, default_value = "pumpd.yaml", env = "PUMPD_CONFIG")]
    config: PathBuf,

    /// Address to bind the control API on
    #[arg(long, default_value = "0.0.0.0")]
    listen: String,

    /// Port for the control API
    #[arg(long, default_value_t = 3200)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let config = Config::load_or_default(&cli.config)?;
    let mut blocked = false;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
            WarnLevel::Error => {
                tracing::error!("{}", warning.message);
                blocked = true;
            }
        }
    }
    if blocked {
        anyhow::bail!(
            "refusing to start with the configuration errors above (config: {})",
            cli.config.display()
        );
    }

    let core = Core::new(config).await?;
    let listener = tokio::net::TcpListener::bind((cli.listen.as_str(), cli.port)).await?;
    pumpd_server::serve(core, listener).await
}
