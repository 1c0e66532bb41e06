use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};
use warden::{settings, web};

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Audience-scoped authorization decision point"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    web::serve(settings).await
}
