//! Server command implementation

use anyhow::Result;
use spendcast_core::{ForecastConfig, ForecastService};

pub async fn cmd_serve(
    config: ForecastConfig,
    host: &str,
    port: u16,
    allowed_origins: Vec<String>,
) -> Result<()> {
    println!("🚀 Starting Spendcast web server...");
    println!("   Data dir: {}", config.data_dir.display());
    println!("   Listening: http://{}:{}", host, port);
    if !allowed_origins.is_empty() {
        println!("   CORS origins: {}", allowed_origins.join(", "));
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let service: ForecastService = ForecastService::new(config);
    let server_config = spendcast_server::ServerConfig { allowed_origins };
    spendcast_server::serve(service, host, port, server_config).await?;

    Ok(())
}
