mod server;

use anyhow::Result;
use tracing::info;

use streamgate_core::{logging, Config};

use server::StreamGateServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config_path = std::env::var("STREAMGATE_CONFIG").ok();
    let config = Config::load(config_path.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("streamgate server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Build and run the server
    let server = StreamGateServer::new(config);
    server.run().await
}
