mod server;

use anyhow::Result;
use tracing::info;

use livertc_core::{logging, Config};

use server::LivertcServer;

#[tokio::main]
async fn main() -> Result<()> {
    let config_file = std::env::var("LIVERTC_CONFIG").ok();
    let config = Config::load(config_file.as_deref())
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    logging::init_logging(&config.logging)?;
    info!(addr = %config.http_address(), "livertc starting");
    if config.recording.enabled {
        info!(dir = %config.recording.dir.display(), "recording enabled");
    }

    LivertcServer::new(config).run().await
}
