use anyhow::Result;
use std::env;

use rship_mv16_labels::{DeviceConfig, Mv16Service};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let device_config = DeviceConfig::from_env();
    let rship_address = env::var("RSHIP_ADDRESS").unwrap_or_else(|_| "nyc.rship.io".to_string());
    let rship_port = env::var("RSHIP_PORT").unwrap_or_else(|_| "5155".to_string());

    log::info!("Starting rship-mv16-labels executor");
    log::info!("MV16: {}", device_config.address());
    log::info!("Rship: {}:{}", rship_address, rship_port);

    let service = Mv16Service::new(device_config, rship_address, rship_port);
    service.start().await?;

    Ok(())
}
