//! `confab prime`: the bootstrap request on its own.

use std::error::Error;

use serde_json::Value;

use crate::core::bootstrap::BootstrapClient;
use crate::core::config::SessionConfig;

pub async fn run_prime(config: SessionConfig, context: Value) -> Result<(), Box<dyn Error>> {
    let client = BootstrapClient::new(config.bootstrap_url, config.bootstrap_timeout)?;
    let ack = client.prime(&context).await?;

    match ack.summary_text() {
        Some(summary) => println!("{summary}"),
        None if ack.extra.is_empty() => println!("✅ Bootstrap acknowledged"),
        None => println!("{}", serde_json::to_string_pretty(&ack.extra)?),
    }
    Ok(())
}
