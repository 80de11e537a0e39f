//! TagCloud uplink. Pushes samples read from a sensor tag to Watson IoT.
//!
//! Usage: `tc-uplink [config.toml] [batch.json]`

use tracing_subscriber::EnvFilter;

use tc_cloud_provider::WatsonProvider;
use tc_uplink::batch::UploadBatch;
use tc_uplink::config::UplinkConfig;
use tc_uplink::upload;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tc-uplink starting");

    // ── Load config ─────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .unwrap_or_else(|| "/etc/tagcloud/uplink.toml".to_string());
    let batch_path = args.next().unwrap_or_else(|| "batch.json".to_string());

    let config = UplinkConfig::from_file(&config_path)?;
    tracing::info!(
        device_id = %config.watson.device_id,
        events_topic = %config.watson.events_topic,
        "config loaded"
    );

    let batch = UploadBatch::from_file(&batch_path)?;
    if batch.is_empty() {
        tracing::info!(path = %batch_path, "batch is empty, nothing to upload");
        return Ok(());
    }

    // ── Upload ──────────────────────────────────────────────────
    let provider = WatsonProvider::new(config.watson);
    let report = upload::run(&provider, &batch).await?;

    tracing::info!(
        samples = ?report.samples,
        extreme = ?report.extreme,
        failures = report.failures,
        "tc-uplink finished"
    );

    if report.failures > 0 {
        anyhow::bail!("{} upload(s) failed", report.failures);
    }
    Ok(())
}
