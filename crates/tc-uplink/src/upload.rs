//! One-shot upload: connect, publish the batch, disconnect.

use anyhow::Context;
use tc_cloud_provider::{CloudProvider, Delivery, ProviderResult};

use crate::batch::UploadBatch;

/// Outcome of each publish in a run. `None` means nothing to send.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub samples: Option<Delivery>,
    pub extreme: Option<Delivery>,
    pub failures: usize,
}

/// Upload `batch` through `provider`.
///
/// Fails only if the connection cannot be established. Publish errors
/// are logged and counted; the session is released either way.
pub async fn run<P: CloudProvider + ?Sized>(
    provider: &P,
    batch: &UploadBatch,
) -> anyhow::Result<UploadReport> {
    let mut conn = provider
        .connect()
        .await
        .context("failed to connect to cloud provider")?;

    let mut report = UploadReport::default();

    if !batch.samples.is_empty() {
        let result = provider.upload_samples(&conn, &batch.samples).await;
        report.samples = record(result, "samples", &mut report.failures);
        tracing::info!(count = batch.samples.len(), delivery = ?report.samples, "samples uploaded");
    }

    if let Some(extreme) = &batch.extreme {
        let result = provider.upload_extreme(&conn, extreme).await;
        report.extreme = record(result, "extreme", &mut report.failures);
    }

    provider.disconnect(&mut conn).await;
    Ok(report)
}

fn record(result: ProviderResult<Delivery>, what: &str, failures: &mut usize) -> Option<Delivery> {
    match result {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            tracing::error!(error = %e, payload = what, "upload failed");
            *failures += 1;
            None
        }
    }
}
