//! Docker daemon probe for harness-backed drivers

use anyhow::Result;
use bollard::Docker;
use tracing::{debug, info};

/// Connect to the local Docker daemon and ping it.
///
/// Used before a batch starts to tell "no isolation backend at all" apart
/// from per-instance failures.
pub async fn ping_daemon() -> Result<()> {
    let docker = Docker::connect_with_local_defaults()
        .map_err(|e| anyhow::anyhow!("Failed to connect to Docker: {}", e))?;

    docker
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ping Docker: {}", e))?;

    match docker.version().await {
        Ok(version) => info!(
            version = version.version.as_deref().unwrap_or("unknown"),
            "Connected to Docker daemon"
        ),
        Err(e) => debug!("Docker version unavailable: {}", e),
    }

    Ok(())
}
