use anyhow::{anyhow, Result};
use reqwest::Client as HttpClient;
use tracing::debug;

/// GET `url` and require a success status.
pub async fn probe_endpoint(client: &HttpClient, url: &str) -> Result<u16> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("request to {} failed: {}", url, e))?;

    let status = response.status();
    debug!("Endpoint {} answered {}", url, status);

    if status.is_success() {
        Ok(status.as_u16())
    } else {
        Err(anyhow!("{} returned HTTP {}", url, status.as_u16()))
    }
}
