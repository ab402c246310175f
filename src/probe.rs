use crate::error::Result;
use std::time::Duration;

/// Build the HTTP client used for liveness probes
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Check that something answers on the speaker's web server
///
/// Any retrieved body counts as reachable; the content is not inspected.
/// Failures are logged and reported as `false`.
pub(crate) async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match fetch(client, url).await {
        Ok(body) => {
            tracing::debug!("Probe {} answered: {}", url, crate::protocol::excerpt(&body));
            true
        }
        Err(e) => {
            tracing::debug!("Probe {} failed: {}", url, e);
            false
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    Ok(response.text().await?)
}
