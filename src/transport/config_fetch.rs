//! One-shot `GET /config` used to seed the session's config.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::state::Config;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches the service's current config.
pub async fn fetch_config(client: &reqwest::Client, url: &Url) -> Result<Config, TransportError> {
    debug!("Fetching config from {}", url);
    let response = client
        .get(url.clone())
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|err| TransportError::ConnectFailed {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

    let response = response
        .error_for_status()
        .map_err(|err| TransportError::Protocol(format!("config request failed: {err}")))?;

    response
        .json::<Config>()
        .await
        .map_err(|err| TransportError::Protocol(format!("config response is not a config: {err}")))
}
