//! Access token request.

use super::HUB_PORT;
use crate::error::AppError;
use sha2::{Digest, Sha512};
use std::time::Duration;
use tracing::{debug, info};

/// Name this tool registers under in the hub's device list.
const DEVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Exchange username and password for a session token.
pub async fn request_access_token(
    host: &str,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<String, AppError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Connection(e.to_string()))?;

    let url = format!("http://{}:{}/access_token", host, HUB_PORT);
    debug!("Requesting access token from {}", url);

    let response = client
        .post(&url)
        .basic_auth(username, Some(password_digest(password)))
        .form(&[
            ("device_name", DEVICE_NAME),
            ("device_hardware_id", DEVICE_NAME),
            ("device_os", "5"),
            ("device_type", "3"),
            ("device_app", "1"),
        ])
        .send()
        .await
        .map_err(|e| AppError::Connection(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::Connection(e.to_string()))?;

    if !status.is_success() {
        return Err(AppError::Connection(format!(
            "Access token request failed with status {}: {}",
            status,
            body.trim()
        )));
    }

    let token = parse_access_token(&body).ok_or_else(|| {
        AppError::Connection("Homee did not return an access token.".to_string())
    })?;
    info!("Received access token");
    Ok(token)
}

/// The hub never sees the plain password, only its SHA-512 hex digest.
fn password_digest(password: &str) -> String {
    hex::encode(Sha512::digest(password.as_bytes()))
}

/// Pull `access_token` out of the URL-encoded response body.
fn parse_access_token(body: &str) -> Option<String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}
