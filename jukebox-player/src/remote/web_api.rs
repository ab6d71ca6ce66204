//! Remote player over a Spotify-Web-API compatible HTTP interface

use super::{Device, RemotePlayer};
use crate::error::RemoteError;
use async_trait::async_trait;
use jukebox_common::model::RemoteClient;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const USER_AGENT: &str = concat!("jukebox-player/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: Vec<Device>,
}

/// Web API client authenticated per call with the user's bearer token
pub struct WebApiPlayer {
    http_client: reqwest::Client,
    base_url: String,
}

impl WebApiPlayer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map a response status onto the remote error taxonomy
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::RateLimited);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Status { code: status.as_u16(), body });
    }

    Ok(response)
}

#[async_trait]
impl RemotePlayer for WebApiPlayer {
    async fn list_devices(&self, client: &RemoteClient) -> Result<Vec<Device>, RemoteError> {
        let response = self
            .http_client
            .get(self.url("/me/player/devices"))
            .bearer_auth(&client.auth_token)
            .send()
            .await?;

        let list: DeviceList = check_status(response).await?.json().await?;
        Ok(list.devices)
    }

    async fn activate_device(&self, client: &RemoteClient, device_id: &str) -> Result<(), RemoteError> {
        let response = self
            .http_client
            .put(self.url("/me/player"))
            .bearer_auth(&client.auth_token)
            .json(&json!({ "device_ids": [device_id], "play": false }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn play(&self, client: &RemoteClient, uri: &str, position_ms: i64) -> Result<(), RemoteError> {
        let response = self
            .http_client
            .put(self.url("/me/player/play"))
            .bearer_auth(&client.auth_token)
            .json(&json!({ "uris": [uri], "position_ms": position_ms.max(0) }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn pause(&self, client: &RemoteClient, position_ms: i64) -> Result<(), RemoteError> {
        let response = self
            .http_client
            .put(self.url("/me/player/pause"))
            .bearer_auth(&client.auth_token)
            .send()
            .await?;

        // The provider refuses to pause an already paused player
        if response.status() != StatusCode::FORBIDDEN {
            check_status(response).await?;
        }

        let response = self
            .http_client
            .put(self.url("/me/player/seek"))
            .bearer_auth(&client.auth_token)
            .query(&[("position_ms", position_ms.max(0))])
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}
