//! Wyze cloud API client.
//!
//! Narrow surface over the Wyze app API: log in, list devices. A device
//! list call may silently rotate the credential pair (the client refreshes
//! an expired access token once and retries); callers compare the returned
//! pair with what they started from and persist it if it changed.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::store::TokenPair;
use crate::{Config, Error, Result};

/// Production Wyze API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.wyzecam.com";

const APP_VER: &str = "com.hualai.WyzeCam___2.19.14";
const SC: &str = "9f275790cab94a72bd206c8876429f3c";
const SV_GET_OBJECT_LIST: &str = "9d74946e652647e9b6c9d59326aef104";
const SV_LOGIN: &str = "41267de22d1847c8b99bfba2658f88d7";
const SV_REFRESH_TOKEN: &str = "e87768bd63dd44a0b1a61183be8f2034";

const SUCCESS_CODE: &str = "1";
const ACCESS_TOKEN_EXPIRED_CODE: &str = "2007";

/// A device record as returned by the Wyze API.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub mac: String,
    pub nickname: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub device_params: DeviceParams,
}

/// Live device state; `open_close_state` is the binary contact reading.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceParams {
    #[serde(default)]
    pub open_close_state: i64,
}

/// Result of a device list call: the devices plus the credential pair the
/// call ended up with (rotated or not).
#[derive(Debug, Clone)]
pub struct DeviceList {
    pub devices: Vec<Device>,
    pub tokens: TokenPair,
}

/// Narrow device API interface so the dispatcher can take a test double.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Obtain a fresh credential pair from the configured account.
    async fn login(&self) -> Result<TokenPair>;
    /// Fetch the full device list for the account.
    async fn list_devices(&self, tokens: &TokenPair) -> Result<DeviceList>;
}

/// Generic Wyze API reply envelope.
#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> ApiReply<T> {
    fn token_expired(&self) -> bool {
        self.code == ACCESS_TOKEN_EXPIRED_CODE || self.msg == "AccessTokenError"
    }

    fn into_data(self) -> Result<T> {
        if self.code != SUCCESS_CODE {
            return Err(Error::Api(format!(
                "Wyze replied with code {}: {}",
                self.code, self.msg
            )));
        }
        self.data
            .ok_or_else(|| Error::Api("Wyze reply has no data".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ObjectListData {
    #[serde(default)]
    device_list: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct CredentialData {
    access_token: String,
    refresh_token: String,
}

/// HTTP client for the Wyze app API.
pub struct WyzeClient {
    http: HttpClient,
    base_url: String,
    username: String,
    password: String,
    phone_id: String,
}

impl WyzeClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: config.api_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            phone_id: config.phone_id.clone(),
        }
    }

    fn timestamp() -> String {
        Utc::now().timestamp_millis().to_string()
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<ApiReply<T>> {
        let reply = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ApiReply<T>>()
            .await?;
        Ok(reply)
    }

    async fn get_object_list(&self, access_token: &str) -> Result<ApiReply<ObjectListData>> {
        self.post(
            "/app/v2/home_page/get_object_list",
            json!({
                "access_token": access_token,
                "phone_id": self.phone_id,
                "app_ver": APP_VER,
                "sc": SC,
                "sv": SV_GET_OBJECT_LIST,
                "ts": Self::timestamp(),
            }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let reply: ApiReply<CredentialData> = self
            .post(
                "/app/user/refresh_token",
                json!({
                    "refresh_token": refresh_token,
                    "phone_id": self.phone_id,
                    "app_ver": APP_VER,
                    "sc": SC,
                    "sv": SV_REFRESH_TOKEN,
                    "ts": Self::timestamp(),
                }),
            )
            .await?;

        let data = reply.into_data()?;
        Ok(TokenPair {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
        })
    }
}

#[async_trait]
impl DeviceApi for WyzeClient {
    async fn login(&self) -> Result<TokenPair> {
        let reply: ApiReply<CredentialData> = self
            .post(
                "/app/user/login",
                json!({
                    "email": self.username,
                    "password": self.password,
                    "phone_id": self.phone_id,
                    "app_ver": APP_VER,
                    "sc": SC,
                    "sv": SV_LOGIN,
                    "ts": Self::timestamp(),
                }),
            )
            .await?;

        let data = reply.into_data()?;
        Ok(TokenPair {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
        })
    }

    async fn list_devices(&self, tokens: &TokenPair) -> Result<DeviceList> {
        let reply = self.get_object_list(&tokens.access_token).await?;

        if reply.token_expired() {
            info!("Wyze access token expired, refreshing");
            let rotated = self.refresh(&tokens.refresh_token).await?;
            let retry = self.get_object_list(&rotated.access_token).await?;
            return Ok(DeviceList {
                devices: retry.into_data()?.device_list,
                tokens: rotated,
            });
        }

        Ok(DeviceList {
            devices: reply.into_data()?.device_list,
            tokens: tokens.clone(),
        })
    }
}
