//! Device portal client
//!
//! Talks to the Windows Device Portal REST surface running on the headset.
//! A [`DeviceClient`] only exists after a successful [`Connector::connect`],
//! so there is no way to issue a read or write on an unconnected client.
//! Nothing here retries or times out; callers own that policy.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::PortalError;

use super::trust::{accepts_untrusted_certs, is_local_endpoint};

const OS_INFO_PATH: &str = "/api/os/info";
const IPD_PATH: &str = "/api/holographic/os/settings/ipd";
const CSRF_COOKIE: &str = "CSRF-Token";
const CSRF_HEADER: &str = "X-CSRF-Token";

/// A live, authenticated connection to the device portal
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Read the current IPD in millimetres
    async fn read_ipd(&self) -> Result<f32, PortalError>;

    /// Write a new IPD in millimetres
    async fn write_ipd(&self, ipd: f32) -> Result<(), PortalError>;

    /// Release the connection; later calls fail
    async fn close(&self) {}
}

/// Opens authenticated connections to a fixed endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, username: &str, secret: &str)
        -> Result<Box<dyn DeviceClient>, PortalError>;
}

/// Connector for the real device portal
#[derive(Debug, Clone)]
pub struct PortalConnector {
    endpoint: Url,
}

impl PortalConnector {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    fn http_client(&self) -> Result<Client, PortalError> {
        let relaxed = accepts_untrusted_certs(&self.endpoint);
        if relaxed {
            debug!(endpoint = %self.endpoint, "accepting self-signed certificate for local portal");
        }
        let mut builder = Client::builder().danger_accept_invalid_certs(relaxed);
        if is_local_endpoint(&self.endpoint) {
            builder = builder.no_proxy();
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl Connector for PortalConnector {
    async fn connect(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<Box<dyn DeviceClient>, PortalError> {
        let client = PortalClient {
            http: Mutex::new(Some(self.http_client()?)),
            base: self.endpoint.clone(),
            username: username.to_string(),
            secret: secret.to_string(),
            csrf_token: Mutex::new(None),
        };

        let response = client.get(OS_INFO_PATH).await?;
        client.remember_csrf(response.headers());
        check_status(response).await?;

        info!(endpoint = %self.endpoint, "connected to device portal");
        Ok(Box::new(client))
    }
}

/// Authenticated device portal connection
pub struct PortalClient {
    http: Mutex<Option<Client>>,
    base: Url,
    username: String,
    secret: String,
    csrf_token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct IpdBody {
    /// IPD in micrometres
    ipd: i64,
}

impl PortalClient {
    fn http(&self) -> Result<Client, PortalError> {
        self.http
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(PortalError::Closed)
    }

    fn url(&self, path: &str) -> Result<Url, PortalError> {
        self.base
            .join(path)
            .map_err(|e| PortalError::InvalidEndpoint(e.to_string()))
    }

    fn csrf_token(&self) -> Option<String> {
        self.csrf_token.lock().ok().and_then(|guard| guard.clone())
    }

    fn remember_csrf(&self, headers: &HeaderMap) {
        if let Some(token) = csrf_from_headers(headers) {
            if let Ok(mut guard) = self.csrf_token.lock() {
                *guard = Some(token);
            }
        }
    }

    async fn get(&self, path: &str) -> Result<Response, PortalError> {
        let response = self
            .http()?
            .get(self.url(path)?)
            .basic_auth(&self.username, Some(&self.secret))
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl DeviceClient for PortalClient {
    async fn read_ipd(&self) -> Result<f32, PortalError> {
        let response = self.get(IPD_PATH).await?;
        self.remember_csrf(response.headers());
        let body: IpdBody = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PortalError::InvalidResponse(e.to_string()))?;

        let ipd = micrometres_to_mm(body.ipd);
        debug!(ipd, "read IPD");
        Ok(ipd)
    }

    async fn write_ipd(&self, ipd: f32) -> Result<(), PortalError> {
        let mut request = self
            .http()?
            .post(self.url(IPD_PATH)?)
            .basic_auth(&self.username, Some(&self.secret))
            .query(&[("ipd", mm_to_micrometres(ipd))]);

        if let Some(token) = self.csrf_token() {
            request = request
                .header(CSRF_HEADER, token.as_str())
                .header(reqwest::header::COOKIE, format!("{CSRF_COOKIE}={token}"));
        }

        let response = request.send().await?;
        self.remember_csrf(response.headers());
        check_status(response).await?;

        debug!(ipd, "wrote IPD");
        Ok(())
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.http.lock() {
            if guard.take().is_some() {
                debug!(endpoint = %self.base, "device portal connection released");
            }
        }
    }
}

async fn check_status(response: Response) -> Result<Response, PortalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PortalError::Unauthorized);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PortalError::Status {
        status: status.as_u16(),
        message,
    })
}

fn csrf_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == CSRF_COOKIE).then(|| value.to_string())
        })
}

fn micrometres_to_mm(raw: i64) -> f32 {
    raw as f32 / 1000.0
}

fn mm_to_micrometres(mm: f32) -> i64 {
    (mm * 1000.0).round() as i64
}
