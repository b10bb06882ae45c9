//! HTTP client for the machine-floor backend.

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;

use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use types::{Database, Envelope, MachineStatusRecord};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can produce a machine status record.
///
/// The session fetches through this trait so it can be driven by a fake
/// in tests.
#[async_trait]
pub trait MachineSource: Send + Sync {
    async fn get_machine(&self, machine_id: u32, database: Database)
    -> Result<MachineStatusRecord>;
}

/// Client for `GET {base}/machine-floor/{id}?database={db}`.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let base_url = url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current status of one machine.
    pub async fn get_machine(
        &self,
        machine_id: u32,
        database: Database,
    ) -> Result<MachineStatusRecord> {
        let url = self.machine_url(machine_id);
        debug!(%url, %database, "Fetching machine status");

        let response = self
            .http
            .get(&url)
            .query(&[("database", database.as_str())])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let envelope: Envelope = response.json().await?;
        trace!(machine_id, record = ?envelope.data, "Loaded machine payload");
        envelope.into_record()
    }

    fn machine_url(&self, machine_id: u32) -> String {
        format!("{}/machine-floor/{}", self.base_url, machine_id)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MachineSource for Client {
    async fn get_machine(
        &self,
        machine_id: u32,
        database: Database,
    ) -> Result<MachineStatusRecord> {
        Client::get_machine(self, machine_id, database).await
    }
}
