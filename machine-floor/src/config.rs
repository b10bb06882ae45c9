//! Runtime configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, the JSON
//! file named by `MACHINE_FLOOR_CONFIG`, then individual environment
//! variables. Binaries apply their command-line flags on top.
//!
//! ```json
//! {
//!   "apiBaseUrl": "http://floor-api.local:5000",
//!   "defaultDatabase": "AHM",
//!   "defaultMachineId": 14,
//!   "refreshIntervalSeconds": 120,
//!   "gridMachineIds": [14, 47, 58],
//!   "timestampCorrectionMinutes": 0,
//!   "displayUtcOffsetMinutes": 330,
//!   "requestTimeoutSeconds": 30
//! }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::api_client::Client;
use crate::api_client::types::Database;
use crate::error::{Error, Result};
use crate::presenter::TimestampOptions;
use crate::presenter::coerce::coerce_machine_id;
use crate::presenter::timestamp::display_offset;
use crate::session::SessionSettings;
use crate::tracing::prelude::*;

pub const CONFIG_FILE_ENV: &str = "MACHINE_FLOOR_CONFIG";
pub const API_URL_ENV: &str = "MACHINE_FLOOR_API_URL";
pub const DATABASE_ENV: &str = "MACHINE_FLOOR_DATABASE";
pub const MACHINE_ID_ENV: &str = "MACHINE_FLOOR_MACHINE_ID";
pub const REFRESH_SECS_ENV: &str = "MACHINE_FLOOR_REFRESH_SECS";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(86_400);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_GRID_MACHINE_IDS: [u32; 10] = [14, 47, 58, 61, 62, 63, 64, 65, 66, 33];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL, without a trailing slash.
    pub api_base_url: String,

    pub default_database: Database,

    /// Suggested machine. Offered as a hint; nothing is loaded until a
    /// machine is selected.
    pub default_machine_id: Option<u32>,

    /// Auto-refresh period for both views. Never zero, at most a day.
    pub refresh_interval: Duration,

    /// Machines shown by the grid view, in display order.
    pub grid_machine_ids: Vec<u32>,

    /// Signed shift applied to every parsed timestamp.
    pub timestamp_correction_minutes: i64,

    /// Display offset for timestamps that carry one. `None` uses the
    /// host's local offset.
    pub display_utc_offset_minutes: Option<i32>,

    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            default_database: Database::default(),
            default_machine_id: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            grid_machine_ids: DEFAULT_GRID_MACHINE_IDS.to_vec(),
            timestamp_correction_minutes: 0,
            display_utc_offset_minutes: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// On-disk shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    api_base_url: Option<String>,
    default_database: Option<String>,
    default_machine_id: Option<Value>,
    refresh_interval_seconds: Option<u64>,
    grid_machine_ids: Option<Vec<u32>>,
    timestamp_correction_minutes: Option<i64>,
    display_utc_offset_minutes: Option<i32>,
    request_timeout_seconds: Option<u64>,
}

impl Config {
    /// Defaults, then the optional config file, then the environment.
    pub fn load() -> Result<Self> {
        let config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading configuration file");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a JSON document and lay it over the defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(text)?;
        let mut config = Self::default();

        if let Some(url) = file.api_base_url.filter(|u| !u.trim().is_empty()) {
            config.set_api_base_url(&url);
        }
        if let Some(name) = file.default_database {
            // Unknown names keep the default rather than failing startup.
            match Database::from_str(name.trim()) {
                Ok(database) => config.default_database = database,
                Err(_) => warn!(
                    database = %name,
                    "Unknown default database, using {}",
                    config.default_database
                ),
            }
        }
        config.default_machine_id = file.default_machine_id.as_ref().and_then(coerce_machine_id);
        if let Some(seconds) = file.refresh_interval_seconds {
            config.set_refresh_seconds(seconds);
        }
        if let Some(ids) = file.grid_machine_ids {
            config.grid_machine_ids = ids.into_iter().filter(|id| *id > 0).collect();
        }
        if let Some(minutes) = file.timestamp_correction_minutes {
            config.timestamp_correction_minutes = minutes;
        }
        config.display_utc_offset_minutes = file.display_utc_offset_minutes.filter(|minutes| {
            let valid = display_offset(*minutes).is_some();
            if !valid {
                warn!(minutes, "Display UTC offset out of range, using the local offset");
            }
            valid
        });
        if let Some(seconds) = file.request_timeout_seconds.filter(|s| *s > 0) {
            config.request_timeout = Duration::from_secs(seconds);
        }

        Ok(config)
    }

    /// Override values from environment-style lookups.
    ///
    /// Unlike the config file, a malformed variable is an error: it was set
    /// deliberately for this run.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.set_api_base_url(&url);
        }

        if let Some(name) = lookup(DATABASE_ENV) {
            self.default_database = Database::from_str(name.trim())
                .map_err(|_| Error::Config(format!("{DATABASE_ENV}: unknown database {name:?}")))?;
        }

        if let Some(id) = lookup(MACHINE_ID_ENV) {
            let id = parse_machine_id(&id).ok_or_else(|| {
                Error::Config(format!("{MACHINE_ID_ENV}: not a machine id: {id:?}"))
            })?;
            self.default_machine_id = Some(id);
        }

        if let Some(seconds) = lookup(REFRESH_SECS_ENV) {
            let seconds = seconds.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{REFRESH_SECS_ENV}: {e}"))
            })?;
            self.set_refresh_seconds(seconds);
        }

        Ok(self)
    }

    pub fn set_api_base_url(&mut self, url: &str) {
        self.api_base_url = url.trim().trim_end_matches('/').to_string();
    }

    /// Zero falls back to the default period; longer than a day is capped.
    pub fn set_refresh_seconds(&mut self, seconds: u64) {
        let requested = Duration::from_secs(seconds);
        self.refresh_interval = if seconds == 0 {
            DEFAULT_REFRESH_INTERVAL
        } else if requested > MAX_REFRESH_INTERVAL {
            warn!(seconds, "Refresh interval too long, capping at one day");
            MAX_REFRESH_INTERVAL
        } else {
            requested
        };
    }

    pub fn timestamp_options(&self) -> TimestampOptions {
        let options = match self.display_utc_offset_minutes {
            Some(minutes) => TimestampOptions::default().with_display_offset_minutes(minutes),
            None => TimestampOptions::local(),
        };
        options.with_correction_minutes(self.timestamp_correction_minutes)
    }

    pub fn client(&self) -> Client {
        Client::with_timeout(self.api_base_url.clone(), self.request_timeout)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            refresh_interval: self.refresh_interval,
            grid_machine_ids: self.grid_machine_ids.clone(),
            timestamps: self.timestamp_options(),
            ..SessionSettings::default()
        }
    }
}

/// Positive integer machine id from user text.
pub fn parse_machine_id(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok().filter(|id| *id > 0)
}
