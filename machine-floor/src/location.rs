//! Machine and database selection from a dashboard URL.
//!
//! A dashboard link names its machine either in the path
//! (`/floor/47`, `/floor/47/index.html`) or in a `machineId` query
//! parameter, which wins when both are present. A `database` parameter
//! selects the backend database.

use std::str::FromStr;

use reqwest::Url;

use crate::api_client::types::Database;
use crate::config::parse_machine_id;
use crate::error::{Error, Result};

/// Base for resolving path-only locations such as `/floor/47?database=AHM`.
const RELATIVE_BASE: &str = "http://localhost/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub machine_id: Option<u32>,
    pub database: Database,
    /// Whether `machine_id` came from the URL.
    pub from_url: bool,
}

impl Location {
    /// Parse an absolute URL or a path with an optional query string.
    pub fn parse(location: &str, default_database: Database) -> Result<Self> {
        let url = Url::parse(location)
            .or_else(|_| Url::parse(RELATIVE_BASE).and_then(|base| base.join(location)))
            .map_err(|e| Error::Other(format!("invalid location {location:?}: {e}")))?;

        let mut machine_id = path_machine_id(&url);
        let mut database = default_database;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "machineId" => {
                    if let Some(id) = parse_machine_id(&value) {
                        machine_id = Some(id);
                    }
                }
                "database" => {
                    if let Ok(db) = Database::from_str(value.trim()) {
                        database = db;
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            machine_id,
            database,
            from_url: machine_id.is_some(),
        })
    }
}

/// Last all-digit path segment, looking past a trailing file name.
fn path_machine_id(url: &Url) -> Option<u32> {
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let (last, rest) = segments.split_last()?;
    let candidate = if is_digits(last) {
        last
    } else if last.contains('.') {
        rest.last().filter(|s| is_digits(s))?
    } else {
        return None;
    };

    parse_machine_id(candidate)
}

fn is_digits(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
