//! API data transfer objects.
//!
//! These types mirror what the machine-floor backend sends. Most record
//! fields are kept as raw JSON values because the backend is loose about
//! types (flags arrive as booleans, 0/1 or strings; quantities as numbers
//! or formatted strings). Interpretation happens in [`crate::presenter`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{Error, GENERIC_API_ERROR, Result};
use crate::presenter::coerce::is_truthy;

/// Backend database a machine lives in.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Database {
    #[default]
    Kol,
    Ahm,
}

impl Database {
    /// Query-string form (`KOL`, `AHM`).
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Response wrapper returned by `GET /machine-floor/{id}`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Envelope {
    /// Success flag. Checked for truthiness rather than strictly as a
    /// boolean.
    pub status: Value,
    pub data: Option<MachineStatusRecord>,
    pub error: Option<String>,
}

impl Envelope {
    /// Unwrap the record, or turn an application-level failure into
    /// [`Error::Api`].
    pub fn into_record(self) -> Result<MachineStatusRecord> {
        if !is_truthy(&self.status) {
            let message = self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| GENERIC_API_ERROR.to_string());
            return Err(Error::Api(message));
        }

        self.data
            .ok_or_else(|| Error::Api(GENERIC_API_ERROR.to_string()))
    }
}

/// Live status of one machine as reported by the backend.
///
/// Every field is optional; absent fields deserialize to `Value::Null`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MachineStatusRecord {
    #[serde(rename = "MachineID", alias = "machineid")]
    pub machine_id: Value,
    #[serde(rename = "MachineName")]
    pub machine_name: Value,
    #[serde(rename = "IsRunning")]
    pub is_running: Value,
    /// Only meaningful while running.
    #[serde(rename = "IsBehindSchedule")]
    pub is_behind_schedule: Value,

    #[serde(rename = "LastCompletedAt")]
    pub last_completed_at: Value,
    #[serde(rename = "CurrentJobStartedAt")]
    pub current_job_started_at: Value,
    #[serde(rename = "TargetFinishAt")]
    pub target_finish_at: Value,

    #[serde(rename = "IdleSinceMinutes")]
    pub idle_since_minutes: Value,
    #[serde(rename = "RunningSinceMinutes")]
    pub running_since_minutes: Value,
    #[serde(rename = "TargetMinutesToFinish")]
    pub target_minutes_to_finish: Value,

    #[serde(rename = "BacklogJobsOnMachine")]
    pub backlog_jobs_on_machine: Value,
    #[serde(rename = "BacklogJobsForProcess")]
    pub backlog_jobs_for_process: Value,
    #[serde(rename = "ProducedQty")]
    pub produced_qty: Value,
    #[serde(rename = "PlanQty")]
    pub plan_qty: Value,
    #[serde(rename = "RemainingQty")]
    pub remaining_qty: Value,
    #[serde(rename = "CurrentJobNumber")]
    pub current_job_number: Value,
    #[serde(rename = "CurrentJobName")]
    pub current_job_name: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case("KOL", Database::Kol; "upper")]
    #[test_case("ahm", Database::Ahm; "lower")]
    #[test_case("Kol", Database::Kol; "mixed")]
    fn database_parses_case_insensitively(input: &str, expected: Database) {
        assert_eq!(input.parse::<Database>().unwrap(), expected);
    }

    #[test]
    fn database_rejects_unknown_names() {
        assert!("XYZ".parse::<Database>().is_err());
    }

    #[test]
    fn database_query_form_is_uppercase() {
        assert_eq!(Database::Ahm.as_str(), "AHM");
        assert_eq!(Database::Kol.to_string(), "KOL");
    }

    #[test]
    fn record_tolerates_missing_fields() {
        let record: MachineStatusRecord =
            serde_json::from_value(json!({ "IsRunning": 1, "Unrelated": "x" })).unwrap();
        assert_eq!(record.is_running, json!(1));
        assert!(record.machine_name.is_null());
        assert!(record.remaining_qty.is_null());
    }

    #[test]
    fn record_accepts_lowercase_machine_id() {
        let record: MachineStatusRecord =
            serde_json::from_value(json!({ "machineid": 47 })).unwrap();
        assert_eq!(record.machine_id, json!(47));
    }

    #[test]
    fn failed_envelope_surfaces_server_message() {
        let envelope: Envelope =
            serde_json::from_value(json!({ "status": false, "error": "DB timeout" })).unwrap();
        let err = envelope.into_record().unwrap_err();
        assert_eq!(err.to_string(), "DB timeout");
    }

    #[test]
    fn failed_envelope_without_message_uses_generic_text() {
        let envelope: Envelope = serde_json::from_value(json!({ "status": false })).unwrap();
        let err = envelope.into_record().unwrap_err();
        assert_eq!(err.to_string(), GENERIC_API_ERROR);
    }

    #[test]
    fn successful_envelope_without_data_is_an_error() {
        let envelope: Envelope = serde_json::from_value(json!({ "status": true })).unwrap();
        assert!(matches!(envelope.into_record(), Err(Error::Api(_))));
    }

    #[test]
    fn successful_envelope_yields_record() {
        let envelope: Envelope = serde_json::from_value(json!({
            "status": true,
            "data": { "MachineID": 14, "MachineName": "Press 14" }
        }))
        .unwrap();
        let record = envelope.into_record().unwrap();
        assert_eq!(record.machine_name, json!("Press 14"));
    }
}
