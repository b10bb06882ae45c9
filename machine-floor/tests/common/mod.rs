//! Fake machine-floor backend for integration tests.
//!
//! Serves `GET /machine-floor/{id}` on an ephemeral local port with canned
//! replies per machine, and records every request it sees.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

#[derive(Clone, Debug)]
pub enum Reply {
    /// `{ status: true, data: record }`
    Record(Value),
    /// `{ status: false, error: message }`
    Fail(String),
    /// Bare HTTP status with no JSON body.
    Status(u16),
    /// Arbitrary JSON body with status 200.
    Json(Value),
    /// Arbitrary text body with status 200.
    Text(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeenRequest {
    pub machine_id: u32,
    pub database: Option<String>,
    pub accept: Option<String>,
}

#[derive(Clone, Default)]
pub struct Backend {
    replies: Arc<Mutex<HashMap<u32, Reply>>>,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, machine_id: u32, reply: Reply) -> &Self {
        self.replies.lock().unwrap().insert(machine_id, reply);
        self
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Start serving and return the base URL.
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .route("/machine-floor/{id}", get(machine))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }
}

async fn machine(
    State(backend): State<Backend>,
    Path(machine_id): Path<u32>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    backend.requests.lock().unwrap().push(SeenRequest {
        machine_id,
        database: params.get("database").cloned(),
        accept: headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let reply = backend.replies.lock().unwrap().get(&machine_id).cloned();
    match reply {
        Some(Reply::Record(record)) => {
            Json(json!({ "status": true, "data": record })).into_response()
        }
        Some(Reply::Fail(message)) => {
            Json(json!({ "status": false, "error": message })).into_response()
        }
        Some(Reply::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(Reply::Json(body)) => Json(body).into_response(),
        Some(Reply::Text(body)) => body.into_response(),
        None => (StatusCode::NOT_FOUND, "unknown machine").into_response(),
    }
}

pub fn idle_record(name: &str, idle_minutes: u32) -> Value {
    json!({
        "MachineID": 14,
        "MachineName": name,
        "IsRunning": 0,
        "IsBehindSchedule": 1,
        "IdleSinceMinutes": idle_minutes,
        "LastCompletedAt": null,
        "BacklogJobsOnMachine": 3,
        "BacklogJobsForProcess": 1250,
    })
}

pub fn running_record(name: &str) -> Value {
    json!({
        "MachineID": 47,
        "MachineName": name,
        "IsRunning": "1",
        "IsBehindSchedule": 0,
        "CurrentJobNumber": "J-50",
        "CurrentJobName": "Widget",
        "CurrentJobStartedAt": "2024-05-01T06:00:00",
        "RunningSinceMinutes": 150,
        "TargetMinutesToFinish": 45,
        "TargetFinishAt": "2024-05-01T09:15:00",
        "ProducedQty": 120,
        "PlanQty": 500,
        "RemainingQty": 380,
    })
}
