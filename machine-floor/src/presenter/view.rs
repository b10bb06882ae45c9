//! Derived view model for one machine.
//!
//! # State Machine
//!
//! ```text
//!            fetch (IsRunning false)          fetch (IsRunning true)
//!  (none) ──────────────────────────► Idle ◄──────────────────────────► Running
//!     ▲                                 │   fetch (flag flips either way)  │
//!     │        error / navigate away    │                                  │
//!     └─────────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Every successful fetch builds a fresh [`ViewState`]; nothing carries over
//! from the previous one, including the duration counter. Between fetches
//! the active counter advances by one minute per tick via
//! [`ViewState::tick`].

use strum::IntoStaticStr;

use crate::api_client::types::MachineStatusRecord;

use super::coerce::{coerce_machine_id, coerce_number, display_text, flag_is_true};
use super::format::{format_minutes, format_number};
use super::timestamp::{TimestampOptions, format_date_time};

const UNKNOWN_MACHINE: &str = "Unknown Machine";
const UNKNOWN_JOB_NUMBER: &str = "Unknown";
const UNNAMED_JOB: &str = "Unnamed";

/// Whether a machine is idle or running a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Idle,
    Running,
}

/// Colour class of a status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Alert,
    Normal,
}

/// Status text and indicator for a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLabel {
    pub text: &'static str,
    pub indicator: Indicator,
}

impl StatusLabel {
    pub const IDLE: Self = Self {
        text: "IDLE",
        indicator: Indicator::Alert,
    };
    pub const BEHIND_SCHEDULE: Self = Self {
        text: "Running behind schedule",
        indicator: Indicator::Alert,
    };
    pub const ON_TRACK: Self = Self {
        text: "On track",
        indicator: Indicator::Normal,
    };

    /// Idle wins over schedule adherence; `behind_schedule` only matters
    /// while running.
    pub fn for_flags(running: bool, behind_schedule: bool) -> Self {
        match (running, behind_schedule) {
            (false, _) => Self::IDLE,
            (true, true) => Self::BEHIND_SCHEDULE,
            (true, false) => Self::ON_TRACK,
        }
    }
}

/// Named display slots. Keys are the camelCase identifiers of the
/// dashboard's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Field {
    MachineName,
    StatusText,
    LastJobCompleted,
    IdleDuration,
    BacklogMachine,
    BacklogProcess,
    CurrentJob,
    StartTime,
    RunningDuration,
    TargetFinishIn,
    Eta,
    ProgressText,
    RemainingText,
}

impl Field {
    pub fn key(self) -> &'static str {
        self.into()
    }

    /// Human-readable caption.
    pub fn label(self) -> &'static str {
        match self {
            Field::MachineName => "Machine",
            Field::StatusText => "Status",
            Field::LastJobCompleted => "Last job completed",
            Field::IdleDuration => "Idle for",
            Field::BacklogMachine => "Backlog (machine)",
            Field::BacklogProcess => "Backlog (process)",
            Field::CurrentJob => "Current job",
            Field::StartTime => "Started",
            Field::RunningDuration => "Running for",
            Field::TargetFinishIn => "Target finish in",
            Field::Eta => "ETA",
            Field::ProgressText => "Progress",
            Field::RemainingText => "Remaining",
        }
    }

    /// Section the field is shown in, or `None` if it is always shown.
    pub fn section(self) -> Option<Section> {
        match self {
            Field::MachineName | Field::StatusText => None,
            Field::LastJobCompleted
            | Field::IdleDuration
            | Field::BacklogMachine
            | Field::BacklogProcess => Some(Section::Idle),
            Field::CurrentJob
            | Field::StartTime
            | Field::RunningDuration
            | Field::TargetFinishIn
            | Field::Eta
            | Field::ProgressText
            | Field::RemainingText => Some(Section::Running),
        }
    }
}

/// Toggleable regions of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// Single-machine view.
    Dashboard,
    /// Shown when no machine is selected.
    Placeholder,
    /// All-machines view.
    Grid,
    Idle,
    Running,
}

/// Minute counter that advances locally between fetches.
///
/// Starts from the backend's value and drifts from backend truth until the
/// next fetch replaces it. A counter without a numeric start shows the
/// placeholder and never advances.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationCounter {
    minutes: f64,
}

impl DurationCounter {
    pub fn new(minutes: f64) -> Self {
        Self { minutes }
    }

    pub fn is_live(&self) -> bool {
        self.minutes.is_finite()
    }

    pub fn tick(&mut self) {
        if self.is_live() {
            self.minutes += 1.0;
        }
    }

    pub fn minutes(&self) -> f64 {
        self.minutes
    }

    pub fn display(&self) -> String {
        format_minutes(self.minutes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdleView {
    pub last_completed: String,
    pub idle: DurationCounter,
    pub backlog_machine: String,
    pub backlog_process: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunningView {
    pub job_label: String,
    pub start_time: String,
    pub running: DurationCounter,
    pub target_minutes: f64,
    pub eta: String,
    pub behind_schedule: bool,
    pub produced: String,
    pub plan: String,
    /// Only present when the backend reports a remaining quantity.
    pub remaining: Option<String>,
}

impl RunningView {
    pub fn progress_text(&self) -> String {
        format!("Produced {} / {}", self.produced, self.plan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewDetail {
    Idle(IdleView),
    Running(RunningView),
}

/// Everything needed to display one machine.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub machine_id: Option<u32>,
    pub machine_name: Option<String>,
    pub detail: ViewDetail,
}

/// Classify a record as idle or running.
pub fn classify(record: &MachineStatusRecord) -> ViewKind {
    if flag_is_true(&record.is_running) {
        ViewKind::Running
    } else {
        ViewKind::Idle
    }
}

/// Build a fresh view from a backend record.
pub fn derive_view_state(record: &MachineStatusRecord, timestamps: &TimestampOptions) -> ViewState {
    let detail = match classify(record) {
        ViewKind::Idle => ViewDetail::Idle(IdleView {
            last_completed: format_date_time(&record.last_completed_at, timestamps),
            idle: DurationCounter::new(coerce_number(&record.idle_since_minutes)),
            backlog_machine: format_number(&record.backlog_jobs_on_machine),
            backlog_process: format_number(&record.backlog_jobs_for_process),
        }),
        ViewKind::Running => ViewDetail::Running(RunningView {
            job_label: format!(
                "{} – {}",
                text_or(&record.current_job_number, UNKNOWN_JOB_NUMBER),
                text_or(&record.current_job_name, UNNAMED_JOB),
            ),
            start_time: format_date_time(&record.current_job_started_at, timestamps),
            running: DurationCounter::new(coerce_number(&record.running_since_minutes)),
            target_minutes: coerce_number(&record.target_minutes_to_finish),
            eta: format_date_time(&record.target_finish_at, timestamps),
            behind_schedule: flag_is_true(&record.is_behind_schedule),
            produced: format_number(&record.produced_qty),
            plan: format_number(&record.plan_qty),
            remaining: (!record.remaining_qty.is_null())
                .then(|| format_number(&record.remaining_qty)),
        }),
    };

    ViewState {
        machine_id: coerce_machine_id(&record.machine_id),
        machine_name: (!record.machine_name.is_null())
            .then(|| display_text(&record.machine_name)),
        detail,
    }
}

fn text_or(value: &serde_json::Value, fallback: &str) -> String {
    if value.is_null() {
        fallback.to_string()
    } else {
        display_text(value)
    }
}

impl ViewState {
    pub fn kind(&self) -> ViewKind {
        match self.detail {
            ViewDetail::Idle(_) => ViewKind::Idle,
            ViewDetail::Running(_) => ViewKind::Running,
        }
    }

    pub fn status_label(&self) -> StatusLabel {
        match &self.detail {
            ViewDetail::Idle(_) => StatusLabel::for_flags(false, false),
            ViewDetail::Running(running) => StatusLabel::for_flags(true, running.behind_schedule),
        }
    }

    /// Name for the single-machine header.
    pub fn display_name(&self) -> &str {
        self.machine_name.as_deref().unwrap_or(UNKNOWN_MACHINE)
    }

    /// The counter that ticks for the current kind.
    pub fn counter(&self) -> &DurationCounter {
        match &self.detail {
            ViewDetail::Idle(idle) => &idle.idle,
            ViewDetail::Running(running) => &running.running,
        }
    }

    /// Advance the active counter by one minute.
    pub fn tick(&mut self) {
        match &mut self.detail {
            ViewDetail::Idle(idle) => idle.idle.tick(),
            ViewDetail::Running(running) => running.running.tick(),
        }
    }

    /// The field that changes on [`tick`](Self::tick), with its current text.
    pub fn duration_field(&self) -> (Field, String) {
        let field = match self.kind() {
            ViewKind::Idle => Field::IdleDuration,
            ViewKind::Running => Field::RunningDuration,
        };
        (field, self.counter().display())
    }

    /// Flat display fields, ready to render without further formatting.
    pub fn fields(&self) -> Vec<(Field, String)> {
        let mut fields = vec![
            (Field::MachineName, self.display_name().to_string()),
            (Field::StatusText, self.status_label().text.to_string()),
        ];

        match &self.detail {
            ViewDetail::Idle(idle) => {
                fields.extend([
                    (Field::LastJobCompleted, idle.last_completed.clone()),
                    (Field::IdleDuration, idle.idle.display()),
                    (Field::BacklogMachine, idle.backlog_machine.clone()),
                    (Field::BacklogProcess, idle.backlog_process.clone()),
                ]);
            }
            ViewDetail::Running(running) => {
                fields.extend([
                    (Field::CurrentJob, running.job_label.clone()),
                    (Field::StartTime, running.start_time.clone()),
                    (Field::RunningDuration, running.running.display()),
                    (Field::TargetFinishIn, format_minutes(running.target_minutes)),
                    (Field::Eta, running.eta.clone()),
                    (Field::ProgressText, running.progress_text()),
                ]);
                if let Some(remaining) = &running.remaining {
                    fields.push((Field::RemainingText, format!("Remaining {remaining}")));
                }
            }
        }

        fields
    }
}
