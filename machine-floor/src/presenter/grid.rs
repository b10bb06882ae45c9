//! Cards for the all-machines grid.

use super::format::PLACEHOLDER;
use super::view::{Indicator, StatusLabel, ViewDetail, ViewState};

/// One machine in the grid. A failed fetch produces a card of its own so
/// that the other machines still render.
#[derive(Debug, Clone, PartialEq)]
pub enum GridCard {
    Loaded { machine_id: u32, view: ViewState },
    Failed { machine_id: u32, message: String },
}

impl GridCard {
    pub fn machine_id(&self) -> u32 {
        match self {
            GridCard::Loaded { machine_id, .. } | GridCard::Failed { machine_id, .. } => {
                *machine_id
            }
        }
    }

    /// Card heading: the backend name, `Machine {id}` when unnamed, or
    /// `Machine {id} - Error` when the fetch failed. Unnamed cards prefer
    /// the id the record reports over the one that was requested.
    pub fn title(&self) -> String {
        match self {
            GridCard::Loaded { machine_id, view } => view.machine_name.clone().unwrap_or_else(|| {
                format!("Machine {}", view.machine_id.unwrap_or(*machine_id))
            }),
            GridCard::Failed { machine_id, .. } => format!("Machine {machine_id} - Error"),
        }
    }

    pub fn status(&self) -> Option<StatusLabel> {
        match self {
            GridCard::Loaded { view, .. } => Some(view.status_label()),
            GridCard::Failed { .. } => None,
        }
    }

    pub fn indicator(&self) -> Indicator {
        self.status()
            .map(|s| s.indicator)
            .unwrap_or(Indicator::Alert)
    }

    pub fn view(&self) -> Option<&ViewState> {
        match self {
            GridCard::Loaded { view, .. } => Some(view),
            GridCard::Failed { .. } => None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.view().is_some_and(|v| v.counter().is_live())
    }

    pub fn tick(&mut self) {
        if let GridCard::Loaded { view, .. } = self {
            view.tick();
        }
    }

    /// One-line summary for compact display.
    pub fn summary(&self) -> String {
        match self {
            GridCard::Loaded { view, .. } => match &view.detail {
                ViewDetail::Idle(idle) => format!(
                    "idle {} · last job {} · backlog {}/{}",
                    idle.idle.display(),
                    idle.last_completed,
                    idle.backlog_machine,
                    idle.backlog_process
                ),
                ViewDetail::Running(running) => format!(
                    "{} · running {} · {}",
                    running.job_label,
                    running.running.display(),
                    running.progress_text()
                ),
            },
            GridCard::Failed { message, .. } => {
                if message.is_empty() {
                    PLACEHOLDER.to_string()
                } else {
                    message.clone()
                }
            }
        }
    }
}
