//! Status presentation: coercion, formatting and view derivation.
//!
//! Everything here is pure. The same record always yields the same view and
//! the same text.

pub mod coerce;
pub mod format;
pub mod grid;
pub mod timestamp;
pub mod view;

pub use coerce::{coerce_number, flag_is_true};
pub use format::{PLACEHOLDER, format_number, minutes_to_hrs_minutes};
pub use grid::GridCard;
pub use timestamp::{TimestampOptions, format_date_time};
pub use view::{
    DurationCounter, Field, IdleView, Indicator, RunningView, Section, StatusLabel, ViewDetail,
    ViewKind, ViewState, classify, derive_view_state,
};
