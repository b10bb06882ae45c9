//! Live status monitor for shop-floor production machines.
//!
//! The crate polls the machine-floor backend for the status of one machine
//! (idle or running a job), derives a view model from the loosely typed
//! record it returns, and renders that model through a [`render::RenderPort`].
//! A grid view polls a fixed list of machines concurrently.

pub mod api_client;
pub mod config;
pub mod error;
pub mod location;
pub mod presenter;
pub mod render;
pub mod session;
pub mod ticker;
pub mod tracing;
