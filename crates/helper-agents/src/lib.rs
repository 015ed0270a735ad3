//! Host wiring for the parenting helper: configuration loading and report
//! rendering shared by the `helper-agents` binary.

pub mod config;
pub mod render;

pub use config::{AppConfig, FileConfig};
pub use render::{render_report, render_verdict};
