//! `backupd-core`: configuration, shared errors and display helpers used by
//! every backupd crate.

pub mod config;
pub mod display;
pub mod error;

pub use config::{BackupdConfig, GatewayConfig, PipelineConfig, ScheduleConfig};
pub use error::{CoreError, Result};
