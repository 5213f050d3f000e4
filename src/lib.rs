//! NVMe drive health telemetry.
//!
//! Controllers are identified once through an [`collector::IdentityCache`],
//! matched to OS storage devices by serial number, and polled for their
//! SMART / Health Information log. Each drive exposes a fixed sensor set
//! plus the auxiliary temperature probes it reported at startup.

pub mod collector;
pub mod config;
pub mod error;

pub use error::{NvmeError, Result};
