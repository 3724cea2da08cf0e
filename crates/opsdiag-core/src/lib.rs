// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # opsdiag-core
//!
//! Shared primitives of the opsdiag supportability subsystem:
//!
//! - [`FeatureRegistry`] mapping feature names to owning daemons
//! - [`ControlClient`] / [`ControlServer`] for the daemon control channel
//! - [`DaemonCollector`] for bounded diagnostic retrieval
//! - [`EventLog`] for structured, filterable events
//! - [`VlogStore`] for live per-feature and per-daemon log levels
//! - [`SupportConfig`] for paths, deadlines and capacities
//!
//! ## Example
//!
//! ```rust,ignore
//! use opsdiag_core::{EventCategory, EventFilter, EventLog, Severity};
//!
//! let log = EventLog::new(1024);
//! log.record(EventCategory::Lldp, Severity::Info, "LLDP Enabled");
//! assert_eq!(log.query(EventFilter::BySeverity(Severity::Info)).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod channel;
pub mod collector;
pub mod config;
pub mod error;
pub mod eventlog;
pub mod registry;
pub mod types;
pub mod vlog;

pub use channel::{
    CommandHandler, ControlClient, ControlServer, DaemonVlog, Reply, ReplyError, Request,
    RunningServer,
};
pub use collector::{CaptureKind, DaemonCollector, DiagnosticPayload, PayloadStatus};
pub use config::SupportConfig;
pub use error::{CollectorError, Result, SupportError};
pub use eventlog::{EventFilter, EventLog, EventRecord};
pub use registry::{
    CaptureMethod, DaemonRef, FeatureEntry, FeatureRegistry, FeatureTable, MappingSources,
    ShowTechFeature, ShowTechSubFeature,
};
pub use types::{
    EventCategory, Severity, VlogDestination, VlogLevel, VlogScope, is_valid_daemon_name,
    signal_name,
};
pub use vlog::{VlogLevels, VlogStore};
