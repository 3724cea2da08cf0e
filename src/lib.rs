// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # opsdiag
//!
//! Diagnostic capture and log routing for a network operating system.
//!
//! - Feature mappings and per-daemon control channels (`opsdiag-core`)
//! - Diag-dump and show tech capture (`opsdiag-capture`)
//! - Crash detection and core dump storage (`opsdiag-crash`)
//! - Remote syslog forwarding (`opsdiag-forward`)
//!
//! This crate wires them together and exposes the operator shell.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use opsdiag::prelude::*;
//!
//! let config = SupportConfig::load("/etc/opsdiag/opsdiag.toml")?;
//! let support = Supportd::start(config)?;
//! print!("{}", support.shell().execute("show events").await);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod error;
pub mod render;
pub mod services;
pub mod shell;
pub mod system;

pub use opsdiag_capture as capture;
pub use opsdiag_core as core;
pub use opsdiag_crash as crash;
pub use opsdiag_forward as forward;

pub use error::{OpsdiagError, Result};
pub use services::{LocalRunner, Services};
pub use shell::Shell;
pub use system::{CORE_REPORT_METHOD, EVENT_LOG_METHOD, Supportd, control_server};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::{Shell, Supportd};
    pub use opsdiag_capture::{DiagDumpEngine, ShowTechEngine, ShowTechScope, Sink};
    pub use opsdiag_core::{
        ControlClient, ControlServer, EventCategory, EventFilter, EventLog, FeatureRegistry,
        Severity, SupportConfig, SupportError, VlogDestination, VlogLevel, VlogScope,
    };
    pub use opsdiag_crash::{CoreDumpRegistry, CrashMonitor};
    pub use opsdiag_forward::{ForwardLayer, Forwarder, RemoteLogTarget, Transport};
}
