// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # opsdiag-test
//!
//! Testing infrastructure for the opsdiag supportability subsystem.
//!
//! This crate provides:
//! - **Fake daemons**: control-socket servers answering diag-dump, vlog and debug
//! - **Sinks**: UDP/TCP syslog collectors and a TFTP server
//! - **Fixtures**: feature and show tech mappings
//! - **Harness**: a fully assembled subsystem rooted in a temp directory
//!
//! ## Example
//!
//! ```rust,ignore
//! use opsdiag_test::{FakeDaemon, SupportHarness};
//!
//! let harness = SupportHarness::builder()
//!     .with_daemon(FakeDaemon::builder("ops-lldpd").with_diag_text("2 neighbors"))
//!     .build()?;
//!
//! let out = harness.exec("diag-dump lldp basic").await;
//! assert!(out.contains("Diagnostic dump captured for feature lldp"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod daemon;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod sinks;

pub use daemon::{FakeDaemon, FakeDaemonBuilder};
pub use error::{Result, TestError};
pub use fixtures::{FEATURE_MAPPING, SHOWTECH_MAPPING};
pub use harness::{SupportHarness, SupportHarnessBuilder};
pub use sinks::{ReceivedFile, SyslogSink, TftpSink};
