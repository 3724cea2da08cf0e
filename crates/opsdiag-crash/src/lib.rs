// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # opsdiag-crash
//!
//! Daemon crash handling:
//!
//! - [`CrashMonitor`]: detects abnormal termination and records a crash event
//! - [`CoreDumpRegistry`]: compressed core files with count and age retention
//! - [`copy_core_dump`]: copy-out of a stored core over TFTP
//!
//! ## Example
//!
//! ```rust,ignore
//! use opsdiag_crash::{CrashMonitor, CrashReport, MonitorSettings};
//!
//! let monitor = CrashMonitor::new(events, cores, MonitorSettings::default());
//! monitor.start();
//! monitor.reporter().report(CrashReport::new("ops-lldpd", Some(812), 11)).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod copy;
pub mod cores;
pub mod error;
pub mod monitor;
pub mod tftp;

pub use copy::{CopyOutcome, CopyStatus, CopyTransport, copy_core_dump};
pub use cores::{CoreDumpRecord, CoreDumpRegistry, NO_CORE_MESSAGE, Retention, render_table};
pub use error::{CrashError, Result};
pub use monitor::{CrashMonitor, CrashReport, CrashReporter, CrashState, MonitorSettings};
pub use tftp::{Packet, TftpClient};
