// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # opsdiag-capture
//!
//! Capture engines built on the opsdiag registry and control channel:
//!
//! - [`DiagDumpEngine`]: single-feature capture from every owning daemon
//! - [`ShowTechEngine`]: ordered multi-command capture with a run budget
//! - [`CommandRunner`]: the seam through which show tech executes commands
//! - [`Sink`]: console or exclusive-create file output
//!
//! ## Example
//!
//! ```rust,ignore
//! use opsdiag_capture::{DiagDumpEngine, Sink};
//!
//! let report = engine.dump("lldp", Sink::File("lldp.txt".into())).await?;
//! println!("{}", report.summary());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod diagdump;
pub mod error;
pub mod runner;
pub mod showtech;
pub mod sink;

pub use diagdump::{DiagDumpEngine, DumpReport, DumpState};
pub use error::CommandError;
pub use runner::{CommandRunner, ExternalRunner, FallbackRunner};
pub use showtech::{CommandOutcome, CommandRecord, ShowTechEngine, ShowTechReport, ShowTechScope};
pub use sink::Sink;
