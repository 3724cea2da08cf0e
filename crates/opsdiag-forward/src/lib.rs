// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # opsdiag-forward
//!
//! Remote syslog forwarding:
//!
//! - [`Forwarder`]: one task and one bounded queue per target, UDP or TCP
//! - [`RemoteLogTarget`]: `(address, transport, port)` and the `logging`
//!   argument grammar
//! - [`LogLine`]: RFC 5424 line formatting
//! - [`ForwardLayer`]: forwards the process's own tracing events
//! - [`SyslogIngress`] and [`forward_events`]: local log sources
//!
//! ## Example
//!
//! ```rust,ignore
//! use opsdiag_forward::{Forwarder, RemoteLogTarget};
//!
//! let forwarder = Forwarder::new(&config.forwarder);
//! forwarder.add_target(RemoteLogTarget::parse_args(&["10.0.10.2", "tcp", "1470"])?)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod backoff;
pub mod error;
pub mod forwarder;
pub mod ingress;
pub mod layer;
pub mod syslog;
pub mod target;

pub use backoff::Backoff;
pub use error::{ForwardError, Result};
pub use forwarder::{Forwarder, StatsSnapshot, TargetStats};
pub use ingress::{SyslogIngress, forward_events};
pub use layer::ForwardLayer;
pub use syslog::LogLine;
pub use target::{DEFAULT_SYSLOG_PORT, NO_TARGET_MESSAGE, RemoteLogTarget, Transport, render_targets};
