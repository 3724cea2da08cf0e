//! Remote log targets and the `logging` command arguments.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use opsdiag_core::SupportError;

/// Default remote syslog port.
pub const DEFAULT_SYSLOG_PORT: u16 = 514;

/// Printed by `show logging` with no targets.
pub const NO_TARGET_MESSAGE: &str = "No remote syslog server configured";

#[allow(clippy::expect_used)]
static HOST_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,62})(\.[A-Za-z0-9]([A-Za-z0-9-]{0,62}))*$")
        .expect("host name pattern is valid")
});

/// Wire transport of a remote target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Fire-and-forget datagrams.
    #[default]
    Udp,
    /// Persistent stream with LF framing.
    Tcp,
}

impl Transport {
    /// CLI token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, SupportError> {
        match s {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(SupportError::syntax(other)),
        }
    }
}

/// A configured remote syslog destination, unique by all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteLogTarget {
    /// IPv4, IPv6 or host name.
    pub address: String,
    /// Transport.
    pub transport: Transport,
    /// Port, never 0.
    pub port: u16,
}

impl RemoteLogTarget {
    /// Creates a target after validating the address.
    ///
    /// # Errors
    /// [`SupportError::Syntax`] if the address is neither an IP address
    /// nor a host name, or the port is 0.
    pub fn new(
        address: impl Into<String>,
        transport: Transport,
        port: u16,
    ) -> Result<Self, SupportError> {
        let address = address.into();
        if !valid_address(&address) {
            return Err(SupportError::syntax(address));
        }
        if port == 0 {
            return Err(SupportError::syntax("0"));
        }
        Ok(Self {
            address,
            transport,
            port,
        })
    }

    /// Parses the arguments following `logging`.
    ///
    /// Grammar: `<addr> [udp|tcp [<port>]]`, defaulting to udp and 514.
    ///
    /// # Errors
    /// [`SupportError::Syntax`] for a bad address, transport or port, or an
    /// extra argument.
    pub fn parse_args(args: &[&str]) -> Result<Self, SupportError> {
        let (address, rest) = args
            .split_first()
            .ok_or_else(|| SupportError::syntax("logging"))?;
        let transport = rest.first().map_or(Ok(Transport::default()), |t| t.parse())?;
        let port = match rest.get(1) {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| SupportError::syntax(*p))?,
            None => DEFAULT_SYSLOG_PORT,
        };
        if let Some(extra) = rest.get(2) {
            return Err(SupportError::syntax(*extra));
        }
        Self::new(*address, transport, port)
    }

    /// `host:port` form for socket resolution.
    #[must_use]
    pub fn socket_spec(&self) -> String {
        match self.address.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]:{}", self.port),
            _ => format!("{}:{}", self.address, self.port),
        }
    }
}

impl fmt::Display for RemoteLogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.address, self.transport, self.port)
    }
}

fn valid_address(address: &str) -> bool {
    address.len() <= 253 && (address.parse::<IpAddr>().is_ok() || HOST_NAME.is_match(address))
}

/// Renders configured targets for `show logging`.
#[must_use]
pub fn render_targets(targets: &[RemoteLogTarget]) -> String {
    if targets.is_empty() {
        return format!("{NO_TARGET_MESSAGE}\n");
    }
    let mut out = String::from("Remote syslog servers\n");
    out.push_str(&"-".repeat(60));
    out.push('\n');
    out.push_str(&format!("{:<40} {:<10} {:>6}\n", "Address", "Transport", "Port"));
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for t in targets {
        out.push_str(&format!(
            "{:<40} {:<10} {:>6}\n",
            t.address,
            t.transport.as_str(),
            t.port
        ));
    }
    out
}
