//! Observable output of the relay.
//!
//! Components emit [`RelayEvent`]s into an injected [`EventSink`] instead of
//! writing to a global logger. [`LogSink`] renders them through the `log`
//! facade; tests capture them through a channel.

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

use ::log::Level;

use crate::flow::Direction;
use crate::forward::StatSample;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Started {
        local: SocketAddr,
        remote: String,
    },
    Accepted {
        id: u64,
        peer: SocketAddr,
    },
    Connected {
        id: u64,
        remote: SocketAddr,
    },
    DialFailed {
        id: u64,
        remote: String,
        error: String,
    },
    Throughput {
        id: u64,
        sample: StatSample,
    },
    CopyFailed {
        id: u64,
        direction: Direction,
        error: String,
    },
    Finished {
        id: u64,
        uploaded: u64,
        downloaded: u64,
    },
    Disconnected {
        id: u64,
        peer: SocketAddr,
        remote: Option<SocketAddr>,
    },
    AcceptFailed {
        error: String,
    },
}

impl RelayEvent {
    pub fn level(&self) -> Level {
        match self {
            RelayEvent::DialFailed { .. } => Level::Error,
            RelayEvent::CopyFailed { .. } | RelayEvent::AcceptFailed { .. } => Level::Warn,
            _ => Level::Info,
        }
    }
}

impl Display for RelayEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayEvent::Started { local, remote } => {
                write!(f, "Starting proxy server {} {}", local, remote)
            }
            RelayEvent::Accepted { id, peer } => write!(f, "{} Connected from {}", id, peer),
            RelayEvent::Connected { id, remote } => write!(f, "{} Connected to {}", id, remote),
            RelayEvent::DialFailed { id, remote, error } => {
                write!(f, "{} Cannot connect to {}: {}", id, remote, error)
            }
            RelayEvent::Throughput { id, sample } => write!(
                f,
                "{} Up: {} bytes, {} bytes/s, Down: {} bytes, {} bytes/s",
                id,
                Grouped(sample.uploaded),
                Grouped(sample.upload_rate),
                Grouped(sample.downloaded),
                Grouped(sample.download_rate),
            ),
            RelayEvent::CopyFailed {
                id,
                direction,
                error,
            } => write!(f, "{} {} error: {}", id, direction, error),
            RelayEvent::Finished {
                id,
                uploaded,
                downloaded,
            } => write!(
                f,
                "{} Uploaded {} bytes, Downloaded {} bytes",
                id,
                Grouped(*uploaded),
                Grouped(*downloaded)
            ),
            RelayEvent::Disconnected { id, peer, remote } => match remote {
                Some(remote) => write!(f, "{} disconnected {} {}", id, peer, remote),
                None => write!(f, "{} disconnected {}", id, peer),
            },
            RelayEvent::AcceptFailed { error } => write!(f, "Accept error: {}", error),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RelayEvent);
}

/// Forwards events to whatever logger is installed behind the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: RelayEvent) {
        ::log::log!(event.level(), "{}", event);
    }
}

/// Renders an integer with `,` between groups of three digits.
pub struct Grouped(pub u64);

impl Display for Grouped {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let digits = self.0.to_string();
        let lead = digits.len() % 3;
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i != 0 && (i + 3 - lead) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        f.write_str(&out)
    }
}
