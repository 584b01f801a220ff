use crate::level::Level;
use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;

/// Syslog facilities accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facility {
    Local0,
    Local1,
    Local2,
    Local3,
}

impl Facility {
    pub const DEFAULT: Facility = Facility::Local0;

    /// Numeric facility code (RFC 5424 table 1).
    pub fn code(&self) -> u8 {
        match self {
            Facility::Local0 => 16,
            Facility::Local1 => 17,
            Facility::Local2 => 18,
            Facility::Local3 => 19,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facility::Local0 => "local0",
            Facility::Local1 => "local1",
            Facility::Local2 => "local2",
            Facility::Local3 => "local3",
        }
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported log facility: {0:?}")]
pub struct ParseFacilityError(pub String);

impl FromStr for Facility {
    type Err = ParseFacilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local0" => Ok(Facility::Local0),
            "local1" => Ok(Facility::Local1),
            "local2" => Ok(Facility::Local2),
            "local3" => Ok(Facility::Local3),
            other => Err(ParseFacilityError(other.to_string())),
        }
    }
}

/// Syslog severity for a log level.
pub fn severity(level: Level) -> u8 {
    match level {
        Level::Panic => 0, // emerg
        Level::Fatal => 2, // crit
        Level::Error => 3, // err
        Level::Warn => 4,  // warning
        Level::Info => 6,  // info
        Level::Debug | Level::Trace => 7,
    }
}

/// Sends each record's formatted line to a syslog daemon over UDP.
pub struct SyslogSink {
    socket: UdpSocket,
    addr: SocketAddr,
    facility: Facility,
    tag: String,
    hostname: String,
    pid: u32,
}

impl SyslogSink {
    /// Resolve `addr` and connect a UDP socket to it.
    ///
    /// Must be called from within a Tokio runtime with I/O enabled.
    pub fn dial(addr: &str, facility: Facility, tag: &str) -> Result<Self, SinkError> {
        Handle::try_current().map_err(|_| SinkError::NoRuntime)?;
        let dial_err = |source: std::io::Error| SinkError::Dial {
            addr: addr.to_string(),
            source,
        };

        let target = addr
            .to_socket_addrs()
            .map_err(dial_err)?
            .next()
            .ok_or_else(|| dial_err(std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")))?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = std::net::UdpSocket::bind(local).map_err(dial_err)?;
        socket.connect(target).map_err(dial_err)?;
        socket.set_nonblocking(true).map_err(dial_err)?;
        let socket = UdpSocket::from_std(socket).map_err(dial_err)?;

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        Ok(SyslogSink {
            socket,
            addr: target,
            facility,
            tag: tag.to_string(),
            hostname,
            pid: std::process::id(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `<PRI>TIMESTAMP HOST TAG[PID]: LINE`
    pub fn packet(&self, record: &LogRecord) -> String {
        let priority = u16::from(self.facility.code()) * 8 + u16::from(severity(record.level));
        let mut packet = format!(
            "<{}>{} {} {}[{}]: {}",
            priority,
            record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.hostname,
            self.tag,
            self.pid,
            record.line
        );
        if !packet.ends_with('\n') {
            packet.push('\n');
        }
        packet
    }
}

#[async_trait]
impl LogSink for SyslogSink {
    fn name(&self) -> &str {
        "syslog"
    }

    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        let packet = self.packet(record);
        self.socket.send(packet.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;

    #[test]
    fn facility_names_parse_strictly() {
        assert_eq!("local2".parse::<Facility>(), Ok(Facility::Local2));
        assert!("local7".parse::<Facility>().is_err());
        assert!("LOCAL0".parse::<Facility>().is_err());
    }

    #[test]
    fn severities_follow_syslog_numbering() {
        assert_eq!(severity(Level::Panic), 0);
        assert_eq!(severity(Level::Error), 3);
        assert_eq!(severity(Level::Trace), 7);
    }

    #[tokio::test]
    async fn packet_carries_priority_tag_and_line() {
        let sink = SyslogSink::dial("127.0.0.1:514", Facility::Local1, "sip").unwrap();
        let record = LogRecord::from_entry(&Entry::new(Level::Error, "m"), r#"{"msg":"m"}"#.to_string());
        let packet = sink.packet(&record);
        // local1 (17) * 8 + err (3)
        assert!(packet.starts_with("<139>"), "{}", packet);
        assert!(packet.contains(&format!(" sip[{}]: ", std::process::id())), "{}", packet);
        assert!(packet.ends_with("{\"msg\":\"m\"}\n"), "{}", packet);
    }

    #[test]
    fn dial_outside_runtime_fails() {
        assert!(matches!(
            SyslogSink::dial("127.0.0.1:514", Facility::Local0, "t"),
            Err(SinkError::NoRuntime)
        ));
    }
}
