//! Syslog sinks.
//!
//! [`Syslog`] hands documents to the local syslog daemon through `syslog(3)`.
//! [`NetSyslog`] speaks RFC 5424 to a remote collector over UDP or TCP; TCP
//! messages are framed with RFC 6587 octet counting.

use chrono::{SecondsFormat, Utc};
use std::ffi::CString;
use std::fmt;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::collector::Target;
use crate::document::{hostname, Document};
use crate::error::CollectorError;

/// `syslog` facility (internal messages).
pub const FACILITY_SYSLOG: u8 = 5;
/// `debug` severity.
pub const SEVERITY_DEBUG: u8 = 7;

pub const DEFAULT_APP_NAME: &str = "syslog-collector-target";
pub const DEFAULT_NET_SYSLOG: &str = "udp://localhost:514";

/// JSON payload shared by both syslog flavours: the data plus its type.
fn payload(doc: &Document) -> String {
    let mut d = doc.data.clone();
    d.insert("type".into(), serde_json::Value::String(doc.doc_type.clone()));
    serde_json::Value::Object(d).to_string()
}

/// Local `syslog(3)`.
pub struct Syslog {
    name: String,
    // openlog keeps the pointer, so the identifier must outlive the target
    _ident: CString,
}

impl Syslog {
    pub fn new(app_name: &str) -> Result<Self, CollectorError> {
        let ident = CString::new(app_name)
            .map_err(|_| CollectorError::InvalidTargetSpec(format!("syslog ident {:?}", app_name)))?;

        // SAFETY: ident is a valid NUL terminated string kept alive in self
        unsafe {
            libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_SYSLOG);
        }

        Ok(Self {
            name: "Syslog".to_string(),
            _ident: ident,
        })
    }
}

impl Target for Syslog {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, doc: &Document) {
        let msg = match CString::new(payload(doc)) {
            Ok(m) => m,
            Err(e) => {
                warn!("{}: dropping document {}: {}", self.name, doc.id, e);
                return;
            }
        };

        // SAFETY: both format and message are valid C strings; "%s" keeps
        // the payload from being read as a format
        unsafe {
            libc::syslog(
                libc::LOG_DEBUG,
                b"%s\0".as_ptr() as *const libc::c_char,
                msg.as_ptr(),
            );
        }
    }
}

/// Transport of a [`NetSyslog`] target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// `[(tcp|udp)://]HOST:PORT`, UDP when no scheme is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogEndpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl FromStr for SyslogEndpoint {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CollectorError::InvalidTargetSpec(format!("netsyslog,{}", s));

        let (proto, rest) = s.split_once("://").unwrap_or(("udp", s));
        let protocol = match proto.to_lowercase().as_str() {
            "udp" => Protocol::Udp,
            "tcp" => Protocol::Tcp,
            _ => return Err(bad()),
        };
        let (host, port) = rest.rsplit_once(':').ok_or_else(bad)?;
        if host.is_empty() {
            return Err(bad());
        }
        let port = port.parse().map_err(|_| bad())?;

        Ok(Self {
            protocol,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for SyslogEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

enum Connection {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// RFC 5424 syslog over the network.
pub struct NetSyslog {
    name: String,
    endpoint: SyslogEndpoint,
    app_name: String,
    host: String,
    conn: Option<Connection>,
}

impl NetSyslog {
    /// Connects lazily on the first push.
    pub fn new(endpoint: SyslogEndpoint, app_name: &str) -> Self {
        Self {
            name: format!("Syslog RFC5424 {}", endpoint),
            endpoint,
            app_name: app_name.to_string(),
            host: hostname(),
            conn: None,
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// `<PRI>1 TIMESTAMP HOST APP PROCID - - MSG`
    pub fn format_message(&self, msg: &str) -> String {
        format!(
            "<{}>1 {} {} {} {} - - {}",
            FACILITY_SYSLOG * 8 + SEVERITY_DEBUG,
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            self.host,
            self.app_name,
            std::process::id(),
            msg
        )
    }

    fn connect(&self) -> io::Result<Connection> {
        let addr = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for host"))?;
        match self.endpoint.protocol {
            Protocol::Udp => {
                let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                let sock = UdpSocket::bind(local)?;
                sock.connect(addr)?;
                Ok(Connection::Udp(sock))
            }
            Protocol::Tcp => Ok(Connection::Tcp(TcpStream::connect(addr)?)),
        }
    }

    fn send(&mut self, line: &str) -> io::Result<()> {
        if self.conn.is_none() {
            debug!("{}: connecting", self.name);
            self.conn = Some(self.connect()?);
        }

        match self.conn.as_mut() {
            Some(Connection::Udp(sock)) => sock.send(line.as_bytes()).map(|_| ()),
            Some(Connection::Tcp(stream)) => {
                write!(stream, "{} {}", line.len(), line)?;
                stream.flush()
            }
            None => Ok(()),
        }
    }
}

impl Target for NetSyslog {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, doc: &Document) {
        let line = self.format_message(&payload(doc));
        if let Err(e) = self.send(&line) {
            warn!("{}: dropping document {}: {}", self.name, doc.id, e);
            // reconnect on the next push
            self.conn = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::io::Read;
    use std::net::TcpListener;

    fn doc() -> Document {
        let mut data = Map::new();
        data.insert("host".into(), json!("box"));
        Document::with_id("src", "abc", "Memory", data)
    }

    // -------------------------------------------------------------------------
    // Endpoint parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_endpoint_parse() {
        let ep: SyslogEndpoint = "tcp://logs.example.org:6514".parse().unwrap();
        assert_eq!(ep.protocol, Protocol::Tcp);
        assert_eq!(ep.host, "logs.example.org");
        assert_eq!(ep.port, 6514);
        assert_eq!(ep.to_string(), "tcp://logs.example.org:6514");

        let ep: SyslogEndpoint = DEFAULT_NET_SYSLOG.parse().unwrap();
        assert_eq!(ep.protocol, Protocol::Udp);

        let ep: SyslogEndpoint = "logs:514".parse().unwrap();
        assert_eq!(ep.protocol, Protocol::Udp);
        assert_eq!(ep.host, "logs");

        let ep: SyslogEndpoint = "TCP://logs:514".parse().unwrap();
        assert_eq!(ep.protocol, Protocol::Tcp);
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        assert!("http://logs:514".parse::<SyslogEndpoint>().is_err());
        assert!("udp://logs".parse::<SyslogEndpoint>().is_err());
        assert!("udp://:514".parse::<SyslogEndpoint>().is_err());
        assert!("udp://logs:port".parse::<SyslogEndpoint>().is_err());
    }

    // -------------------------------------------------------------------------
    // Message format and delivery
    // -------------------------------------------------------------------------

    #[test]
    fn test_payload_carries_type_but_not_id() {
        let p: serde_json::Value = serde_json::from_str(&payload(&doc())).unwrap();
        assert_eq!(p, json!({ "host": "box", "type": "Memory" }));
    }

    #[test]
    fn test_rfc5424_header() {
        let t = NetSyslog::new(DEFAULT_NET_SYSLOG.parse().unwrap(), "app").with_host("box");
        let line = t.format_message("{}");

        assert!(line.starts_with("<47>1 "));
        assert!(line.ends_with(&format!(" box app {} - - {{}}", std::process::id())));
    }

    #[test]
    fn test_udp_delivery() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();

        let ep = SyslogEndpoint {
            protocol: Protocol::Udp,
            host: "127.0.0.1".into(),
            port,
        };
        let mut t = NetSyslog::new(ep, "app");
        t.push(&doc());

        let mut buf = [0u8; 4096];
        let n = server.recv(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.starts_with("<47>1 "));
        assert!(text.ends_with(r#"{"host":"box","type":"Memory"}"#));
    }

    #[test]
    fn test_tcp_delivery_is_octet_counted() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let ep = SyslogEndpoint {
            protocol: Protocol::Tcp,
            host: "127.0.0.1".into(),
            port,
        };
        let mut t = NetSyslog::new(ep, "app");
        t.push(&doc());
        drop(t);

        let (mut stream, _) = listener.accept().unwrap();
        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();

        let (len, msg) = text.split_once(' ').unwrap();
        assert_eq!(len.parse::<usize>().unwrap(), msg.len());
        assert!(msg.starts_with("<47>1 "));
    }
}
