//! Syslog output for the module.
//!
//! The module runs inside someone else's process, so it never installs a
//! global subscriber. Instead [`with_syslog`] scopes a dispatcher around one
//! PAM call, and every `tracing` event in that call is sent as one datagram
//! to the local syslog socket under the `authpriv` facility.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use tracing::{Dispatch, Level, Metadata};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// Program name attached to every record.
pub const IDENT: &str = "pam_flux";

const SYSLOG_SOCKET: &str = "/dev/log";

/// `LOG_AUTHPRIV` facility code, already shifted.
const LOG_AUTHPRIV: u8 = 10 << 3;

/// Syslog severity for a tracing level.
pub fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Format one RFC 3164 record as accepted by the local syslog daemon.
pub fn format_record(ident: &str, pid: u32, severity: u8, message: &str) -> String {
    format!(
        "<{}>{}[{}]: {}",
        LOG_AUTHPRIV | severity,
        ident,
        pid,
        message.trim_end()
    )
}

/// [`MakeWriter`] producing one [`SyslogRecord`] per event.
#[derive(Debug, Clone)]
pub struct Syslog {
    socket: PathBuf,
    ident: String,
}

impl Default for Syslog {
    fn default() -> Self {
        Self::new(SYSLOG_SOCKET, IDENT)
    }
}

impl Syslog {
    pub fn new(socket: impl Into<PathBuf>, ident: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
            ident: ident.into(),
        }
    }

    fn record(&self, severity: u8) -> SyslogRecord {
        SyslogRecord {
            socket: self.socket.clone(),
            ident: self.ident.clone(),
            severity,
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        self.record(severity(&Level::INFO))
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.record(severity(meta.level()))
    }
}

/// Buffers one formatted event and sends it when dropped.
pub struct SyslogRecord {
    socket: PathBuf,
    ident: String,
    severity: u8,
    buf: Vec<u8>,
}

impl SyslogRecord {
    fn send(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let message = String::from_utf8_lossy(&self.buf);
        let record = format_record(&self.ident, std::process::id(), self.severity, &message);
        self.buf.clear();

        let socket = UnixDatagram::unbound()?;
        socket.send_to(record.as_bytes(), &self.socket)?;
        Ok(())
    }
}

impl io::Write for SyslogRecord {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogRecord {
    fn drop(&mut self) {
        // Nowhere left to report a failure to log
        let _ = self.send();
    }
}

/// Dispatcher writing INFO and above to syslog.
pub fn syslog_dispatch(syslog: Syslog) -> Dispatch {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(syslog)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_level(false);
    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(layer);
    Dispatch::new(subscriber)
}

/// Run `f` with module events routed to the system log.
pub fn with_syslog<T>(f: impl FnOnce() -> T) -> T {
    let dispatch = syslog_dispatch(Syslog::default());
    tracing::dispatcher::with_default(&dispatch, f)
}
