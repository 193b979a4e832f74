//! One identification handshake against one serial port.
//!
//! Open the port, let the firmware settle, flush stale input, send `x\r`,
//! wait a fixed response delay, read what arrived and trim it. The session is
//! torn down before `probe()` returns, whatever happened.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time;

use super::{ProbeLink, SerialBackend};
use crate::{error::Result, tracing::prelude::*};

/// Product id request: `'x'` followed by carriage return.
pub const ID_REQUEST: [u8; 2] = [b'x', 0x0D];

/// Line settings and timing for the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Line speed (8-N-1, no flow control).
    pub baud_rate: u32,
    /// Bound on opening the port.
    pub open_timeout: Duration,
    /// Pause after opening while the firmware resets.
    pub settle: Duration,
    /// Fixed wait between request and read.
    pub response_delay: Duration,
    /// Most bytes read back as the product id.
    pub read_buffer: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            open_timeout: Duration::from_millis(2000),
            settle: Duration::from_millis(2000),
            response_delay: Duration::from_millis(300),
            read_buffer: 32,
        }
    }
}

/// Runs the handshake on ports from a backend.
pub struct PortProbe<'a, B: SerialBackend> {
    backend: &'a B,
    config: ProbeConfig,
}

impl<'a, B: SerialBackend> PortProbe<'a, B> {
    pub fn new(backend: &'a B, config: ProbeConfig) -> Self {
        Self { backend, config }
    }

    /// Ask `port` for its product id.
    ///
    /// An empty id means the port answered nothing within the window; errors
    /// mean the port could not be opened or the exchange failed.
    pub async fn probe(&self, port: &str) -> Result<String> {
        let link = self.backend.open(port, &self.config).map_err(|e| {
            debug!(port, error = %e, "Error connecting");
            e
        })?;

        let mut session = ProbeSession { port, link };
        let id = session.identify(&self.config).await;
        session.close().await;
        id
    }
}

// An open port for the duration of one probe.
struct ProbeSession<'p, L: ProbeLink> {
    port: &'p str,
    link: L,
}

impl<L: ProbeLink> ProbeSession<'_, L> {
    async fn identify(&mut self, config: &ProbeConfig) -> Result<String> {
        if !config.settle.is_zero() {
            time::sleep(config.settle).await;
        }

        // Leftovers from whoever had the port before must not be taken for
        // the reply.
        if let Err(e) = self.link.discard_input() {
            warn!(port = self.port, error = %e, "Could not discard stale input");
        }

        self.link.write_all(&ID_REQUEST).await?;
        self.link.flush().await?;

        time::sleep(config.response_delay).await;

        let pending = self.link.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(String::new());
        }

        let mut buf = vec![0u8; config.read_buffer];
        let len = pending.min(buf.len());
        let read = self.link.read(&mut buf[..len]).await?;

        Ok(String::from_utf8_lossy(&buf[..read]).trim().to_string())
    }

    async fn close(mut self) {
        if let Err(e) = self.link.shutdown().await {
            debug!(port = self.port, error = %e, "Output close failed");
        }
        trace!(port = self.port, "Probe session closed");
        // Dropping the link releases the port.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::{FakeBackend, Firmware};
    use crate::error::Error;
    use tokio::time::Instant;

    fn backend(firmware: Firmware) -> FakeBackend {
        FakeBackend::new(&[("/dev/ttyACM0", firmware)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_is_trimmed() {
        let backend = backend(Firmware::Replies(b"  <id:beamscan>\r\n".to_vec()));
        let probe = PortProbe::new(&backend, ProbeConfig::default());

        let id = probe.probe("/dev/ttyACM0").await.unwrap();

        assert_eq!(id, "<id:beamscan>");
        assert_eq!(*backend.ledger.written.lock(), ID_REQUEST.to_vec());
        assert_eq!(backend.ledger.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_input_discarded() {
        let mut backend = backend(Firmware::Replies(b"<id:oculusDC>\r\n".to_vec()));
        backend.stale = b"garbage from last run".to_vec();
        let probe = PortProbe::new(&backend, ProbeConfig::default());

        assert_eq!(probe.probe("/dev/ttyACM0").await.unwrap(), "<id:oculusDC>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_truncated_to_buffer() {
        let backend = backend(Firmware::Replies(vec![b'a'; 40]));
        let probe = PortProbe::new(&backend, ProbeConfig::default());

        assert_eq!(probe.probe("/dev/ttyACM0").await.unwrap().len(), 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_port_gives_empty_id_within_window() {
        let backend = backend(Firmware::Silent);
        let config = ProbeConfig::default();
        let probe = PortProbe::new(&backend, config.clone());
        let start = Instant::now();

        let id = probe.probe("/dev/ttyACM0").await.unwrap();

        assert_eq!(id, "");
        assert_eq!(start.elapsed(), config.settle + config.response_delay);
        assert_eq!(backend.ledger.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_leaves_nothing_open() {
        let backend = backend(Firmware::Unopenable);
        let probe = PortProbe::new(&backend, ProbeConfig::default());

        let err = probe.probe("/dev/ttyACM0").await.unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(backend.ledger.opened(), vec!["/dev/ttyACM0"]);
        assert_eq!(backend.ledger.closed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_still_closes() {
        let backend = backend(Firmware::BrokenWrite);
        let probe = PortProbe::new(&backend, ProbeConfig::default());

        assert!(probe.probe("/dev/ttyACM0").await.is_err());
        assert_eq!(backend.ledger.closed(), 1);
    }
}
