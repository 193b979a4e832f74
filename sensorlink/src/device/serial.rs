//! Serial-port device driver shared by the hardware families.
//!
//! A family supplies a frame decoder and a way to report decoded frames; this
//! module handles the port, the liveness clock and the read loop.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;

use super::Device;
use crate::{
    config::Config,
    error::{Error, Result},
    tracing::prelude::*,
};

/// Bound on how long opening the port may take.
pub const OPEN_TIMEOUT: Duration = Duration::from_millis(2000);

/// A hardware family speaking over a serial link.
pub trait Family: Send + Sync + 'static {
    /// One decoded unit of data from the device.
    type Frame: Send;

    /// Splits the byte stream into frames.
    type Codec: Decoder<Item = Self::Frame, Error = Error> + Send;

    /// Family name used in logs.
    const NAME: &'static str;

    /// Line speed of the link.
    const BAUD_RATE: u32;

    /// Fresh decoder for a new connection.
    fn codec() -> Self::Codec;

    /// Emit a decoded frame.
    fn report(device: &str, frame: &Self::Frame);
}

/// Device reachable over a serial port, framed by family `F`.
pub struct SerialDevice<F: Family> {
    name: String,
    port: String,
    stream: Mutex<Option<SerialStream>>,
    last_data: Mutex<Instant>,
    frames: AtomicU64,
    _family: PhantomData<fn() -> F>,
}

impl<F: Family> SerialDevice<F> {
    /// Device described by `config`; nothing is opened until `connect()`.
    pub fn new(config: &Config) -> Self {
        Self {
            name: config.device.clone(),
            port: config.port.clone(),
            stream: Mutex::new(None),
            last_data: Mutex::new(Instant::now()),
            frames: AtomicU64::new(0),
            _family: PhantomData,
        }
    }

    /// Serial port this device lives on.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Frames decoded since construction.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        *self.last_data.lock() = Instant::now();
    }

    // Drive the decoder over any byte source until end of stream, error or
    // cancellation.
    async fn pump<R>(&self, source: R, cancel: CancellationToken) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let mut frames = FramedRead::new(source, F::codec());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(device = %self.name, "Read loop cancelled");
                    return Ok(());
                }
                next = frames.next() => match next {
                    Some(Ok(frame)) => {
                        self.touch();
                        self.frames.fetch_add(1, Ordering::Relaxed);
                        F::report(&self.name, &frame);
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        info!(device = %self.name, frames = self.frames(), "Stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }
}

#[async_trait]
impl<F: Family> Device for SerialDevice<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> bool {
        let opened = tokio_serial::new(&self.port, F::BAUD_RATE)
            .timeout(OPEN_TIMEOUT)
            .open_native_async();

        match opened {
            Ok(stream) => {
                *self.stream.lock() = Some(stream);
                self.touch();
                info!(
                    device = %self.name,
                    port = %self.port,
                    family = F::NAME,
                    baud = F::BAUD_RATE,
                    "Connected"
                );
                true
            }
            Err(e) => {
                warn!(device = %self.name, port = %self.port, error = %e, "Error connecting");
                false
            }
        }
    }

    async fn read_loop(&self, cancel: CancellationToken) -> Result<()> {
        let stream = self
            .stream
            .lock()
            .take()
            .ok_or_else(|| Error::Device(format!("{} is not connected", self.name)))?;

        // The port closes when the framed reader drops at the end of pump().
        self.pump(stream, cancel).await
    }

    async fn close(&self) {
        if self.stream.lock().take().is_some() {
            debug!(device = %self.name, port = %self.port, "Released unread port");
        }
        info!(device = %self.name, frames = self.frames(), "Closed");
    }

    fn staleness(&self) -> Duration {
        self.last_data.lock().elapsed()
    }
}
