//! Serial port discovery.
//!
//! Finds which serial port hosts a device by asking every candidate port for
//! its product id. A [`scanner::PortScanner`] snapshots the port list and runs
//! a [`probe::PortProbe`] handshake on each port in turn.
//!
//! Discovery runs on its own (`sensorlink-find`), before a device server is
//! configured with the port it found. It never runs two probes at once: the
//! firmware on the far end expects to be the only conversation on the line.

pub mod probe;
pub mod scanner;

pub use probe::{PortProbe, ProbeConfig};
pub use scanner::PortScanner;

use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

use crate::error::Result;

/// A duplex serial line the identification handshake runs over.
pub trait ProbeLink: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drop whatever is already buffered on the receive side.
    fn discard_input(&mut self) -> io::Result<()>;

    /// Number of received bytes waiting to be read.
    fn bytes_to_read(&self) -> io::Result<u32>;
}

impl ProbeLink for SerialStream {
    fn discard_input(&mut self) -> io::Result<()> {
        SerialPort::clear(self, ClearBuffer::Input).map_err(io::Error::from)
    }

    fn bytes_to_read(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(self).map_err(io::Error::from)
    }
}

/// Source of serial ports: lists them and opens them.
pub trait SerialBackend {
    type Link: ProbeLink;

    /// Names of the serial ports present right now, in enumeration order.
    fn available_ports(&self) -> Result<Vec<String>>;

    /// Open `port` with the probe's line settings.
    fn open(&self, port: &str, config: &ProbeConfig) -> Result<Self::Link>;
}

/// The host's serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSerial;

impl SerialBackend for NativeSerial {
    type Link = SerialStream;

    fn available_ports(&self) -> Result<Vec<String>> {
        Ok(tokio_serial::available_ports()?
            .into_iter()
            .map(|info| info.port_name)
            .collect())
    }

    fn open(&self, port: &str, config: &ProbeConfig) -> Result<SerialStream> {
        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(config.open_timeout)
            .open_native_async()?;
        Ok(stream)
    }
}
