//! Scan every serial port for a device with a given product id.

use super::{NativeSerial, PortProbe, ProbeConfig, SerialBackend};
use crate::{error::Result, tracing::prelude::*};

/// Probes a fixed snapshot of serial ports, one at a time.
pub struct PortScanner<B: SerialBackend> {
    backend: B,
    config: ProbeConfig,
    ports: Vec<String>,
}

impl PortScanner<NativeSerial> {
    /// Scanner over the host's serial ports.
    pub fn native(config: ProbeConfig) -> Result<Self> {
        Self::new(NativeSerial, config)
    }
}

impl<B: SerialBackend> PortScanner<B> {
    /// Snapshot the backend's ports. The list is not refreshed afterwards.
    pub fn new(backend: B, config: ProbeConfig) -> Result<Self> {
        let ports = backend.available_ports()?;
        debug!(count = ports.len(), ports = ?ports, "Available serial ports");
        Ok(Self {
            backend,
            config,
            ports,
        })
    }

    /// Ports in enumeration order.
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    /// Find the port whose product id equals `target`, ignoring case.
    ///
    /// Ports are probed last-enumerated first and the first match wins. A
    /// port that fails to open or answer is skipped.
    pub async fn scan(&self, target: &str) -> Option<String> {
        let probe = PortProbe::new(&self.backend, self.config.clone());
        let target = target.to_lowercase();

        for port in self.ports.iter().rev() {
            match probe.probe(port).await {
                Ok(id) => {
                    info!(port = %port, id = %id, "Discovered");
                    if id.to_lowercase() == target {
                        return Some(port.clone());
                    }
                }
                Err(e) => {
                    warn!(port = %port, error = %e, "Probe failed");
                }
            }
        }

        None
    }
}
