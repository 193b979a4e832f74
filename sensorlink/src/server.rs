//! Device server: the connection lifecycle of one sensor link.
//!
//! ```text
//! create --(no driver)--> terminate(NoDevice)
//!   |
//! connect --(false)--------------------------+
//!   |                                        |
//! [watchdog] -> read loop -> (end|err|signal) |
//!   |                                        |
//!   +------------> log name, close, terminate <+
//! ```
//!
//! Everything after a device exists funnels through the same close and
//! terminate tail, so the port is always released before the process exits.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    device::DeviceFactory,
    shutdown::{ExitReason, Terminate},
    tracing::prelude::*,
    watchdog::Watchdog,
};

/// Runs one device from construction to process exit.
pub struct DeviceServer {
    config: Config,
    terminator: Arc<dyn Terminate>,
    cancel: CancellationToken,
}

impl DeviceServer {
    pub fn new(config: Config, terminator: Arc<dyn Terminate>) -> Self {
        Self {
            config,
            terminator,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that ends the read loop early; the close tail still runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Create, connect, watch, read, close, terminate.
    ///
    /// With [`crate::shutdown::ProcessExit`] this never returns. The returned
    /// reason is what was handed to the terminator.
    pub async fn run(self, factory: &dyn DeviceFactory) -> ExitReason {
        let device = match factory.create(&self.config) {
            Ok(device) => device,
            Err(e) => {
                error!(device = %self.config.device, error = %e, "Can't create device, terminate.");
                self.terminator.terminate(ExitReason::NoDevice);
                return ExitReason::NoDevice;
            }
        };

        let reason = if device.connect().await {
            let watchdog = self.config.enable_watchdog.then(|| {
                Watchdog::new(&self.config, self.terminator.clone())
                    .start(Arc::downgrade(&device))
            });

            let reason = match device.read_loop(self.cancel.clone()).await {
                Ok(()) if self.cancel.is_cancelled() => ExitReason::Interrupted,
                Ok(()) => ExitReason::Finished,
                Err(e) => {
                    error!(device = %device.name(), error = %e, "Read loop failed");
                    ExitReason::ReadFailed
                }
            };

            // Stop polling before the handle is closed.
            if let Some(watchdog) = watchdog {
                watchdog.abort();
                let _ = watchdog.await;
            }

            reason
        } else {
            info!(device = %device.name(), port = %self.config.port, "Can't connect");
            ExitReason::ConnectFailed
        };

        info!(device = %device.name(), reason = %reason, "Closing device");
        device.close().await;
        drop(device);

        self.terminator.terminate(reason);
        reason
    }
}
