//! Liveness watchdog.
//!
//! Once a device is connected, the watchdog wakes every `spin_time`, asks the
//! device how long it has been silent and, past the configured threshold,
//! terminates the whole process. Restarting the link is the supervisor's job.
//!
//! The watchdog holds a [`Weak`] reference: it never keeps the device alive,
//! never mutates it and never closes it.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::{
    config::Config,
    device::Device,
    shutdown::{ExitReason, Terminate},
    tracing::prelude::*,
};

/// Polls a device's staleness and ends the process when it goes quiet.
pub struct Watchdog {
    spin_time: Duration,
    threshold: Duration,
    terminator: Arc<dyn Terminate>,
}

impl Watchdog {
    pub fn new(config: &Config, terminator: Arc<dyn Terminate>) -> Self {
        Self {
            spin_time: config.spin_time(),
            threshold: config.liveness_threshold(),
            terminator,
        }
    }

    /// Spawn the tick loop on the current runtime.
    pub fn start(self, device: Weak<dyn Device>) -> JoinHandle<()> {
        tokio::spawn(self.run(device))
    }

    async fn run(self, device: Weak<dyn Device>) {
        debug!(
            spin_ms = self.spin_time.as_millis() as u64,
            threshold_ms = self.threshold.as_millis() as u64,
            "Watchdog started"
        );

        loop {
            time::sleep(self.spin_time).await;

            // Device dropped: the server is already tearing down.
            let Some(device) = device.upgrade() else {
                debug!("Device gone, watchdog stopped");
                return;
            };

            let delta = device.staleness();
            if delta > self.threshold {
                error!(
                    device = %device.name(),
                    delta_ms = delta.as_millis() as u64,
                    threshold_ms = self.threshold.as_millis() as u64,
                    "Device went silent, terminating"
                );
                drop(device);
                self.terminator.terminate(ExitReason::LivenessExpired);
                return;
            }

            trace!(device = %device.name(), delta_ms = delta.as_millis() as u64, "Alive");
        }
    }
}
