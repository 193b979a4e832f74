//! Device handles and the driver registry.
//!
//! A [`Device`] is one physical link to a sensor. The device server only ever
//! talks to this trait; hardware families live in submodules and register a
//! [`DriverDescriptor`] with `inventory` so the registry can pick one from the
//! device's friendly name.

pub mod beam;
pub mod hxm;
pub mod serial;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{Error, Result},
    tracing::prelude::*,
};

/// One connection to a physical sensor.
///
/// Methods take `&self`: the server owns the handle, the watchdog holds a weak
/// reference and only ever calls [`Device::staleness`]. Drivers keep their
/// mutable state behind short-lived locks.
#[async_trait]
pub trait Device: Send + Sync {
    /// Friendly name of the device.
    fn name(&self) -> &str;

    /// Open the link. `false` means the device is unreachable right now.
    async fn connect(&self) -> bool;

    /// Read until the stream ends, fails, or `cancel` fires.
    async fn read_loop(&self, cancel: CancellationToken) -> Result<()>;

    /// Release the link. Called once per handle by the server.
    async fn close(&self);

    /// Time since the device last produced recognizable data.
    fn staleness(&self) -> Duration;
}

/// Builds a device handle from the configuration.
pub trait DeviceFactory {
    fn create(&self, config: &Config) -> Result<Arc<dyn Device>>;
}

impl<F> DeviceFactory for F
where
    F: Fn(&Config) -> Result<Arc<dyn Device>>,
{
    fn create(&self, config: &Config) -> Result<Arc<dyn Device>> {
        self(config)
    }
}

/// Registration record for one hardware family.
pub struct DriverDescriptor {
    /// Family name used in logs.
    pub family: &'static str,
    /// Friendly-name prefix the family answers to, matched case-insensitively.
    pub prefix: &'static str,
    /// Build a handle for the configured device.
    pub create: fn(&Config) -> Result<Arc<dyn Device>>,
}

impl DriverDescriptor {
    /// Whether this family handles a device called `name`.
    pub fn matches(&self, name: &str) -> bool {
        name.len() >= self.prefix.len()
            && name.is_char_boundary(self.prefix.len())
            && name[..self.prefix.len()].eq_ignore_ascii_case(self.prefix)
    }
}

impl std::fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("family", &self.family)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

inventory::collect!(DriverDescriptor);

/// Looks up the driver family for a device by its friendly name.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    descriptors: Vec<&'static DriverDescriptor>,
}

impl DriverRegistry {
    /// Registry of every family linked into the binary.
    pub fn builtin() -> Self {
        Self::with_descriptors(inventory::iter::<DriverDescriptor>().collect())
    }

    /// Registry restricted to the given families.
    pub fn with_descriptors(descriptors: Vec<&'static DriverDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Find the family for a device name.
    ///
    /// When several prefixes match, the longest one wins.
    pub fn find_descriptor(&self, name: &str) -> Option<&'static DriverDescriptor> {
        self.descriptors
            .iter()
            .copied()
            .filter(|desc| desc.matches(name))
            .max_by_key(|desc| desc.prefix.len())
    }

    /// Family names, for diagnostics.
    pub fn families(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|desc| desc.family)
    }
}

impl DeviceFactory for DriverRegistry {
    fn create(&self, config: &Config) -> Result<Arc<dyn Device>> {
        let desc = self
            .find_descriptor(&config.device)
            .ok_or_else(|| Error::NoDriver(config.device.clone()))?;
        debug!(device = %config.device, family = desc.family, "Selected driver");
        (desc.create)(config)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// How the fake's read loop ends.
    #[derive(Debug, Clone, Copy)]
    pub enum ReadBehavior {
        /// Produce a few frames, then report end of stream.
        Finish,
        /// Fail with an I/O error.
        Fail,
        /// Block until cancelled.
        UntilCancelled,
    }

    /// Scriptable device that counts lifecycle calls.
    pub struct FakeDevice {
        pub connects: bool,
        pub read: ReadBehavior,
        pub connect_calls: AtomicUsize,
        pub read_calls: AtomicUsize,
        pub close_calls: AtomicUsize,
        pub staleness_calls: AtomicUsize,
        pub last_data: Mutex<tokio::time::Instant>,
    }

    impl FakeDevice {
        pub fn new(connects: bool, read: ReadBehavior) -> Arc<Self> {
            Arc::new(Self {
                connects,
                read,
                connect_calls: AtomicUsize::new(0),
                read_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                staleness_calls: AtomicUsize::new(0),
                last_data: Mutex::new(tokio::time::Instant::now()),
            })
        }

        pub fn calls(&self) -> (usize, usize, usize) {
            (
                self.connect_calls.load(Ordering::SeqCst),
                self.read_calls.load(Ordering::SeqCst),
                self.close_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl Device for FakeDevice {
        fn name(&self) -> &str {
            "FAKE01"
        }

        async fn connect(&self) -> bool {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_data.lock() = tokio::time::Instant::now();
            self.connects
        }

        async fn read_loop(&self, cancel: CancellationToken) -> Result<()> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            match self.read {
                ReadBehavior::Finish => {
                    for _ in 0..3 {
                        *self.last_data.lock() = tokio::time::Instant::now();
                        tokio::task::yield_now().await;
                    }
                    Ok(())
                }
                ReadBehavior::Fail => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "link dropped",
                ))),
                ReadBehavior::UntilCancelled => {
                    cancel.cancelled().await;
                    Ok(())
                }
            }
        }

        async fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn staleness(&self) -> Duration {
            self.staleness_calls.fetch_add(1, Ordering::SeqCst);
            self.last_data.lock().elapsed()
        }
    }
}
