//! Single-link sensor daemon.
//!
//! `sensorlink` keeps one serial/Bluetooth link to a remote sensor: the
//! [`server::DeviceServer`] creates the device from its friendly name,
//! connects, optionally starts the liveness [`watchdog`], reads until the
//! stream ends, then always closes the device and exits so a supervisor can
//! start the next attempt.
//!
//! [`discovery`] is the separate tool side: it finds which serial port a
//! device answers on by asking each port for its product id.

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod server;
pub mod shutdown;
pub mod tracing;
pub mod watchdog;
