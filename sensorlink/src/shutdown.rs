//! Process termination.
//!
//! Both the device server and the watchdog end by terminating the process;
//! an external supervisor decides whether to start a new one. They do so
//! through [`Terminate`] so tests can observe the request instead of dying.

use strum::{Display, IntoStaticStr};

use crate::tracing::prelude::*;

/// Why the process is going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ExitReason {
    /// No driver could build a device from the configuration.
    NoDevice,
    /// The device exists but would not connect.
    ConnectFailed,
    /// The read loop ended with an error.
    ReadFailed,
    /// The read loop ended because the stream ended.
    Finished,
    /// The read loop was cancelled by a signal.
    Interrupted,
    /// The watchdog saw the device go silent.
    LivenessExpired,
}

impl ExitReason {
    /// Process exit status reported to the supervisor.
    pub fn code(self) -> i32 {
        match self {
            ExitReason::Finished | ExitReason::Interrupted => 0,
            ExitReason::ConnectFailed | ExitReason::ReadFailed => 1,
            ExitReason::LivenessExpired => 2,
            // EX_CONFIG from sysexits.h
            ExitReason::NoDevice => 78,
        }
    }
}

/// Something that ends the process.
///
/// In production this never returns. Test doubles record the request and
/// return, so callers must not assume anything runs after it.
pub trait Terminate: Send + Sync {
    fn terminate(&self, reason: ExitReason);
}

/// Terminates the host process with the reason's exit code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminate for ProcessExit {
    fn terminate(&self, reason: ExitReason) {
        info!(reason = %reason, code = reason.code(), "Exiting.");
        std::process::exit(reason.code());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records termination requests instead of exiting.
    #[derive(Debug, Default)]
    pub struct RecordingTerminator {
        reasons: Mutex<Vec<(ExitReason, tokio::time::Instant)>>,
    }

    impl RecordingTerminator {
        pub fn reasons(&self) -> Vec<ExitReason> {
            self.reasons.lock().iter().map(|(r, _)| *r).collect()
        }

        pub fn times(&self) -> Vec<tokio::time::Instant> {
            self.reasons.lock().iter().map(|(_, t)| *t).collect()
        }
    }

    impl Terminate for RecordingTerminator {
        fn terminate(&self, reason: ExitReason) {
            self.reasons.lock().push((reason, tokio::time::Instant::now()));
        }
    }
}
