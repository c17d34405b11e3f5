use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};

/// Canonical reason of a target stop.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, IntoStaticStr, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[strum(serialize = "breakpoint")]
    Breakpoint,
    #[strum(serialize = "step")]
    Step,
    #[strum(serialize = "signal")]
    Signal,
    #[strum(serialize = "exited")]
    Exited,
    /// Anything the backend reports without a better match, including no reason at all.
    #[strum(serialize = "pause")]
    Pause,
}

impl From<&str> for StopReason {
    fn from(reason: &str) -> Self {
        match reason {
            "breakpoint-hit" => StopReason::Breakpoint,
            "end-stepping-range" => StopReason::Step,
            "signal-received" => StopReason::Signal,
            "exited-normally" => StopReason::Exited,
            _ => StopReason::Pause,
        }
    }
}
