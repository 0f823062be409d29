use super::task::SkipReason;

/// State transitions published by the scheduler, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Scheduled { package: String },
    Skipped { package: String, reason: SkipReason },
    Started { package: String, command: String },
    /// The package's `finished` signal settled.
    Finished { package: String, ok: bool },
    Exited { package: String, code: Option<i32> },
    Cancelled { package: String },
    Aborted { reason: String },
}

impl RunEvent {
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Scheduled { package }
            | Self::Skipped { package, .. }
            | Self::Started { package, .. }
            | Self::Finished { package, .. }
            | Self::Exited { package, .. }
            | Self::Cancelled { package } => Some(package),
            Self::Aborted { .. } => None,
        }
    }
}
