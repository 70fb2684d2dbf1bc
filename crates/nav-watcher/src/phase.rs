use std::fmt;

/// `Idle -> SignalReceived -> Debouncing -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    #[default]
    Idle,
    /// A page signal arrived and is being reconciled.
    SignalReceived,
    /// A trigger was published and waits out the debounce window.
    Debouncing,
}

impl WatchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchPhase::Idle => "idle",
            WatchPhase::SignalReceived => "signal_received",
            WatchPhase::Debouncing => "debouncing",
        }
    }
}

impl fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
