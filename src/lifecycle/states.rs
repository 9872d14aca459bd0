use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a stubber instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubberState {
    /// Not connected; the only state `start` accepts
    Stopped,
    /// Connecting and attaching queues
    Starting,
    /// Queues attached and dispatching
    Running,
    /// Closing the session and connection
    Stopping,
    /// A start or stop step failed; the instance should be discarded
    Failed,
}

impl StubberState {
    /// Check if the stubber is attached and dispatching messages
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the stubber is between stable states
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    /// Check if this state can never lead back to Running
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for StubberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StubberState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid stubber state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip_through_strings() {
        for state in [
            StubberState::Stopped,
            StubberState::Starting,
            StubberState::Running,
            StubberState::Stopping,
            StubberState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<StubberState>(), Ok(state));
        }
        assert!("paused".parse::<StubberState>().is_err());
    }

    #[test]
    fn test_state_predicates() {
        assert!(StubberState::Running.is_running());
        assert!(StubberState::Starting.is_transitioning());
        assert!(!StubberState::Stopped.is_transitioning());
        assert!(StubberState::Failed.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&StubberState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
