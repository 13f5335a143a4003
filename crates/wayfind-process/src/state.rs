//! Pure state machine for the process controller lifecycle
//!
//! No I/O and no async: controllers compute their next state here and only
//! then perform side effects, so every lifecycle rule is testable in isolation.

use serde::Serialize;
use wayfind_core::{Result, WayfindError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    /// No process has been launched yet, or the last launch attempt failed
    NotStarted,
    /// Process spawned, waiting out the launch grace period
    Launching,
    /// Process confirmed alive, window not located yet
    WindowPending,
    /// Window located; input and capture are possible
    Ready,
    /// Terminated by us
    Terminated,
    /// Process exited on its own
    Crashed { code: Option<i32> },
}

impl ControllerState {
    /// A process exists that we are responsible for
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Launching | Self::WindowPending | Self::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    LaunchRequested,
    /// Process survived the grace period
    LaunchConfirmed,
    LaunchFailed,
    WindowFound,
    /// Window disappeared while the process kept running
    WindowLost,
    ExitObserved { code: Option<i32> },
    TerminateRequested,
}

/// Pure state transition function
///
/// Launching again after `Terminated` starts a fresh lifecycle (application
/// restart). Terminating a process that is not live is a no-op. Anything else
/// not listed is an `InvalidState` error; this function never panics.
pub fn transition(state: ControllerState, event: ControllerEvent) -> Result<ControllerState> {
    use ControllerEvent as E;
    use ControllerState as S;

    match (state, event) {
        (S::NotStarted | S::Terminated, E::LaunchRequested) => Ok(S::Launching),
        (S::Launching, E::LaunchConfirmed) => Ok(S::WindowPending),
        (S::Launching, E::LaunchFailed) => Ok(S::NotStarted),

        (S::WindowPending | S::Ready, E::WindowFound) => Ok(S::Ready),
        (S::Ready, E::WindowLost) => Ok(S::WindowPending),

        (S::Launching | S::WindowPending | S::Ready, E::ExitObserved { code }) => {
            Ok(S::Crashed { code })
        }

        (S::Launching | S::WindowPending | S::Ready, E::TerminateRequested) => Ok(S::Terminated),
        (state @ (S::NotStarted | S::Terminated | S::Crashed { .. }), E::TerminateRequested) => {
            Ok(state)
        }

        (state, event) => Err(WayfindError::InvalidState(format!(
            "{:?} cannot handle {:?}",
            state, event
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = transition(ControllerState::NotStarted, ControllerEvent::LaunchRequested).unwrap();
        assert_eq!(state, ControllerState::Launching);

        let state = transition(state, ControllerEvent::LaunchConfirmed).unwrap();
        assert_eq!(state, ControllerState::WindowPending);

        let state = transition(state, ControllerEvent::WindowFound).unwrap();
        assert_eq!(state, ControllerState::Ready);

        let state = transition(state, ControllerEvent::TerminateRequested).unwrap();
        assert_eq!(state, ControllerState::Terminated);
    }

    #[test]
    fn test_failed_launch_can_retry() {
        let state = transition(ControllerState::Launching, ControllerEvent::LaunchFailed).unwrap();
        assert_eq!(state, ControllerState::NotStarted);
        assert!(transition(state, ControllerEvent::LaunchRequested).is_ok());
    }

    #[test]
    fn test_crash_from_any_live_state() {
        for live in [
            ControllerState::Launching,
            ControllerState::WindowPending,
            ControllerState::Ready,
        ] {
            let state = transition(live, ControllerEvent::ExitObserved { code: Some(1) }).unwrap();
            assert_eq!(state, ControllerState::Crashed { code: Some(1) });
        }
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let crashed = ControllerState::Crashed { code: None };
        assert_eq!(
            transition(crashed.clone(), ControllerEvent::TerminateRequested).unwrap(),
            crashed
        );
        assert_eq!(
            transition(ControllerState::Terminated, ControllerEvent::TerminateRequested).unwrap(),
            ControllerState::Terminated
        );
    }

    #[test]
    fn test_restart_after_terminate() {
        let state = transition(ControllerState::Terminated, ControllerEvent::LaunchRequested).unwrap();
        assert_eq!(state, ControllerState::Launching);
    }

    #[test]
    fn test_invalid_transitions_error() {
        let err = transition(ControllerState::Crashed { code: None }, ControllerEvent::WindowFound)
            .unwrap_err();
        assert!(matches!(err, WayfindError::InvalidState(_)));

        assert!(transition(ControllerState::Ready, ControllerEvent::LaunchRequested).is_err());
        assert!(transition(ControllerState::NotStarted, ControllerEvent::WindowFound).is_err());
    }
}
