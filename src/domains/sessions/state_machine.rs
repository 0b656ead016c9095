//! Session status transitions. This is the only code that writes
//! `Session::status`; every other component feeds it signals.

use super::entity::{Session, SessionStatus};
use chrono::Utc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The attached process produced output or took input within the poll window.
    ActivityObserved,
    /// Quiet past the quiescence threshold and judged blocked on input.
    AwaitingInput,
    /// The process id no longer exists and the user did not stop it.
    ProcessGone,
    /// Explicit user reset.
    Reset,
    /// Explicit user stop of the process, session kept.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Pure transition table. `None` means the pair is a no-op.
pub fn next_status(current: SessionStatus, signal: SessionSignal) -> Option<SessionStatus> {
    use SessionSignal::*;
    use SessionStatus::*;

    match (current, signal) {
        (_, Stopped) if current != Idle => Some(Idle),
        (Idle, ActivityObserved) => Some(Running),
        (Waiting, ActivityObserved) => Some(Running),
        (Running, AwaitingInput) => Some(Waiting),
        (Running | Waiting, ProcessGone) => Some(Error),
        (Error, Reset) => Some(Idle),
        _ => None,
    }
}

/// Apply `signal` to `session`, stamping `last_activity_at` when the status
/// actually changes.
pub fn apply_signal(session: &mut Session, signal: SessionSignal) -> Option<Transition> {
    let from = session.status;
    let to = next_status(from, signal)?;
    session.status = to;
    session.last_activity_at = Utc::now();
    log::debug!(
        "Session '{}' {from} -> {to} on {signal:?}",
        session.name
    );
    Some(Transition { from, to })
}

/// What one poll tick observed about a session's process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub process_gone: bool,
    pub recent_activity: bool,
    pub quiet_for: Option<Duration>,
    pub awaiting_input: bool,
}

/// Reduce an observation to at most one signal. Process loss wins over
/// activity, which wins over the awaiting-input heuristic.
pub fn derive_signal(observation: &Observation, quiescence: Duration) -> Option<SessionSignal> {
    if observation.process_gone {
        return Some(SessionSignal::ProcessGone);
    }
    if observation.recent_activity {
        return Some(SessionSignal::ActivityObserved);
    }
    let quiet_long_enough = observation
        .quiet_for
        .is_some_and(|quiet| quiet > quiescence);
    if observation.awaiting_input && quiet_long_enough {
        return Some(SessionSignal::AwaitingInput);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const STATES: [SessionStatus; 4] = [
        SessionStatus::Idle,
        SessionStatus::Running,
        SessionStatus::Waiting,
        SessionStatus::Error,
    ];
    const SIGNALS: [SessionSignal; 5] = [
        SessionSignal::ActivityObserved,
        SessionSignal::AwaitingInput,
        SessionSignal::ProcessGone,
        SessionSignal::Reset,
        SessionSignal::Stopped,
    ];

    #[test]
    fn transition_table_is_exhaustive() {
        use SessionSignal::*;
        use SessionStatus::*;

        let expected = |state: SessionStatus, signal: SessionSignal| match (state, signal) {
            (Idle, ActivityObserved) => Some(Running),
            (Waiting, ActivityObserved) => Some(Running),
            (Running, AwaitingInput) => Some(Waiting),
            (Running, ProcessGone) | (Waiting, ProcessGone) => Some(Error),
            (Error, Reset) => Some(Idle),
            (Running, Stopped) | (Waiting, Stopped) | (Error, Stopped) => Some(Idle),
            _ => None,
        };

        for state in STATES {
            for signal in SIGNALS {
                assert_eq!(
                    next_status(state, signal),
                    expected(state, signal),
                    "({state}, {signal:?})"
                );
            }
        }
    }

    #[test]
    fn error_is_never_left_automatically() {
        for signal in [
            SessionSignal::ActivityObserved,
            SessionSignal::AwaitingInput,
            SessionSignal::ProcessGone,
        ] {
            assert_eq!(next_status(SessionStatus::Error, signal), None);
        }
    }

    #[test]
    fn no_op_leaves_timestamp_alone() {
        let mut session = Session::new("a", "a", PathBuf::from("/tmp/a"));
        let stamp = session.last_activity_at;
        assert!(apply_signal(&mut session, SessionSignal::Reset).is_none());
        assert_eq!(session.last_activity_at, stamp);
        assert_eq!(session.status, SessionStatus::Idle);
    }

    #[test]
    fn transition_updates_timestamp() {
        let mut session = Session::new("a", "a", PathBuf::from("/tmp/a"));
        session.last_activity_at -= chrono::Duration::seconds(60);
        let stamp = session.last_activity_at;

        let transition = apply_signal(&mut session, SessionSignal::ActivityObserved).unwrap();
        assert_eq!(transition.from, SessionStatus::Idle);
        assert_eq!(transition.to, SessionStatus::Running);
        assert!(session.last_activity_at > stamp);
    }

    #[test]
    fn derive_signal_priorities() {
        let quiescence = Duration::from_secs(5);
        let gone = Observation {
            process_gone: true,
            recent_activity: true,
            ..Observation::default()
        };
        assert_eq!(derive_signal(&gone, quiescence), Some(SessionSignal::ProcessGone));

        let active = Observation {
            recent_activity: true,
            awaiting_input: true,
            quiet_for: Some(Duration::from_secs(10)),
            ..Observation::default()
        };
        assert_eq!(
            derive_signal(&active, quiescence),
            Some(SessionSignal::ActivityObserved)
        );

        let blocked = Observation {
            awaiting_input: true,
            quiet_for: Some(Duration::from_secs(6)),
            ..Observation::default()
        };
        assert_eq!(
            derive_signal(&blocked, quiescence),
            Some(SessionSignal::AwaitingInput)
        );

        let briefly_quiet = Observation {
            awaiting_input: true,
            quiet_for: Some(Duration::from_secs(2)),
            ..Observation::default()
        };
        assert_eq!(derive_signal(&briefly_quiet, quiescence), None);

        let quiet_but_busy = Observation {
            quiet_for: Some(Duration::from_secs(60)),
            ..Observation::default()
        };
        assert_eq!(derive_signal(&quiet_but_busy, quiescence), None);
    }
}
