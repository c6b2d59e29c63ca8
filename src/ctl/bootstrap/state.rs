//! Pure retry bookkeeping for the credential bootstrap.
//!
//! Nothing here performs I/O. [`classify`] maps the state before a failed
//! attempt and the kind of failure to the next step, the updated state and
//! the message to show.

use super::message::{FailureKind, FailureMessage};

/// Failed validations allowed before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Steps of one bootstrap invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Load,
    BuildChannel,
    Validate,
    Classify,
    Persist,
    Retry,
    Fatal,
    Done,
}

/// Per-invocation retry flags, threaded through every transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Failed validations so far. Never decreases.
    pub loop_counter: u32,
    /// A stored config was loaded for the first attempt.
    pub old_config_exists: bool,
    /// The first failure was charged to the stored config.
    pub invalid_existing_config: bool,
    /// The last failure was a region failure after successful auth.
    /// Connection failures clear it.
    pub region_invalid: bool,
    /// The config in hand came from the prompt and has not been persisted.
    pub is_new_config: bool,
    /// Running under an explicit "set new config" action.
    pub invoked_as_explicit_set: bool,
}

impl RetryState {
    pub fn new(invoked_as_explicit_set: bool) -> Self {
        Self {
            invoked_as_explicit_set,
            ..Self::default()
        }
    }

    /// Attempts allowed under the current flags.
    pub fn bound(&self) -> u32 {
        if self.invalid_existing_config {
            MAX_ATTEMPTS + 1
        } else {
            MAX_ATTEMPTS
        }
    }

    /// Record that the config for the next attempt came from the store.
    pub fn loaded_from_store(self) -> Self {
        Self {
            old_config_exists: true,
            is_new_config: false,
            ..self
        }
    }

    /// Record that the config for the next attempt came from the prompt.
    pub fn prompted(self) -> Self {
        Self {
            is_new_config: true,
            ..self
        }
    }

    /// Record a successful persist.
    pub fn persisted(self) -> Self {
        Self {
            is_new_config: false,
            ..self
        }
    }

    /// True when this failure is the very first one against a stored config.
    fn first_failure_of_stored_config(&self) -> bool {
        self.loop_counter == 0 && self.old_config_exists && !self.invoked_as_explicit_set
    }
}

/// Result of classifying one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Either [`BootstrapState::Retry`] or [`BootstrapState::Fatal`].
    pub next: BootstrapState,
    pub state: RetryState,
    pub message: FailureMessage,
}

/// Classify a failed attempt.
///
/// Every kind costs one attempt, including a channel that could not be
/// built, since the proxy it goes through is part of the prompted config.
pub fn classify(state: RetryState, kind: FailureKind) -> Transition {
    let message = FailureMessage::select(&state, kind);

    let mut next_state = RetryState {
        region_invalid: kind == FailureKind::Region,
        ..state
    };
    if state.first_failure_of_stored_config() {
        next_state.invalid_existing_config = true;
    }
    next_state.loop_counter += 1;

    let next = if next_state.loop_counter >= next_state.bound() {
        BootstrapState::Fatal
    } else {
        BootstrapState::Retry
    };

    Transition {
        next,
        state: next_state,
        message,
    }
}

/// Where a successful validation goes.
pub fn after_success(state: &RetryState) -> BootstrapState {
    if state.is_new_config {
        BootstrapState::Persist
    } else {
        BootstrapState::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::bootstrap::message::Attribution;

    /// Feed failures until the loop goes fatal, returning how many it took.
    fn attempts_until_fatal(mut state: RetryState, kind: FailureKind) -> u32 {
        for attempt in 1..=10 {
            let t = classify(state, kind);
            if t.next == BootstrapState::Fatal {
                return attempt;
            }
            assert_eq!(t.next, BootstrapState::Retry);
            state = t.state.prompted();
        }
        panic!("never went fatal");
    }

    mod bound {
        use super::*;

        #[test]
        fn test_fresh_config_fatal_after_max_attempts() {
            let state = RetryState::new(false).prompted();
            assert_eq!(
                attempts_until_fatal(state, FailureKind::Credentials),
                MAX_ATTEMPTS
            );
        }

        #[test]
        fn test_stored_config_gets_one_grace_attempt() {
            let state = RetryState::new(false).loaded_from_store();
            let t = classify(state, FailureKind::Credentials);
            assert!(t.state.invalid_existing_config);
            assert_eq!(t.state.loop_counter, 1);
            assert_eq!(t.state.bound(), MAX_ATTEMPTS + 1);

            assert_eq!(
                attempts_until_fatal(state, FailureKind::Credentials),
                MAX_ATTEMPTS + 1
            );
        }

        #[test]
        fn test_explicit_set_never_gets_grace() {
            let state = RetryState::new(true).prompted();
            assert_eq!(attempts_until_fatal(state, FailureKind::Region), MAX_ATTEMPTS);
        }

        #[test]
        fn test_counter_increments_by_one() {
            let mut state = RetryState::new(false).prompted();
            for expected in 1..MAX_ATTEMPTS {
                state = classify(state, FailureKind::Credentials).state;
                assert_eq!(state.loop_counter, expected);
            }
        }

        #[test]
        fn test_connection_failures_share_the_budget() {
            let state = RetryState::new(false).loaded_from_store();
            let t = classify(state, FailureKind::Connection);
            assert_eq!(t.next, BootstrapState::Retry);
            assert!(t.state.invalid_existing_config);
            assert_eq!(t.state.loop_counter, 1);

            let fresh = RetryState::new(false).prompted();
            assert_eq!(
                attempts_until_fatal(fresh, FailureKind::Connection),
                MAX_ATTEMPTS
            );
        }
    }

    mod flags {
        use super::*;

        #[test]
        fn test_region_invalid_tracks_last_outcome() {
            let state = RetryState::new(false).prompted();
            let t = classify(state, FailureKind::Region);
            assert!(t.state.region_invalid);

            let t = classify(t.state, FailureKind::Credentials);
            assert!(!t.state.region_invalid);

            let t = classify(classify(t.state, FailureKind::Region).state, FailureKind::Connection);
            assert!(!t.state.region_invalid);
        }

        #[test]
        fn test_persist_only_for_new_config() {
            let stored = RetryState::new(false).loaded_from_store();
            assert_eq!(after_success(&stored), BootstrapState::Done);

            let fresh = RetryState::new(false).prompted();
            assert_eq!(after_success(&fresh), BootstrapState::Persist);
            assert_eq!(after_success(&fresh.persisted()), BootstrapState::Done);
        }
    }

    mod messages {
        use super::*;

        #[test]
        fn test_stored_config_failure_is_found_then_entered() {
            let state = RetryState::new(false).loaded_from_store();
            let first = classify(state, FailureKind::Region);
            assert_eq!(first.message.kind, FailureKind::Region);
            assert_eq!(first.message.attribution, Attribution::Found);

            let second = classify(first.state.prompted(), FailureKind::Credentials);
            assert_eq!(second.message.kind, FailureKind::Credentials);
            assert_eq!(second.message.attribution, Attribution::Entered);
        }

        #[test]
        fn test_grace_attempt_repeats_entered_message() {
            let mut state = RetryState::new(false).loaded_from_store();
            let mut last = None;
            for _ in 0..=MAX_ATTEMPTS {
                let t = classify(state, FailureKind::Credentials);
                state = t.state.prompted();
                last = Some(t);
            }
            let last = last.unwrap();
            assert_eq!(last.next, BootstrapState::Fatal);
            assert_eq!(last.message.attribution, Attribution::Entered);
        }

        #[test]
        fn test_explicit_set_always_entered() {
            let mut state = RetryState::new(true);
            state.old_config_exists = true;
            let t = classify(state, FailureKind::Credentials);
            assert_eq!(t.message.attribution, Attribution::Entered);
            assert!(!t.state.invalid_existing_config);
        }
    }
}
