//! User-facing failure messages.

use std::fmt;

use colored::Colorize;
use tracing::debug;

use super::state::RetryState;

const CREDENTIAL_FIELDS: &str = "Account URL/Username/Password/Region/Tenant";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Credentials,
    Region,
    /// The channel could not be built, e.g. an unusable proxy.
    Connection,
}

/// Whether the bad values were typed in this run or read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Entered,
    Found,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureMessage {
    pub kind: FailureKind,
    pub attribution: Attribution,
}

impl FailureMessage {
    /// Pick the message for a failure of `kind` observed while in `state`.
    pub fn select(state: &RetryState, kind: FailureKind) -> Self {
        let found = !state.invoked_as_explicit_set
            && state.old_config_exists
            && !state.invalid_existing_config
            && state.loop_counter == 0;
        let attribution = if found {
            Attribution::Found
        } else {
            Attribution::Entered
        };
        Self { kind, attribution }
    }

    /// Print in red on stdout and mirror to the debug log.
    pub fn emit(&self) {
        println!("\n{}{}", "x ".red(), self);
        debug!("{}", self);
    }
}

impl fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.attribution {
            Attribution::Entered => "entered",
            Attribution::Found => "found",
        };
        match self.kind {
            FailureKind::Region => write!(f, "Invalid Region {}", verb),
            FailureKind::Credentials => {
                write!(f, "Invalid credentials {} ({})", verb, CREDENTIAL_FIELDS)
            }
            FailureKind::Connection => write!(f, "Unable to reach the node with the Proxy URL {}", verb),
        }
    }
}

/// Message logged when the retry bound is exhausted.
pub fn retries_exhausted() -> String {
    format!(
        "Invalid credentials entered multiple times ({})",
        CREDENTIAL_FIELDS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        let region_found = FailureMessage {
            kind: FailureKind::Region,
            attribution: Attribution::Found,
        };
        assert_eq!(region_found.to_string(), "Invalid Region found");

        let creds_entered = FailureMessage {
            kind: FailureKind::Credentials,
            attribution: Attribution::Entered,
        };
        assert_eq!(
            creds_entered.to_string(),
            "Invalid credentials entered (Account URL/Username/Password/Region/Tenant)"
        );
        assert!(retries_exhausted().contains("entered multiple times"));

        let proxy_found = FailureMessage {
            kind: FailureKind::Connection,
            attribution: Attribution::Found,
        };
        assert_eq!(
            proxy_found.to_string(),
            "Unable to reach the node with the Proxy URL found"
        );
    }

    #[test]
    fn test_found_only_on_first_stored_failure() {
        let stored = RetryState::new(false).loaded_from_store();
        assert_eq!(
            FailureMessage::select(&stored, FailureKind::Credentials).attribution,
            Attribution::Found
        );

        let later = RetryState {
            loop_counter: 1,
            invalid_existing_config: true,
            ..stored
        };
        assert_eq!(
            FailureMessage::select(&later, FailureKind::Region),
            FailureMessage {
                kind: FailureKind::Region,
                attribution: Attribution::Entered
            }
        );

        let prompted = RetryState::new(false).prompted();
        assert_eq!(
            FailureMessage::select(&prompted, FailureKind::Connection).attribution,
            Attribution::Entered
        );
    }
}
