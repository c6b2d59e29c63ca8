//! Credential bootstrap.
//!
//! A [`Bootstrap`] loads or prompts for a [`Config`], opens a channel to the
//! target, validates the credentials and retries within a bounded budget.
//! The session runs strictly sequentially: an attempt's channel is closed
//! before the next attempt builds another one.
//!
//! ```text
//! LOAD -> BUILD_CHANNEL -> VALIDATE -+-> PERSIST -> DONE
//!   ^           |                    +-> DONE
//!   |           +--------------------+-> CLASSIFY -+-> RETRY --+
//!   |                                              +-> FATAL   |
//!   +----------------------------------------------------------+
//! ```
//!
//! A channel that cannot be built is classified like a failed validation,
//! unless the SSH server refused the login, which no prompted value can fix.

pub mod message;
pub mod state;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use message::{Attribution, FailureKind, FailureMessage, retries_exhausted};
pub use state::{BootstrapState, MAX_ATTEMPTS, RetryState, Transition, after_success, classify};

use crate::ctl::channel::{ChannelFactory, CommandChannel};
use crate::ctl::error::{BootstrapError, ExecError, IdentityError, PromptError};
use crate::ctl::identity::{IdentityValidator, validate_credentials};
use crate::ctl::prompt::ConfigPrompt;
use crate::ctl::store::CredentialStore;
use crate::ctl::types::{AuthToken, Config, ValidationOutcome};

/// Validated execution context handed back on success.
pub struct Bootstrapped {
    pub config: Config,
    pub channel: Box<dyn CommandChannel>,
    pub token: AuthToken,
    /// Resolved endpoint of the configured region.
    pub endpoint: String,
    /// Retry flags at the end of the run.
    pub state: RetryState,
}

/// One bootstrap invocation and its collaborators.
pub struct Bootstrap {
    store: Box<dyn CredentialStore>,
    prompt: Box<dyn ConfigPrompt>,
    factory: Box<dyn ChannelFactory>,
    validator: Box<dyn IdentityValidator>,
    explicit_set: bool,
}

/// A validated attempt: the open channel and what the identity service
/// returned.
struct Validated {
    channel: Box<dyn CommandChannel>,
    token: AuthToken,
    endpoint: String,
}

/// Driver steps. Each one owns what the step needs, so `Classify` always
/// has a failure and `Done` always has a channel.
enum Step {
    Load,
    BuildChannel,
    Validate(Box<dyn CommandChannel>),
    Classify(FailureKind),
    Persist(Validated),
    Retry,
    Fatal,
    Done(Validated),
}

impl Step {
    fn state(&self) -> BootstrapState {
        match self {
            Step::Load => BootstrapState::Load,
            Step::BuildChannel => BootstrapState::BuildChannel,
            Step::Validate(_) => BootstrapState::Validate,
            Step::Classify(_) => BootstrapState::Classify,
            Step::Persist(_) => BootstrapState::Persist,
            Step::Retry => BootstrapState::Retry,
            Step::Fatal => BootstrapState::Fatal,
            Step::Done(_) => BootstrapState::Done,
        }
    }
}

fn interrupted(e: IdentityError) -> BootstrapError {
    match e {
        IdentityError::TimedOut(d) => BootstrapError::TimedOut(d),
        _ => BootstrapError::Cancelled,
    }
}

async fn release(channel: Box<dyn CommandChannel>) {
    if let Err(e) = channel.close().await {
        warn!("Failed to release channel to {}: {}", channel.describe(), e);
    }
}

impl Bootstrap {
    pub fn new(
        store: Box<dyn CredentialStore>,
        prompt: Box<dyn ConfigPrompt>,
        factory: Box<dyn ChannelFactory>,
        validator: Box<dyn IdentityValidator>,
    ) -> Self {
        Self {
            store,
            prompt,
            factory,
            validator,
            explicit_set: false,
        }
    }

    /// Always prompt for a new config instead of loading the stored one.
    pub fn explicit_set(mut self, explicit_set: bool) -> Self {
        self.explicit_set = explicit_set;
        self
    }

    async fn ask(
        &self,
        previous: Option<&Config>,
        cancel: &CancellationToken,
    ) -> Result<Config, BootstrapError> {
        self.prompt.prompt(previous, cancel).await.map_err(|e| match e {
            PromptError::Cancelled => BootstrapError::Cancelled,
            other => BootstrapError::Prompt(other),
        })
    }

    /// Obtain the config for the next attempt.
    async fn load(
        &self,
        state: RetryState,
        previous: Option<&Config>,
        cancel: &CancellationToken,
    ) -> Result<(Config, RetryState), BootstrapError> {
        if previous.is_some() {
            return Ok((self.ask(previous, cancel).await?, state.prompted()));
        }

        if self.explicit_set {
            // Offer the stored values as defaults, if readable
            let stored = self.store.load().ok().flatten();
            return Ok((self.ask(stored.as_ref(), cancel).await?, state.prompted()));
        }

        match self.store.load()? {
            Some(config) => {
                debug!("Using stored config for {}", config.username);
                Ok((config, state.loaded_from_store()))
            }
            None => {
                info!("No stored config found");
                Ok((self.ask(None, cancel).await?, state.prompted()))
            }
        }
    }

    /// Drive the loop to `DONE` or a terminal error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Bootstrapped, BootstrapError> {
        let mut state = RetryState::new(self.explicit_set);
        let mut step = Step::Load;
        let mut previous: Option<Config> = None;
        let mut config = Config::default();

        loop {
            debug!(step = ?step.state(), loop_counter = state.loop_counter, "Bootstrap step");

            step = match step {
                Step::Load => {
                    let (loaded, next) = self.load(state, previous.as_ref(), cancel).await?;
                    config = loaded;
                    state = next;
                    Step::BuildChannel
                }

                Step::BuildChannel => match self.factory.build(&config.proxy_url, cancel).await {
                    Ok(channel) => {
                        debug!("Channel ready on {}", channel.describe());
                        Step::Validate(channel)
                    }
                    Err(e) if e.is_cancelled() || e.is_login_rejected() => return Err(e.into()),
                    Err(ExecError::Connection { target, reason }) => {
                        warn!("Unable to reach {}: {}", target, reason);
                        Step::Classify(FailureKind::Connection)
                    }
                    Err(e) => return Err(e.into()),
                },

                Step::Validate(channel) => {
                    info!("Validating credentials for {}", config.username);
                    let outcome = match validate_credentials(self.validator.as_ref(), &config, cancel).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            release(channel).await;
                            return Err(interrupted(e));
                        }
                    };
                    match outcome {
                        ValidationOutcome::Success { token, endpoint } => {
                            let validated = Validated {
                                channel,
                                token,
                                endpoint,
                            };
                            match after_success(&state) {
                                BootstrapState::Persist => Step::Persist(validated),
                                _ => Step::Done(validated),
                            }
                        }
                        ValidationOutcome::AuthFailure => {
                            release(channel).await;
                            Step::Classify(FailureKind::Credentials)
                        }
                        ValidationOutcome::RegionFailure { reason } => {
                            debug!("Region {} rejected: {}", config.region, reason);
                            release(channel).await;
                            Step::Classify(FailureKind::Region)
                        }
                    }
                }

                Step::Classify(kind) => {
                    let transition = classify(state, kind);
                    transition.message.emit();
                    state = transition.state;
                    match transition.next {
                        BootstrapState::Fatal => Step::Fatal,
                        _ => Step::Retry,
                    }
                }

                Step::Retry => {
                    previous = Some(std::mem::take(&mut config));
                    Step::Load
                }

                Step::Persist(validated) => {
                    match self.store.store(&config) {
                        Ok(()) => state = state.persisted(),
                        Err(e) => error!("Failed to store config: {}", e),
                    }
                    Step::Done(validated)
                }

                Step::Fatal => {
                    let message = retries_exhausted();
                    error!("{}", message);
                    return Err(BootstrapError::RetryBoundExceeded { message });
                }

                Step::Done(Validated {
                    channel,
                    token,
                    endpoint,
                }) => {
                    info!("Credentials validated for region {}", config.region);
                    return Ok(Bootstrapped {
                        config,
                        channel,
                        token,
                        endpoint,
                        state,
                    });
                }
            };
        }
    }
}
