//! Two-phase reconciliation state machine.
//!
//! The machine owns no timers and performs no I/O. Every call to
//! [`ReconciliationMachine::handle`] consumes one [`Event`] and returns the
//! [`Effect`]s the driver must carry out. Events that do not apply to the
//! current phase are stale and produce nothing.

use std::time::Duration;

use crate::checkout::models::{SessionStatus, Tier};
use crate::config::ReconcilerConfig;
use crate::error::{ConfigurationError, VerificationError, VerificationFailure};

/// Progress of the reconciliation as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationState {
    Verifying,
    Success,
    Error,
}

impl ReconciliationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReconciliationState::Verifying)
    }

    pub fn headline(&self) -> &'static str {
        match self {
            ReconciliationState::Verifying => "Verifying Payment",
            ReconciliationState::Success => "Payment Successful!",
            ReconciliationState::Error => "Verification Failed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReconciliationState::Verifying => {
                "Please wait while we confirm your subscription. This may take a moment."
            }
            ReconciliationState::Success => {
                "Your subscription is active. Finalizing and redirecting to your dashboard..."
            }
            ReconciliationState::Error => crate::error::VERIFICATION_FAILED_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectReason {
    /// The profile reported a tier different from the baseline.
    Converged { tier: Tier },
    /// The max-wait elapsed before the profile caught up.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CapturingBaseline,
    Confirming,
    AwaitingRetry,
    Converging,
    Settling,
    Redirected,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_finished(&self) -> bool {
        matches!(self, Phase::Redirected | Phase::Failed | Phase::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    BaselineCaptured(Tier),
    BaselineFailed(VerificationError),
    SessionResolved(SessionStatus),
    SessionRequestFailed(VerificationError),
    RetryDue,
    TierPollDue,
    TierObserved(Tier),
    TierPollFailed(String),
    MaxWaitElapsed,
    SettleElapsed,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchBaseline,
    VerifySession,
    ScheduleRetry(Duration),
    StartTierPolling { period: Duration, max_wait: Duration },
    FetchProfile,
    ScheduleRedirect(Duration),
    ClearTimers,
    Redirect { target: String, reason: RedirectReason },
    Fail(VerificationFailure),
}

/// Tier captured before checkout and the latest tier the profile reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierSnapshot {
    pub initial_tier: Option<Tier>,
    pub current_tier: Option<Tier>,
}

#[derive(Debug)]
pub struct ReconciliationMachine {
    config: ReconcilerConfig,
    phase: Phase,
    state: ReconciliationState,
    tiers: TierSnapshot,
    session_attempts: u32,
    profile_in_flight: bool,
    failure: Option<VerificationFailure>,
}

impl ReconciliationMachine {
    pub fn new(config: ReconcilerConfig, initial_tier: Option<Tier>) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            state: ReconciliationState::Verifying,
            tiers: TierSnapshot {
                initial_tier,
                current_tier: None,
            },
            session_attempts: 0,
            profile_in_flight: false,
            failure: None,
        }
    }

    /// Validates the run inputs. Runs before any request is made.
    pub fn preflight(
        config: &ReconcilerConfig,
        session_id: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        match session_id {
            None => Err(ConfigurationError::MissingSessionId),
            Some(id) if id.trim().is_empty() => Err(ConfigurationError::MissingSessionId),
            Some(_) if !config.payments_enabled => Err(ConfigurationError::PaymentsDisabled),
            Some(_) => Ok(()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> ReconciliationState {
        self.state
    }

    pub fn tiers(&self) -> &TierSnapshot {
        &self.tiers
    }

    pub fn session_attempts(&self) -> u32 {
        self.session_attempts
    }

    pub fn failure(&self) -> Option<&VerificationFailure> {
        self.failure.as_ref()
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        if self.phase.is_finished() {
            return Vec::new();
        }

        match (self.phase, event) {
            (_, Event::Cancel) => {
                self.phase = Phase::Cancelled;
                vec![Effect::ClearTimers]
            }
            (Phase::Idle, Event::Start) => {
                if self.tiers.initial_tier.is_some() {
                    self.begin_confirming()
                } else {
                    self.phase = Phase::CapturingBaseline;
                    vec![Effect::FetchBaseline]
                }
            }
            (Phase::CapturingBaseline, Event::BaselineCaptured(tier)) => {
                if self.tiers.initial_tier.is_none() {
                    self.tiers.initial_tier = Some(tier);
                }
                self.begin_confirming()
            }
            (Phase::CapturingBaseline, Event::BaselineFailed(err))
            | (Phase::Confirming, Event::SessionRequestFailed(err)) => self.fail(err.into()),
            (Phase::Confirming, Event::SessionResolved(status)) => match status {
                SessionStatus::Paid => {
                    self.phase = Phase::Converging;
                    self.state = ReconciliationState::Success;
                    vec![
                        Effect::ClearTimers,
                        Effect::StartTierPolling {
                            period: self.config.tier_poll_interval,
                            max_wait: self.config.tier_max_wait,
                        },
                    ]
                }
                SessionStatus::Open => {
                    self.phase = Phase::AwaitingRetry;
                    vec![Effect::ScheduleRetry(self.config.session_poll_interval)]
                }
                SessionStatus::Other(status) => {
                    self.fail(VerificationError::UnpaidSession { status }.into())
                }
            },
            (Phase::AwaitingRetry, Event::RetryDue) => self.begin_confirming(),
            (Phase::Converging, Event::TierPollDue) => {
                if self.profile_in_flight {
                    Vec::new()
                } else {
                    self.profile_in_flight = true;
                    vec![Effect::FetchProfile]
                }
            }
            (Phase::Converging, Event::TierObserved(tier)) => {
                self.profile_in_flight = false;
                let converged = self.tiers.initial_tier.as_ref() != Some(&tier);
                self.tiers.current_tier = Some(tier);
                if converged {
                    self.phase = Phase::Settling;
                    vec![
                        Effect::ClearTimers,
                        Effect::ScheduleRedirect(self.config.settle_delay),
                    ]
                } else {
                    Vec::new()
                }
            }
            (Phase::Converging, Event::TierPollFailed(_)) => {
                self.profile_in_flight = false;
                Vec::new()
            }
            (Phase::Converging, Event::MaxWaitElapsed) => self.redirect(RedirectReason::TimedOut),
            (Phase::Settling, Event::SettleElapsed) => {
                let reason = match self.tiers.current_tier.clone() {
                    Some(tier) => RedirectReason::Converged { tier },
                    None => RedirectReason::TimedOut,
                };
                self.redirect(reason)
            }
            _ => Vec::new(),
        }
    }

    fn begin_confirming(&mut self) -> Vec<Effect> {
        self.phase = Phase::Confirming;
        self.session_attempts += 1;
        vec![Effect::VerifySession]
    }

    fn fail(&mut self, failure: VerificationFailure) -> Vec<Effect> {
        self.phase = Phase::Failed;
        self.state = ReconciliationState::Error;
        self.failure = Some(failure.clone());
        vec![Effect::ClearTimers, Effect::Fail(failure)]
    }

    fn redirect(&mut self, reason: RedirectReason) -> Vec<Effect> {
        self.phase = Phase::Redirected;
        vec![
            Effect::ClearTimers,
            Effect::Redirect {
                target: self.config.dashboard_route.clone(),
                reason,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(initial: Option<&str>) -> ReconciliationMachine {
        ReconciliationMachine::new(ReconcilerConfig::default(), initial.map(Tier::new))
    }

    fn paid(machine: &mut ReconciliationMachine) {
        machine.handle(Event::Start);
        machine.handle(Event::SessionResolved(SessionStatus::Paid));
    }

    #[test]
    fn preflight_rejects_missing_session_and_disabled_payments() {
        let config = ReconcilerConfig::default();
        assert_eq!(
            ReconciliationMachine::preflight(&config, None),
            Err(ConfigurationError::MissingSessionId)
        );
        assert_eq!(
            ReconciliationMachine::preflight(&config, Some("  ")),
            Err(ConfigurationError::MissingSessionId)
        );
        let disabled = ReconcilerConfig {
            payments_enabled: false,
            ..ReconcilerConfig::default()
        };
        assert_eq!(
            ReconciliationMachine::preflight(&disabled, Some("cs_1")),
            Err(ConfigurationError::PaymentsDisabled)
        );
        assert!(ReconciliationMachine::preflight(&config, Some("cs_1")).is_ok());
    }

    #[test]
    fn start_without_baseline_fetches_profile_first() {
        let mut m = machine(None);
        assert_eq!(m.handle(Event::Start), vec![Effect::FetchBaseline]);
        assert_eq!(m.phase(), Phase::CapturingBaseline);
        assert_eq!(
            m.handle(Event::BaselineCaptured(Tier::new("free"))),
            vec![Effect::VerifySession]
        );
        assert_eq!(m.tiers().initial_tier, Some(Tier::new("free")));
    }

    #[test]
    fn open_sessions_schedule_retries() {
        let mut m = machine(Some("free"));
        assert_eq!(m.handle(Event::Start), vec![Effect::VerifySession]);
        assert_eq!(
            m.handle(Event::SessionResolved(SessionStatus::Open)),
            vec![Effect::ScheduleRetry(Duration::from_millis(3000))]
        );
        assert_eq!(m.handle(Event::RetryDue), vec![Effect::VerifySession]);
        assert_eq!(m.session_attempts(), 2);
        assert_eq!(m.state(), ReconciliationState::Verifying);
    }

    #[test]
    fn unpaid_terminal_status_fails() {
        let mut m = machine(Some("free"));
        m.handle(Event::Start);
        let effects = m.handle(Event::SessionResolved(SessionStatus::Other(
            "expired".to_string(),
        )));
        let failure = VerificationFailure::Verification(VerificationError::UnpaidSession {
            status: "expired".to_string(),
        });
        assert_eq!(effects, vec![Effect::ClearTimers, Effect::Fail(failure)]);
        assert_eq!(m.state(), ReconciliationState::Error);
        assert!(m.handle(Event::RetryDue).is_empty());
        assert!(m.handle(Event::SessionResolved(SessionStatus::Paid)).is_empty());
        assert_eq!(m.state(), ReconciliationState::Error);
    }

    #[test]
    fn paid_enters_tier_polling() {
        let mut m = machine(Some("free"));
        m.handle(Event::Start);
        assert_eq!(
            m.handle(Event::SessionResolved(SessionStatus::Paid)),
            vec![
                Effect::ClearTimers,
                Effect::StartTierPolling {
                    period: Duration::from_millis(2000),
                    max_wait: Duration::from_millis(10_000),
                },
            ]
        );
        assert_eq!(m.state(), ReconciliationState::Success);
        assert!(m.handle(Event::RetryDue).is_empty());
    }

    #[test]
    fn overlapping_profile_polls_are_skipped() {
        let mut m = machine(Some("free"));
        paid(&mut m);
        assert_eq!(m.handle(Event::TierPollDue), vec![Effect::FetchProfile]);
        assert!(m.handle(Event::TierPollDue).is_empty());
        assert!(m.handle(Event::TierObserved(Tier::new("free"))).is_empty());
        assert_eq!(m.handle(Event::TierPollDue), vec![Effect::FetchProfile]);
        assert!(m.handle(Event::TierPollFailed("boom".to_string())).is_empty());
        assert_eq!(m.phase(), Phase::Converging);
    }

    #[test]
    fn changed_tier_settles_then_redirects() {
        let mut m = machine(Some("free"));
        paid(&mut m);
        m.handle(Event::TierPollDue);
        assert_eq!(
            m.handle(Event::TierObserved(Tier::new("tier1"))),
            vec![
                Effect::ClearTimers,
                Effect::ScheduleRedirect(Duration::from_millis(2000))
            ]
        );
        assert!(m.handle(Event::MaxWaitElapsed).is_empty());
        assert_eq!(
            m.handle(Event::SettleElapsed),
            vec![
                Effect::ClearTimers,
                Effect::Redirect {
                    target: "/dash".to_string(),
                    reason: RedirectReason::Converged {
                        tier: Tier::new("tier1")
                    },
                },
            ]
        );
        assert!(m.handle(Event::SettleElapsed).is_empty());
    }

    #[test]
    fn max_wait_redirects_without_convergence() {
        let mut m = machine(Some("free"));
        paid(&mut m);
        let effects = m.handle(Event::MaxWaitElapsed);
        assert_eq!(
            effects,
            vec![
                Effect::ClearTimers,
                Effect::Redirect {
                    target: "/dash".to_string(),
                    reason: RedirectReason::TimedOut,
                },
            ]
        );
        assert_eq!(m.state(), ReconciliationState::Success);
    }

    #[test]
    fn cancel_is_final() {
        let mut m = machine(Some("free"));
        paid(&mut m);
        assert_eq!(m.handle(Event::Cancel), vec![Effect::ClearTimers]);
        assert_eq!(m.phase(), Phase::Cancelled);
        assert!(m.handle(Event::TierObserved(Tier::new("tier2"))).is_empty());
        assert!(m.handle(Event::Cancel).is_empty());
    }
}
