//! Payment reconciliation after a checkout redirect.
//!
//! Phase 1 polls the checkout session until it is `paid` (or fails). Phase 2
//! polls the user profile until its tier moves off the pre-checkout baseline or
//! the max-wait elapses, then redirects to the dashboard.

pub mod machine;
pub mod timers;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::checkout::models::Tier;
use crate::checkout::services::{CheckoutSessionService, Navigator, UserProfileService};
use crate::config::ReconcilerConfig;
use crate::error::{VerificationError, VerificationFailure};

pub use machine::{
    Effect, Event, Phase, ReconciliationMachine, ReconciliationState, RedirectReason,
    TierSnapshot,
};
pub use timers::TimerSet;

const CHECKOUT_SERVICE: &str = "checkout session";
const PROFILE_SERVICE: &str = "user profile";

/// Inputs for one run, captured when the redirect lands.
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    pub session_id: Option<String>,
    pub initial_tier: Option<Tier>,
}

impl VerificationRequest {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            initial_tier: None,
        }
    }

    pub fn with_initial_tier(mut self, tier: Tier) -> Self {
        self.initial_tier = Some(tier);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Redirected {
        target: String,
        reason: RedirectReason,
    },
    Failed(VerificationFailure),
    Cancelled,
}

/// key: payment-reconciler -> drives the two-phase machine against live services
#[derive(Clone)]
pub struct PaymentReconciler {
    sessions: Arc<dyn CheckoutSessionService>,
    profiles: Arc<dyn UserProfileService>,
    navigator: Arc<dyn Navigator>,
    config: ReconcilerConfig,
}

impl PaymentReconciler {
    pub fn new(
        sessions: Arc<dyn CheckoutSessionService>,
        profiles: Arc<dyn UserProfileService>,
        navigator: Arc<dyn Navigator>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            sessions,
            profiles,
            navigator,
            config,
        }
    }

    /// Starts a run on the current tokio runtime.
    ///
    /// Configuration problems are detected before anything is spawned against
    /// the services: the returned handle already reports
    /// [`ReconciliationState::Error`].
    pub fn start(&self, request: VerificationRequest) -> ReconciliationHandle {
        let run_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let session_id = match ReconciliationMachine::preflight(
            &self.config,
            request.session_id.as_deref(),
        ) {
            Ok(()) => request.session_id.unwrap_or_default(),
            Err(err) => {
                error!(%run_id, %err, "payment verification rejected before polling");
                let (state_tx, state_rx) = watch::channel(ReconciliationState::Error);
                drop(state_tx);
                let failure = VerificationFailure::from(err);
                return ReconciliationHandle {
                    run_id,
                    state: state_rx,
                    cancel: Some(cancel_tx),
                    task: tokio::spawn(async move { ReconciliationOutcome::Failed(failure) }),
                    outcome: None,
                };
            }
        };

        let (state_tx, state_rx) = watch::channel(ReconciliationState::Verifying);
        let driver = Driver {
            sessions: self.sessions.clone(),
            profiles: self.profiles.clone(),
            navigator: self.navigator.clone(),
            machine: ReconciliationMachine::new(self.config.clone(), request.initial_tier),
            session_id,
            state: state_tx,
        };
        let span = info_span!("payment_reconciliation", %run_id);
        let task = tokio::spawn(driver.run(cancel_rx).instrument(span));

        ReconciliationHandle {
            run_id,
            state: state_rx,
            cancel: Some(cancel_tx),
            task,
            outcome: None,
        }
    }
}

/// Caller side of a running reconciliation. Dropping it cancels the run.
pub struct ReconciliationHandle {
    run_id: Uuid,
    state: watch::Receiver<ReconciliationState>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<ReconciliationOutcome>,
    outcome: Option<ReconciliationOutcome>,
}

impl ReconciliationHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> ReconciliationState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change of this run.
    pub fn subscribe(&self) -> watch::Receiver<ReconciliationState> {
        self.state.clone()
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the run to finish without giving up the handle.
    ///
    /// Cancel-safe: dropping the returned future leaves the run untouched.
    pub async fn join(&mut self) -> ReconciliationOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(run_id = %self.run_id, ?err, "reconciliation task ended abnormally");
                ReconciliationOutcome::Cancelled
            }
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Waits for the run to finish. The run stays alive for as long as this waits.
    pub async fn wait(mut self) -> ReconciliationOutcome {
        self.join().await
    }
}

struct Driver {
    sessions: Arc<dyn CheckoutSessionService>,
    profiles: Arc<dyn UserProfileService>,
    navigator: Arc<dyn Navigator>,
    machine: ReconciliationMachine,
    session_id: String,
    state: watch::Sender<ReconciliationState>,
}

impl Driver {
    async fn run(mut self, mut cancel: oneshot::Receiver<()>) -> ReconciliationOutcome {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new(events_tx);
        let mut pending = vec![Event::Start];

        info!(session_id = %self.session_id, "verifying checkout session");
        loop {
            for event in pending.drain(..) {
                let effects = self.machine.handle(event);
                for effect in effects {
                    if let Some(outcome) = self.apply(effect, &mut timers) {
                        return outcome;
                    }
                }
            }
            self.state.send_if_modified(|current| {
                let next = self.machine.state();
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });

            let event = tokio::select! {
                biased;
                _ = &mut cancel => Event::Cancel,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => Event::Cancel,
                },
            };
            if event == Event::Cancel {
                info!(phase = ?self.machine.phase(), "payment verification cancelled");
                self.machine.handle(Event::Cancel);
                timers.clear();
                return ReconciliationOutcome::Cancelled;
            }
            pending.push(event);
        }
    }

    fn apply(&self, effect: Effect, timers: &mut TimerSet) -> Option<ReconciliationOutcome> {
        match effect {
            Effect::FetchBaseline => {
                let profiles = self.profiles.clone();
                timers.track(async move {
                    match profiles.current_profile().await {
                        Ok(profile) => Event::BaselineCaptured(profile.tier().clone()),
                        Err(err) => {
                            Event::BaselineFailed(VerificationError::request(PROFILE_SERVICE, &err))
                        }
                    }
                });
            }
            Effect::VerifySession => {
                let sessions = self.sessions.clone();
                let session_id = self.session_id.clone();
                let attempt = self.machine.session_attempts();
                timers.track(async move {
                    match sessions.verify_session(&session_id).await {
                        Ok(session) => {
                            info!(
                                %session_id,
                                attempt,
                                status = %session.status,
                                "checkout session polled"
                            );
                            Event::SessionResolved(session.status)
                        }
                        Err(err) => Event::SessionRequestFailed(VerificationError::request(
                            CHECKOUT_SERVICE,
                            &err,
                        )),
                    }
                });
            }
            Effect::ScheduleRetry(delay) => timers.schedule(delay, Event::RetryDue),
            Effect::StartTierPolling { period, max_wait } => {
                info!(
                    initial_tier = ?self.machine.tiers().initial_tier,
                    "payment confirmed; waiting for profile tier to update"
                );
                timers.every(period, Event::TierPollDue);
                timers.schedule(max_wait, Event::MaxWaitElapsed);
            }
            Effect::FetchProfile => {
                let profiles = self.profiles.clone();
                timers.track(async move {
                    match profiles.current_profile().await {
                        Ok(profile) => Event::TierObserved(profile.tier().clone()),
                        Err(err) => {
                            warn!(?err, "profile refresh failed while waiting for tier update");
                            Event::TierPollFailed(err.to_string())
                        }
                    }
                });
            }
            Effect::ScheduleRedirect(delay) => {
                info!(tier = ?self.machine.tiers().current_tier, "profile tier updated");
                timers.schedule(delay, Event::SettleElapsed);
            }
            Effect::ClearTimers => timers.clear(),
            Effect::Redirect { target, reason } => {
                match &reason {
                    RedirectReason::Converged { tier } => {
                        info!(%target, %tier, "redirecting after tier update")
                    }
                    RedirectReason::TimedOut => warn!(
                        %target,
                        initial_tier = ?self.machine.tiers().initial_tier,
                        "profile tier did not change before max wait; redirecting anyway"
                    ),
                }
                let _ = self.state.send_replace(self.machine.state());
                self.navigator.redirect(&target);
                return Some(ReconciliationOutcome::Redirected { target, reason });
            }
            Effect::Fail(failure) => {
                error!(session_id = %self.session_id, %failure, "payment verification failed");
                let _ = self.state.send_replace(self.machine.state());
                return Some(ReconciliationOutcome::Failed(failure));
            }
        }
        None
    }
}
