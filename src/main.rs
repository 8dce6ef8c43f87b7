use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use payment_verify::checkout::{session_id_from_redirect, BackendClient, Navigator, TierPlan};
use payment_verify::config::{self, BackendConfig, ReconcilerConfig};
use payment_verify::{
    PaymentReconciler, ReconciliationOutcome, ReconciliationState, RedirectReason,
    VerificationRequest,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Reports the redirect on stdout for whatever shell or browser wrapper launched us.
struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn redirect(&self, target: &str) {
        println!("redirect: {target}");
    }
}

fn print_state(state: ReconciliationState) {
    println!("{}: {}", state.headline(), state.description());
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    let redirect = std::env::args()
        .nth(1)
        .context("usage: payment-verify <redirect-url>")?;
    let session_id = session_id_from_redirect(&redirect);

    let client = Arc::new(
        BackendClient::new(&BackendConfig::from_env())
            .context("failed to build backend client")?,
    );
    let reconciler = PaymentReconciler::new(
        client.clone(),
        client,
        Arc::new(StdoutNavigator),
        ReconcilerConfig::from_env(),
    );

    let mut handle = reconciler.start(VerificationRequest::new(session_id));
    let mut states = handle.subscribe();
    print_state(*states.borrow_and_update());

    let printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            print_state(*states.borrow_and_update());
        }
    });

    let finished = tokio::select! {
        outcome = handle.join() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            handle.cancel();
            handle.wait().await
        }
    };
    let _ = printer.await;

    let code = match outcome {
        ReconciliationOutcome::Redirected { reason, .. } => {
            if let RedirectReason::Converged { tier } = reason {
                if let Some(plan) = TierPlan::find(&config::ACTIVE_TIERS, &tier) {
                    println!(
                        "Now on {} ({}): {}",
                        plan.name, plan.display_price, plan.description
                    );
                }
            }
            ExitCode::SUCCESS
        }
        ReconciliationOutcome::Failed(failure) => {
            eprintln!("{failure}");
            ExitCode::from(1)
        }
        ReconciliationOutcome::Cancelled => ExitCode::from(130),
    };
    Ok(code)
}
