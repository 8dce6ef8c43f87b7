use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

use super::machine::Event;

/// Owned set of every timer and in-flight request started by one run.
///
/// Each entry is a spawned task that reports back through `events`.
/// [`TimerSet::clear`] aborts all of them at once; dropping the set does the same.
pub struct TimerSet {
    events: UnboundedSender<Event>,
    handles: Vec<JoinHandle<()>>,
}

impl TimerSet {
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events,
            handles: Vec::new(),
        }
    }

    /// Posts `event` once after `delay`.
    pub fn schedule(&mut self, delay: Duration, event: Event) {
        let events = self.events.clone();
        self.push(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events.send(event);
        }));
    }

    /// Posts `event` every `period`, first one period from now.
    pub fn every(&mut self, period: Duration, event: Event) {
        let events = self.events.clone();
        self.push(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(event.clone()).is_err() {
                    break;
                }
            }
        }));
    }

    /// Runs a request and posts whatever event it resolves to.
    pub fn track<F>(&mut self, request: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let events = self.events.clone();
        self.push(tokio::spawn(
            async move {
                let event = request.await;
                let _ = events.send(event);
            }
            .in_current_span(),
        ));
    }

    /// Aborts every outstanding timer and request.
    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.handles.iter().filter(|handle| !handle.is_finished()).count()
    }

    fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.retain(|existing| !existing.is_finished());
        self.handles.push(handle);
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_timers() {
        let (tx, mut rx) = unbounded_channel();
        let mut timers = TimerSet::new(tx);
        timers.schedule(Duration::from_millis(500), Event::RetryDue);
        timers.every(Duration::from_millis(100), Event::TierPollDue);

        time::sleep(Duration::from_millis(250)).await;
        timers.clear();
        time::sleep(Duration::from_secs(5)).await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received, vec![Event::TierPollDue, Event::TierPollDue]);
        assert_eq!(timers.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_set_aborts_tracked_requests() {
        let (tx, mut rx) = unbounded_channel();
        {
            let mut timers = TimerSet::new(tx);
            timers.track(async {
                time::sleep(Duration::from_secs(1)).await;
                Event::SettleElapsed
            });
        }
        time::sleep(Duration::from_secs(2)).await;
        assert!(rx.recv().await.is_none());
    }
}
