use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::RegistrationBackend;

/// Candidates shorter than this (after trimming) are never probed.
pub const MIN_PROBE_LEN: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Unknown,
    Available,
    Taken,
}

/// Availability verdict for the current `(event, candidate)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeState {
    pub event_id: Option<String>,
    /// Trimmed team name the verdict belongs to.
    pub candidate: String,
    pub generation: u64,
    pub availability: Availability,
    /// A request for `candidate` is on the wire.
    pub checking: bool,
}

impl ProbeState {
    /// Store a probe result if nothing newer has been typed since.
    ///
    /// Returns whether the state changed.
    pub fn settle(&mut self, generation: u64, candidate: &str, availability: Availability) -> bool {
        if generation != self.generation || candidate != self.candidate {
            return false;
        }
        self.availability = availability;
        self.checking = false;
        true
    }
}

/// Debounced team-name uniqueness checks.
///
/// Each `update` aborts the scheduled probe and bumps the generation; the
/// spawned task sleeps for the debounce interval, marks the state as
/// checking and then asks the backend. Results are applied through
/// `ProbeState::settle`, so an answer for an older name is dropped even if
/// its task was not aborted in time.
pub struct TeamNameProber<B: RegistrationBackend> {
    backend: Arc<B>,
    debounce: Duration,
    state: Arc<watch::Sender<ProbeState>>,
    pending: Option<JoinHandle<()>>,
}

impl<B: RegistrationBackend> TeamNameProber<B> {
    pub fn new(backend: Arc<B>, debounce: Duration) -> Self {
        let (tx, _rx) = watch::channel(ProbeState::default());
        Self {
            backend,
            debounce,
            state: Arc::new(tx),
            pending: None,
        }
    }

    pub fn snapshot(&self) -> ProbeState {
        self.state.borrow().clone()
    }

    pub fn availability(&self) -> Availability {
        self.state.borrow().availability
    }

    pub fn is_checking(&self) -> bool {
        self.state.borrow().checking
    }

    /// Change notifications, for UIs that redraw on availability changes.
    pub fn subscribe(&self) -> watch::Receiver<ProbeState> {
        self.state.subscribe()
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn probe_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Feed the latest team name input.
    ///
    /// Re-entering the same name keeps its verdict. An `Unknown` verdict with
    /// nothing pending (the last check failed) is asked again.
    pub fn update(&mut self, event_id: &str, name: &str) {
        let candidate = name.trim();
        {
            let current = self.state.borrow();
            let same_question =
                current.candidate == candidate && current.event_id.as_deref() == Some(event_id);
            if same_question
                && (current.availability != Availability::Unknown || self.probe_pending())
            {
                return;
            }
        }

        self.cancel_pending();
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.event_id = Some(event_id.to_string());
            state.candidate = candidate.to_string();
            state.availability = Availability::Unknown;
            state.checking = false;
            generation = state.generation;
        });

        if candidate.chars().count() < MIN_PROBE_LEN {
            return;
        }

        debug!(event_id = %event_id, generation, "Scheduling team name probe");
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let debounce = self.debounce;
        let event_id = event_id.to_string();
        let candidate = candidate.to_string();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let still_current = state.send_if_modified(|s| {
                if s.generation == generation {
                    s.checking = true;
                    true
                } else {
                    false
                }
            });
            if !still_current {
                return;
            }

            let availability = match backend.check_team_name(&event_id, &candidate).await {
                Ok(true) => Availability::Available,
                Ok(false) => Availability::Taken,
                Err(e) => {
                    warn!(event_id = %event_id, error = %e, "Team name check failed");
                    Availability::Unknown
                }
            };

            let applied = state.send_if_modified(|s| s.settle(generation, &candidate, availability));
            if applied {
                debug!(event_id = %event_id, ?availability, "Team name probe settled");
            } else {
                debug!(event_id = %event_id, generation, "Dropping stale team name probe");
            }
        }));
    }

    /// Forget the candidate and any scheduled probe.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.state.send_modify(|state| {
            *state = ProbeState {
                generation: state.generation + 1,
                ..Default::default()
            };
        });
    }
}

impl<B: RegistrationBackend> Drop for TeamNameProber<B> {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::testing::{Call, ScriptedBackend};

    const DEBOUNCE: Duration = Duration::from_millis(400);

    fn prober(backend: &Arc<ScriptedBackend>) -> TeamNameProber<ScriptedBackend> {
        TeamNameProber::new(Arc::clone(backend), DEBOUNCE)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn test_settle_rejects_stale_generation_and_candidate() {
        let mut state = ProbeState {
            candidate: "Falcons".to_string(),
            generation: 3,
            checking: true,
            ..Default::default()
        };
        assert!(!state.settle(2, "Falcons", Availability::Taken));
        assert!(!state.settle(3, "Falcon", Availability::Taken));
        assert!(state.checking);
        assert!(state.settle(3, "Falcons", Availability::Taken));
        assert_eq!(state.availability, Availability::Taken);
        assert!(!state.checking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_typing_sends_one_probe() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut prober = prober(&backend);

        for prefix in ["F", "Fa", "Fal", "Falc", "Falco", "Falcon", "Falcons"] {
            prober.update("ev1", prefix);
            advance(100).await;
        }
        advance(500).await;

        assert_eq!(
            backend.name_checks(),
            vec![Call::CheckTeamName { event_id: "ev1".into(), team_name: "Falcons".into() }]
        );
        assert_eq!(prober.availability(), Availability::Available);
        assert!(!prober.is_checking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_names_reset_without_request() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut prober = prober(&backend);

        prober.update("ev1", "Falcons");
        advance(500).await;
        assert_eq!(prober.availability(), Availability::Available);

        prober.update("ev1", " F ");
        assert_eq!(prober.availability(), Availability::Unknown);
        advance(1000).await;
        assert_eq!(backend.name_checks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checking_while_request_in_flight() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.delay_name_check("Falcons", Duration::from_millis(300));
        let mut prober = prober(&backend);

        prober.update("ev1", "Falcons");
        assert!(!prober.is_checking());
        advance(450).await;
        assert!(prober.is_checking());
        advance(300).await;
        assert!(!prober.is_checking());
        assert_eq!(prober.availability(), Availability::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_never_overwrites_newer_name() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.set_taken(["Alpha"]);
        backend.delay_name_check("Alpha", Duration::from_millis(1000));
        let mut prober = prober(&backend);

        prober.update("ev1", "Alpha");
        advance(450).await;
        assert!(prober.is_checking());

        // "Alpha" is on the wire; "Bravo" settles first
        prober.update("ev1", "Bravo");
        advance(450).await;
        assert_eq!(prober.snapshot().candidate, "Bravo");
        assert_eq!(prober.availability(), Availability::Available);

        advance(2000).await;
        assert_eq!(prober.snapshot().candidate, "Bravo");
        assert_eq!(prober.availability(), Availability::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_fails_open() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.fail_name_checks();
        let mut prober = prober(&backend);

        prober.update("ev1", "Falcons");
        advance(500).await;
        assert_eq!(prober.availability(), Availability::Unknown);
        assert!(!prober.is_checking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_check_is_retried_for_same_name() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.fail_name_checks();
        backend.set_taken(["Falcons"]);
        let mut prober = prober(&backend);

        prober.update("ev1", "Falcons");
        advance(500).await;
        assert_eq!(prober.availability(), Availability::Unknown);

        backend.recover_name_checks();
        prober.update("ev1", " Falcons ");
        advance(500).await;
        assert_eq!(backend.name_checks().len(), 2);
        assert_eq!(prober.availability(), Availability::Taken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_name_while_pending_keeps_scheduled_probe() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut prober = prober(&backend);

        prober.update("ev1", "Falcons");
        advance(300).await;
        prober.update("ev1", "Falcons");
        advance(150).await;
        // The first schedule fires at 400 ms; a restart would push it to 700 ms
        assert_eq!(backend.name_checks().len(), 1);
        assert_eq!(prober.availability(), Availability::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_trimmed_name_does_not_reprobe() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut prober = prober(&backend);

        prober.update("ev1", "Falcons");
        advance(500).await;
        prober.update("ev1", "Falcons  ");
        advance(500).await;
        assert_eq!(backend.name_checks().len(), 1);

        // Same name for another event is a new question
        prober.update("ev2", "Falcons");
        advance(500).await;
        assert_eq!(backend.name_checks().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_scheduled_probe() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut prober = prober(&backend);
        let mut rx = prober.subscribe();

        prober.update("ev1", "Falcons");
        prober.reset();
        advance(1000).await;

        assert!(backend.name_checks().is_empty());
        assert_eq!(prober.snapshot().candidate, "");
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().availability, Availability::Unknown);
    }
}
