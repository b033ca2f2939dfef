use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use vidtap_core::{
    request_attach, request_detach, update, AppState, AppViewModel, AttachResult, AttachStatus,
    DetachStatus, Effect, Msg, TabId, Targets,
};
use vidtap_logging::{tab_debug, tab_error, tab_warn, tap_info};

use crate::dispatch::deliver;
use crate::{BrowserHost, HostError, HostEvent};

/// Produces the wall-clock stamp attached to `failed` outcomes.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct CoordinatorConfig {
    pub targets: Targets,
    pub clock: Clock,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            targets: Targets::default(),
            clock: Arc::new(|| chrono::Local::now().format("%H:%M:%S").to_string()),
        }
    }
}

/// Owns the tab/job state and runs its effects against a [`BrowserHost`].
///
/// Host calls for one tab go through that tab's lane: a single worker that
/// runs them one at a time in the order they were emitted. Timers and tab
/// lookups run on their own. Every outcome comes back as a `Msg` applied on
/// the coordinator's own loop, so state is never read across an await.
pub struct Coordinator<H: BrowserHost + 'static> {
    host: Arc<H>,
    state: AppState,
    clock: Clock,
    lanes: HashMap<TabId, mpsc::UnboundedSender<Effect>>,
    results_tx: mpsc::UnboundedSender<Option<Msg>>,
    results: mpsc::UnboundedReceiver<Option<Msg>>,
    in_flight: usize,
}

impl<H: BrowserHost + 'static> Coordinator<H> {
    pub fn new(host: Arc<H>, config: CoordinatorConfig) -> Self {
        let (results_tx, results) = mpsc::unbounded_channel();
        Self {
            host,
            state: AppState::new(config.targets),
            clock: config.clock,
            lanes: HashMap::new(),
            results_tx,
            results,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn view(&self) -> AppViewModel {
        self.state.view()
    }

    /// Number of host calls and timers still outstanding.
    pub fn pending(&self) -> usize {
        self.in_flight
    }

    /// Feeds one host notification into the state machine.
    pub fn ingest(&mut self, event: HostEvent) {
        let tab_id = event.tab_id();
        match event {
            HostEvent::TabActivated { .. } => {
                let host = self.host.clone();
                self.spawn(async move {
                    let url = match host.tab(tab_id).await {
                        Ok(snapshot) => snapshot.and_then(|tab| tab.url),
                        Err(err) => {
                            tab_warn!(tab_id, "failed to get tab info: {}", err);
                            None
                        }
                    };
                    Some(Msg::TabActivated { tab_id, url })
                });
            }
            HostEvent::TabRemoved { .. } => {
                self.dispatch(Msg::TabRemoved { tab_id });
                // The worker drains what is already queued, then exits.
                self.lanes.remove(&tab_id);
            }
            other => {
                if let Some(msg) = other.into_msg() {
                    self.dispatch(msg);
                }
            }
        }
    }

    /// Explicit attach request from a collaborator.
    pub fn attach(&mut self, tab_id: TabId) -> AttachStatus {
        let (status, effects) = request_attach(&mut self.state, tab_id);
        self.execute_all(effects);
        status
    }

    /// Explicit busy-guarded detach request from a collaborator.
    pub fn detach(&mut self, tab_id: TabId) -> DetachStatus {
        let (status, effects) = request_detach(&mut self.state, tab_id);
        self.execute_all(effects);
        status
    }

    /// Guarded detach of every tracked tab; busy tabs are skipped.
    pub fn detach_all(&mut self) -> Vec<(TabId, DetachStatus)> {
        self.state
            .tracked_tabs()
            .into_iter()
            .map(|tab_id| (tab_id, self.detach(tab_id)))
            .collect()
    }

    /// Drives outstanding host calls and timers until none remain.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            let Some(result) = self.results.recv().await else {
                break;
            };
            self.absorb(result);
        }
    }

    /// Serves host events until the sender side closes, then settles.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HostEvent>) -> AppState {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.ingest(event),
                    None => break,
                },
                Some(result) = self.results.recv() => self.absorb(result),
            }
        }
        tap_info!("host event stream closed; settling {} tasks", self.in_flight);
        self.settle().await;
        self.state
    }

    fn absorb(&mut self, result: Option<Msg>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Some(msg) = result {
            self.dispatch(msg);
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.execute_all(effects);
    }

    fn execute_all(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Schedule {
                tab_id,
                timer,
                delay,
            } => {
                let host = self.host.clone();
                self.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let tab = match host.tab(tab_id).await {
                        Ok(tab) => tab,
                        Err(err) => {
                            tab_debug!(tab_id, "tab lookup after {:?} failed: {}", timer, err);
                            None
                        }
                    };
                    Some(Msg::TimerFired { tab_id, timer, tab })
                });
            }
            host_call => self.enqueue(host_call),
        }
    }

    /// Runs a standalone task whose result re-enters the loop.
    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Option<Msg>> + Send + 'static,
    {
        self.in_flight += 1;
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let _ = results.send(task.await);
        });
    }

    /// Queues a host call behind the calls already emitted for the same tab.
    fn enqueue(&mut self, effect: Effect) {
        let tab_id = effect.tab_id();
        let host = &self.host;
        let clock = &self.clock;
        let results = &self.results_tx;
        let lane = self
            .lanes
            .entry(tab_id)
            .or_insert_with(|| spawn_lane(host.clone(), clock.clone(), results.clone()));
        match lane.send(effect) {
            Ok(()) => self.in_flight += 1,
            Err(err) => {
                tab_error!(tab_id, "host call lane closed, dropping {:?}", err.0);
                self.lanes.remove(&tab_id);
            }
        }
    }
}

fn spawn_lane<H: BrowserHost + 'static>(
    host: Arc<H>,
    clock: Clock,
    results: mpsc::UnboundedSender<Option<Msg>>,
) -> mpsc::UnboundedSender<Effect> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(effect) = rx.recv().await {
            let result = run_host_call(host.as_ref(), &clock, effect).await;
            if results.send(result).is_err() {
                break;
            }
        }
    });
    tx
}

async fn run_host_call<H: BrowserHost + ?Sized>(
    host: &H,
    clock: &Clock,
    effect: Effect,
) -> Option<Msg> {
    match effect {
        Effect::Attach { tab_id } => {
            let result = match host.attach(tab_id).await {
                Ok(()) => AttachResult::Attached,
                Err(HostError::AlreadyAttached) => AttachResult::AlreadyHeld,
                Err(err) => AttachResult::Failed(err.to_string()),
            };
            Some(Msg::AttachFinished { tab_id, result })
        }
        Effect::EnableNetwork { tab_id } => {
            if let Err(err) = host.enable_network(tab_id).await {
                tab_warn!(tab_id, "network enable failed: {}", err);
            }
            None
        }
        Effect::Detach { tab_id } => {
            let error = host.detach(tab_id).await.err().map(|err| err.to_string());
            Some(Msg::DetachFinished { tab_id, error })
        }
        Effect::FetchResponseBody { tab_id, request_id } => {
            let body = match host.response_body(tab_id, &request_id).await {
                Ok(body) => Some(body),
                Err(err) => {
                    tab_debug!(tab_id, "no body for {}: {}", request_id, err);
                    None
                }
            };
            Some(Msg::ResponseBodyLoaded {
                tab_id,
                request_id,
                body,
                received_at: clock(),
            })
        }
        Effect::Notify { tab_id, outcome } => {
            deliver(host, tab_id, &outcome.to_message()).await;
            None
        }
        // Timers never enter a lane.
        Effect::Schedule { .. } => None,
    }
}
