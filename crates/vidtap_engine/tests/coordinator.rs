use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use vidtap_core::{
    DetachReason, DetachStatus, InterceptedRequest, JobPhase, TabId, TabSnapshot, Targets,
    REATTACH_DELAY,
};
use vidtap_engine::{BrowserHost, Coordinator, CoordinatorConfig, HostError, HostEvent};

const TARGET: &str = "https://grok.com/imagine";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Attach(TabId),
    Detach(TabId),
    EnableNetwork(TabId),
    ResponseBody(TabId, String),
    SendMessage(TabId, Value),
}

#[derive(Default)]
struct FakeHost {
    calls: Mutex<Vec<Call>>,
    tabs: Mutex<HashMap<TabId, TabSnapshot>>,
    bodies: Mutex<HashMap<String, String>>,
    attach_error: Mutex<Option<HostError>>,
    message_error: Mutex<Option<HostError>>,
    detach_delay: Mutex<Option<Duration>>,
    slow_action: Mutex<Option<&'static str>>,
}

impl FakeHost {
    fn set_tab(&self, tab_id: TabId, active: bool, url: &str) {
        self.tabs.lock().unwrap().insert(
            tab_id,
            TabSnapshot {
                active,
                url: Some(url.to_string()),
            },
        );
    }

    fn set_body(&self, request_id: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(request_id.to_string(), body.to_string());
    }

    fn take(&self) -> Vec<Call> {
        self.calls.lock().unwrap().drain(..).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BrowserHost for FakeHost {
    async fn attach(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(Call::Attach(tab_id));
        match self.attach_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn detach(&self, tab_id: TabId) -> Result<(), HostError> {
        let delay = *self.detach_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Call::Detach(tab_id));
        Ok(())
    }

    async fn enable_network(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(Call::EnableNetwork(tab_id));
        Ok(())
    }

    async fn response_body(&self, tab_id: TabId, request_id: &str) -> Result<String, HostError> {
        self.record(Call::ResponseBody(tab_id, request_id.to_string()));
        self.bodies
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .ok_or_else(|| HostError::Failed("No resource with given identifier found".into()))
    }

    async fn send_message(&self, tab_id: TabId, message: &Value) -> Result<(), HostError> {
        let slow = *self.slow_action.lock().unwrap();
        if slow.is_some_and(|action| message["action"] == action) {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        self.record(Call::SendMessage(tab_id, message.clone()));
        match self.message_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn tab(&self, tab_id: TabId) -> Result<Option<TabSnapshot>, HostError> {
        Ok(self.tabs.lock().unwrap().get(&tab_id).cloned())
    }
}

fn coordinator(host: &Arc<FakeHost>) -> Coordinator<FakeHost> {
    vidtap_logging::initialize_for_tests();
    Coordinator::new(
        host.clone(),
        CoordinatorConfig {
            targets: Targets::default(),
            clock: Arc::new(|| "09:15:30".to_string()),
        },
    )
}

fn navigated(tab_id: TabId, url: &str) -> HostEvent {
    HostEvent::NavigationCompleted {
        tab_id,
        url: url.to_string(),
    }
}

fn generation_request(tab_id: TabId) -> HostEvent {
    let mut headers = BTreeMap::new();
    headers.insert("referer".to_string(), format!("{TARGET}/post/abc"));
    HostEvent::RequestSent {
        tab_id,
        request: InterceptedRequest {
            request_id: "1000.42".to_string(),
            method: "POST".to_string(),
            url: "https://grok.com/rest/app-chat/conversations/new".to_string(),
            headers,
            post_data: Some(json!({ "message": "a cat", "toolOverrides": { "videoGen": true } })),
        },
    }
}

fn response_completed(tab_id: TabId) -> HostEvent {
    HostEvent::ResponseCompleted {
        tab_id,
        request_id: "1000.42".to_string(),
        encoded_data_length: 812.0,
    }
}

async fn attached(host: &Arc<FakeHost>, tab_id: TabId) -> Coordinator<FakeHost> {
    host.set_tab(tab_id, true, TARGET);
    let mut coordinator = coordinator(host);
    coordinator.ingest(navigated(tab_id, TARGET));
    coordinator.settle().await;
    host.take();
    coordinator
}

#[tokio::test(start_paused = true)]
async fn target_page_is_instrumented() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = coordinator(&host);

    coordinator.ingest(navigated(3, TARGET));
    coordinator.settle().await;

    assert_eq!(host.take(), vec![Call::Attach(3), Call::EnableNetwork(3)]);
    assert!(coordinator.state().is_attached(3));
}

#[tokio::test(start_paused = true)]
async fn submission_and_ready_video_reach_the_consumer() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = attached(&host, 3).await;

    coordinator.ingest(generation_request(3));
    coordinator.settle().await;
    assert_eq!(
        host.take(),
        vec![Call::SendMessage(
            3,
            json!({
                "action": "videoProcessing",
                "status": "processing",
                "referer": "https://grok.com/imagine/post/abc"
            })
        )]
    );
    assert_eq!(coordinator.state().job_phase(3), JobPhase::Processing);

    host.set_body(
        "1000.42",
        concat!(
            r#"{"result":{"response":{"streamingVideoGenerationResponse":{"progress":1,"videoPrompt":"a cat"}}}}"#,
            "\n",
            r#"{"result":{"response":{"streamingVideoGenerationResponse":{"progress":100,"videoId":"v1","videoUrl":"v/1.mp4","videoPrompt":"a cat surfing"}}}}"#,
        ),
    );
    coordinator.ingest(response_completed(3));
    coordinator.settle().await;

    let calls = host.take();
    assert_eq!(calls[0], Call::ResponseBody(3, "1000.42".to_string()));
    let Call::SendMessage(3, message) = &calls[1] else {
        panic!("expected a consumer message, got {:?}", calls);
    };
    assert_eq!(message["action"], "videoDetected");
    assert_eq!(message["videoInfo"]["videoUrl"], "v/1.mp4");
    assert_eq!(message["videoInfo"]["generated_prompt"], "a cat surfing");
    assert_eq!(message["videoInfo"]["originalPrompt"], "a cat");
    assert_eq!(coordinator.state().job_phase(3), JobPhase::Completed);
}

#[tokio::test(start_paused = true)]
async fn upstream_error_is_stamped_with_the_clock() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = attached(&host, 3).await;
    coordinator.ingest(generation_request(3));
    coordinator.settle().await;
    host.take();

    host.set_body("1000.42", r#"{"error":{"code":8,"message":"quota"}}"#);
    coordinator.ingest(response_completed(3));
    coordinator.settle().await;

    let sent: Vec<Value> = host
        .take()
        .into_iter()
        .filter_map(|call| match call {
            Call::SendMessage(_, message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(
        sent,
        vec![json!({
            "action": "videoProcessing",
            "status": "failed",
            "error": { "code": 8, "message": "quota" },
            "ts": "09:15:30"
        })]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_consumer_does_not_stall_the_job() {
    let host = Arc::new(FakeHost::default());
    *host.message_error.lock().unwrap() = Some(HostError::NoReceiver);
    let mut coordinator = attached(&host, 3).await;

    coordinator.ingest(generation_request(3));
    coordinator.settle().await;

    assert_eq!(host.take().len(), 1);
    assert_eq!(coordinator.state().job_phase(3), JobPhase::Processing);
    assert_eq!(coordinator.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn foreign_debugger_counts_as_attached_without_enabling_network() {
    let host = Arc::new(FakeHost::default());
    *host.attach_error.lock().unwrap() = Some(HostError::AlreadyAttached);
    let mut coordinator = coordinator(&host);

    coordinator.ingest(navigated(3, TARGET));
    coordinator.settle().await;

    assert_eq!(host.take(), vec![Call::Attach(3)]);
    assert!(coordinator.state().is_attached(3));
}

#[tokio::test(start_paused = true)]
async fn user_cancel_reattaches_after_delay() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = attached(&host, 3).await;

    coordinator.ingest(HostEvent::ChannelDetached {
        tab_id: 3,
        reason: DetachReason::UserCancelled,
    });
    assert!(!coordinator.state().is_attached(3));

    let start = Instant::now();
    coordinator.settle().await;

    assert!(start.elapsed() >= REATTACH_DELAY);
    assert_eq!(host.take(), vec![Call::Attach(3), Call::EnableNetwork(3)]);
    assert!(coordinator.state().is_attached(3));
}

#[tokio::test(start_paused = true)]
async fn reattach_is_skipped_for_background_tab() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = attached(&host, 3).await;
    host.set_tab(3, false, TARGET);

    coordinator.ingest(HostEvent::ChannelDetached {
        tab_id: 3,
        reason: DetachReason::UserCancelled,
    });
    coordinator.settle().await;

    assert_eq!(host.take(), vec![]);
    assert!(!coordinator.state().is_attached(3));
}

#[tokio::test(start_paused = true)]
async fn activation_releases_other_tabs() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = attached(&host, 1).await;
    host.set_tab(2, true, TARGET);
    coordinator.ingest(navigated(2, TARGET));
    coordinator.settle().await;
    host.take();

    host.set_tab(1, false, TARGET);
    coordinator.ingest(HostEvent::TabActivated { tab_id: 2 });
    coordinator.settle().await;

    assert_eq!(host.take(), vec![Call::Detach(1)]);
    assert_eq!(coordinator.state().tracked_tabs(), vec![2]);

    host.set_tab(2, false, TARGET);
    host.set_tab(4, true, "https://example.com/");
    coordinator.ingest(HostEvent::TabActivated { tab_id: 4 });
    coordinator.settle().await;

    assert_eq!(host.take(), vec![Call::Detach(2)]);
    assert!(coordinator.state().tracked_tabs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn busy_tab_refuses_explicit_detach() {
    let host = Arc::new(FakeHost::default());
    let mut coordinator = attached(&host, 3).await;
    coordinator.ingest(generation_request(3));
    coordinator.settle().await;
    host.take();

    assert_eq!(coordinator.detach_all(), vec![(3, DetachStatus::Deferred)]);
    coordinator.settle().await;
    assert_eq!(host.take(), vec![]);

    coordinator.ingest(HostEvent::TabRemoved { tab_id: 3 });
    coordinator.settle().await;
    assert_eq!(host.take(), vec![Call::Detach(3)]);
    assert_eq!(coordinator.state().job_phase(3), JobPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn run_serves_events_until_the_stream_closes() {
    let host = Arc::new(FakeHost::default());
    host.set_tab(3, true, TARGET);
    let coordinator = coordinator(&host);
    let (tx, rx) = mpsc::unbounded_channel();

    tx.send(navigated(3, TARGET)).unwrap();
    tx.send(HostEvent::TabRemoved { tab_id: 9 }).unwrap();
    drop(tx);
    let state = coordinator.run(rx).await;

    assert!(state.is_attached(3));
    assert_eq!(host.take(), vec![Call::Attach(3), Call::EnableNetwork(3)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_tab_calls_reach_the_host_in_emit_order() {
    let host = Arc::new(FakeHost::default());
    *host.detach_delay.lock().unwrap() = Some(Duration::from_millis(30));
    let mut coordinator = attached(&host, 5).await;

    coordinator.ingest(navigated(5, "https://example.com/"));
    coordinator.ingest(navigated(5, TARGET));
    coordinator.settle().await;

    assert_eq!(
        host.take(),
        vec![Call::Detach(5), Call::Attach(5), Call::EnableNetwork(5)]
    );
    assert!(coordinator.state().is_attached(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processing_is_delivered_before_ready() {
    let host = Arc::new(FakeHost::default());
    *host.slow_action.lock().unwrap() = Some("videoProcessing");
    let mut coordinator = attached(&host, 3).await;
    host.set_body(
        "1000.42",
        r#"{"result":{"response":{"streamingVideoGenerationResponse":{"progress":100,"videoUrl":"v/1.mp4"}}}}"#,
    );

    coordinator.ingest(generation_request(3));
    coordinator.ingest(response_completed(3));
    coordinator.settle().await;

    let actions: Vec<Value> = host
        .take()
        .into_iter()
        .filter_map(|call| match call {
            Call::SendMessage(_, message) => Some(message["action"].clone()),
            _ => None,
        })
        .collect();
    assert_eq!(actions, vec![json!("videoProcessing"), json!("videoDetected")]);
    assert_eq!(coordinator.state().job_phase(3), JobPhase::Completed);
    assert_eq!(coordinator.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tabs_do_not_wait_on_each_other() {
    let host = Arc::new(FakeHost::default());
    *host.detach_delay.lock().unwrap() = Some(Duration::from_millis(50));
    let mut coordinator = attached(&host, 1).await;
    host.set_tab(2, true, TARGET);

    coordinator.ingest(navigated(1, "https://example.com/"));
    coordinator.ingest(navigated(2, TARGET));
    coordinator.settle().await;

    let calls = host.take();
    let position = |call: &Call| calls.iter().position(|c| c == call);
    assert!(position(&Call::Attach(2)) < position(&Call::Detach(1)));
    assert!(position(&Call::Attach(2)).is_some());
    assert!(coordinator.state().is_attached(2));
    assert!(!coordinator.state().is_attached(1));
}
