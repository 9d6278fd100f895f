use super::*;
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::message::Message;
use crate::provider::{ChunkStream, SamplingParams};

/// Behavior of one scripted model.
#[derive(Clone)]
enum Script {
    Fail(u16),
    Malformed(&'static str),
    Chunks(Vec<&'static str>),
    ChunksThenFail(Vec<&'static str>, u16),
    ChunksThenHang(Vec<&'static str>),
    Empty,
}

struct ScriptedBackend {
    name: &'static str,
    fallbacks: Vec<String>,
    scripts: HashMap<String, Script>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    fn new(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            fallbacks: Vec::new(),
            scripts: HashMap::new(),
            calls: calls.clone(),
        }
    }

    fn fallbacks(mut self, models: &[&str]) -> Self {
        self.fallbacks = models.iter().map(|m| m.to_string()).collect();
        self
    }

    fn script(mut self, model: &str, script: Script) -> Self {
        self.scripts.insert(model.to_string(), script);
        self
    }

    fn err(&self, model: &str, kind: CallErrorKind) -> ProviderCallError {
        ProviderCallError::new(self.name, model, kind)
    }
}

fn status(code: u16) -> CallErrorKind {
    CallErrorKind::Status {
        status: code,
        body: format!("status {code}"),
        retry_after: None,
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn fallback_models(&self) -> &[String] {
        &self.fallbacks
    }

    async fn stream_completion(
        &self,
        _messages: &[Message],
        model: &str,
        _sampling: &SamplingParams,
        _cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderCallError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}/{}", self.name, model));

        let script = self.scripts.get(model).cloned().unwrap_or(Script::Fail(404));
        let ok = |chunks: Vec<&'static str>| {
            chunks
                .into_iter()
                .map(|c| Ok::<_, ProviderCallError>(c.to_string()))
                .collect::<Vec<_>>()
        };
        match script {
            Script::Fail(code) => Err(self.err(model, status(code))),
            Script::Malformed(msg) => Err(self.err(model, CallErrorKind::Malformed(msg.into()))),
            Script::Chunks(chunks) => Ok(stream::iter(ok(chunks)).boxed()),
            Script::ChunksThenFail(chunks, code) => {
                let mut items = ok(chunks);
                items.push(Err(self.err(model, status(code))));
                Ok(stream::iter(items).boxed())
            }
            Script::ChunksThenHang(chunks) => {
                Ok(stream::iter(ok(chunks)).chain(stream::pending()).boxed())
            }
            Script::Empty => Ok(stream::empty().boxed()),
        }
    }
}

/// Sets its flag when dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Stalls forever, either before returning a stream or after one chunk,
/// while holding a [`ReleaseGuard`].
struct StallingBackend {
    on_open: bool,
    entered: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl StallingBackend {
    fn new(on_open: bool) -> Self {
        Self {
            on_open,
            entered: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl ChatBackend for StallingBackend {
    fn name(&self) -> &str {
        "stalling"
    }

    fn fallback_models(&self) -> &[String] {
        &[]
    }

    async fn stream_completion(
        &self,
        _messages: &[Message],
        _model: &str,
        _sampling: &SamplingParams,
        _cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderCallError> {
        self.entered.store(true, Ordering::SeqCst);
        let guard = ReleaseGuard(self.released.clone());
        if self.on_open {
            let _guard = guard;
            return futures::future::pending().await;
        }
        let chunks = stream::unfold((guard, false), |(guard, sent)| async move {
            if sent {
                futures::future::pending::<()>().await;
            }
            Some((Ok::<_, ProviderCallError>("x".to_string()), (guard, true)))
        });
        Ok(chunks.boxed())
    }
}

async fn wait_for(flag: &AtomicBool) -> bool {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

fn router(backends: Vec<ScriptedBackend>) -> FallbackRouter {
    let backends = backends
        .into_iter()
        .map(|b| Arc::new(b) as Arc<dyn ChatBackend>)
        .collect();
    FallbackRouter::new(backends).unwrap()
}

fn request(model: &str) -> CompletionRequest {
    CompletionRequest::new(vec![Message::user("Is this claim true?")], model)
}

fn calls_of(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    calls.lock().unwrap().clone()
}

async fn events_of(
    router: &FallbackRouter,
    req: CompletionRequest,
) -> Vec<Result<StreamEvent, FallbackError>> {
    router.stream_completion(req).collect().await
}

#[tokio::test]
async fn test_rate_limited_model_falls_back_to_next() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openrouter", &calls)
        .fallbacks(&["A", "B"])
        .script("A", Script::Fail(429))
        .script("B", Script::Chunks(vec!["ok"]))]);

    let text = router.complete(request("A")).await.unwrap();

    assert_eq!(text, "ok");
    assert_eq!(calls_of(&calls), ["openrouter/A", "openrouter/B"]);
}

#[tokio::test]
async fn test_stops_after_first_success() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openrouter", &calls)
        .fallbacks(&["m2", "m3"])
        .script("m1", Script::Fail(500))
        .script("m2", Script::Chunks(vec!["from ", "m2"]))
        .script("m3", Script::Chunks(vec!["from m3"]))]);

    let events = events_of(&router, request("m1")).await;

    assert_eq!(
        events.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
        [
            StreamEvent::Chunk("from ".into()),
            StreamEvent::Chunk("m2".into())
        ]
    );
    assert!(!calls_of(&calls).contains(&"openrouter/m3".to_string()));
}

#[tokio::test]
async fn test_exhaustion_wraps_last_failure() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openai", &calls)
        .fallbacks(&["B", "C"])
        .script("A", Script::Fail(500))
        .script("B", Script::Malformed("eB"))
        .script("C", Script::Fail(503))]);

    let err = router.complete(request("A")).await.unwrap_err();

    match &err {
        FallbackError::AllProvidersFailed { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert_eq!(last.model, "C");
            assert!(matches!(last.kind, CallErrorKind::Status { status: 503, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), crate::constants::USER_FAILURE_MESSAGE);
}

#[tokio::test]
async fn test_requested_model_in_fallbacks_is_attempted_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![
        ScriptedBackend::new("openrouter", &calls).fallbacks(&["A", "B", "A"]),
        ScriptedBackend::new("openai", &calls).fallbacks(&["A"]),
    ]);

    let err = router.complete(request("A")).await.unwrap_err();

    assert_eq!(
        calls_of(&calls),
        ["openrouter/A", "openrouter/B", "openai/A"]
    );
    assert!(matches!(err, FallbackError::AllProvidersFailed { attempts: 3, .. }));
}

#[tokio::test]
async fn test_providers_are_tried_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![
        ScriptedBackend::new("openrouter", &calls).script("A", Script::Fail(401)),
        ScriptedBackend::new("textgen", &calls).script("A", Script::Chunks(vec!["local"])),
    ]);

    assert_eq!(router.complete(request("A")).await.unwrap(), "local");
    assert_eq!(calls_of(&calls), ["openrouter/A", "textgen/A"]);
    assert_eq!(router.backend_names(), ["openrouter", "textgen"]);
}

#[tokio::test]
async fn test_chunks_keep_adapter_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let parts = vec!["The ", "claim ", "", "is ", "unverified", "."];
    let router = router(vec![
        ScriptedBackend::new("openai", &calls).script("A", Script::Chunks(parts.clone()))
    ]);

    let text = router.complete(request("A")).await.unwrap();

    assert_eq!(text, parts.concat());
}

#[tokio::test]
async fn test_partial_output_then_failure_emits_restart() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openrouter", &calls)
        .fallbacks(&["B"])
        .script("A", Script::ChunksThenFail(vec!["half"], 502))
        .script("B", Script::Chunks(vec!["whole"]))]);

    let events: Vec<_> = events_of(&router, request("A"))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(
        events,
        [
            StreamEvent::Chunk("half".into()),
            StreamEvent::Restart {
                provider: "openrouter".into(),
                model: "A".into()
            },
            StreamEvent::Chunk("whole".into()),
        ]
    );
    assert_eq!(router.complete(request("A")).await.unwrap(), "whole");
}

#[tokio::test]
async fn test_empty_completion_counts_as_failure() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("textgen", &calls)
        .fallbacks(&["B"])
        .script("A", Script::Empty)
        .script("B", Script::Empty)]);

    let err = router.complete(request("A")).await.unwrap_err();

    let last = err.last_error().unwrap();
    assert_eq!(last.model, "B");
    assert!(matches!(last.kind, CallErrorKind::EmptyResponse));
}

#[tokio::test]
async fn test_cancel_mid_stream_stops_without_fallback() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openrouter", &calls)
        .fallbacks(&["B"])
        .script("A", Script::ChunksThenHang(vec!["first"]))
        .script("B", Script::Chunks(vec!["never"]))]);

    let cancel = CancellationToken::new();
    let mut events = router.stream_completion(request("A").with_cancel(cancel.clone()));

    assert_eq!(
        events.next().await.unwrap().unwrap(),
        StreamEvent::Chunk("first".into())
    );
    cancel.cancel();

    let next = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("cancellation should end the stream promptly");
    assert!(matches!(next, Some(Err(FallbackError::Cancelled))));
    assert!(events.next().await.is_none());
    assert_eq!(calls_of(&calls), ["openrouter/A"]);
}

#[tokio::test]
async fn test_cancel_before_start_makes_no_calls() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![
        ScriptedBackend::new("openai", &calls).script("A", Script::Chunks(vec!["x"]))
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = router
        .complete(request("A").with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(matches!(err, FallbackError::Cancelled));
    assert_eq!(err.user_message(), "Request cancelled.");
    assert!(calls_of(&calls).is_empty());
}

#[tokio::test]
async fn test_dropping_stream_stops_attempts() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openai", &calls)
        .fallbacks(&["B"])
        .script("A", Script::ChunksThenHang(vec!["x"]))]);

    let mut events = router.stream_completion(request("A"));
    assert!(events.next().await.is_some());
    drop(events);
    tokio::task::yield_now().await;

    assert_eq!(calls_of(&calls), ["openai/A"]);
}

#[tokio::test]
async fn test_no_candidates_without_models() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![ScriptedBackend::new("openai", &calls)]);

    let err = router.complete(request("  ")).await.unwrap_err();

    assert!(matches!(err, FallbackError::NoCandidates));
    assert!(calls_of(&calls).is_empty());
}

#[test]
fn test_empty_router_is_a_config_error() {
    assert_eq!(
        FallbackRouter::new(Vec::new()).unwrap_err(),
        ConfigError::NoProviderConfigured
    );
}

#[test]
fn test_router_without_credentials_fails_at_construction() {
    let config = Config::default();
    assert_eq!(
        FallbackRouter::from_config(&config).unwrap_err(),
        ConfigError::NoProviderConfigured
    );
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_feed_usage_tracker() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tracker = Arc::new(UsageTracker::new());
    let router = router(vec![ScriptedBackend::new("openrouter", &calls)
        .fallbacks(&["B"])
        .script("A", Script::Fail(429))
        .script("B", Script::Chunks(vec!["ok"]))])
    .with_usage_tracker(tracker.clone(), Tier::Free);

    router.complete(request("A")).await.unwrap();

    assert!(tracker.get(Tier::Free, "A").unwrap().rate_limited);
    assert!(!tracker.get(Tier::Free, "B").unwrap().rate_limited);
    assert!(!tracker.is_eligible(Tier::Free, "A"));
    assert!(tracker.get(Tier::Paid, "B").is_none());
}

#[test]
fn test_plan_skips_blank_fallbacks() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let router = router(vec![
        ScriptedBackend::new("openrouter", &calls).fallbacks(&["", "B"]),
        ScriptedBackend::new("openai", &calls),
    ]);

    assert_eq!(
        router.plan("A"),
        [(0, "A".to_string()), (0, "B".to_string()), (1, "A".to_string())]
    );
}

#[tokio::test]
async fn test_dropping_stream_releases_stalled_body() {
    let backend = Arc::new(StallingBackend::new(false));
    let released = backend.released.clone();
    let router = FallbackRouter::new(vec![backend as Arc<dyn ChatBackend>]).unwrap();

    let mut events = router.stream_completion(request("A"));
    assert_eq!(
        events.next().await.unwrap().unwrap(),
        StreamEvent::Chunk("x".into())
    );
    drop(events);

    assert!(wait_for(&released).await, "stalled body was never dropped");
}

#[tokio::test]
async fn test_dropping_stream_releases_stalled_open() {
    let backend = Arc::new(StallingBackend::new(true));
    let entered = backend.entered.clone();
    let released = backend.released.clone();
    let router = FallbackRouter::new(vec![backend as Arc<dyn ChatBackend>]).unwrap();

    let events = router.stream_completion(request("A"));
    assert!(wait_for(&entered).await);
    assert!(!released.load(Ordering::SeqCst));
    drop(events);

    assert!(wait_for(&released).await, "stalled request was never dropped");
}

#[tokio::test(start_paused = true)]
async fn test_non_rate_limit_failure_marks_model_used() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tracker = Arc::new(UsageTracker::new());
    let router = router(vec![ScriptedBackend::new("openai", &calls)
        .fallbacks(&["B"])
        .script("A", Script::Fail(500))
        .script("B", Script::Chunks(vec!["ok"]))])
    .with_usage_tracker(tracker.clone(), Tier::Paid);

    router.complete(request("A")).await.unwrap();

    let failed = tracker.get(Tier::Paid, "A").expect("failed attempt is recorded");
    assert!(!failed.rate_limited);
    assert!(!tracker.is_eligible(Tier::Paid, "A"));
}
