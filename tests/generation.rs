//! Generation tests: queue ordering and retry, the vocabulary attempt loop,
//! and the persistence gate. Model calls go to scripted in-process clients.

use async_trait::async_trait;
use examforge::prompts::REPAIR_SYSTEM_PROMPT;
use examforge::{
    finalize_problem, generate_from_document, generate_insertion_problem, generate_order_problem,
    is_valid, repair_mcq, AttemptError, ChatClient, ChatReply, ChatRequest, ClientAccessor,
    ClientSlot, Difficulty, ForgeError, GenerationConfig, GenerationProgressCallback,
    GenerationQueue, InMemoryDocumentStore, ProblemKind, RetryPolicy, VocabularyPipeline,
    VocabularyRequest, VocabularyVariant,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ── Fixtures ─────────────────────────────────────────────────────────────

const PASSAGE: &str = "Plants absorb light and release oxygen. Their roots anchor them \
    while leaves increase surface area to capture sunlight.";

const MARKED: &str = "Plants <u>absorb</u> light and <u>release</u> oxygen. \
    Their roots <u>anchor</u> them while leaves <u>decrease</u> surface area \
    to <u>capture</u> sunlight.";

fn good_payload() -> String {
    json!({
        "question": "다음 글의 밑줄 친 부분 중, 문맥상 낱말의 쓰임이 적절하지 않은 것은?",
        "passage": MARKED,
        "options": ["① absorb", "② release", "③ anchor", "④ decrease", "⑤ capture"],
        "answer": 4,
        "explanation": "Leaves increase surface area to capture more light.",
        "optionReasons": ["fits", "fits", "fits", "should be increase", "fits"],
        "corrections": [{"index": 4, "original": "decrease", "replacement": "increase"}]
    })
    .to_string()
}

/// Parses as JSON but names four options against five spans.
fn short_options_payload() -> String {
    let mut v: Value = serde_json::from_str(&good_payload()).unwrap();
    v["options"] = json!(["① absorb", "② release", "③ anchor", "④ decrease"]);
    v.to_string()
}

fn fast(retries: u32) -> RetryPolicy {
    RetryPolicy {
        retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

fn config() -> GenerationConfig {
    GenerationConfig::builder()
        .model("base-model")
        .premium_model("premium-model")
        .temperature(0.7)
        .premium_temperature(0.2)
        .retry_policy(fast(0))
        .build()
        .unwrap()
}

fn request() -> VocabularyRequest {
    VocabularyRequest {
        passage: PASSAGE.to_string(),
        variant: VocabularyVariant::inappropriate(),
        passage_index: 2,
        extra_context: None,
    }
}

/// Replies from a fixed script and records every request it sees.
struct ScriptedClient {
    script: Mutex<VecDeque<Result<String, AttemptError>>>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String, AttemptError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn replying(replies: Vec<String>) -> Arc<Self> {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, AttemptError> {
        let model = request.model.clone().unwrap_or_default();
        self.seen.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AttemptError::api("script exhausted")));
        next.map(|content| ChatReply {
            content,
            model,
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }
}

fn accessor_for(client: Arc<ScriptedClient>) -> ClientAccessor {
    Arc::new(move || Some(client.clone() as Arc<dyn ChatClient>))
}

fn pipeline_with(client: Arc<ScriptedClient>, config: GenerationConfig) -> VocabularyPipeline {
    let queue = GenerationQueue::new(accessor_for(client), config.retry);
    VocabularyPipeline::new(queue, config)
}

fn chat(user: &str) -> ChatRequest {
    ChatRequest {
        model: None,
        system: None,
        user: user.to_string(),
        temperature: 0.0,
        max_tokens: 16,
    }
}

// ── Queue ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_succeeds_on_third_call() {
    let client = ScriptedClient::new(vec![
        Err(AttemptError::api("rate limited")),
        Err(AttemptError::api("timeout")),
        Ok("done".to_string()),
    ]);
    let queue = GenerationQueue::new(accessor_for(client.clone()), fast(2));

    let reply = assert_ok!(queue.call_chat_completion(chat("hi"), None).await);
    assert_eq!(reply.content, "done");
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn retry_rejects_with_last_error() {
    let client = ScriptedClient::new(vec![
        Err(AttemptError::api("first")),
        Err(AttemptError::api("second")),
        Ok("too late".to_string()),
    ]);
    let queue = GenerationQueue::new(accessor_for(client.clone()), fast(2));

    let err = assert_err!(queue.call_chat_completion(chat("hi"), Some(fast(1))).await);
    assert_eq!(err, AttemptError::api("second"));
    assert_eq!(client.calls(), 2);
}

/// Sleeps inside every call and logs when it starts and ends.
struct SlowClient {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ChatClient for SlowClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, AttemptError> {
        self.events.lock().unwrap().push(format!("start {}", request.user));
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.events.lock().unwrap().push(format!("end {}", request.user));
        Ok(ChatReply {
            content: request.user,
            model: "slow".into(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }
}

#[tokio::test]
async fn tasks_never_overlap_and_client_is_read_per_task() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let client: Arc<dyn ChatClient> = Arc::new(SlowClient {
        events: events.clone(),
    });
    let log = events.clone();
    let accessor: ClientAccessor = Arc::new(move || {
        log.lock().unwrap().push("access".to_string());
        Some(client.clone())
    });
    let queue = GenerationQueue::new(accessor, fast(0));

    let a = queue.call_chat_completion(chat("A"), None);
    let b = queue.call_chat_completion(chat("B"), None);
    // Queue order is fixed at call time, not by which future is polled first.
    let (b_reply, a_reply) = tokio::join!(b, a);
    assert_eq!(assert_ok!(a_reply).content, "A");
    assert_eq!(assert_ok!(b_reply).content, "B");

    assert_eq!(
        *events.lock().unwrap(),
        vec!["access", "start A", "end A", "access", "start B", "end B"]
    );
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn client_slot_can_be_swapped_between_tasks() {
    let slot = ClientSlot::new(None);
    let queue = GenerationQueue::new(slot.accessor(), fast(0));

    let err = assert_err!(queue.call_chat_completion(chat("x"), None).await);
    assert_eq!(err, AttemptError::ClientUnavailable);

    slot.set(ScriptedClient::replying(vec!["configured".into()]));
    let reply = assert_ok!(queue.call_chat_completion(chat("x"), None).await);
    assert_eq!(reply.content, "configured");

    slot.clear();
    assert!(!slot.is_configured());
    let err = assert_err!(queue.call_chat_completion(chat("x"), None).await);
    assert_eq!(err, AttemptError::ClientUnavailable);
}

// ── Vocabulary pipeline ──────────────────────────────────────────────────

#[tokio::test]
async fn first_attempt_success() {
    let client = ScriptedClient::replying(vec![good_payload()]);
    let pipeline = pipeline_with(client.clone(), config());

    let generated = assert_ok!(pipeline.generate_problem(request()).await);
    let problem = &generated.problem;

    assert_eq!(problem.kind, "vocabulary");
    assert_eq!(problem.answer, "4");
    assert!(problem.question.contains("④<u>decrease</u>"));
    assert_eq!(problem.options.as_ref().unwrap()[3], "④ decrease");
    assert!(problem.is_valid());

    assert_eq!(generated.meta.attempts, 1);
    assert_eq!(generated.meta.model, "base-model");
    let generation = &problem.metadata.as_ref().unwrap()["generation"];
    assert_eq!(generation["generator"], "vocabulary-pipeline");
    assert_eq!(generation["model"], "base-model");
    assert!(generation["variantTag"]
        .as_str()
        .unwrap()
        .starts_with("vocab-"));

    let sent = client.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].model.as_deref(), Some("base-model"));
    assert!(sent[0].user.contains("Passage #3"));
}

#[tokio::test]
async fn rejected_payload_is_repaired_within_the_same_attempt() {
    let client = ScriptedClient::replying(vec![short_options_payload(), good_payload()]);
    let pipeline = pipeline_with(client.clone(), config());

    let generated = assert_ok!(pipeline.generate_problem(request()).await);
    assert_eq!(generated.meta.attempts, 1);

    let sent = client.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].system.as_deref(), Some(REPAIR_SYSTEM_PROMPT));
    assert!(sent[1].user.contains("`options` must have 5 entries"));
}

#[tokio::test]
async fn premium_tier_from_third_attempt() {
    let client = ScriptedClient::replying(vec![
        "not json".into(),
        "still not json".into(),
        good_payload(),
    ]);
    let cfg = GenerationConfig {
        repair_budget: 0,
        ..config()
    };
    let pipeline = pipeline_with(client.clone(), cfg);

    let generated = assert_ok!(pipeline.generate_problem(request()).await);
    assert_eq!(generated.meta.attempts, 3);
    assert_eq!(generated.meta.model, "premium-model");

    let sent = client.requests();
    let models: Vec<_> = sent.iter().map(|r| r.model.clone().unwrap()).collect();
    assert_eq!(models, vec!["base-model", "base-model", "premium-model"]);
    assert!((sent[2].temperature - 0.2).abs() < f32::EPSILON);
    assert!((sent[0].temperature - 0.7).abs() < f32::EPSILON);
}

/// Serves every request with one fixed model, whatever was asked for.
struct FixedModelClient {
    inner: Arc<ScriptedClient>,
    served: &'static str,
}

#[async_trait]
impl ChatClient for FixedModelClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, AttemptError> {
        let reply = self.inner.complete(request).await?;
        Ok(ChatReply {
            model: self.served.to_string(),
            ..reply
        })
    }
}

#[tokio::test]
async fn metadata_names_the_model_that_served_the_reply() {
    let scripted = ScriptedClient::replying(vec![
        "not json".into(),
        "still not json".into(),
        good_payload(),
    ]);
    let client: Arc<dyn ChatClient> = Arc::new(FixedModelClient {
        inner: scripted.clone(),
        served: "fallback-model",
    });
    let cfg = GenerationConfig {
        repair_budget: 0,
        ..config()
    };
    let queue = GenerationQueue::new(Arc::new(move || Some(client.clone())), cfg.retry);
    let pipeline = VocabularyPipeline::new(queue, cfg);

    let generated = assert_ok!(pipeline.generate_problem(request()).await);
    assert_eq!(generated.meta.attempts, 3);
    assert_eq!(generated.meta.model, "fallback-model");
    let generation = &generated.problem.metadata.as_ref().unwrap()["generation"];
    assert_eq!(generation["model"], "fallback-model");

    // The premium model was still what the third attempt asked for.
    assert_eq!(scripted.requests()[2].model.as_deref(), Some("premium-model"));
}

#[tokio::test]
async fn repair_budget_is_shared_across_attempts() {
    let client = ScriptedClient::replying(vec!["not json".to_string(); 5]);
    let cfg = GenerationConfig {
        max_attempts: 3,
        repair_budget: 2,
        ..config()
    };
    let pipeline = pipeline_with(client.clone(), cfg);

    let err = assert_err!(pipeline.generate_problem(request()).await);
    assert!(matches!(&err, ForgeError::GenerationExhausted { attempts: 3, .. }), "{err}");

    let sent = client.requests();
    let repairs: Vec<bool> = sent
        .iter()
        .map(|r| r.system.as_deref() == Some(REPAIR_SYSTEM_PROMPT))
        .collect();
    // Attempts 1 and 2 each spend one repair; attempt 3 has none left.
    assert_eq!(repairs, vec![false, true, false, true, false]);
    assert_eq!(client.calls(), 5);
}

#[tokio::test]
async fn exhaustion_reports_the_last_reason() {
    let client = ScriptedClient::replying(vec!["nope".into(), short_options_payload()]);
    let cfg = GenerationConfig {
        max_attempts: 2,
        repair_budget: 0,
        ..config()
    };
    let pipeline = pipeline_with(client, cfg);

    let err = assert_err!(pipeline.generate_problem(request()).await);
    match err {
        ForgeError::GenerationExhausted {
            attempts,
            last_reason,
        } => {
            assert_eq!(attempts, 2);
            assert!(last_reason.contains("`options` must have 5 entries"), "{last_reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failures_become_directives_in_later_prompts() {
    let client = ScriptedClient::replying(vec![short_options_payload(), good_payload()]);
    let cfg = GenerationConfig {
        repair_budget: 0,
        ..config()
    };
    let pipeline = pipeline_with(client.clone(), cfg);

    let generated = assert_ok!(pipeline.generate_problem(request()).await);
    assert_eq!(generated.meta.attempts, 2);

    let sent = client.requests();
    assert!(!sent[0].user.contains("Previous attempts were rejected"));
    assert!(sent[1].user.contains("Previous attempts were rejected"));
    assert!(sent[1].user.contains("`options` must have 5 entries"));
    // Each attempt carries its own tag.
    assert_ne!(sent[0].user.lines().next(), sent[1].user.lines().next());
}

#[tokio::test]
async fn missing_client_fails_every_attempt() {
    let slot = ClientSlot::new(None);
    let cfg = GenerationConfig {
        max_attempts: 2,
        ..config()
    };
    let queue = GenerationQueue::new(slot.accessor(), cfg.retry);
    let pipeline = VocabularyPipeline::new(queue, cfg);

    let err = assert_err!(pipeline.generate_problem(request()).await);
    assert!(err.to_string().contains("no model client is configured"));
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl GenerationProgressCallback for Recorder {
    fn on_attempt_start(&self, attempt: u32, _max: u32, model: &str) {
        self.0.lock().unwrap().push(format!("start {attempt} {model}"));
    }
    fn on_attempt_failed(&self, attempt: u32, _reason: &str) {
        self.0.lock().unwrap().push(format!("failed {attempt}"));
    }
    fn on_repair(&self, attempt: u32, remaining: u32) {
        self.0.lock().unwrap().push(format!("repair {attempt} {remaining}"));
    }
    fn on_complete(&self, attempts: u32) {
        self.0.lock().unwrap().push(format!("complete {attempts}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_attempt_loop() {
    let client = ScriptedClient::replying(vec![
        "garbage".into(),
        "more garbage".into(),
        good_payload(),
    ]);
    let recorder = Arc::new(Recorder::default());
    let cfg = GenerationConfig {
        repair_budget: 1,
        progress_callback: Some(recorder.clone()),
        ..config()
    };
    let pipeline = pipeline_with(client, cfg);

    assert_ok!(pipeline.generate_problem(request()).await);
    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec![
            "start 1 base-model",
            "repair 1 0",
            "failed 1",
            "start 2 base-model",
            "complete 2",
        ]
    );
}

// ── Validation and repair ────────────────────────────────────────────────

#[test]
fn validator_accepts_exactly_well_formed_problems() {
    let base = json!({"type": "order", "question": "q", "options": ["a", "b", "c"], "answer": "3"});
    assert!(is_valid(&base));

    let cases = [
        ("answer", json!("0")),
        ("answer", json!("4")),
        ("answer", json!(" 1")),
        ("answer", json!(1)),
        ("options", json!(["a"])),
        ("options", json!(["a", ""])),
        ("options", json!("a,b")),
        ("question", json!("")),
        ("type", json!("")),
    ];
    for (key, value) in cases {
        let mut p = base.clone();
        p[key] = value.clone();
        assert!(!is_valid(&p), "{key} = {value} should be rejected");
    }

    let essay = json!({"type": "essay", "question": "Summarise the passage."});
    assert!(is_valid(&essay));
    assert!(!is_valid(&json!("not an object")));
}

#[test]
fn repair_is_idempotent_and_yields_valid_problems() {
    let inputs = [
        json!({"type": "order", "question": "q", "options": ["a", "b"], "answer": "0"}),
        json!({"type": "order", "question": "q", "options": [" a ", "a", ""], "answer": "9"}),
        json!({"type": "mcq", "question": "q", "choices": ["x", "y", "z"], "correctAnswer": "y"}),
        json!({"type": "mcq", "question": "q"}),
    ];
    for input in inputs {
        let once = repair_mcq(&input);
        let twice = repair_mcq(&once);
        assert_eq!(once, twice);
        assert!(is_valid(&once), "{once}");
    }
}

// ── Rule-based generators and the document path ──────────────────────────

#[test]
fn rule_based_generators_enforce_sentence_minimums() {
    let three = "One. Two. Three.";
    let err = assert_err!(generate_order_problem(three, Difficulty::Basic));
    assert!(matches!(
        err,
        ForgeError::InsufficientSentences {
            required: 4,
            found: 3
        }
    ));

    let four = "One. Two. Three. Four.";
    assert_ok!(generate_order_problem(four, Difficulty::Basic));
    let err = assert_err!(generate_insertion_problem(four));
    assert!(matches!(
        err,
        ForgeError::InsufficientSentences {
            required: 5,
            found: 4
        }
    ));
}

#[tokio::test]
async fn stored_documents_produce_persistable_problems() {
    let store = InMemoryDocumentStore::new();
    let id = store.insert(
        "Mock exam",
        json!({"passages": [
            "First sentence here. Second one follows. Third comes next. Fourth is last. Fifth ends it."
        ]})
        .to_string(),
    );

    for kind in [
        ProblemKind::Order(Difficulty::Basic),
        ProblemKind::Order(Difficulty::Advanced),
        ProblemKind::Insertion,
    ] {
        let generated = assert_ok!(generate_from_document(&store, id, 0, &kind, None).await);
        assert!(generated.problem.is_valid());
        assert_eq!(generated.meta.model, "none");
        // Finalising twice changes nothing.
        assert_eq!(
            assert_ok!(finalize_problem(generated.problem.clone())),
            generated.problem
        );
    }

    let err =
        assert_err!(generate_from_document(&store, id + 1, 0, &ProblemKind::Insertion, None).await);
    assert!(matches!(err, ForgeError::DocumentNotFound { .. }));
}
