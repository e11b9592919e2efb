//! End-to-end turn pipeline tests with scripted providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use echoai_agent::{AgentConfig, AgentEvent, ConversationAgent};
use echoai_core::{
    Capability, Error, ErrorKind, GenerateRequest, KnowledgeRetriever, LanguageModel, Result,
    Snippet, SpeechToText, TextToSpeech, Transcript, TurnRole, TurnStatus, Utterance, VoiceConfig,
};
use echoai_providers::{FallbackChain, ProviderChains, ResponseCache};

struct FixedStt(&'static str);

#[async_trait]
impl SpeechToText for FixedStt {
    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
        Ok(Transcript::new(self.0, 0.95))
    }

    fn name(&self) -> &str {
        "fixed-stt"
    }
}

struct RecordingLlm {
    reply: &'static str,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl RecordingLlm {
    fn new(reply: &'static str) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for RecordingLlm {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        Ok(self.reply.to_string())
    }

    fn name(&self) -> &str {
        "recording-llm"
    }
}

struct FailingLlm;

#[async_trait]
impl LanguageModel for FailingLlm {
    async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
        Err(Error::Provider {
            provider: "failing-llm".to_string(),
            kind: ErrorKind::BadResponse,
            detail: "scripted failure".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing-llm"
    }
}

/// Returns a distinct transcript per call, for telling turns apart.
struct SequencedStt(AtomicUsize);

#[async_trait]
impl SpeechToText for SequencedStt {
    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Transcript::new(format!("question {n}"), 0.9))
    }

    fn name(&self) -> &str {
        "sequenced-stt"
    }
}

/// Echoes the transcript back after a configurable delay.
struct EchoLlm {
    delay: Duration,
}

#[async_trait]
impl LanguageModel for EchoLlm {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("re: {}", request.transcript))
    }

    fn name(&self) -> &str {
        "echo-llm"
    }
}

struct CountingTts {
    audio_len: usize,
    calls: AtomicUsize,
}

impl CountingTts {
    fn new(audio_len: usize) -> Self {
        Self {
            audio_len,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextToSpeech for CountingTts {
    async fn synthesize(&self, _text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xAB; self.audio_len])
    }

    fn name(&self) -> &str {
        "counting-tts"
    }
}

struct FlakyRetriever;

#[async_trait]
impl KnowledgeRetriever for FlakyRetriever {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<Snippet>> {
        Err(Error::RetrievalUnavailable("scripted outage".to_string()))
    }

    fn name(&self) -> &str {
        "flaky-retriever"
    }
}

fn chains(
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn TextToSpeech>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
) -> Arc<ProviderChains> {
    let timeout = Duration::from_secs(1);
    let mut stt_chain = FallbackChain::new(Capability::Stt, timeout);
    stt_chain.push("stt", stt);
    let mut llm_chain = FallbackChain::new(Capability::Llm, timeout);
    llm_chain.push("llm", llm);
    let mut tts_chain = FallbackChain::new(Capability::Tts, timeout);
    tts_chain.push("tts", tts);
    Arc::new(ProviderChains {
        stt: stt_chain,
        llm: llm_chain,
        tts: tts_chain,
        retriever,
    })
}

fn utterance() -> Utterance {
    Utterance {
        audio: vec![1; 4096],
        chunk_count: 3,
    }
}

async fn drain(rx: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn full_turn_streams_in_order() {
    let tts = Arc::new(CountingTts::new(70_000));
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(), // 32 KiB chunks
        chains(
            Arc::new(FixedStt("hello there")),
            Arc::new(RecordingLlm::new("hi, how can I help?")),
            tts,
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();

    let events = drain(&mut rx).await;

    let transcript_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::Transcript { text } if text == "hello there"))
        .unwrap();
    let response_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ResponseText { .. }))
        .unwrap();
    let complete_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::TurnComplete { .. }))
        .unwrap();
    assert!(transcript_at < response_at);
    assert!(response_at < complete_at);
    assert_eq!(complete_at, events.len() - 1);

    // 70,000 bytes at 32 KiB per chunk: 3 chunks, final flagged once
    let chunks: Vec<(u64, bool)> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::AudioChunk { seq, is_final, .. } => Some((*seq, *is_final)),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![(0, false), (1, false), (2, true)]);

    let history = agent.history_snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, TurnRole::User);
    assert_eq!(history[1].role, TurnRole::Assistant);
    assert_eq!(history[1].audio.as_ref().unwrap().byte_len, 70_000);
}

#[tokio::test]
async fn outbound_seq_continues_across_turns() {
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(FixedStt("first question")),
            Arc::new(RecordingLlm::new("an answer")),
            Arc::new(CountingTts::new(40_000)), // 2 chunks per turn
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();

    let seqs: Vec<u64> = drain(&mut rx)
        .await
        .iter()
        .filter_map(|e| match e {
            AgentEvent::AudioChunk { seq, .. } => Some(*seq),
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    agent.reset_outbound_seq();
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();
    let seqs: Vec<u64> = drain(&mut rx)
        .await
        .iter()
        .filter_map(|e| match e {
            AgentEvent::AudioChunk { seq, .. } => Some(*seq),
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![0, 1]);
}

#[tokio::test]
async fn blank_transcript_completes_without_response() {
    let llm = Arc::new(RecordingLlm::new("should not run"));
    let tts = Arc::new(CountingTts::new(1024));
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(Arc::new(FixedStt("   ")), llm.clone(), tts.clone(), None),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();

    let events = drain(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::TurnComplete { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::AudioChunk { .. } | AgentEvent::ResponseText { .. })));

    assert!(llm.requests.lock().is_empty());
    assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    assert_eq!(agent.turn_count(), 1);
}

#[tokio::test]
async fn retrieval_outage_degrades_to_empty_context() {
    let llm = Arc::new(RecordingLlm::new("answered anyway"));
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(FixedStt("what are your hours?")),
            llm.clone(),
            Arc::new(CountingTts::new(1024)),
            Some(Arc::new(FlakyRetriever)),
        ),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();

    let requests = llm.requests.lock();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].context.is_empty());

    // No error event reached the client for a degraded retrieval
    assert!(!drain(&mut rx)
        .await
        .iter()
        .any(|e| matches!(e, AgentEvent::Error { .. })));
}

#[tokio::test]
async fn exhausted_llm_chain_fails_the_turn() {
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(FixedStt("hello")),
            Arc::new(FailingLlm),
            Arc::new(CountingTts::new(1024)),
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let err = agent
        .run_turn(utterance(), &tx, &cancel_rx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AllProvidersExhausted { .. }));

    let events = drain(&mut rx).await;
    let error_event = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::Error { code, message } => Some((*code, message.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(error_event.0, "all_providers_exhausted");
    assert!(!error_event.1.contains("scripted"));

    // User turn recorded, failed assistant turn appended
    let history = agent.history_snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].status, TurnStatus::Failed);
}

#[tokio::test]
async fn repeated_response_served_from_cache() {
    let tts = Arc::new(CountingTts::new(2048));
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(FixedStt("hello")),
            Arc::new(RecordingLlm::new("same answer every time")),
            tts.clone(),
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();
    drain(&mut rx).await;
    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();

    assert_eq!(tts.calls.load(Ordering::SeqCst), 1);

    // Cached audio streams identically
    let bytes: usize = drain(&mut rx)
        .await
        .iter()
        .filter_map(|e| match e {
            AgentEvent::AudioChunk { payload, .. } => Some(payload.len()),
            _ => None,
        })
        .sum();
    assert_eq!(bytes, 2048);
}

#[tokio::test]
async fn concurrent_turns_never_interleave_history() {
    let agent = Arc::new(ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(SequencedStt(AtomicUsize::new(0))),
            Arc::new(EchoLlm {
                delay: Duration::from_millis(50),
            }),
            Arc::new(CountingTts::new(512)),
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    ));

    let (tx, mut rx) = mpsc::channel(256);
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    // Two runner tasks racing on one session, as after a reconnect where
    // the old task has not finished draining.
    let mut runners = Vec::new();
    for _ in 0..2 {
        let agent = Arc::clone(&agent);
        let tx = tx.clone();
        let cancel_rx = cancel_rx.clone();
        runners.push(tokio::spawn(async move {
            agent.run_turn(utterance(), &tx, &cancel_rx).await
        }));
    }
    for runner in runners {
        runner.await.unwrap().unwrap();
    }

    // Strictly paired turns: each user question directly followed by the
    // reply generated from it.
    let history = agent.history_snapshot();
    assert_eq!(history.len(), 4);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, TurnRole::User);
        assert_eq!(pair[1].role, TurnRole::Assistant);
        let question = pair[0].text.as_deref().unwrap();
        assert_eq!(
            pair[1].text.as_deref().unwrap(),
            format!("re: {question}")
        );
    }
    drain(&mut rx).await;
}

#[tokio::test]
async fn cancellation_drops_in_flight_generation() {
    let agent = Arc::new(ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(FixedStt("hello")),
            Arc::new(EchoLlm {
                delay: Duration::from_secs(30),
            }),
            Arc::new(CountingTts::new(512)),
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    ));

    let (tx, mut rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let runner = {
        let agent = Arc::clone(&agent);
        let tx = tx.clone();
        tokio::spawn(async move { agent.run_turn(utterance(), &tx, &cancel_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    // Well before the generation delay or the chain timeout elapses
    let result = tokio::time::timeout(Duration::from_millis(500), runner)
        .await
        .expect("cancel should abandon the provider call promptly")
        .unwrap();
    result.unwrap();

    // Abandoned, not exhausted: no provider error reached the client
    let events = drain(&mut rx).await;
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::TurnComplete { .. })));
    let history = agent.history_snapshot();
    assert_eq!(history.last().unwrap().status, TurnStatus::Failed);
}

#[tokio::test]
async fn cancellation_abandons_the_turn() {
    let llm = Arc::new(RecordingLlm::new("too late"));
    let agent = ConversationAgent::new(
        "session-1",
        AgentConfig::default(),
        chains(
            Arc::new(FixedStt("hello")),
            llm.clone(),
            Arc::new(CountingTts::new(1024)),
            None,
        ),
        Arc::new(ResponseCache::new(8)),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    agent.run_turn(utterance(), &tx, &cancel_rx).await.unwrap();

    let events = drain(&mut rx).await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::TurnComplete { .. })));
    assert!(llm.requests.lock().is_empty());

    let history = agent.history_snapshot();
    assert_eq!(history.last().unwrap().status, TurnStatus::Failed);
}
