//! Shared test helpers for pipeline tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use careplan_core::error::ProviderError;
use careplan_core::message::{Message, Role};
use careplan_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use careplan_core::{
    Gender, PatientAttributes, PatientRecord, ResidenceType, RetrievalError, Stage, WealthTier,
};
use careplan_patients::{PatientDataset, patient_documents};
use careplan_retrieval::{
    ContextRetriever, Embedder, HashingEmbedder, MEDICAL_KNOWLEDGE, PATIENT_DATA, TextSplitter,
    medical_documents,
};

use crate::roles;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    call_count: Mutex<usize>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        if *count >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                *count,
                responses.len()
            );
        }

        let response = responses[*count].clone();
        *count += 1;
        Ok(response)
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

enum Script {
    Reply(String),
    Delayed(Duration, String),
    Fail(ProviderError),
}

/// A provider that recognises the stage from the system prompt and
/// answers per stage. Every request is recorded.
pub struct ScriptedProvider {
    scripts: HashMap<Stage, Script>,
    requests: Mutex<Vec<(Stage, ProviderRequest)>>,
}

impl ScriptedProvider {
    /// Every stage replies with [`ScriptedProvider::reply_for`].
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The default reply for `stage`, unique per stage.
    pub fn reply_for(stage: Stage) -> String {
        format!("<<{} OUTPUT>>", stage.key().to_uppercase())
    }

    pub fn with_text(mut self, stage: Stage, text: &str) -> Self {
        self.scripts.insert(stage, Script::Reply(text.to_string()));
        self
    }

    pub fn with_delay(mut self, stage: Stage, delay: Duration) -> Self {
        self.scripts
            .insert(stage, Script::Delayed(delay, Self::reply_for(stage)));
        self
    }

    pub fn with_failure(mut self, stage: Stage, error: ProviderError) -> Self {
        self.scripts.insert(stage, Script::Fail(error));
        self
    }

    /// Stages in the order their calls arrived.
    pub fn calls(&self) -> Vec<Stage> {
        self.requests.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn request_for(&self, stage: Stage) -> Option<ProviderRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, r)| r.clone())
    }
}

fn stage_of(request: &ProviderRequest) -> Option<Stage> {
    let system = request.messages.iter().find(|m| m.role == Role::System)?;
    Stage::ALL
        .into_iter()
        .find(|s| roles::profile(*s).agent.system_prompt() == system.content)
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let stage = stage_of(&request).expect("request carries no known stage role");
        self.requests.lock().unwrap().push((stage, request));

        match self.scripts.get(&stage) {
            None => Ok(make_text_response(&Self::reply_for(stage))),
            Some(Script::Reply(text)) => Ok(make_text_response(text)),
            Some(Script::Delayed(delay, text)) => {
                tokio::time::sleep(*delay).await;
                Ok(make_text_response(text))
            }
            Some(Script::Fail(error)) => Err(error.clone()),
        }
    }
}

/// Hashing embedder that can be switched to fail after corpora are built.
pub struct ToggleEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl Default for ToggleEmbedder {
    fn default() -> Self {
        Self {
            inner: HashingEmbedder::new(64),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }
}

impl ToggleEmbedder {
    pub fn fail_from_now_on(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn delay_from_now_on(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Embedder for ToggleEmbedder {
    fn name(&self) -> &str {
        "toggle"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::Embedding("embedding service unavailable".into()));
        }
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.embed(texts).await
    }
}

/// 35-year-old woman, 160 cm, 75 kg (BMI 29.30, Obese), rural Kerala.
pub fn patient() -> PatientRecord {
    let mut attrs = PatientAttributes::new(35, Gender::Female, 160.0, 75.0);
    attrs.patient_id = Some("P-TEST".into());
    attrs.state = "Kerala".into();
    attrs.residence_type = ResidenceType::Rural;
    attrs.wealth_index = WealthTier::Middle;
    PatientRecord::from_attributes(attrs).unwrap()
}

/// In-memory retriever with both corpora built from bundled data.
pub async fn test_retriever(embedder: Arc<dyn Embedder>) -> ContextRetriever {
    let dataset = PatientDataset::bundled().unwrap();
    let mut retriever = ContextRetriever::new(embedder, TextSplitter::default());
    retriever
        .build_corpus(MEDICAL_KNOWLEDGE, &medical_documents())
        .await
        .unwrap();
    retriever
        .build_corpus(PATIENT_DATA, &patient_documents(&dataset, None))
        .await
        .unwrap();
    retriever
}
