//! Process-wide care context.
//!
//! Built once at start-up from [`AppConfig`]: the patient dataset, both
//! retrieval corpora and the LLM provider are loaded here and shared
//! read-only through `Arc`. Concurrent runs touch nothing mutable.

use std::sync::Arc;

use careplan_config::{AppConfig, EmbedderKind, RetrievalConfig};
use careplan_core::{Error, EventBus, PatientDataError, PatientRecord, Provider, ProviderError, RetrievalError};
use careplan_patients::{PatientDataset, patient_documents};
use careplan_retrieval::{
    ContextRetriever, Embedder, HashingEmbedder, IndexStore, MEDICAL_KNOWLEDGE, PATIENT_DATA, ProviderEmbedder,
    TextSplitter, medical_documents,
};
use tracing::info;

use crate::pipeline::TreatmentPipeline;
use crate::report::TreatmentReport;

pub struct CareContext {
    config: AppConfig,
    dataset: Arc<PatientDataset>,
    retriever: Arc<ContextRetriever>,
    event_bus: Arc<EventBus>,
    pipeline: TreatmentPipeline,
}

impl CareContext {
    /// Load everything from configuration, using the configured default
    /// provider for both completions and (optionally) embeddings.
    pub async fn bootstrap(config: AppConfig) -> Result<Self, Error> {
        let dataset = load_dataset(&config)?;
        let router = careplan_providers::build_from_config(&config);
        let provider = router
            .default()
            .ok_or_else(|| ProviderError::NotConfigured(config.default_provider.clone()))?;
        Self::assemble(config, dataset, provider).await
    }

    /// Build a context around an already-loaded dataset and provider.
    pub async fn assemble(
        config: AppConfig,
        dataset: PatientDataset,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, Error> {
        let retriever = Arc::new(prepare_retriever(&config, &dataset, provider.clone(), false).await?);
        let event_bus = Arc::new(EventBus::default());
        let model = careplan_providers::default_model(&config);

        let pipeline = TreatmentPipeline::new(provider.clone(), retriever.clone(), model, event_bus.clone())?
            .with_config(&config.pipeline)?
            .with_top_k(config.retrieval.top_k);

        info!(
            provider = provider.name(),
            model = pipeline.model(),
            records = dataset.len(),
            medical_chunks = retriever.corpus_len(MEDICAL_KNOWLEDGE),
            patient_chunks = retriever.corpus_len(PATIENT_DATA),
            "Care context ready"
        );

        Ok(Self {
            config,
            dataset: Arc::new(dataset),
            retriever,
            event_bus,
            pipeline,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Arc<PatientDataset> {
        &self.dataset
    }

    pub fn retriever(&self) -> &Arc<ContextRetriever> {
        &self.retriever
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn pipeline(&self) -> &TreatmentPipeline {
        &self.pipeline
    }

    /// Run the full treatment pipeline for one patient.
    pub async fn plan_for(&self, patient: &PatientRecord) -> Result<TreatmentReport, Error> {
        self.pipeline.run(patient).await
    }
}

/// The configured CSV, or the bundled sample when none is set.
pub fn load_dataset(config: &AppConfig) -> Result<PatientDataset, PatientDataError> {
    match &config.dataset.path {
        Some(path) => PatientDataset::from_csv_path(path),
        None => PatientDataset::bundled(),
    }
}

pub fn build_embedder(config: &RetrievalConfig, provider: Arc<dyn Provider>) -> Arc<dyn Embedder> {
    match config.embedder {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
        EmbedderKind::Provider => Arc::new(ProviderEmbedder::new(
            provider,
            config.embedding_model.clone(),
            config.dimension,
        )),
    }
}

/// A retriever holding both corpora. Persisted indexes are reused unless
/// `rebuild` is set or they were built from different documents or
/// splitter settings; freshly built corpora are written back.
pub async fn prepare_retriever(
    config: &AppConfig,
    dataset: &PatientDataset,
    provider: Arc<dyn Provider>,
    rebuild: bool,
) -> Result<ContextRetriever, RetrievalError> {
    let r = &config.retrieval;
    let embedder = build_embedder(r, provider);
    let mut retriever = ContextRetriever::new(embedder, TextSplitter::new(r.chunk_size, r.chunk_overlap))
        .with_store(IndexStore::new(r.index_dir()));

    if rebuild {
        retriever.build_corpus(MEDICAL_KNOWLEDGE, &medical_documents()).await?;
        retriever
            .build_corpus(PATIENT_DATA, &patient_documents(dataset, r.patient_sample_size))
            .await?;
    } else {
        retriever.load_or_build(MEDICAL_KNOWLEDGE, medical_documents).await?;
        retriever
            .load_or_build(PATIENT_DATA, || patient_documents(dataset, r.patient_sample_size))
            .await?;
    }
    Ok(retriever)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, SequentialMockProvider, patient};
    use careplan_core::Stage;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.retrieval.index_dir = Some(dir.join("index"));
        config.retrieval.dimension = 64;
        config
    }

    #[tokio::test]
    async fn assemble_builds_and_persists_both_corpora() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let provider = Arc::new(SequentialMockProvider::new(vec![]));

        let ctx = CareContext::assemble(config, PatientDataset::bundled().unwrap(), provider)
            .await
            .unwrap();

        assert!(ctx.retriever().has_corpus(MEDICAL_KNOWLEDGE));
        assert!(ctx.retriever().has_corpus(PATIENT_DATA));
        assert_eq!(ctx.dataset().len(), 40);
        assert!(tmp.path().join("index/medical_knowledge.json").exists());
        assert!(tmp.path().join("index/patient_data.json").exists());
    }

    #[tokio::test]
    async fn second_assembly_loads_persisted_index() {
        let tmp = tempfile::tempdir().unwrap();
        let provider: Arc<dyn Provider> = Arc::new(SequentialMockProvider::new(vec![]));
        let dataset = PatientDataset::bundled().unwrap();
        let index = tmp.path().join("index/patient_data.json");

        let first = prepare_retriever(&config_in(tmp.path()), &dataset, provider.clone(), false)
            .await
            .unwrap();
        let saved = std::fs::read_to_string(&index).unwrap();

        let second = prepare_retriever(&config_in(tmp.path()), &dataset, provider, false)
            .await
            .unwrap();
        assert_eq!(second.corpus_len(PATIENT_DATA), first.corpus_len(PATIENT_DATA));
        // A rebuild would have rewritten the file with a new timestamp.
        assert_eq!(std::fs::read_to_string(&index).unwrap(), saved);
    }

    #[tokio::test]
    async fn changed_patient_inputs_rebuild_persisted_index() {
        let tmp = tempfile::tempdir().unwrap();
        let provider: Arc<dyn Provider> = Arc::new(SequentialMockProvider::new(vec![]));
        let dataset = PatientDataset::bundled().unwrap();
        let mut config = config_in(tmp.path());

        config.retrieval.patient_sample_size = Some(5);
        let small = prepare_retriever(&config, &dataset, provider.clone(), false).await.unwrap();
        assert_eq!(small.corpus_len(PATIENT_DATA), 5);

        config.retrieval.patient_sample_size = Some(10);
        let larger = prepare_retriever(&config, &dataset, provider.clone(), false).await.unwrap();
        assert_eq!(larger.corpus_len(PATIENT_DATA), 10);

        let empty = PatientDataset::from_records(vec![]);
        let other_dataset = prepare_retriever(&config, &empty, provider, false).await.unwrap();
        assert_eq!(other_dataset.corpus_len(PATIENT_DATA), 0);
    }

    #[tokio::test]
    async fn sample_size_limits_patient_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.retrieval.patient_sample_size = Some(5);
        let provider: Arc<dyn Provider> = Arc::new(SequentialMockProvider::new(vec![]));

        let retriever = prepare_retriever(&config, &PatientDataset::bundled().unwrap(), provider, true)
            .await
            .unwrap();
        assert_eq!(retriever.corpus_len(PATIENT_DATA), 5);
    }

    #[tokio::test]
    async fn plan_for_runs_the_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let ctx = CareContext::assemble(config_in(tmp.path()), PatientDataset::bundled().unwrap(), provider.clone())
            .await
            .unwrap();

        let report = ctx.plan_for(&patient()).await.unwrap();
        assert_eq!(report.content, ScriptedProvider::reply_for(Stage::Coordination));
        assert_eq!(provider.calls().len(), 5);
    }

    #[test]
    fn missing_dataset_file_is_reported() {
        let mut config = AppConfig::default();
        config.dataset.path = Some("/nonexistent/patients.csv".into());
        assert!(matches!(load_dataset(&config), Err(PatientDataError::Dataset(_))));
    }

    #[test]
    fn embedder_follows_config() {
        let provider: Arc<dyn Provider> = Arc::new(SequentialMockProvider::new(vec![]));
        let mut r = RetrievalConfig::default();
        r.dimension = 32;
        assert_eq!(build_embedder(&r, provider.clone()).name(), "hashing");

        r.embedder = EmbedderKind::Provider;
        let embedder = build_embedder(&r, provider);
        assert_eq!(embedder.name(), "sequential_mock:text-embedding-3-small");
        assert_eq!(embedder.dimension(), 32);
    }
}
