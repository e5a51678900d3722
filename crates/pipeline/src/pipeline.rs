//! Treatment pipeline: five LLM stages over one patient record.
//!
//! ```text
//!                 ┌──► DietPlanning ───────┐
//! Analysis ───────┼──► MedicalEvaluation ──┼──► Coordination ──► report
//!                 └──► FitnessPlanning ────┘
//! ```
//!
//! Grounding is retrieved before the first LLM call. Every stage is a
//! single provider call bounded by the stage timeout. The first failure
//! aborts the run with a [`StageExecutionError`]; partial outputs are
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use careplan_config::PipelineConfig;
use careplan_core::{
    Error, EventBus, Message, PatientRecord, PipelineEvent, PromptError, Provider, ProviderRequest, Stage,
    StageExecutionError, StageFailure, StageOutput,
};
use careplan_retrieval::ContextRetriever;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::grounding::{self, Grounding};
use crate::input::{AnalysisInput, CoordinationInput, SpecialistInput, StageInput};
use crate::prompt::{self, PromptTemplate};
use crate::report::TreatmentReport;
use crate::roles;

const DEFAULT_TOP_K: usize = 3;

pub struct TreatmentPipeline {
    provider: Arc<dyn Provider>,
    retriever: Arc<ContextRetriever>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    stage_timeout: Duration,
    parallel_specialists: bool,
    top_k: usize,
    templates: HashMap<Stage, PromptTemplate>,
    event_bus: Arc<EventBus>,
}

impl TreatmentPipeline {
    /// Create a pipeline with the built-in templates and default settings.
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<ContextRetriever>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, PromptError> {
        let defaults = PipelineConfig::default();
        let mut templates = HashMap::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            templates.insert(stage, checked_template(stage, roles::profile(stage).template)?);
        }

        Ok(Self {
            provider,
            retriever,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            stage_timeout: Duration::from_secs(defaults.stage_timeout_secs),
            parallel_specialists: defaults.parallel_specialists,
            top_k: DEFAULT_TOP_K,
            templates,
            event_bus,
        })
    }

    /// Apply `[pipeline]` settings, including template overrides.
    pub fn with_config(mut self, config: &PipelineConfig) -> Result<Self, Error> {
        self.temperature = config.temperature;
        self.max_tokens = config.max_tokens;
        self.stage_timeout = Duration::from_secs(config.stage_timeout_secs);
        self.parallel_specialists = config.parallel_specialists;

        for (key, source) in &config.templates {
            let stage = Stage::from_key(key).ok_or_else(|| Error::Config {
                message: format!("Unknown stage '{key}' in [pipeline.templates]"),
            })?;
            self = self.with_template(stage, source)?;
        }
        Ok(self)
    }

    /// Replace one stage's task template. Placeholders the stage cannot
    /// bind, and templates that drop the patient block or an upstream
    /// output the stage depends on, are rejected here, before any run.
    pub fn with_template(mut self, stage: Stage, source: &str) -> Result<Self, PromptError> {
        let template = checked_template(stage, source)?;
        debug!(stage = %stage, placeholders = ?template.placeholders(), "Template override applied");
        self.templates.insert(stage, template);
        Ok(self)
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_parallel_specialists(mut self, parallel: bool) -> Self {
        self.parallel_specialists = parallel;
        self
    }

    /// Hits retrieved per grounding query.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run all five stages for `patient` and return the coordinated report.
    pub async fn run(&self, patient: &PatientRecord) -> Result<TreatmentReport, Error> {
        let run_id = Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            patient_id = patient.patient_id(),
            bmi = patient.bmi(),
            category = %patient.bmi_category(),
            model = %self.model,
            parallel = self.parallel_specialists,
            "Treatment pipeline: starting run"
        );
        self.event_bus.progress(&run_id, 0.0, "Initializing");

        // ── Step 1: Retrieve grounding ──
        let grounding = grounding::gather(
            &self.retriever,
            patient,
            self.top_k,
            self.stage_timeout,
            &run_id,
            &self.event_bus,
        )
        .await?;

        // ── Step 2: Analyse patient data ──
        self.event_bus.progress(&run_id, 0.1, "Analyzing patient data");
        let analysis = self
            .invoke(
                &run_id,
                &AnalysisInput {
                    patient,
                    similar_patients: &grounding.similar_patients,
                },
            )
            .await?;

        // ── Step 3: Specialist plans ──
        self.event_bus.progress(&run_id, 0.3, "Specialists planning");
        let diet_input = specialist_input(Stage::DietPlanning, patient, &analysis.content, &grounding)?;
        let medical_input = specialist_input(Stage::MedicalEvaluation, patient, &analysis.content, &grounding)?;
        let fitness_input = specialist_input(Stage::FitnessPlanning, patient, &analysis.content, &grounding)?;

        let (diet, medical, fitness) = if self.parallel_specialists {
            tokio::try_join!(
                self.invoke(&run_id, &diet_input),
                self.invoke(&run_id, &medical_input),
                self.invoke(&run_id, &fitness_input),
            )?
        } else {
            let diet = self.invoke(&run_id, &diet_input).await?;
            let medical = self.invoke(&run_id, &medical_input).await?;
            let fitness = self.invoke(&run_id, &fitness_input).await?;
            (diet, medical, fitness)
        };

        // ── Step 4: Coordinate ──
        self.event_bus.progress(&run_id, 0.9, "Coordinating treatment plan");
        let coordination = self
            .invoke(
                &run_id,
                &CoordinationInput {
                    patient,
                    analysis: &analysis.content,
                    diet_plan: &diet.content,
                    medical_evaluation: &medical.content,
                    fitness_plan: &fitness.content,
                },
            )
            .await?;

        self.event_bus.progress(&run_id, 1.0, "Complete");
        let report = TreatmentReport::from_stages(
            run_id,
            patient.patient_id(),
            vec![analysis, diet, medical, fitness, coordination],
        );
        info!(
            run_id = %report.run_id,
            patient_id = %report.patient_id,
            report_chars = report.content.len(),
            total_tokens = report.usage.total_tokens,
            "Treatment pipeline: run complete"
        );
        Ok(report)
    }

    /// One stage: assemble the prompt, call the provider under the stage
    /// timeout, and turn the reply into a [`StageOutput`].
    async fn invoke<I: StageInput>(&self, run_id: &str, input: &I) -> Result<StageOutput, Error> {
        let stage = input.stage();
        let template = self
            .templates
            .get(&stage)
            .ok_or_else(|| Error::Internal(format!("No template registered for stage {stage}")))?;
        let task = prompt::assemble(template, input.patient(), &input.bindings())?;
        let profile = roles::profile(stage);

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(profile.agent.system_prompt()),
                Message::user(format!("{task}\n\nExpected output: {}", profile.expected_output)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: vec![],
        };

        debug!(run_id, stage = %stage, prompt_chars = task.len(), "Stage prompt assembled");
        self.event_bus.publish(PipelineEvent::StageStarted {
            run_id: run_id.to_string(),
            stage,
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.stage_timeout, self.provider.complete(request)).await {
            Err(_) => Err(StageFailure::Timeout(self.stage_timeout)),
            Ok(Err(e)) => Err(StageFailure::Provider(e)),
            Ok(Ok(response)) if response.message.content.trim().is_empty() => Err(StageFailure::EmptyResponse),
            Ok(Ok(response)) => Ok(response),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => {
                let output_chars = response.message.content.chars().count();
                info!(run_id, stage = %stage, output_chars, duration_ms, "Stage completed");
                self.event_bus.publish(PipelineEvent::StageCompleted {
                    run_id: run_id.to_string(),
                    stage,
                    output_chars,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(StageOutput {
                    stage,
                    content: response.message.content,
                    model: response.model,
                    usage: response.usage,
                })
            }
            Err(cause) => {
                warn!(run_id, stage = %stage, error = %cause, duration_ms, "Stage failed, aborting run");
                self.event_bus.publish(PipelineEvent::StageFailed {
                    run_id: run_id.to_string(),
                    stage,
                    error_message: cause.to_string(),
                    timestamp: Utc::now(),
                });
                Err(StageExecutionError::new(stage, cause).into())
            }
        }
    }
}

fn specialist_input<'a>(
    stage: Stage,
    patient: &'a PatientRecord,
    analysis: &'a str,
    grounding: &'a Grounding,
) -> Result<SpecialistInput<'a>, Error> {
    SpecialistInput::new(stage, patient, analysis, grounding.for_specialist(stage))
        .ok_or_else(|| Error::Internal(format!("{stage} is not a specialist stage")))
}

/// Parse `source` for `stage`: every placeholder must be bindable, and
/// `patient_data` plus each dependency's output must appear.
fn checked_template(stage: Stage, source: &str) -> Result<PromptTemplate, PromptError> {
    let template = PromptTemplate::parse(stage.key(), source)?;
    template.validate(roles::profile(stage).placeholders)?;

    let required: Vec<&str> = std::iter::once(prompt::PATIENT_DATA)
        .chain(stage.dependencies().iter().map(Stage::key))
        .collect();
    template.require(&required)?;
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        ScriptedProvider, SequentialMockProvider, ToggleEmbedder, make_text_response, patient, test_retriever,
    };
    use careplan_core::ProviderError;
    use careplan_patients::PatientDataset;
    use careplan_retrieval::{NO_MEDICAL_CONTEXT, TextSplitter};

    async fn pipeline_with(provider: Arc<dyn Provider>) -> TreatmentPipeline {
        let retriever = test_retriever(Arc::new(ToggleEmbedder::default())).await;
        TreatmentPipeline::new(provider, Arc::new(retriever), "mock-model", Arc::new(EventBus::default())).unwrap()
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Arc<PipelineEvent>>) -> Vec<Arc<PipelineEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn report_is_the_coordination_output() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline_with(provider.clone()).await;

        let report = pipeline.run(&patient()).await.unwrap();

        assert_eq!(report.content, ScriptedProvider::reply_for(Stage::Coordination));
        assert_eq!(report.patient_id, "P-TEST");
        assert_eq!(report.stages.len(), 5);
        assert_eq!(report.usage.total_tokens, 5 * 15);
        assert_eq!(provider.calls().len(), 5);
    }

    #[tokio::test]
    async fn analysis_runs_first_and_coordination_last() {
        for parallel in [true, false] {
            let provider = Arc::new(ScriptedProvider::new());
            let pipeline = pipeline_with(provider.clone()).await.with_parallel_specialists(parallel);
            pipeline.run(&patient()).await.unwrap();

            let calls = provider.calls();
            assert_eq!(calls.first(), Some(&Stage::Analysis));
            assert_eq!(calls.last(), Some(&Stage::Coordination));
            for stage in Stage::SPECIALISTS {
                assert!(calls.contains(&stage));
            }
            if !parallel {
                assert_eq!(calls, Stage::ALL.to_vec());
            }
        }
    }

    #[tokio::test]
    async fn coordination_prompt_contains_every_upstream_output() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline_with(provider.clone()).await;
        pipeline.run(&patient()).await.unwrap();

        let prompt = provider.request_for(Stage::Coordination).unwrap().prompt_text();
        for stage in Stage::Coordination.dependencies() {
            assert!(prompt.contains(&ScriptedProvider::reply_for(*stage)), "missing {stage}");
        }
    }

    #[tokio::test]
    async fn specialist_prompts_see_analysis_but_not_each_other() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline_with(provider.clone()).await.with_parallel_specialists(false);
        pipeline.run(&patient()).await.unwrap();

        for stage in Stage::SPECIALISTS {
            let prompt = provider.request_for(stage).unwrap().prompt_text();
            assert!(prompt.contains(&ScriptedProvider::reply_for(Stage::Analysis)));
            for other in Stage::SPECIALISTS {
                assert!(
                    !prompt.contains(&ScriptedProvider::reply_for(other)),
                    "{stage} prompt leaked {other} output"
                );
            }
        }
    }

    #[tokio::test]
    async fn prompts_carry_role_patient_and_grounding() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline_with(provider.clone()).await;
        pipeline.run(&patient()).await.unwrap();

        let analysis = provider.request_for(Stage::Analysis).unwrap();
        assert_eq!(analysis.messages.len(), 2);
        assert!(analysis.messages[0].content.starts_with("You are the Clinical Data Analyst."));
        assert!(analysis.messages[1].content.contains("- Bmi Category: Obese"));
        assert!(analysis.messages[1].content.contains("Similar Patient Cases"));
        assert!(analysis.messages[1].content.contains("Expected output:"));

        let medical = provider.request_for(Stage::MedicalEvaluation).unwrap().prompt_text();
        assert!(medical.contains("Relevant Medical Knowledge:"));
        assert!(!medical.contains(NO_MEDICAL_CONTEXT));
    }

    #[tokio::test]
    async fn unknown_state_still_completes() {
        let dataset = PatientDataset::bundled().unwrap();
        let record = dataset.by_index(17).unwrap();
        assert_eq!(record.state(), "Unknown");

        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline_with(provider.clone()).await;
        let report = pipeline.run(record).await.unwrap();

        assert_eq!(report.patient_id, "NFHS_17");
        let prompt = provider.request_for(Stage::Analysis).unwrap().prompt_text();
        assert!(prompt.contains("- State: Unknown"));
    }

    #[tokio::test(start_paused = true)]
    async fn medical_timeout_aborts_the_run() {
        let provider = Arc::new(
            ScriptedProvider::new().with_delay(Stage::MedicalEvaluation, Duration::from_secs(600)),
        );
        let pipeline = pipeline_with(provider.clone()).await;
        let mut rx = pipeline.event_bus().subscribe();

        let err = pipeline.run(&patient()).await.unwrap_err();

        match err {
            Error::Stage(e) => {
                assert_eq!(e.stage, Stage::MedicalEvaluation);
                assert!(matches!(e.cause, StageFailure::Timeout(d) if d == Duration::from_secs(180)));
            }
            other => panic!("expected stage error, got {other:?}"),
        }
        assert!(!provider.calls().contains(&Stage::Coordination));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e.as_ref(),
            PipelineEvent::StageFailed { stage: Stage::MedicalEvaluation, .. }
        )));
        assert!(!events.iter().any(|e| matches!(
            e.as_ref(),
            PipelineEvent::Progress { fraction, .. } if *fraction >= 0.9
        )));
    }

    #[tokio::test]
    async fn provider_error_names_the_failing_stage() {
        let provider = Arc::new(ScriptedProvider::new().with_failure(
            Stage::FitnessPlanning,
            ProviderError::RateLimited { retry_after_secs: 30 },
        ));
        let pipeline = pipeline_with(provider).await;

        let err = pipeline.run(&patient()).await.unwrap_err();
        let Error::Stage(e) = err else {
            panic!("expected stage error");
        };
        assert_eq!(e.stage, Stage::FitnessPlanning);
        assert!(matches!(e.cause, StageFailure::Provider(ProviderError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn empty_analysis_stops_before_specialists() {
        let provider = Arc::new(ScriptedProvider::new().with_text(Stage::Analysis, "   \n"));
        let pipeline = pipeline_with(provider.clone()).await;

        let err = pipeline.run(&patient()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Stage(StageExecutionError {
                stage: Stage::Analysis,
                cause: StageFailure::EmptyResponse
            })
        ));
        assert_eq!(provider.calls(), vec![Stage::Analysis]);
    }

    #[tokio::test]
    async fn progress_checkpoints_are_published_in_order() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline_with(provider).await;
        let mut rx = pipeline.event_bus().subscribe();

        pipeline.run(&patient()).await.unwrap();

        let events = drain(&mut rx);
        let checkpoints: Vec<(f32, String)> = events
            .iter()
            .filter_map(|e| match e.as_ref() {
                PipelineEvent::Progress {
                    fraction, description, ..
                } => Some((*fraction, description.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            checkpoints,
            vec![
                (0.0, "Initializing".to_string()),
                (0.1, "Analyzing patient data".to_string()),
                (0.3, "Specialists planning".to_string()),
                (0.9, "Coordinating treatment plan".to_string()),
                (1.0, "Complete".to_string()),
            ]
        );
        let completed = events
            .iter()
            .filter(|e| matches!(e.as_ref(), PipelineEvent::StageCompleted { .. }))
            .count();
        assert_eq!(completed, 5);
    }

    #[tokio::test]
    async fn missing_corpus_fails_before_any_llm_call() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let retriever = ContextRetriever::new(Arc::new(ToggleEmbedder::default()), TextSplitter::default());
        let pipeline =
            TreatmentPipeline::new(provider.clone(), Arc::new(retriever), "mock-model", Arc::new(EventBus::default()))
                .unwrap();

        let err = pipeline.run(&patient()).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn sequential_mode_consumes_replies_in_stage_order() {
        let replies = Stage::ALL
            .iter()
            .map(|s| make_text_response(&format!("{} done", s.label())))
            .collect();
        let provider = Arc::new(SequentialMockProvider::new(replies));
        let pipeline = pipeline_with(provider.clone()).await.with_parallel_specialists(false);

        let report = pipeline.run(&patient()).await.unwrap();
        assert_eq!(report.content, "Care coordination done");
        assert_eq!(report.stage(Stage::MedicalEvaluation).unwrap().content, "Medical evaluation done");
        assert_eq!(provider.call_count(), 5);
    }

    #[tokio::test]
    async fn config_overrides_template_and_settings() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut config = PipelineConfig {
            temperature: 0.2,
            max_tokens: Some(900),
            ..Default::default()
        };
        config
            .templates
            .insert("diet_plan".into(), "Diet for {{patient}}:\n{patient_data}\nBased on {analysis}".into());

        let pipeline = pipeline_with(provider.clone()).await.with_config(&config).unwrap();
        pipeline.run(&patient()).await.unwrap();

        let request = provider.request_for(Stage::DietPlanning).unwrap();
        assert!(request.messages[1].content.starts_with("Diet for {patient}:\n- Patient Id: P-TEST"));
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, Some(900));
    }

    #[tokio::test]
    async fn invalid_template_override_is_rejected_up_front() {
        let provider = Arc::new(ScriptedProvider::new());

        let mut config = PipelineConfig::default();
        config
            .templates
            .insert("fitness_plan".into(), "{patient_data} {diet_plan}".into());
        let err = pipeline_with(provider.clone()).await.with_config(&config).err().unwrap();
        assert!(matches!(err, Error::Prompt(PromptError::MissingPlaceholder { .. })));

        for (stage, source) in [
            (Stage::Coordination, "Summarise {patient_data}"),
            (Stage::MedicalEvaluation, "{patient_data}\n{medical_context}"),
            (Stage::Analysis, "Review {similar_patients}"),
        ] {
            let err = pipeline_with(provider.clone())
                .await
                .with_template(stage, source)
                .err()
                .unwrap();
            assert!(matches!(err, PromptError::MissingPlaceholder { .. }), "{stage}: {err:?}");
        }

        let mut config = PipelineConfig::default();
        config.templates.insert("triage".into(), "{patient_data}".into());
        let err = pipeline_with(provider.clone()).await.with_config(&config).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));

        assert!(provider.calls().is_empty());
    }
}
