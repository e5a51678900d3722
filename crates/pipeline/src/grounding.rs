//! Retrieval grounding gathered before the first LLM call.

use std::time::Duration;

use careplan_core::{EventBus, PatientRecord, PipelineEvent, RetrievalError, Stage};
use careplan_retrieval::{
    ContextRetriever, MEDICAL_KNOWLEDGE, NO_MEDICAL_CONTEXT, NO_PATIENT_CONTEXT, PATIENT_DATA, RetrievalResult,
    format_medical_context, format_patient_context,
};
use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, warn};

/// Rendered context for every stage that consumes retrieval.
#[derive(Debug, Clone)]
pub struct Grounding {
    pub similar_patients: String,
    pub diet: String,
    pub medical: String,
    pub fitness: String,
}

impl Grounding {
    /// The medical context for a specialist stage; empty for other stages.
    pub fn for_specialist(&self, stage: Stage) -> &str {
        match stage {
            Stage::DietPlanning => &self.diet,
            Stage::MedicalEvaluation => &self.medical,
            Stage::FitnessPlanning => &self.fitness,
            Stage::Analysis | Stage::Coordination => "",
        }
    }
}

/// The retrieval query each grounded stage issues for `patient`.
pub fn queries(patient: &PatientRecord) -> [(Stage, &'static str, String); 4] {
    let summary = patient.profile_summary();
    let category = patient.bmi_category();
    [
        (Stage::Analysis, PATIENT_DATA, summary.clone()),
        (
            Stage::DietPlanning,
            MEDICAL_KNOWLEDGE,
            format!("Indian diet plan, calorie targets and meal guidelines for {category} patient: {summary}"),
        ),
        (
            Stage::MedicalEvaluation,
            MEDICAL_KNOWLEDGE,
            format!("Pharmacotherapy options and laboratory monitoring for {category} patient: {summary}"),
        ),
        (
            Stage::FitnessPlanning,
            MEDICAL_KNOWLEDGE,
            format!("Exercise and physical activity recommendations for {category} patient: {summary}"),
        ),
    ]
}

/// Retrieve grounding for every stage.
///
/// A missing corpus aborts. An embedding failure, or a lookup that
/// outlasts `timeout`, degrades that stage's context to the "no
/// information" text.
pub async fn gather(
    retriever: &ContextRetriever,
    patient: &PatientRecord,
    top_k: usize,
    timeout: Duration,
    run_id: &str,
    event_bus: &EventBus,
) -> Result<Grounding, RetrievalError> {
    let lookups = queries(patient).into_iter().map(|(stage, corpus, query)| async move {
        let outcome = tokio::time::timeout(timeout, retriever.retrieve(corpus, &query, top_k))
            .await
            .unwrap_or_else(|_| Err(RetrievalError::Embedding(format!("query timed out after {timeout:?}"))));
        let (text, hits, degraded) = match outcome {
            Ok(result) => {
                let hits = result.len();
                (render(stage, &result), hits, false)
            }
            Err(RetrievalError::Embedding(reason)) => {
                warn!(stage = %stage, corpus, %reason, "Retrieval degraded, continuing without context");
                (fallback(stage).to_string(), 0, true)
            }
            Err(e) => return Err(e),
        };

        debug!(stage = %stage, corpus, hits, degraded, "Grounding retrieved");
        event_bus.publish(PipelineEvent::ContextRetrieved {
            run_id: run_id.to_string(),
            corpus: corpus.to_string(),
            hits,
            degraded,
            timestamp: Utc::now(),
        });
        Ok::<_, RetrievalError>(text)
    });

    let mut texts = try_join_all(lookups).await?.into_iter();
    let mut next = || texts.next().unwrap_or_default();
    Ok(Grounding {
        similar_patients: next(),
        diet: next(),
        medical: next(),
        fitness: next(),
    })
}

fn render(stage: Stage, result: &RetrievalResult) -> String {
    match stage {
        Stage::Analysis => format_patient_context(result),
        _ => format_medical_context(result),
    }
}

fn fallback(stage: Stage) -> &'static str {
    match stage {
        Stage::Analysis => NO_PATIENT_CONTEXT,
        _ => NO_MEDICAL_CONTEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ToggleEmbedder, patient, test_retriever};
    use std::sync::Arc;

    const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn queries_target_the_right_corpora() {
        let p = patient();
        let q = queries(&p);
        assert_eq!(q[0].1, PATIENT_DATA);
        assert!(q[1..].iter().all(|(_, corpus, _)| *corpus == MEDICAL_KNOWLEDGE));
        assert!(q[2].2.contains("Pharmacotherapy"));
        assert!(q.iter().all(|(_, _, query)| query.contains("BMI 29.30")));
    }

    #[tokio::test]
    async fn gathers_context_for_every_stage() {
        let retriever = test_retriever(Arc::new(ToggleEmbedder::default())).await;
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let g = gather(&retriever, &patient(), 3, LOOKUP_TIMEOUT, "run-1", &bus).await.unwrap();
        assert!(g.similar_patients.starts_with("Similar Patient Cases (found 3"));
        assert!(!g.diet.is_empty());
        assert_ne!(g.medical, NO_MEDICAL_CONTEXT);
        assert_eq!(g.for_specialist(Stage::FitnessPlanning), g.fitness);
        assert_eq!(g.for_specialist(Stage::Coordination), "");

        let mut events = 0;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::ContextRetrieved { degraded, hits, .. } = event.as_ref() {
                assert!(!degraded);
                assert_eq!(*hits, 3);
                events += 1;
            }
        }
        assert_eq!(events, 4);
    }

    #[tokio::test]
    async fn embedding_failure_degrades_to_no_information() {
        let embedder = Arc::new(ToggleEmbedder::default());
        let retriever = test_retriever(embedder.clone()).await;
        embedder.fail_from_now_on();

        let g = gather(&retriever, &patient(), 3, LOOKUP_TIMEOUT, "run-2", &EventBus::default()).await.unwrap();
        assert_eq!(g.similar_patients, NO_PATIENT_CONTEXT);
        assert_eq!(g.diet, NO_MEDICAL_CONTEXT);
        assert_eq!(g.medical, NO_MEDICAL_CONTEXT);
        assert_eq!(g.fitness, NO_MEDICAL_CONTEXT);
    }

    #[tokio::test]
    async fn missing_corpus_aborts() {
        let retriever = ContextRetriever::new(
            Arc::new(ToggleEmbedder::default()),
            careplan_retrieval::TextSplitter::default(),
        );
        let err = gather(&retriever, &patient(), 3, LOOKUP_TIMEOUT, "run-3", &EventBus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::CorpusNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_degrades_after_timeout() {
        let embedder = Arc::new(ToggleEmbedder::default());
        let retriever = test_retriever(embedder.clone()).await;
        embedder.delay_from_now_on(Duration::from_secs(600));

        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let started = tokio::time::Instant::now();
        let g = gather(&retriever, &patient(), 3, LOOKUP_TIMEOUT, "run-4", &bus).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(600));
        assert_eq!(g.similar_patients, NO_PATIENT_CONTEXT);
        assert_eq!(g.medical, NO_MEDICAL_CONTEXT);

        let mut degraded = 0;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::ContextRetrieved { degraded: true, .. } = event.as_ref() {
                degraded += 1;
            }
        }
        assert_eq!(degraded, 4);
    }
}
