//! `careplan query`: Retrieve context from a corpus.

use careplan_config::{AppConfig, EmbedderKind};
use careplan_pipeline::{load_dataset, prepare_retriever};
use careplan_retrieval::{MEDICAL_KNOWLEDGE, PATIENT_DATA, format_medical_context, format_patient_context};
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CorpusArg {
    /// Bundled medical guidelines
    Medical,
    /// Indexed patient records
    Patients,
}

impl CorpusArg {
    pub fn corpus_id(self) -> &'static str {
        match self {
            CorpusArg::Medical => MEDICAL_KNOWLEDGE,
            CorpusArg::Patients => PATIENT_DATA,
        }
    }
}

pub async fn run(
    config: AppConfig,
    text: String,
    corpus: CorpusArg,
    top_k: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.retrieval.embedder == EmbedderKind::Provider {
        super::require_api_key(&config)?;
    }

    let dataset = load_dataset(&config)?;
    let router = careplan_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let retriever = prepare_retriever(&config, &dataset, provider, false).await?;

    let k = top_k.unwrap_or(config.retrieval.top_k);
    let result = retriever.retrieve(corpus.corpus_id(), &text, k).await?;

    println!();
    for (i, hit) in result.hits.iter().enumerate() {
        println!(
            "  #{} score={:.3} source={} doc={} chunk={}",
            i + 1,
            hit.score,
            hit.chunk.source,
            hit.chunk.document_id,
            hit.chunk.chunk_index
        );
    }
    println!();

    let context = match corpus {
        CorpusArg::Medical => format_medical_context(&result),
        CorpusArg::Patients => format_patient_context(&result),
    };
    println!("{context}");

    Ok(())
}
