//! `careplan index`: Build and persist the retrieval indexes.

use careplan_config::{AppConfig, EmbedderKind};
use careplan_pipeline::{load_dataset, prepare_retriever};
use careplan_retrieval::{MEDICAL_KNOWLEDGE, PATIENT_DATA};

pub async fn run(config: AppConfig, rebuild: bool) -> Result<(), Box<dyn std::error::Error>> {
    if config.retrieval.embedder == EmbedderKind::Provider {
        super::require_api_key(&config)?;
    }

    let dataset = load_dataset(&config)?;
    let router = careplan_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;

    let index_dir = config.retrieval.index_dir();
    println!();
    println!("  🔎 Building retrieval indexes");
    println!("  ========================================");
    println!("  Dataset:    {} ({} records)", dataset.source(), dataset.len());
    if let Some(n) = config.retrieval.patient_sample_size {
        println!("  Sample:     {n} patients");
    }
    println!("  Index dir:  {}", index_dir.display());

    let retriever = prepare_retriever(&config, &dataset, provider, rebuild).await?;

    println!("  Embedder:   {}", retriever.embedder().fingerprint());
    println!();
    println!("  ✅ {MEDICAL_KNOWLEDGE}: {} chunks", retriever.corpus_len(MEDICAL_KNOWLEDGE));
    println!("  ✅ {PATIENT_DATA}: {} chunks", retriever.corpus_len(PATIENT_DATA));
    println!();

    Ok(())
}
