//! `careplan plan`: Generate a treatment plan for one patient.

use std::path::PathBuf;

use careplan_config::AppConfig;
use careplan_core::PipelineEvent;
use careplan_pipeline::{CareContext, TreatmentReport};
use clap::ValueEnum;
use tokio::sync::broadcast::error::RecvError;

use super::patients::PatientArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Markdown,
    Json,
}

pub struct PlanOptions {
    pub output: Option<PathBuf>,
    pub format: ReportFormat,
    pub show_stages: bool,
    pub sequential: bool,
}

pub async fn run(
    mut config: AppConfig,
    patient: PatientArgs,
    options: PlanOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    super::require_api_key(&config)?;
    if options.sequential {
        config.pipeline.parallel_specialists = false;
    }

    eprintln!("  Loading patient data and knowledge base...");
    let ctx = CareContext::bootstrap(config).await?;
    let record = patient.select_one(ctx.dataset())?;

    eprintln!();
    eprintln!("  Patient:   {}", record.patient_id());
    eprintln!("  Profile:   {}", record.profile_summary());
    eprintln!("  Location:  {}", record.location_context());
    eprintln!("  Model:     {}", ctx.pipeline().model());
    eprintln!();

    // Render progress while the pipeline runs
    let mut rx = ctx.event_bus().subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = ctx.plan_for(&record).await;
    progress.abort();
    let report = result?;

    let rendered = render(&report, options.format, options.show_stages)?;
    println!("{rendered}");

    if let Some(path) = options.output {
        std::fs::write(&path, &rendered)?;
        eprintln!("  Report saved to {}", path.display());
    }
    eprintln!(
        "  Tokens used: {} (prompt {}, completion {})",
        report.usage.total_tokens, report.usage.prompt_tokens, report.usage.completion_tokens
    );

    Ok(())
}

fn render(report: &TreatmentReport, format: ReportFormat, show_stages: bool) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Markdown => Ok(report.to_markdown(show_stages)),
        ReportFormat::Json => serde_json::to_string_pretty(report),
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Progress {
            fraction, description, ..
        } => eprintln!("  [{:>3.0}%] {description}", fraction * 100.0),
        PipelineEvent::StageCompleted { stage, duration_ms, .. } => {
            eprintln!("         ✅ {} ({:.1}s)", stage.label(), *duration_ms as f64 / 1000.0)
        }
        PipelineEvent::StageFailed {
            stage, error_message, ..
        } => eprintln!("         ❌ {}: {error_message}", stage.label()),
        PipelineEvent::ContextRetrieved { corpus, degraded: true, .. } => {
            eprintln!("         ⚠️  {corpus} retrieval unavailable, continuing without it")
        }
        _ => {}
    }
}
