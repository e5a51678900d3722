//! The final treatment report.

use careplan_core::{Stage, StageOutput, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a successful pipeline run. `content` is the Coordination
/// stage's output verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentReport {
    pub run_id: String,
    pub patient_id: String,
    pub content: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    /// Token usage summed over all stages that reported it.
    pub usage: Usage,
    /// Every stage output, in execution order.
    pub stages: Vec<StageOutput>,
}

impl TreatmentReport {
    pub(crate) fn from_stages(run_id: String, patient_id: &str, stages: Vec<StageOutput>) -> Self {
        let mut usage = Usage::default();
        for output in &stages {
            if let Some(u) = &output.usage {
                usage.add(u);
            }
        }
        let (content, model) = stages
            .iter()
            .find(|s| s.stage == Stage::Coordination)
            .map(|s| (s.content.clone(), s.model.clone()))
            .unwrap_or_default();

        Self {
            run_id,
            patient_id: patient_id.to_string(),
            content,
            model,
            generated_at: Utc::now(),
            usage,
            stages,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Markdown rendering with a short header. Intermediate stages are
    /// appended when `include_stages` is set.
    pub fn to_markdown(&self, include_stages: bool) -> String {
        let mut out = format!(
            "# Treatment Plan: {}\n\n_Generated {} by {}_\n\n{}\n",
            self.patient_id,
            self.generated_at.format("%Y-%m-%d %H:%M UTC"),
            self.model,
            self.content.trim_end(),
        );
        if include_stages {
            for output in self.stages.iter().filter(|s| s.stage != Stage::Coordination) {
                out.push_str(&format!("\n---\n\n## {}\n\n{}\n", output.stage.label(), output.content.trim_end()));
            }
        }
        out
    }
}
