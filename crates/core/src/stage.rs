//! Pipeline stages and their outputs.
//!
//! The treatment pipeline has five fixed stages. Analysis runs first;
//! the three specialist stages depend only on Analysis; Coordination
//! depends on all four.

use serde::{Deserialize, Serialize};

use crate::provider::Usage;

/// One step of the five-step treatment-planning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    DietPlanning,
    MedicalEvaluation,
    FitnessPlanning,
    Coordination,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Analysis,
        Stage::DietPlanning,
        Stage::MedicalEvaluation,
        Stage::FitnessPlanning,
        Stage::Coordination,
    ];

    /// The three specialist stages that run between Analysis and Coordination.
    pub const SPECIALISTS: [Stage; 3] = [
        Stage::DietPlanning,
        Stage::MedicalEvaluation,
        Stage::FitnessPlanning,
    ];

    /// Stable identifier, also the key of this stage's output.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Analysis => "analysis",
            Stage::DietPlanning => "diet_plan",
            Stage::MedicalEvaluation => "medical_evaluation",
            Stage::FitnessPlanning => "fitness_plan",
            Stage::Coordination => "coordination",
        }
    }

    /// Human-readable name for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Analysis => "Patient data analysis",
            Stage::DietPlanning => "Diet planning",
            Stage::MedicalEvaluation => "Medical evaluation",
            Stage::FitnessPlanning => "Fitness planning",
            Stage::Coordination => "Care coordination",
        }
    }

    /// Stages whose output must exist before this stage may run.
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::Analysis => &[],
            Stage::DietPlanning | Stage::MedicalEvaluation | Stage::FitnessPlanning => &[Stage::Analysis],
            Stage::Coordination => &[
                Stage::Analysis,
                Stage::DietPlanning,
                Stage::MedicalEvaluation,
                Stage::FitnessPlanning,
            ],
        }
    }

    /// Parse a stage from its key (`diet_plan`) or variant name (`diet_planning`).
    pub fn from_key(key: &str) -> Option<Stage> {
        match key.trim().to_ascii_lowercase().as_str() {
            "analysis" => Some(Stage::Analysis),
            "diet_plan" | "diet_planning" => Some(Stage::DietPlanning),
            "medical_evaluation" => Some(Stage::MedicalEvaluation),
            "fitness_plan" | "fitness_planning" => Some(Stage::FitnessPlanning),
            "coordination" => Some(Stage::Coordination),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// The text produced by one stage during one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: Stage,
    pub content: String,
    /// Model that produced the text.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StageOutput {
    pub fn new(stage: Stage, content: impl Into<String>) -> Self {
        Self {
            stage,
            content: content.into(),
            model: String::new(),
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_point_backwards() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            for dep in stage.dependencies() {
                let dep_pos = Stage::ALL.iter().position(|s| s == dep).unwrap();
                assert!(dep_pos < i, "{stage} depends on later stage {dep}");
            }
        }
    }

    #[test]
    fn specialists_only_need_analysis() {
        for stage in Stage::SPECIALISTS {
            assert_eq!(stage.dependencies(), &[Stage::Analysis]);
        }
        assert_eq!(Stage::Coordination.dependencies().len(), 4);
    }

    #[test]
    fn parse_from_key_or_variant() {
        assert_eq!(Stage::from_key("diet_plan"), Some(Stage::DietPlanning));
        assert_eq!(Stage::from_key("diet_planning"), Some(Stage::DietPlanning));
        assert_eq!(Stage::from_key("Medical_Evaluation"), Some(Stage::MedicalEvaluation));
        assert_eq!(Stage::from_key("triage"), None);
    }

    #[test]
    fn display_uses_key() {
        assert_eq!(Stage::FitnessPlanning.to_string(), "fitness_plan");
    }
}
