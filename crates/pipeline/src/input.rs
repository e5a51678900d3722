//! Typed stage inputs.
//!
//! Each input carries exactly the upstream outputs its stage depends
//! on. A specialist input has one `analysis` slot and one grounding
//! slot, so no specialist can see another specialist's output.

use careplan_core::{PatientRecord, Stage};

use crate::roles::{MEDICAL_CONTEXT, SIMILAR_PATIENTS};

/// What a stage hands to the prompt assembler.
pub trait StageInput: Send + Sync {
    fn stage(&self) -> Stage;
    fn patient(&self) -> &PatientRecord;
    /// Upstream bindings, excluding `patient_data`.
    fn bindings(&self) -> Vec<(&'static str, &str)>;
}

pub struct AnalysisInput<'a> {
    pub patient: &'a PatientRecord,
    pub similar_patients: &'a str,
}

impl StageInput for AnalysisInput<'_> {
    fn stage(&self) -> Stage {
        Stage::Analysis
    }

    fn patient(&self) -> &PatientRecord {
        self.patient
    }

    fn bindings(&self) -> Vec<(&'static str, &str)> {
        vec![(SIMILAR_PATIENTS, self.similar_patients)]
    }
}

pub struct SpecialistInput<'a> {
    stage: Stage,
    pub patient: &'a PatientRecord,
    pub analysis: &'a str,
    pub grounding: &'a str,
}

impl<'a> SpecialistInput<'a> {
    /// Returns `None` unless `stage` is one of [`Stage::SPECIALISTS`].
    pub fn new(stage: Stage, patient: &'a PatientRecord, analysis: &'a str, grounding: &'a str) -> Option<Self> {
        Stage::SPECIALISTS.contains(&stage).then_some(Self {
            stage,
            patient,
            analysis,
            grounding,
        })
    }
}

impl StageInput for SpecialistInput<'_> {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn patient(&self) -> &PatientRecord {
        self.patient
    }

    fn bindings(&self) -> Vec<(&'static str, &str)> {
        vec![
            (Stage::Analysis.key(), self.analysis),
            (MEDICAL_CONTEXT, self.grounding),
        ]
    }
}

pub struct CoordinationInput<'a> {
    pub patient: &'a PatientRecord,
    pub analysis: &'a str,
    pub diet_plan: &'a str,
    pub medical_evaluation: &'a str,
    pub fitness_plan: &'a str,
}

impl StageInput for CoordinationInput<'_> {
    fn stage(&self) -> Stage {
        Stage::Coordination
    }

    fn patient(&self) -> &PatientRecord {
        self.patient
    }

    fn bindings(&self) -> Vec<(&'static str, &str)> {
        vec![
            (Stage::Analysis.key(), self.analysis),
            (Stage::DietPlanning.key(), self.diet_plan),
            (Stage::MedicalEvaluation.key(), self.medical_evaluation),
            (Stage::FitnessPlanning.key(), self.fitness_plan),
        ]
    }
}
