//! `careplan patients`: Look up patient records.
//!
//! Also home of [`PatientArgs`], the selection flags shared with `plan`.

use careplan_config::AppConfig;
use careplan_core::{Gender, PatientAttributes, PatientRecord, ResidenceType, WealthTier};
use careplan_patients::codes::{self, UNKNOWN};
use careplan_patients::{Criteria, PatientDataset};
use careplan_pipeline::{format_patient_data, load_dataset};
use clap::Args;

/// How to pick a patient: a manual description (`--age` with `--height`
/// and `--weight`), a dataset row (`--index`), dataset filters, or a
/// random record when nothing is given.
#[derive(Args, Debug, Default, Clone)]
pub struct PatientArgs {
    /// Dataset row index
    #[arg(long, conflicts_with = "age")]
    pub index: Option<usize>,

    /// State name (filter, or the patient's state with --age)
    #[arg(long)]
    pub state: Option<String>,

    /// Urban or Rural
    #[arg(long)]
    pub residence: Option<String>,

    /// Underweight, Normal, Overweight or Obese (filter only)
    #[arg(long, conflicts_with = "age")]
    pub bmi_category: Option<String>,

    /// Poorest, Poorer, Middle, Richer or Richest
    #[arg(long)]
    pub wealth: Option<String>,

    /// Age in years; describes a patient manually
    #[arg(long, requires_all = ["height", "weight"])]
    pub age: Option<i32>,

    #[arg(long, requires = "age")]
    pub gender: Option<String>,

    /// Height in cm
    #[arg(long, requires = "age")]
    pub height: Option<f64>,

    /// Weight in kg
    #[arg(long, requires = "age")]
    pub weight: Option<f64>,

    #[arg(long, requires = "age")]
    pub name: Option<String>,

    /// Dietary preference (e.g. vegetarian)
    #[arg(long, requires = "age")]
    pub diet: Option<String>,

    /// Physical activity level
    #[arg(long, requires = "age")]
    pub activity: Option<String>,

    #[arg(long, requires = "age")]
    pub daily_steps: Option<u32>,

    #[arg(long, requires = "age")]
    pub smoking: Option<String>,

    #[arg(long, requires = "age")]
    pub alcohol: Option<String>,
}

impl PatientArgs {
    pub fn criteria(&self) -> Criteria {
        Criteria {
            state: self.state.clone(),
            residence_type: self.residence.clone(),
            bmi_category: self.bmi_category.clone(),
            wealth_index: self.wealth.clone(),
        }
    }

    /// Build a record from the manual flags, if `--age` was given.
    pub fn manual_record(&self) -> Option<Result<PatientRecord, careplan_core::PatientDataError>> {
        let age = self.age?;
        let mut attrs = PatientAttributes::new(
            age,
            self.gender.as_deref().map(Gender::parse).unwrap_or_default(),
            self.height.unwrap_or_default(),
            self.weight.unwrap_or_default(),
        );
        attrs.name = self.name.clone();
        if let Some(state) = &self.state {
            attrs.state = state.clone();
        }
        attrs.residence_type = self
            .residence
            .as_deref()
            .and_then(ResidenceType::from_label)
            .unwrap_or_default();
        attrs.wealth_index = self
            .wealth
            .as_deref()
            .and_then(WealthTier::from_label)
            .unwrap_or_default();
        attrs.dietary_preference = self.diet.clone();
        attrs.physical_activity = self.activity.clone();
        attrs.daily_steps = self.daily_steps;
        attrs.smoking_status = self.smoking.clone();
        attrs.alcohol_consumption = self.alcohol.clone();
        Some(PatientRecord::from_attributes(attrs))
    }

    /// Up to `limit` records per the selection rules.
    pub fn select(
        &self,
        dataset: &PatientDataset,
        limit: usize,
    ) -> Result<Vec<PatientRecord>, Box<dyn std::error::Error>> {
        let args = self.with_canonical_state()?;
        args.select_checked(dataset, limit)
    }

    /// Replace `--state` with its canonical spelling, rejecting names
    /// outside the state table.
    fn with_canonical_state(&self) -> Result<Self, String> {
        let mut args = self.clone();
        if let Some(name) = &self.state {
            let canonical = if name.trim().eq_ignore_ascii_case(UNKNOWN) {
                UNKNOWN
            } else {
                let code = codes::state_code(name).ok_or_else(|| {
                    format!(
                        "Unknown state '{name}'. Known states: {}",
                        codes::state_names().join(", ")
                    )
                })?;
                codes::state_name(code)
            };
            args.state = Some(canonical.to_string());
        }
        Ok(args)
    }

    fn select_checked(
        &self,
        dataset: &PatientDataset,
        limit: usize,
    ) -> Result<Vec<PatientRecord>, Box<dyn std::error::Error>> {
        if let Some(record) = self.manual_record() {
            return Ok(vec![record?]);
        }
        if let Some(index) = self.index {
            return Ok(vec![dataset.by_index(index)?.clone()]);
        }

        let criteria = self.criteria();
        if criteria.is_empty() {
            return Ok(vec![dataset.random()?.clone()]);
        }

        let matches = dataset.by_criteria(&criteria, limit.max(1));
        if matches.is_empty() {
            return Err(format!("No patients found matching {}", describe(&criteria)).into());
        }
        Ok(matches.into_iter().cloned().collect())
    }

    pub fn select_one(&self, dataset: &PatientDataset) -> Result<PatientRecord, Box<dyn std::error::Error>> {
        self.select(dataset, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| "No patient selected".into())
    }
}

fn describe(c: &Criteria) -> String {
    let parts: Vec<String> = [
        ("state", &c.state),
        ("residence", &c.residence_type),
        ("BMI category", &c.bmi_category),
        ("wealth", &c.wealth_index),
    ]
    .into_iter()
    .filter_map(|(label, v)| v.as_ref().map(|v| format!("{label}={v}")))
    .collect();
    parts.join(", ")
}

pub async fn run(
    config: AppConfig,
    args: PatientArgs,
    limit: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load_dataset(&config)?;
    let records = args.select(&dataset, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!();
    println!("  Dataset: {} ({} records)", dataset.source(), dataset.len());
    for record in &records {
        println!();
        println!("  ── {} ──", record.patient_id());
        println!("  {}", record.profile_summary());
        println!();
        for line in format_patient_data(record).lines() {
            println!("  {line}");
        }
    }
    println!();
    Ok(())
}
