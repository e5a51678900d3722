//! The patient dataset: a fixed, read-only table of NFHS-5 records.
//!
//! Rows are decoded once at load time into [`PatientRecord`]s. Row
//! position is the identity: the record at CSV data row `i` is always
//! `NFHS_{i}`, even when earlier rows were skipped as invalid.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use careplan_core::{BmiCategory, Gender, PatientAttributes, PatientDataError, PatientRecord};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codes;

const BUNDLED_SAMPLE: &str = include_str!("../data/patients_sample.csv");

/// One CSV row as stored on disk. Blank cells decode as `None`.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "BMI")]
    bmi: Option<f64>,
    #[serde(rename = "Weight_kg")]
    weight_kg: Option<f64>,
    #[serde(rename = "Height_cm")]
    height_cm: Option<f64>,
    #[serde(rename = "BMI_Category")]
    bmi_category: Option<String>,
    #[serde(rename = "Age")]
    age: Option<f64>,
    #[serde(rename = "State")]
    state: Option<f64>,
    #[serde(rename = "Urban_Rural")]
    urban_rural: Option<f64>,
    #[serde(rename = "Wealth_Index")]
    wealth_index: Option<f64>,
}

impl CsvRow {
    fn into_record(self, row: usize) -> Result<PatientRecord, PatientDataError> {
        let age = self.age.ok_or_else(|| PatientDataError::invalid("age", "missing"))?;
        let height_cm = self
            .height_cm
            .ok_or_else(|| PatientDataError::invalid("height_cm", "missing"))?;
        let weight_kg = self
            .weight_kg
            .ok_or_else(|| PatientDataError::invalid("weight_kg", "missing"))?;

        let mut attrs = PatientAttributes::new(age as i32, Gender::NotRecorded, height_cm, weight_kg);
        attrs.patient_id = Some(format!("NFHS_{row}"));
        attrs.state = codes::state_name(self.state.map(|c| c as i64).unwrap_or(0)).to_string();
        attrs.residence_type = codes::residence(self.urban_rural.map(|c| c as i64));
        attrs.wealth_index = codes::wealth(self.wealth_index.map(|c| c as i64));

        let record = PatientRecord::from_attributes(attrs)?;

        // The stored category uses the same cutoffs; flag drift but trust the recomputation.
        if let Some(stored) = self.bmi_category.as_deref().and_then(BmiCategory::from_label)
            && stored != record.bmi_category()
        {
            debug!(
                row,
                stored = %stored,
                computed = %record.bmi_category(),
                stored_bmi = self.bmi.unwrap_or_default(),
                "Stored BMI category differs from recomputed value"
            );
        }

        Ok(record)
    }
}

/// Filters for [`PatientDataset::by_criteria`]. Unset fields match everything.
/// Matching is exact on the decoded label, ignoring case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Criteria {
    pub state: Option<String>,
    pub residence_type: Option<String>,
    pub bmi_category: Option<String>,
    pub wealth_index: Option<String>,
}

impl Criteria {
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn residence_type(mut self, residence: impl Into<String>) -> Self {
        self.residence_type = Some(residence.into());
        self
    }

    pub fn bmi_category(mut self, category: impl Into<String>) -> Self {
        self.bmi_category = Some(category.into());
        self
    }

    pub fn wealth_index(mut self, wealth: impl Into<String>) -> Self {
        self.wealth_index = Some(wealth.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.residence_type.is_none()
            && self.bmi_category.is_none()
            && self.wealth_index.is_none()
    }

    pub fn matches(&self, record: &PatientRecord) -> bool {
        fn eq(filter: &Option<String>, label: &str) -> bool {
            filter
                .as_deref()
                .is_none_or(|f| f.trim().eq_ignore_ascii_case(label))
        }

        eq(&self.state, record.state())
            && eq(&self.residence_type, record.residence_type().label())
            && eq(&self.bmi_category, record.bmi_category().label())
            && eq(&self.wealth_index, record.wealth_index().label())
    }
}

/// Aggregate figures over the whole dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetStats {
    pub total_records: usize,
    pub bmi_categories: BTreeMap<String, usize>,
    pub average_bmi: f64,
    pub average_age: f64,
    pub average_weight_kg: f64,
    pub average_height_cm: f64,
    pub states: BTreeMap<String, usize>,
    pub residence_types: BTreeMap<String, usize>,
    pub wealth_tiers: BTreeMap<String, usize>,
}

/// A fixed, pre-loaded patient table.
#[derive(Debug, Clone)]
pub struct PatientDataset {
    source: String,
    records: Vec<PatientRecord>,
    /// CSV row -> position in `records`; `None` for rows skipped at load.
    rows: Vec<Option<usize>>,
}

impl PatientDataset {
    /// Load a CSV file with the NFHS column layout.
    pub fn from_csv_path(path: &Path) -> Result<Self, PatientDataError> {
        let file = std::fs::File::open(path).map_err(|e| {
            PatientDataError::Dataset(format!("Failed to open dataset at {}: {e}", path.display()))
        })?;
        Self::from_reader(file, path.display().to_string())
    }

    /// The small sample table compiled into the binary.
    pub fn bundled() -> Result<Self, PatientDataError> {
        Self::from_reader(BUNDLED_SAMPLE.as_bytes(), "bundled sample")
    }

    /// Parse CSV from any reader. Invalid rows are skipped with a warning.
    pub fn from_reader<R: Read>(reader: R, source: impl Into<String>) -> Result<Self, PatientDataError> {
        let source = source.into();
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut records = Vec::new();
        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for (row, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
            let parsed = result
                .map_err(|e| PatientDataError::invalid("row", e.to_string()))
                .and_then(|r| r.into_record(row));
            match parsed {
                Ok(record) => {
                    rows.push(Some(records.len()));
                    records.push(record);
                }
                Err(e) => {
                    rows.push(None);
                    skipped += 1;
                    warn!(row, error = %e, "Skipping invalid patient row");
                }
            }
        }

        info!(source = %source, records = records.len(), skipped, "Loaded patient dataset");
        Ok(Self { source, records, rows })
    }

    /// Wrap already-validated records.
    pub fn from_records(records: Vec<PatientRecord>) -> Self {
        Self {
            source: "in-memory".into(),
            rows: (0..records.len()).map(Some).collect(),
            records,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of valid records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of source rows, including rows skipped as invalid.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    /// A uniformly random record.
    pub fn random(&self) -> Result<&PatientRecord, PatientDataError> {
        self.random_with(&mut rand::rng())
    }

    pub fn random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&PatientRecord, PatientDataError> {
        self.records
            .choose(rng)
            .ok_or_else(|| PatientDataError::Dataset("dataset is empty".into()))
    }

    /// The record loaded from source row `index` in `[0, row_count)`.
    ///
    /// A row that failed validation at load time yields
    /// [`PatientDataError::InvalidPatientData`].
    pub fn by_index(&self, index: usize) -> Result<&PatientRecord, PatientDataError> {
        match self.rows.get(index) {
            None => Err(PatientDataError::IndexOutOfRange {
                index,
                len: self.rows.len(),
            }),
            Some(None) => Err(PatientDataError::invalid(
                "row",
                format!("row {index} failed validation when the dataset was loaded"),
            )),
            Some(Some(pos)) => self.records.get(*pos).ok_or_else(|| {
                PatientDataError::Dataset(format!("row {index} points past the loaded records"))
            }),
        }
    }

    /// Records matching `criteria`. When more than `limit` match, `limit`
    /// of them are sampled uniformly without replacement.
    pub fn by_criteria(&self, criteria: &Criteria, limit: usize) -> Vec<&PatientRecord> {
        self.by_criteria_with(&mut rand::rng(), criteria, limit)
    }

    pub fn by_criteria_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        criteria: &Criteria,
        limit: usize,
    ) -> Vec<&PatientRecord> {
        let matching: Vec<&PatientRecord> = self.records.iter().filter(|r| criteria.matches(r)).collect();

        if matching.len() <= limit {
            return matching;
        }
        matching.choose_multiple(rng, limit).copied().collect()
    }

    pub fn stats(&self) -> DatasetStats {
        let total = self.records.len();
        if total == 0 {
            return DatasetStats::default();
        }

        let mut stats = DatasetStats {
            total_records: total,
            ..DatasetStats::default()
        };
        let (mut bmi, mut age, mut weight, mut height) = (0.0, 0.0, 0.0, 0.0);

        for r in &self.records {
            bmi += r.bmi();
            age += r.age() as f64;
            weight += r.weight_kg();
            height += r.height_cm();
            *stats.bmi_categories.entry(r.bmi_category().to_string()).or_default() += 1;
            *stats.states.entry(r.state().to_string()).or_default() += 1;
            *stats
                .residence_types
                .entry(r.residence_type().to_string())
                .or_default() += 1;
            *stats.wealth_tiers.entry(r.wealth_index().to_string()).or_default() += 1;
        }

        let n = total as f64;
        stats.average_bmi = round2(bmi / n);
        stats.average_age = round2(age / n);
        stats.average_weight_kg = round2(weight / n);
        stats.average_height_cm = round2(height / n);
        stats
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
