//! Patient-corpus documents: one natural-language profile per record.

use careplan_core::{BmiCategory, PatientRecord};
use careplan_retrieval::SourceDocument;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::dataset::PatientDataset;

/// Seed for the indexing sample, so a sampled corpus is reproducible.
const SAMPLE_SEED: u64 = 42;

pub const PATIENT_SOURCE: &str = "NFHS-5 Patient Records";

/// Build one document per record, or per record of a deterministic
/// sample of `sample_size` when set. Sampled records keep dataset order.
pub fn patient_documents(dataset: &PatientDataset, sample_size: Option<usize>) -> Vec<SourceDocument> {
    let records = dataset.records();
    let selected: Vec<&PatientRecord> = match sample_size {
        Some(n) if n < records.len() => {
            let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
            let mut indices = rand::seq::index::sample(&mut rng, records.len(), n).into_vec();
            indices.sort_unstable();
            indices.into_iter().map(|i| &records[i]).collect()
        }
        _ => records.iter().collect(),
    };

    selected.into_iter().map(patient_document).collect()
}

pub fn patient_document(record: &PatientRecord) -> SourceDocument {
    SourceDocument::new(record.patient_id(), PATIENT_SOURCE, describe(record))
        .with_meta("patient_id", record.patient_id())
        .with_meta("age", record.age())
        .with_meta("height", format!("{:.1}", record.height_cm()))
        .with_meta("weight", format!("{:.1}", record.weight_kg()))
        .with_meta("bmi", format!("{:.2}", record.bmi()))
        .with_meta("bmi_category", record.bmi_category())
        .with_meta("state", record.state())
        .with_meta("residence_type", record.residence_type())
        .with_meta("wealth_index", record.wealth_index())
        .with_meta("record_type", "patient_data")
}

fn describe(r: &PatientRecord) -> String {
    let category = r.bmi_category();
    let mut text = format!(
        "Patient Profile:\n\
         - Demographics: {age} year old from {state}, {residence} area\n\
         - Socioeconomic Status: {wealth} wealth index\n\
         - Physical Measurements: Height {height:.1}cm, Weight {weight:.1}kg\n\
         - Body Mass Index: {bmi:.2} ({category})\n\
         - Health Classification: {category} BMI category\n",
        age = r.age(),
        state = r.state(),
        residence = r.residence_type(),
        wealth = r.wealth_index(),
        height = r.height_cm(),
        weight = r.weight_kg(),
        bmi = r.bmi(),
    );

    let clinical = match category {
        BmiCategory::Obese => Some((
            "Clinical Concerns: High risk for obesity-related comorbidities including type 2 diabetes, hypertension, cardiovascular disease",
            "Treatment Priority: Weight loss of 5-10% recommended, lifestyle modifications essential, consider pharmacotherapy",
        )),
        BmiCategory::Overweight => Some((
            "Clinical Concerns: Moderate risk for metabolic syndrome and chronic diseases",
            "Treatment Priority: Weight management through diet and exercise, prevent progression to obesity",
        )),
        BmiCategory::Normal => Some((
            "Clinical Status: Healthy weight range",
            "Treatment Priority: Maintenance of current weight, healthy lifestyle habits",
        )),
        BmiCategory::Underweight => Some((
            "Clinical Concerns: Risk of nutritional deficiencies, weakened immunity",
            "Treatment Priority: Weight gain through balanced nutrition, rule out underlying conditions",
        )),
        BmiCategory::Invalid => None,
    };
    if let Some((concerns, priority)) = clinical {
        text.push_str(&format!("- {concerns}\n- {priority}\n"));
    }

    text.push_str(&format!(
        "- Regional Considerations: Patient from {} - consider local food availability, cultural dietary practices, and regional health infrastructure\n\
         - Socioeconomic Context: {} wealth index - treatment plan should be cost-appropriate and accessible",
        r.state(),
        r.wealth_index(),
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_carries_profile_and_metadata() {
        let ds = PatientDataset::bundled().unwrap();
        let record = ds.by_index(1).unwrap();
        let doc = patient_document(record);

        assert_eq!(doc.id, "NFHS_1");
        assert_eq!(doc.source, PATIENT_SOURCE);
        assert!(doc.content.starts_with("Patient Profile:"));
        assert!(doc.content.contains("Regional Considerations: Patient from West Bengal"));
        assert!(doc.content.contains("consider pharmacotherapy"));
        assert_eq!(doc.metadata["bmi_category"], "Obese");
        assert_eq!(doc.metadata["bmi"], "35.31");
        assert_eq!(doc.metadata["residence_type"], "Rural");
    }

    #[test]
    fn full_corpus_by_default() {
        let ds = PatientDataset::bundled().unwrap();
        assert_eq!(patient_documents(&ds, None).len(), ds.len());
        assert_eq!(patient_documents(&ds, Some(1000)).len(), ds.len());
    }

    #[test]
    fn sample_is_deterministic_and_ordered() {
        let ds = PatientDataset::bundled().unwrap();
        let a: Vec<String> = patient_documents(&ds, Some(10)).into_iter().map(|d| d.id).collect();
        let b: Vec<String> = patient_documents(&ds, Some(10)).into_iter().map(|d| d.id).collect();
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);

        let positions: Vec<usize> = a
            .iter()
            .map(|id| id.trim_start_matches("NFHS_").parse().unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
