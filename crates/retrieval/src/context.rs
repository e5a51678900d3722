//! Rendering retrieval results into prompt-ready context blocks.

use crate::corpus::RetrievalResult;

pub const NO_MEDICAL_CONTEXT: &str = "No relevant medical information found.";
pub const NO_PATIENT_CONTEXT: &str = "No similar patient records found.";

/// Format medical-knowledge hits as numbered, source-attributed snippets.
pub fn format_medical_context(result: &RetrievalResult) -> String {
    if result.is_empty() {
        return NO_MEDICAL_CONTEXT.to_string();
    }

    let mut context = String::from("Relevant Medical Knowledge:\n\n");
    for (i, hit) in result.hits.iter().enumerate() {
        let source = if hit.chunk.source.is_empty() {
            "Unknown"
        } else {
            hit.chunk.source.as_str()
        };
        context.push_str(&format!("Source {} ({}):\n{}\n\n", i + 1, source, hit.chunk.content));
    }
    context
}

/// Format patient-corpus hits as a list of comparable cases, using the
/// structured metadata stored with each patient document.
pub fn format_patient_context(result: &RetrievalResult) -> String {
    if result.is_empty() {
        return NO_PATIENT_CONTEXT.to_string();
    }

    let mut context = format!(
        "Similar Patient Cases (found {} similar patients):\n\n",
        result.len()
    );
    for (i, hit) in result.hits.iter().enumerate() {
        let chunk = &hit.chunk;
        let meta = |key: &str| chunk.meta(key).unwrap_or("Unknown");
        let bmi = chunk
            .meta("bmi")
            .and_then(|b| b.parse::<f64>().ok())
            .map(|b| format!("{b:.2}"))
            .unwrap_or_else(|| "Unknown".into());

        context.push_str(&format!("Patient {} (ID: {}):\n", i + 1, meta("patient_id")));
        context.push_str(&format!("- Age: {} years\n", meta("age")));
        context.push_str(&format!("- BMI: {} ({})\n", bmi, meta("bmi_category")));
        context.push_str(&format!("- Location: {}, {}\n", meta("state"), meta("residence_type")));
        context.push_str(&format!("- Wealth Index: {}\n", meta("wealth_index")));
        context.push_str(&format!(
            "- Height: {}cm, Weight: {}kg\n\n",
            meta("height"),
            meta("weight")
        ));
    }
    context
}
