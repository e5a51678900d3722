//! Bundled medical knowledge for the `medical_knowledge` corpus.

use crate::corpus::SourceDocument;

/// The six reference documents shipped with the binary.
pub fn medical_documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(
            "who_guidelines",
            "WHO Guidelines",
            include_str!("../knowledge/who_guidelines.md"),
        )
        .with_meta("year", 2023),
        SourceDocument::new(
            "indian_research",
            "Indian Medical Research",
            include_str!("../knowledge/indian_research.md"),
        )
        .with_meta("topic", "Obesity"),
        SourceDocument::new(
            "pharmacotherapy",
            "Drug Database",
            include_str!("../knowledge/pharmacotherapy.md"),
        )
        .with_meta("topic", "Obesity Medications"),
        SourceDocument::new(
            "dietary_guidelines",
            "Nutrition Guidelines",
            include_str!("../knowledge/dietary_guidelines.md"),
        )
        .with_meta("region", "India"),
        SourceDocument::new(
            "exercise_guidelines",
            "Exercise Guidelines",
            include_str!("../knowledge/exercise_guidelines.md"),
        )
        .with_meta("region", "India"),
        SourceDocument::new(
            "lab_monitoring",
            "Clinical Guidelines",
            include_str!("../knowledge/lab_monitoring.md"),
        )
        .with_meta("topic", "Lab Tests"),
    ]
}
