//! Patient record domain type and BMI classification.
//!
//! A [`PatientRecord`] is an immutable snapshot created either from a
//! dataset row or from a user form ([`PatientAttributes`]). BMI and the
//! contextual descriptions are derived once at creation and never
//! recomputed.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::PatientDataError;

/// Minimum age accepted for treatment planning.
pub const MIN_AGE: i32 = 18;

/// BMI category using the WHO cutoffs for Asian populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
    /// Marker for BMI values that could not be computed (non-positive inputs).
    Invalid,
}

impl BmiCategory {
    /// Classify a BMI value. `< 18.5` Underweight, `< 23.0` Normal,
    /// `< 27.5` Overweight, otherwise Obese. Non-positive or non-finite
    /// values are `Invalid`.
    pub fn classify(bmi: f64) -> Self {
        if !bmi.is_finite() || bmi <= 0.0 {
            BmiCategory::Invalid
        } else if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 23.0 {
            BmiCategory::Normal
        } else if bmi < 27.5 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
            BmiCategory::Invalid => "Invalid",
        }
    }

    /// Case-insensitive parse of a category label.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            BmiCategory::Underweight,
            BmiCategory::Normal,
            BmiCategory::Overweight,
            BmiCategory::Obese,
            BmiCategory::Invalid,
        ]
        .into_iter()
        .find(|c| c.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl std::fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A computed BMI value (rounded to two decimals) and its category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BmiAssessment {
    pub value: f64,
    pub category: BmiCategory,
}

impl BmiAssessment {
    /// BMI = weight_kg / height_m². Never panics: invalid inputs yield
    /// `value = 0.0` with [`BmiCategory::Invalid`].
    pub fn compute(weight_kg: f64, height_cm: f64) -> Self {
        if !weight_kg.is_finite() || !height_cm.is_finite() || weight_kg <= 0.0 || height_cm <= 0.0 {
            return Self::invalid();
        }
        let height_m = height_cm / 100.0;
        let bmi = weight_kg / (height_m * height_m);
        let value = (bmi * 100.0).round() / 100.0;
        Self {
            value,
            category: BmiCategory::classify(value),
        }
    }

    pub fn invalid() -> Self {
        Self {
            value: 0.0,
            category: BmiCategory::Invalid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.category != BmiCategory::Invalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Other,
    #[default]
    #[serde(alias = "Not recorded")]
    NotRecorded,
}

impl Gender {
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Male => "Male",
            Gender::Other => "Other",
            Gender::NotRecorded => "Not recorded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" | "f" | "woman" => Gender::Female,
            "male" | "m" | "man" => Gender::Male,
            "other" => Gender::Other,
            _ => Gender::NotRecorded,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Place of residence, decoded from the dataset's `Urban_Rural` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResidenceType {
    Urban,
    Rural,
    #[default]
    Unknown,
}

impl ResidenceType {
    /// `1` Urban, `2` Rural, anything else Unknown.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ResidenceType::Urban,
            2 => ResidenceType::Rural,
            _ => ResidenceType::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResidenceType::Urban => "Urban",
            ResidenceType::Rural => "Rural",
            ResidenceType::Unknown => "Unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [ResidenceType::Urban, ResidenceType::Rural, ResidenceType::Unknown]
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl std::fmt::Display for ResidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Household wealth quintile, decoded from the dataset's `Wealth_Index` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WealthTier {
    Poorest,
    Poorer,
    Middle,
    Richer,
    Richest,
    #[default]
    Unknown,
}

impl WealthTier {
    /// `1..=5` map to Poorest..Richest, anything else Unknown.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => WealthTier::Poorest,
            2 => WealthTier::Poorer,
            3 => WealthTier::Middle,
            4 => WealthTier::Richer,
            5 => WealthTier::Richest,
            _ => WealthTier::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WealthTier::Poorest => "Poorest",
            WealthTier::Poorer => "Poorer",
            WealthTier::Middle => "Middle",
            WealthTier::Richer => "Richer",
            WealthTier::Richest => "Richest",
            WealthTier::Unknown => "Unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            WealthTier::Poorest,
            WealthTier::Poorer,
            WealthTier::Middle,
            WealthTier::Richer,
            WealthTier::Richest,
            WealthTier::Unknown,
        ]
        .into_iter()
        .find(|w| w.label().eq_ignore_ascii_case(label.trim()))
    }

    fn is_affluent(&self) -> bool {
        matches!(self, WealthTier::Richer | WealthTier::Richest)
    }
}

impl std::fmt::Display for WealthTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw, unvalidated patient attributes as entered in a form or decoded
/// from a dataset row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAttributes {
    /// Stable identifier. Generated from the current time if absent.
    #[serde(default)]
    pub patient_id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    pub age: i32,

    #[serde(default)]
    pub gender: Gender,

    pub height_cm: f64,

    pub weight_kg: f64,

    #[serde(default = "unknown_label")]
    pub state: String,

    #[serde(default)]
    pub residence_type: ResidenceType,

    #[serde(default)]
    pub wealth_index: WealthTier,

    #[serde(default)]
    pub dietary_preference: Option<String>,

    #[serde(default)]
    pub physical_activity: Option<String>,

    #[serde(default)]
    pub daily_steps: Option<u32>,

    #[serde(default)]
    pub smoking_status: Option<String>,

    #[serde(default)]
    pub alcohol_consumption: Option<String>,
}

fn unknown_label() -> String {
    "Unknown".into()
}

impl PatientAttributes {
    /// Minimal attributes; everything else defaults to unknown/absent.
    pub fn new(age: i32, gender: Gender, height_cm: f64, weight_kg: f64) -> Self {
        Self {
            patient_id: None,
            name: None,
            age,
            gender,
            height_cm,
            weight_kg,
            state: unknown_label(),
            residence_type: ResidenceType::Unknown,
            wealth_index: WealthTier::Unknown,
            dietary_preference: None,
            physical_activity: None,
            daily_steps: None,
            smoking_status: None,
            alcohol_consumption: None,
        }
    }
}

/// An immutable, validated patient snapshot consumed read-only by the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PatientRecord {
    patient_id: String,
    name: Option<String>,
    age: i32,
    gender: Gender,
    height_cm: f64,
    weight_kg: f64,
    bmi: BmiAssessment,
    state: String,
    residence_type: ResidenceType,
    wealth_index: WealthTier,
    dietary_preference: Option<String>,
    physical_activity: Option<String>,
    daily_steps: Option<u32>,
    smoking_status: Option<String>,
    alcohol_consumption: Option<String>,
    location_context: String,
    dietary_context: String,
    physical_activity_context: String,
}

impl PatientRecord {
    /// Validate attributes and derive BMI and context fields.
    ///
    /// Fails with [`PatientDataError::InvalidPatientData`] for age below
    /// 18 or non-positive height/weight.
    pub fn from_attributes(attrs: PatientAttributes) -> Result<Self, PatientDataError> {
        if attrs.age < MIN_AGE {
            return Err(PatientDataError::invalid(
                "age",
                format!("must be at least {MIN_AGE}, got {}", attrs.age),
            ));
        }
        if !attrs.height_cm.is_finite() || attrs.height_cm <= 0.0 {
            return Err(PatientDataError::invalid(
                "height_cm",
                format!("must be positive, got {}", attrs.height_cm),
            ));
        }
        if !attrs.weight_kg.is_finite() || attrs.weight_kg <= 0.0 {
            return Err(PatientDataError::invalid(
                "weight_kg",
                format!("must be positive, got {}", attrs.weight_kg),
            ));
        }

        let bmi = BmiAssessment::compute(attrs.weight_kg, attrs.height_cm);
        let state = match attrs.state.trim() {
            "" => unknown_label(),
            s => s.to_string(),
        };
        let patient_id = attrs
            .patient_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("USER_{}", Utc::now().format("%Y%m%d_%H%M%S")));
        let name = attrs.name.filter(|n| !n.trim().is_empty());

        let location_context = format!("{} area in {}", attrs.residence_type, state);
        let dietary_context = dietary_context(attrs.residence_type).to_string();
        let physical_activity_context =
            activity_context(attrs.residence_type, attrs.wealth_index).to_string();

        Ok(Self {
            patient_id,
            name,
            age: attrs.age,
            gender: attrs.gender,
            height_cm: attrs.height_cm,
            weight_kg: attrs.weight_kg,
            bmi,
            state,
            residence_type: attrs.residence_type,
            wealth_index: attrs.wealth_index,
            dietary_preference: attrs.dietary_preference,
            physical_activity: attrs.physical_activity,
            daily_steps: attrs.daily_steps,
            smoking_status: attrs.smoking_status,
            alcohol_consumption: attrs.alcohol_consumption,
            location_context,
            dietary_context,
            physical_activity_context,
        })
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn age(&self) -> i32 {
        self.age
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn height_cm(&self) -> f64 {
        self.height_cm
    }

    pub fn weight_kg(&self) -> f64 {
        self.weight_kg
    }

    pub fn bmi(&self) -> f64 {
        self.bmi.value
    }

    pub fn bmi_category(&self) -> BmiCategory {
        self.bmi.category
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn residence_type(&self) -> ResidenceType {
        self.residence_type
    }

    pub fn wealth_index(&self) -> WealthTier {
        self.wealth_index
    }

    pub fn dietary_preference(&self) -> Option<&str> {
        self.dietary_preference.as_deref()
    }

    pub fn physical_activity(&self) -> Option<&str> {
        self.physical_activity.as_deref()
    }

    pub fn location_context(&self) -> &str {
        &self.location_context
    }

    pub fn dietary_context(&self) -> &str {
        &self.dietary_context
    }

    pub fn physical_activity_context(&self) -> &str {
        &self.physical_activity_context
    }

    /// Every populated field as `(snake_case_key, display value)`, in a
    /// fixed order. Absent optional fields are skipped.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("patient_id", self.patient_id.clone())];
        if let Some(name) = &self.name {
            fields.push(("patient_name", name.clone()));
        }
        fields.extend([
            ("age", self.age.to_string()),
            ("gender", self.gender.to_string()),
            ("height_cm", format_measure(self.height_cm)),
            ("weight_kg", format_measure(self.weight_kg)),
            ("bmi", format!("{:.2}", self.bmi.value)),
            ("bmi_category", self.bmi.category.to_string()),
            ("state", self.state.clone()),
            ("residence_type", self.residence_type.to_string()),
            ("wealth_index", self.wealth_index.to_string()),
        ]);
        if let Some(pref) = &self.dietary_preference {
            fields.push(("dietary_preference", pref.clone()));
        }
        fields.push(("location_context", self.location_context.clone()));
        fields.push(("socioeconomic_status", self.wealth_index.to_string()));
        if let Some(activity) = &self.physical_activity {
            fields.push(("physical_activity", activity.clone()));
        }
        if let Some(steps) = self.daily_steps {
            fields.push(("daily_steps", steps.to_string()));
        }
        if let Some(smoking) = &self.smoking_status {
            fields.push(("smoking_status", smoking.clone()));
        }
        if let Some(alcohol) = &self.alcohol_consumption {
            fields.push(("alcohol_consumption", alcohol.clone()));
        }
        fields.push(("dietary_context", self.dietary_context.clone()));
        fields.push(("physical_activity_context", self.physical_activity_context.clone()));
        fields
    }

    /// One-line natural-language description, used as a retrieval query.
    pub fn profile_summary(&self) -> String {
        let gender = match self.gender {
            Gender::NotRecorded => String::new(),
            g => format!(" {}", g.label().to_lowercase()),
        };
        format!(
            "{} year old{} patient, BMI {:.2} ({}), from {}, {} wealth index",
            self.age,
            gender,
            self.bmi.value,
            self.bmi.category,
            self.location_context.to_lowercase(),
            self.wealth_index.label().to_lowercase(),
        )
    }
}

fn format_measure(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        let s = format!("{v:.2}");
        s.trim_end_matches('0').to_string()
    }
}

fn dietary_context(residence: ResidenceType) -> &'static str {
    match residence {
        ResidenceType::Rural => "Traditional Indian diet with locally grown crops, rice/wheat based meals",
        _ => "Urban diet with mix of traditional and modern foods, increased processed food access",
    }
}

fn activity_context(residence: ResidenceType, wealth: WealthTier) -> &'static str {
    if residence == ResidenceType::Rural {
        "Moderate to high physical labor in agriculture or manual work"
    } else if wealth.is_affluent() {
        "Sedentary office work, limited physical activity, gym access available"
    } else {
        "Mix of manual and sedentary work, limited structured exercise"
    }
}
