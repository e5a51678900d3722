//! Prompt assembly: renders a stage task template for one patient.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` render literal
//! braces. A template is parsed once, and its placeholders are checked
//! against the bindings a stage can supply before any run starts.
//!
//! Rendering is pure: no I/O, no clock, no randomness.

use careplan_core::{PatientRecord, PromptError};

/// Placeholder that receives the rendered patient record.
pub const PATIENT_DATA: &str = "patient_data";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed task template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `source`. `name` identifies the template in errors.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Result<Self, PromptError> {
        let name = name.into();
        let source = source.into();
        let segments = parse_segments(&name, &source)?;
        Ok(Self {
            name,
            source,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder names, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(p) = segment
                && !seen.contains(&p.as_str())
            {
                seen.push(p);
            }
        }
        seen
    }

    /// Reject placeholders outside `allowed`.
    pub fn validate(&self, allowed: &[&str]) -> Result<(), PromptError> {
        match self.placeholders().into_iter().find(|p| !allowed.contains(p)) {
            Some(unknown) => Err(PromptError::MissingPlaceholder {
                template: self.name.clone(),
                placeholder: unknown.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Reject templates that never mention one of `required`.
    pub fn require(&self, required: &[&str]) -> Result<(), PromptError> {
        let present = self.placeholders();
        match required.iter().find(|r| !present.contains(r)) {
            Some(absent) => Err(PromptError::MissingPlaceholder {
                template: self.name.clone(),
                placeholder: absent.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Substitute every placeholder from `bindings`.
    pub fn render(&self, bindings: &[(&str, &str)]) -> Result<String, PromptError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    let value = bindings
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| PromptError::MissingPlaceholder {
                            template: self.name.clone(),
                            placeholder: key.clone(),
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_segments(name: &str, source: &str) -> Result<Vec<Segment>, PromptError> {
    let malformed = |reason: String| PromptError::Malformed {
        template: name.to_string(),
        reason,
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for (_, k) in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(malformed(format!("unclosed '{{' at byte {pos}")));
                }
                if key.is_empty() || !key.chars().all(|k| k.is_ascii_alphanumeric() || k == '_') {
                    return Err(malformed(format!("invalid placeholder '{{{key}}}' at byte {pos}")));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(key));
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(malformed(format!("unmatched '}}' at byte {pos}"))),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// `patient_id` → `Patient Id`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// One `- Label: value` line per populated record field.
pub fn format_patient_data(patient: &PatientRecord) -> String {
    patient
        .fields()
        .into_iter()
        .map(|(key, value)| format!("- {}: {}", title_case(key), value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render `template` with the patient block bound to `{patient_data}`
/// and each upstream output bound to its own placeholder.
pub fn assemble(
    template: &PromptTemplate,
    patient: &PatientRecord,
    upstream: &[(&str, &str)],
) -> Result<String, PromptError> {
    let patient_block = format_patient_data(patient);
    let mut bindings: Vec<(&str, &str)> = Vec::with_capacity(upstream.len() + 1);
    bindings.push((PATIENT_DATA, patient_block.as_str()));
    bindings.extend_from_slice(upstream);
    template.render(&bindings)
}
