//! Submission model: what the caller sent, before and after validation.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::intake::multipart::{ExtractedForm, FormValue};

pub const RESUME_FIELD: &str = "resume";
pub const JOB_DESCRIPTION_FIELD: &str = "job_description";

/// Target seniority of the generated challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Difficulty {
    Junior,
    #[default]
    Intermediate,
    Senior,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Junior => "junior",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Senior => "senior",
        }
    }

    /// Parses a form value. Unknown values fall back to the default level.
    pub fn from_form_value(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "junior" => Difficulty::Junior,
            "intermediate" => Difficulty::Intermediate,
            "senior" => Difficulty::Senior,
            other => {
                warn!("Unknown difficulty '{other}', falling back to intermediate");
                Difficulty::default()
            }
        }
    }
}

/// Raw submission as extracted from the multipart body. Byte payloads may be
/// empty here; the orchestrator rejects them during validation.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    pub resume: Bytes,
    pub job_description: Bytes,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub difficulty: Difficulty,
}

impl SubmissionRequest {
    pub fn from_form(mut form: ExtractedForm) -> Self {
        let resume = take_bytes(&mut form, RESUME_FIELD);
        let job_description = take_bytes(&mut form, JOB_DESCRIPTION_FIELD);
        let job_title =
            take_text(&mut form, "job_title").or_else(|| take_text(&mut form, "job_desc_text"));

        Self {
            resume,
            job_description,
            first_name: take_text(&mut form, "first_name"),
            last_name: take_text(&mut form, "last_name"),
            job_title,
            difficulty: take_text(&mut form, "difficulty")
                .map(|d| Difficulty::from_form_value(&d))
                .unwrap_or_default(),
        }
    }
}

/// Candidate metadata carried past validation.
#[derive(Debug, Clone, Default)]
pub struct CandidateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub difficulty: Difficulty,
}

/// A submission whose documents decoded to non-blank text.
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub resume_text: String,
    pub job_description_text: String,
    pub profile: CandidateProfile,
}

fn take_bytes(form: &mut ExtractedForm, name: &str) -> Bytes {
    match form.fields.remove(name) {
        Some(FormValue::File { file_name, bytes }) => {
            debug!(
                "Received '{name}' upload {:?} ({} bytes)",
                file_name.as_deref().unwrap_or("unnamed"),
                bytes.len()
            );
            bytes
        }
        Some(FormValue::Text(text)) => Bytes::from(text),
        None => Bytes::new(),
    }
}

fn take_text(form: &mut ExtractedForm, name: &str) -> Option<String> {
    let value = match form.fields.remove(name)? {
        FormValue::Text(text) => text,
        FormValue::File { bytes, .. } => String::from_utf8_lossy(&bytes).into_owned(),
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
