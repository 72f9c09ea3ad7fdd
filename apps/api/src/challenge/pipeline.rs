//! Challenge Pipeline: sequences one submission end to end.
//!
//! Flow: Received → Extracted → Validated → PromptBuilt → Completed →
//!       Provisioned → Responded. Any stage may fail; the failure is already
//!       an `AppError` by the time it leaves `run`.
//!
//! Stages are strictly sequential and nothing outlives the call: the only
//! local state is the provisioner's invocation-scoped temp directory.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::challenge::prompts::build_challenge_prompt;
use crate::config::IntakeConfig;
use crate::errors::AppError;
use crate::intake::documents::decode_document;
use crate::intake::multipart::{extract_form, require_multipart, MultipartSource};
use crate::intake::submission::{
    CandidateProfile, SubmissionRequest, ValidatedSubmission, JOB_DESCRIPTION_FIELD, RESUME_FIELD,
};
use crate::llm_client::CompletionProvider;
use crate::provisioning::RepositoryProvisioner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Extracted,
    Validated,
    PromptBuilt,
    Completed,
    Provisioned,
    Responded,
}

/// Success body. Both links or an error, never one link alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    /// Web-editor deep link into the challenge branch.
    pub challenge_link: String,
    /// Branch page of the new repository.
    pub github_repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct ChallengePipeline {
    completion: Arc<dyn CompletionProvider>,
    provisioner: RepositoryProvisioner,
    intake: IntakeConfig,
}

impl ChallengePipeline {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        provisioner: RepositoryProvisioner,
        intake: IntakeConfig,
    ) -> Self {
        Self {
            completion,
            provisioner,
            intake,
        }
    }

    /// Runs one submission. `content_type` is the raw request header.
    pub async fn run(
        &self,
        source: MultipartSource,
        content_type: Option<&str>,
    ) -> Result<SubmissionResult, AppError> {
        let invocation = Uuid::new_v4();
        let span = info_span!("challenge_pipeline", %invocation);

        async move {
            let mut stage = PipelineStage::Received;
            let result = self.execute(&mut stage, source, content_type).await;
            match &result {
                Ok(_) => info!("Pipeline finished"),
                Err(e) => warn!(failed_at = ?stage, code = e.code(), "Pipeline failed: {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        stage: &mut PipelineStage,
        source: MultipartSource,
        content_type: Option<&str>,
    ) -> Result<SubmissionResult, AppError> {
        let content_type = require_multipart(content_type)?;

        let form = extract_form(source, content_type, &self.intake).await?;
        if form.timed_out {
            warn!("Extraction finalized by timeout; validating what arrived");
        }
        advance(stage, PipelineStage::Extracted);

        let submission = validate_submission(SubmissionRequest::from_form(form)).await?;
        info!(
            difficulty = submission.profile.difficulty.as_str(),
            resume_chars = submission.resume_text.len(),
            job_description_chars = submission.job_description_text.len(),
            "Submission validated"
        );
        advance(stage, PipelineStage::Validated);

        let prompt = build_challenge_prompt(
            &submission.resume_text,
            &submission.job_description_text,
            &submission.profile,
        );
        advance(stage, PipelineStage::PromptBuilt);

        let challenge = self.completion.complete(&prompt).await?;
        info!("Completion returned {} characters", challenge.len());
        advance(stage, PipelineStage::Completed);

        let handle = self
            .provisioner
            .provision(&challenge, &submission.profile)
            .await?;
        advance(stage, PipelineStage::Provisioned);

        let result = SubmissionResult {
            challenge_link: handle.editor_url,
            github_repo: handle.branch_url,
            message: Some(format!("Challenge repository {} created", handle.name)),
        };
        advance(stage, PipelineStage::Responded);
        Ok(result)
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    info!("Stage {:?} -> {:?}", stage, next);
    *stage = next;
}

/// Decodes both documents and rejects the submission unless both hold
/// non-blank text.
pub async fn validate_submission(request: SubmissionRequest) -> Result<ValidatedSubmission, AppError> {
    let resume_text = decode_required(RESUME_FIELD, request.resume).await?;
    let job_description_text = decode_required(JOB_DESCRIPTION_FIELD, request.job_description).await?;

    Ok(ValidatedSubmission {
        resume_text,
        job_description_text,
        profile: CandidateProfile {
            first_name: request.first_name,
            last_name: request.last_name,
            job_title: request.job_title,
            difficulty: request.difficulty,
        },
    })
}

async fn decode_required(field: &str, bytes: Bytes) -> Result<String, AppError> {
    if bytes.is_empty() {
        return Err(AppError::MissingFile(format!(
            "Both resume and job_description files are required ('{field}' is missing)"
        )));
    }
    let text = decode_document(bytes)
        .await
        .map_err(|e| AppError::InvalidFile(format!("'{field}' could not be read: {e}")))?;
    if text.is_empty() {
        return Err(AppError::MissingFile(format!("'{field}' contains no text")));
    }
    Ok(text)
}
