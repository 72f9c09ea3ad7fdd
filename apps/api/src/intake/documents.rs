//! Document decoding: turns an uploaded résumé / job description into plain text.

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

const PDF_SIGNATURE: &[u8] = b"%PDF";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("PDF extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Decodes an uploaded document into trimmed text.
///
/// PDFs are detected by their signature and run through `pdf-extract` on a
/// blocking thread. Everything else is treated as UTF-8 (lossy).
pub async fn decode_document(bytes: Bytes) -> Result<String, DocumentError> {
    if is_pdf(&bytes) {
        debug!("Extracting text from PDF upload ({} bytes)", bytes.len());
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| DocumentError::Pdf(e.to_string()))
        })
        .await??;
        return Ok(text.trim().to_string());
    }

    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}
