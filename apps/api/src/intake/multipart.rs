//! Multipart extraction.
//!
//! Parsing is driven by `multer` and reduced into a single [`ExtractedForm`]
//! by [`FormAccumulator`]. Every run ends in exactly one [`Terminal`] event:
//! the closing boundary was seen, framing broke, or the safety deadline fired.
//! A buffered body is always preferred over a live stream; partial stream
//! delivery is what truncates uploads in practice. [`read_body`] buffers a
//! request body under the same safety deadline, so a stalled client cannot
//! hold an invocation open.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::IntakeConfig;
use crate::intake::submission::{JOB_DESCRIPTION_FIELD, RESUME_FIELD};

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("expected multipart/form-data, got '{0}'")]
    BadContentType(String),

    #[error("{0}")]
    Malformed(String),

    #[error("'{field}' exceeds the {limit} byte upload limit")]
    FileTooLarge { field: String, limit: usize },

    #[error("at most {limit} files may be uploaded")]
    TooManyFiles { limit: usize },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

/// Where the multipart bytes come from.
pub enum MultipartSource {
    /// The whole body, already buffered by the HTTP layer.
    Buffered(Bytes),
    /// A live body stream.
    Streaming(BoxStream<'static, Result<Bytes, std::io::Error>>),
    /// The prefix of a body that stopped arriving before the deadline. A
    /// premature end here finalizes like a timeout instead of failing.
    Truncated(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    File {
        file_name: Option<String>,
        bytes: Bytes,
    },
    Text(String),
}

#[derive(Debug, Default)]
pub struct ExtractedForm {
    pub fields: HashMap<String, FormValue>,
    /// Set when the safety deadline finalized extraction before the closing
    /// boundary arrived. Parts cut off mid-read are not in `fields`.
    pub timed_out: bool,
}

/// How an extraction run ended.
#[derive(Debug)]
enum Terminal {
    Complete,
    Error(multer::Error),
    Timeout,
}

/// Accumulates parts as they finish and folds the terminal event into the
/// final result.
struct FormAccumulator {
    fields: HashMap<String, FormValue>,
    file_count: usize,
    max_files: usize,
}

impl FormAccumulator {
    fn new(max_files: usize) -> Self {
        Self {
            fields: HashMap::new(),
            file_count: 0,
            max_files,
        }
    }

    fn begin_file(&mut self) -> Result<(), ExtractError> {
        if self.file_count >= self.max_files {
            return Err(ExtractError::TooManyFiles {
                limit: self.max_files,
            });
        }
        self.file_count += 1;
        Ok(())
    }

    fn push(&mut self, name: String, value: FormValue) {
        if self.fields.insert(name.clone(), value).is_some() {
            debug!("Multipart field '{name}' repeated; keeping the last value");
        }
    }

    fn finish(self, terminal: Terminal) -> Result<ExtractedForm, ExtractError> {
        match terminal {
            Terminal::Complete => Ok(ExtractedForm {
                fields: self.fields,
                timed_out: false,
            }),
            Terminal::Timeout => {
                warn!(
                    "Multipart extraction timed out; finalizing with {} complete part(s)",
                    self.fields.len()
                );
                Ok(ExtractedForm {
                    fields: self.fields,
                    timed_out: true,
                })
            }
            Terminal::Error(err) => Err(classify_multer_error(err)),
        }
    }
}

/// Checks the request content type and returns it when it is multipart.
pub fn require_multipart(content_type: Option<&str>) -> Result<&str, ExtractError> {
    match content_type {
        Some(ct)
            if ct
                .trim_start()
                .to_ascii_lowercase()
                .starts_with(MULTIPART_FORM_DATA) =>
        {
            Ok(ct)
        }
        Some(ct) => Err(ExtractError::BadContentType(ct.to_string())),
        None => Err(ExtractError::BadContentType("none".to_string())),
    }
}

/// Buffers a request body, giving up once `timeout` has elapsed.
///
/// A body that completes in time becomes [`MultipartSource::Buffered`]; one
/// that stalls becomes [`MultipartSource::Truncated`] holding what arrived.
pub async fn read_body<S, E>(
    body: S,
    timeout: Duration,
    max_bytes: usize,
) -> Result<MultipartSource, ExtractError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(body);
    let deadline = Instant::now() + timeout;
    let mut buf = BytesMut::new();

    loop {
        match timeout_at(deadline, body.next()).await {
            Err(_) => {
                warn!(
                    "Request body stalled after {} bytes; finalizing with what arrived",
                    buf.len()
                );
                return Ok(MultipartSource::Truncated(buf.freeze()));
            }
            Ok(None) => return Ok(MultipartSource::Buffered(buf.freeze())),
            Ok(Some(Err(e))) => {
                return Err(ExtractError::Malformed(format!(
                    "Request body could not be read: {e}"
                )))
            }
            Ok(Some(Ok(chunk))) => {
                if buf.len() + chunk.len() > max_bytes {
                    return Err(ExtractError::BodyTooLarge { limit: max_bytes });
                }
                buf.extend_from_slice(&chunk);
            }
        }
    }
}

/// Extracts every part of a multipart body.
///
/// Files over `limits.max_file_bytes` and more than `limits.max_files` file
/// parts reject the whole body. Broken framing is reported as
/// [`ExtractError::Malformed`].
pub async fn extract_form(
    source: MultipartSource,
    content_type: &str,
    limits: &IntakeConfig,
) -> Result<ExtractedForm, ExtractError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| ExtractError::BadContentType(content_type.to_string()))?;

    let cut_off = matches!(source, MultipartSource::Truncated(_));
    let body: BoxStream<'static, Result<Bytes, std::io::Error>> = match source {
        MultipartSource::Buffered(bytes) => {
            debug!("Extracting multipart from buffered body ({} bytes)", bytes.len());
            stream::once(async move { Ok(bytes) }).boxed()
        }
        MultipartSource::Truncated(bytes) => {
            debug!("Extracting multipart from truncated body ({} bytes)", bytes.len());
            stream::once(async move { Ok(bytes) }).boxed()
        }
        MultipartSource::Streaming(stream) => {
            debug!("Extracting multipart from live stream");
            stream
        }
    };

    let mut multipart = multer::Multipart::new(body, boundary);
    let deadline = Instant::now() + Duration::from_secs(limits.timeout_secs);
    let mut acc = FormAccumulator::new(limits.max_files);

    let terminal = loop {
        let field = match timeout_at(deadline, multipart.next_field()).await {
            Err(_) => break Terminal::Timeout,
            Ok(Err(e)) => break Terminal::Error(e),
            Ok(Ok(None)) => break Terminal::Complete,
            Ok(Ok(Some(field))) => field,
        };

        if let Some(terminal) = read_part(field, &mut acc, deadline, limits.max_file_bytes).await? {
            break terminal;
        }
    };

    let terminal = match terminal {
        Terminal::Error(e) if cut_off && is_premature_end(&e) => Terminal::Timeout,
        other => other,
    };

    acc.finish(terminal)
}

/// Reads one part into the accumulator. Returns a terminal event if the part
/// could not be read to its end.
async fn read_part(
    mut field: multer::Field<'static>,
    acc: &mut FormAccumulator,
    deadline: Instant,
    max_bytes: usize,
) -> Result<Option<Terminal>, ExtractError> {
    let Some(name) = field.name().map(str::to_string) else {
        debug!("Skipping unnamed multipart part");
        return Ok(None);
    };
    let file_name = field.file_name().map(str::to_string);
    let is_file =
        file_name.is_some() || name == RESUME_FIELD || name == JOB_DESCRIPTION_FIELD;

    if is_file {
        acc.begin_file()?;
    }

    let mut buf = BytesMut::new();
    loop {
        match timeout_at(deadline, field.chunk()).await {
            Err(_) => {
                warn!("Multipart part '{name}' cut off by timeout after {} bytes; dropping it", buf.len());
                return Ok(Some(Terminal::Timeout));
            }
            Ok(Err(e)) => return Ok(Some(Terminal::Error(e))),
            Ok(Ok(None)) => break,
            Ok(Ok(Some(chunk))) => {
                if buf.len() + chunk.len() > max_bytes {
                    return Err(ExtractError::FileTooLarge {
                        field: name,
                        limit: max_bytes,
                    });
                }
                buf.extend_from_slice(&chunk);
            }
        }
    }

    let value = if is_file {
        FormValue::File {
            file_name,
            bytes: buf.freeze(),
        }
    } else {
        FormValue::Text(String::from_utf8_lossy(&buf).into_owned())
    };
    acc.push(name, value);
    Ok(None)
}

/// Maps a `multer` failure to the client-facing malformed-body condition.
/// Premature termination is told apart through multer's own error variants.
fn classify_multer_error(err: multer::Error) -> ExtractError {
    let reason = if is_premature_end(&err) {
        "Unexpected end of multipart body"
    } else {
        "Multipart body could not be parsed"
    };
    ExtractError::Malformed(format!("{reason}: {err}"))
}

fn is_premature_end(err: &multer::Error) -> bool {
    matches!(
        err,
        multer::Error::IncompleteStream
            | multer::Error::IncompleteFieldData { .. }
            | multer::Error::IncompleteHeaders
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-CHALLENGE-BOUNDARY";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    fn file_part(name: &str, file_name: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
        )
    }

    fn text_part(name: &str, value: &str) -> String {
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
    }

    fn closing() -> String {
        format!("--{BOUNDARY}--\r\n")
    }

    fn limits() -> IntakeConfig {
        IntakeConfig {
            max_file_bytes: 1024,
            max_files: 2,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_require_multipart_accepts_form_data() {
        let ct = content_type();
        assert_eq!(require_multipart(Some(&ct)).unwrap(), ct);
    }

    #[test]
    fn test_require_multipart_rejects_json_and_missing() {
        assert!(matches!(
            require_multipart(Some("application/json")),
            Err(ExtractError::BadContentType(_))
        ));
        assert!(matches!(
            require_multipart(None),
            Err(ExtractError::BadContentType(_))
        ));
    }

    #[tokio::test]
    async fn test_buffered_body_yields_files_and_text() {
        let body = [
            file_part("resume", "resume.txt", "Ten years of Rust"),
            file_part("job_description", "jd.txt", "Build a queue"),
            text_part("first_name", "Ada"),
            closing(),
        ]
        .concat();

        let form = extract_form(
            MultipartSource::Buffered(Bytes::from(body)),
            &content_type(),
            &limits(),
        )
        .await
        .unwrap();

        assert!(!form.timed_out);
        assert_eq!(
            form.fields.get("resume"),
            Some(&FormValue::File {
                file_name: Some("resume.txt".to_string()),
                bytes: Bytes::from_static(b"Ten years of Rust"),
            })
        );
        assert_eq!(
            form.fields.get("first_name"),
            Some(&FormValue::Text("Ada".to_string()))
        );
    }

    #[tokio::test]
    async fn test_truncated_body_is_malformed() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"r.txt\"\r\n\r\nhalf a res"
        );

        let err = extract_form(
            MultipartSource::Buffered(Bytes::from(body)),
            &content_type(),
            &limits(),
        )
        .await
        .unwrap_err();

        match err {
            ExtractError::Malformed(msg) => assert!(msg.contains("Unexpected end")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected() {
        let big = "x".repeat(2048);
        let body = [file_part("resume", "resume.txt", &big), closing()].concat();

        let err = extract_form(
            MultipartSource::Buffered(Bytes::from(body)),
            &content_type(),
            &limits(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExtractError::FileTooLarge { ref field, limit: 1024 } if field == "resume"));
    }

    #[tokio::test]
    async fn test_third_file_is_rejected() {
        let body = [
            file_part("resume", "a.txt", "a"),
            file_part("job_description", "b.txt", "b"),
            file_part("portfolio", "c.txt", "c"),
            closing(),
        ]
        .concat();

        let err = extract_form(
            MultipartSource::Buffered(Bytes::from(body)),
            &content_type(),
            &limits(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExtractError::TooManyFiles { limit: 2 }));
    }

    #[tokio::test]
    async fn test_streaming_body_in_chunks() {
        let body = [
            file_part("resume", "resume.txt", "streamed resume"),
            closing(),
        ]
        .concat();
        let chunks: Vec<Result<Bytes, std::io::Error>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let form = extract_form(
            MultipartSource::Streaming(stream::iter(chunks).boxed()),
            &content_type(),
            &limits(),
        )
        .await
        .unwrap();

        assert!(matches!(
            form.fields.get("resume"),
            Some(FormValue::File { bytes, .. }) if &bytes[..] == b"streamed resume"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_finalizes_with_received_parts() {
        let head = [
            text_part("first_name", "Grace"),
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"r.txt\"\r\n\r\npartial"),
        ]
        .concat();
        let stalled = stream::iter(vec![Ok::<Bytes, std::io::Error>(Bytes::from(head))])
            .chain(stream::pending())
            .boxed();

        let form = extract_form(MultipartSource::Streaming(stalled), &content_type(), &limits())
            .await
            .unwrap();

        assert!(form.timed_out);
        assert_eq!(
            form.fields.get("first_name"),
            Some(&FormValue::Text("Grace".to_string()))
        );
        assert!(!form.fields.contains_key("resume"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_body_stalled_client_yields_truncated_prefix() {
        let head = text_part("first_name", "Grace");
        let stalled = stream::iter(vec![Ok::<Bytes, std::io::Error>(Bytes::from(head.clone()))])
            .chain(stream::pending());

        let source = read_body(stalled, Duration::from_secs(30), 1024).await.unwrap();

        match source {
            MultipartSource::Truncated(bytes) => assert_eq!(&bytes[..], head.as_bytes()),
            _ => panic!("expected a truncated body"),
        }
    }

    #[tokio::test]
    async fn test_read_body_complete_is_buffered() {
        let body = [text_part("first_name", "Grace"), closing()].concat();
        let chunks = stream::iter(vec![Ok::<Bytes, std::io::Error>(Bytes::from(body))]);

        let source = read_body(chunks, Duration::from_secs(30), 1024).await.unwrap();

        assert!(matches!(source, MultipartSource::Buffered(_)));
    }

    #[tokio::test]
    async fn test_read_body_enforces_total_limit() {
        let chunks = stream::iter(vec![Ok::<Bytes, std::io::Error>(Bytes::from("x".repeat(2048)))]);

        let err = read_body(chunks, Duration::from_secs(30), 1024).await.err().unwrap();

        assert!(matches!(err, ExtractError::BodyTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_truncated_body_keeps_complete_parts() {
        let body = [
            text_part("first_name", "Grace"),
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"r.txt\"\r\n\r\nhalf"),
        ]
        .concat();

        let form = extract_form(
            MultipartSource::Truncated(Bytes::from(body)),
            &content_type(),
            &limits(),
        )
        .await
        .unwrap();

        assert!(form.timed_out);
        assert_eq!(
            form.fields.get("first_name"),
            Some(&FormValue::Text("Grace".to_string()))
        );
        assert!(!form.fields.contains_key("resume"));
    }

    #[tokio::test]
    async fn test_missing_boundary_is_bad_content_type() {
        let err = extract_form(
            MultipartSource::Buffered(Bytes::new()),
            "multipart/form-data",
            &limits(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::BadContentType(_)));
    }
}
