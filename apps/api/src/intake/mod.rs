// Request intake: multipart extraction, document decoding and the submission model.
// Nothing in here talks to the completion provider or the hosting account.

pub mod documents;
pub mod multipart;
pub mod submission;
