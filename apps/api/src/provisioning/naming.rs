//! Repository naming.
//!
//! `name = base-<millis>[-slug(last_name)][-slug(job_title)]`.
//! Uniqueness comes from the millisecond timestamp only; two submissions that
//! carry the same metadata inside the same millisecond would collide. That is
//! accepted at the request rates this service sees.
//!
//! GitHub caps names at 100 characters and rejects a trailing `.git`; the
//! metadata suffix is cut to fit, the `base-<millis>` prefix never is.

/// GitHub's repository name limit.
pub const MAX_REPOSITORY_NAME_LEN: usize = 100;

/// Lower-cases and joins whitespace-separated words with single hyphens.
/// Characters GitHub does not allow in repository names are dropped.
pub fn slugify(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            word.to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('-')
        .to_string()
}

pub fn repository_name(
    base: &str,
    timestamp_millis: i64,
    last_name: Option<&str>,
    job_title: Option<&str>,
) -> String {
    let prefix = format!("{base}-{timestamp_millis}");
    let mut name = prefix.clone();
    for part in [last_name, job_title].into_iter().flatten() {
        let slug = slugify(part);
        if !slug.is_empty() {
            name.push('-');
            name.push_str(&slug);
        }
    }

    let limit = MAX_REPOSITORY_NAME_LEN.max(prefix.len());
    if let Some((cut, _)) = name.char_indices().nth(limit) {
        name.truncate(cut);
    }
    while name.len() > prefix.len() {
        if name.ends_with(".git") {
            name.truncate(name.len() - ".git".len());
        } else if name.ends_with(|c: char| matches!(c, '-' | '.' | '_')) {
            name.pop();
        } else {
            break;
        }
    }
    name
}

pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
