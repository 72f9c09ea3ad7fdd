// Prompt constants and the prompt builder for challenge generation.
// The builder is pure: same inputs, same prompt, no I/O.

use crate::intake::submission::{CandidateProfile, Difficulty};

/// System message sent alongside every challenge prompt.
pub const CHALLENGE_SYSTEM: &str = "You are an expert technical interviewer who designs \
    realistic, role-specific take-home coding challenges. \
    Respond in Markdown only, following the requested section layout exactly.";

/// Time box every generated challenge must fit in.
pub const TIME_BOX_MINUTES: u32 = 90;

pub const RESUME_WEIGHT_PERCENT: u32 = 40;
pub const JOB_DESCRIPTION_WEIGHT_PERCENT: u32 = 60;

/// The output skeleton, in order. The completion must reproduce these
/// headers verbatim.
pub const SECTION_HEADERS: [&str; 6] = [
    "# Challenge Title",
    "## Problem Description",
    "## Requirements",
    "## Technical Specifications",
    "## Evaluation Criteria",
    "## Submission Instructions",
];

/// Prompt preamble. Replace: {candidate_line}, {role_line}, {difficulty},
/// {resume_weight}, {jd_weight}, {time_box}
const CHALLENGE_PROMPT_PREAMBLE: &str = r#"You are an expert technical interviewer. Design one coding challenge for a candidate.
{candidate_line}{role_line}
Target difficulty: {difficulty}.

WEIGHTING:
- Base {resume_weight}% of the challenge on the candidate's resume (their demonstrated languages, tools and experience).
- Base {jd_weight}% of the challenge on the job description (the skills the role actually needs).

RULES:
1. The challenge must be completable within {time_box} minutes by a candidate at the target difficulty.
2. If you provide starter code, deliberately include a few subtle bugs in it. Do NOT mention, hint at, or list these bugs anywhere in the output.
3. Use concrete inputs, outputs and constraints. No vague tasks.
4. Do not address the candidate's resume directly in the output."#;

const OUTPUT_FORMAT_INSTRUCTION: &str = "OUTPUT FORMAT. Use exactly these six Markdown headers, \
    in this order, each once. Replace the first header's text with the challenge's actual title:";

/// Renders the challenge-generation prompt.
///
/// Callers guarantee both texts are non-blank; the orchestrator validates
/// before building. Document text is appended after placeholder substitution
/// so braces inside uploads are never interpreted, and its headings are
/// flattened so the skeleton's headers stay the only ones in the prompt.
pub fn build_challenge_prompt(
    resume_text: &str,
    job_description_text: &str,
    profile: &CandidateProfile,
) -> String {
    let candidate_line = match &profile.first_name {
        Some(name) => format!("The candidate's first name is {}.\n", flatten_headings(name)),
        None => String::new(),
    };
    let role_line = match &profile.job_title {
        Some(title) => format!("The role being hired for is: {}.\n", flatten_headings(title)),
        None => String::new(),
    };

    let preamble = CHALLENGE_PROMPT_PREAMBLE
        .replace("{candidate_line}", &candidate_line)
        .replace("{role_line}", &role_line)
        .replace("{difficulty}", difficulty_label(profile.difficulty))
        .replace("{resume_weight}", &RESUME_WEIGHT_PERCENT.to_string())
        .replace("{jd_weight}", &JOB_DESCRIPTION_WEIGHT_PERCENT.to_string())
        .replace("{time_box}", &TIME_BOX_MINUTES.to_string());

    format!(
        "{preamble}\n\nCANDIDATE RESUME:\n{}\n\nJOB DESCRIPTION:\n{}\n\n{OUTPUT_FORMAT_INSTRUCTION}\n{}",
        flatten_headings(resume_text.trim()),
        flatten_headings(job_description_text.trim()),
        SECTION_HEADERS.join("\n"),
    )
}

/// Turns Markdown heading lines into plain lines and strips the hash markers
/// from any skeleton header quoted mid-line.
fn flatten_headings(text: &str) -> String {
    let flattened = text
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let rest = trimmed.trim_start_matches('#');
            let level = trimmed.len() - rest.len();
            if (1..=6).contains(&level) && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
                rest.trim()
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    SECTION_HEADERS.iter().fold(flattened, |acc, header| {
        acc.replace(header, header.trim_start_matches('#').trim_start())
    })
}

fn difficulty_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Junior => "junior (0-2 years of experience)",
        Difficulty::Intermediate => "intermediate (2-5 years of experience)",
        Difficulty::Senior => "senior (5+ years of experience)",
    }
}
