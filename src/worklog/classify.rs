use crate::error::OracleError;
use crate::worklog::oracle::Oracle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "P0")]
    P0,
    #[serde(rename = "P1")]
    P1,
    #[serde(rename = "P2")]
    P2,
    #[serde(rename = "TOOLING")]
    Tooling,
    #[serde(rename = "META")]
    Meta,
    #[serde(rename = "FEATURE")]
    Feature,
    #[serde(rename = "BUGFIX")]
    Bugfix,
    #[serde(rename = "RESEARCH")]
    Research,
    #[serde(rename = "OFF-PRIORITY")]
    OffPriority,
    #[serde(rename = "OTHER")]
    Other,
    #[serde(rename = "UNCLEAR")]
    Unclear,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::P0 => "P0",
            Tag::P1 => "P1",
            Tag::P2 => "P2",
            Tag::Tooling => "TOOLING",
            Tag::Meta => "META",
            Tag::Feature => "FEATURE",
            Tag::Bugfix => "BUGFIX",
            Tag::Research => "RESEARCH",
            Tag::OffPriority => "OFF-PRIORITY",
            Tag::Other => "OTHER",
            Tag::Unclear => "UNCLEAR",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spellings accepted at the start of a `PRIORITY:` line. All `OFF` variants
/// collapse to [`Tag::OffPriority`].
const TAG_TABLE: [(&str, Tag); 14] = [
    ("P0", Tag::P0),
    ("P1", Tag::P1),
    ("P2", Tag::P2),
    ("TOOLING", Tag::Tooling),
    ("META", Tag::Meta),
    ("FEATURE", Tag::Feature),
    ("BUGFIX", Tag::Bugfix),
    ("RESEARCH", Tag::Research),
    ("OFF-PRIORITY", Tag::OffPriority),
    ("OFF PRIORITY", Tag::OffPriority),
    ("OFFPRIORITY", Tag::OffPriority),
    ("OFF", Tag::OffPriority),
    ("OTHER", Tag::Other),
    ("UNCLEAR", Tag::Unclear),
];

const PRIORITY_MARKER: &str = "PRIORITY:";
const SUMMARY_MARKER: &str = "SUMMARY:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tag: Tag,
    pub label: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed {
        tag: Tag,
        label: String,
        summary: String,
    },
    Failed {
        reason: String,
    },
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        Some(&line[marker.len()..])
    } else {
        None
    }
}

/// Longest table entry that prefixes `value`, case-insensitively.
fn match_tag(value: &str) -> Option<(&'static str, Tag)> {
    TAG_TABLE
        .iter()
        .filter(|(spelling, _)| {
            value
                .get(..spelling.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(spelling))
        })
        .max_by_key(|(spelling, _)| spelling.len())
        .copied()
}

fn trim_label(raw: &str) -> &str {
    raw.trim_matches(|c: char| c == ':' || c == ' ' || c == '-')
}

pub fn split_tag(priority_text: &str) -> (Tag, String) {
    match match_tag(priority_text) {
        Some((spelling, tag)) => (tag, trim_label(&priority_text[spelling.len()..]).to_string()),
        None => (Tag::Unclear, priority_text.to_string()),
    }
}

pub fn parse_classification(output: &str) -> ParseOutcome {
    let mut priority_text: Option<String> = None;
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut in_summary = false;

    for line in output.lines() {
        let lead = line.trim_start();
        if let Some(rest) = strip_marker(lead, PRIORITY_MARKER) {
            priority_text = Some(rest.trim().to_string());
        } else if let Some(rest) = strip_marker(lead, SUMMARY_MARKER) {
            in_summary = true;
            if !rest.trim().is_empty() {
                summary_lines.push(rest.trim());
            }
        } else if in_summary {
            summary_lines.push(line);
        }
    }

    let Some(priority_text) = priority_text else {
        return ParseOutcome::Failed {
            reason: "response has no PRIORITY line".to_string(),
        };
    };
    let (tag, label) = split_tag(&priority_text);
    ParseOutcome::Parsed {
        tag,
        label,
        summary: summary_lines.join("\n").trim().to_string(),
    }
}

pub fn build_classify_prompt(chunk_text: &str, project: &str, taxonomy: &str) -> String {
    let instructions = if taxonomy.trim().is_empty() {
        "1. Categorize the work. Reply with exactly one of:\n\
         \x20  - TOOLING: [brief description] - for dev tools, configs, infrastructure\n\
         \x20  - META: [brief description] - for planning, project management\n\
         \x20  - FEATURE: [brief description] - for feature work\n\
         \x20  - BUGFIX: [brief description] - for bug fixes\n\
         \x20  - RESEARCH: [brief description] - for exploration, investigation\n\
         \x20  - OTHER: [brief description] - anything else"
            .to_string()
    } else {
        format!(
            "1. Which priority does this work DIRECTLY relate to? Be conservative - only match \
             if the work clearly fits a priority. Reply with exactly one of:\n\
             \x20  - P0: [which P0 priority, verbatim from list]\n\
             \x20  - P1: [which P1 priority, verbatim from list]\n\
             \x20  - P2: [which P2 priority, verbatim from list]\n\
             \x20  - TOOLING: [brief description] - for dev tools, configs, infrastructure\n\
             \x20  - META: [brief description] - for planning, priorities discussion, project management\n\
             \x20  - OFF-PRIORITY: [brief description] - for work that doesn't fit any category\n\
             \x20  - UNCLEAR: [if can't determine]\n\n\
             Do NOT stretch to fit. If it's tangentially related or infrastructure work, use \
             OFF-PRIORITY or UNCLEAR.\n\n\
             ## Priorities Reference (includes project context)\n{taxonomy}"
        )
    };

    format!(
        "Analyze this conversation chunk.\n\n\
         {instructions}\n\n\
         2. Summarize in 2-3 bullets what user was trying to do and what got done.\n\n\
         ## Conversation (Project: {project})\n\
         {chunk_text}\n\n\
         Reply in this exact format:\n\
         PRIORITY: [your answer]\n\
         SUMMARY:\n\
         - bullet 1\n\
         - bullet 2"
    )
}

pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        chunk_text: &str,
        project: &str,
        taxonomy: &str,
    ) -> Result<Classification, OracleError>;
}

pub struct OracleClassifier<'a> {
    oracle: &'a dyn Oracle,
    model: String,
    timeout: Duration,
}

impl<'a> OracleClassifier<'a> {
    pub fn new(oracle: &'a dyn Oracle, model: &str, timeout: Duration) -> Self {
        Self {
            oracle,
            model: model.to_string(),
            timeout,
        }
    }
}

impl Classifier for OracleClassifier<'_> {
    fn classify(
        &self,
        chunk_text: &str,
        project: &str,
        taxonomy: &str,
    ) -> Result<Classification, OracleError> {
        let prompt = build_classify_prompt(chunk_text, project, taxonomy);
        let output = self.oracle.complete(&prompt, &self.model, self.timeout)?;
        match parse_classification(&output) {
            ParseOutcome::Parsed {
                tag,
                label,
                summary,
            } => Ok(Classification {
                tag,
                label,
                summary,
            }),
            ParseOutcome::Failed { reason } => Err(OracleError::Process(reason)),
        }
    }
}

/// Classification used in place of a failed call.
pub fn unclear(reason: &str) -> Classification {
    Classification {
        tag: Tag::Unclear,
        label: format!("(failed: {reason})"),
        summary: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Classifier, OracleClassifier, ParseOutcome, Tag, build_classify_prompt,
        parse_classification, split_tag,
    };
    use crate::error::OracleError;
    use crate::worklog::oracle::Oracle;
    use std::time::Duration;

    #[test]
    fn parses_priority_and_summary_block() {
        let out = "Some preamble\nPRIORITY: P1: Ship billing migration\nSUMMARY:\n- moved client\n- added tests\n";
        assert_eq!(
            parse_classification(out),
            ParseOutcome::Parsed {
                tag: Tag::P1,
                label: "Ship billing migration".to_string(),
                summary: "- moved client\n- added tests".to_string(),
            }
        );
    }

    #[test]
    fn off_spellings_collapse_to_one_tag() {
        for line in [
            "OFF-PRIORITY: yak shaving",
            "off priority - yak shaving",
            "OffPriority: yak shaving",
            "OFF: yak shaving",
        ] {
            let (tag, label) = split_tag(line);
            assert_eq!(tag, Tag::OffPriority, "{line}");
            assert_eq!(label, "yak shaving", "{line}");
        }
    }

    #[test]
    fn other_stays_distinct_from_off_priority() {
        assert_eq!(split_tag("OTHER: misc").0, Tag::Other);
    }

    #[test]
    fn unknown_priority_text_becomes_unclear_with_full_label() {
        let (tag, label) = split_tag("Something else entirely");
        assert_eq!(tag, Tag::Unclear);
        assert_eq!(label, "Something else entirely");
    }

    #[test]
    fn missing_priority_line_is_a_parse_failure() {
        assert!(matches!(
            parse_classification("SUMMARY:\n- only a summary"),
            ParseOutcome::Failed { .. }
        ));
        assert!(matches!(parse_classification(""), ParseOutcome::Failed { .. }));
    }

    #[test]
    fn prompt_shape_depends_on_taxonomy() {
        let with = build_classify_prompt("USER: hi\n", "code/app", "P0: Billing migration");
        assert!(with.contains("Do NOT stretch to fit"));
        assert!(with.contains("## Priorities Reference"));
        assert!(with.contains("P0: Billing migration"));
        assert!(with.contains("## Conversation (Project: code/app)"));

        let without = build_classify_prompt("USER: hi\n", "code/app", "  ");
        assert!(without.contains("BUGFIX: [brief description]"));
        assert!(!without.contains("Priorities Reference"));
        assert!(without.ends_with("- bullet 2"));
    }

    struct Canned(Result<String, OracleError>);

    impl Oracle for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn complete(&self, _: &str, _: &str, _: Duration) -> Result<String, OracleError> {
            self.0.clone()
        }
    }

    #[test]
    fn oracle_classifier_surfaces_parse_failure_as_error() {
        let oracle = Canned(Ok("no markers here".to_string()));
        let classifier = OracleClassifier::new(&oracle, "haiku", Duration::from_secs(1));
        assert!(classifier.classify("USER: x", "p", "").is_err());

        let oracle = Canned(Ok("PRIORITY: TOOLING: ci cache\nSUMMARY:\n- sped up ci".to_string()));
        let classifier = OracleClassifier::new(&oracle, "haiku", Duration::from_secs(1));
        let got = classifier.classify("USER: x", "p", "").expect("classify");
        assert_eq!(got.tag, Tag::Tooling);
        assert_eq!(got.label, "ci cache");
    }
}
