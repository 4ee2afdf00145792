//! Parses a semi-structured markdown plan document into [`Batch`]/[`Task`]
//! records (§4.1), following the grammar the original plan-writing tooling
//! emits: `## Batch N: Title`, `### Task N.M: Title`, with
//! `**Dependencies:**`, `**Files:**`, and `**Verification:**` sections.

use regex::Regex;

use crate::batch::{Batch, BatchStatus};
use crate::task::{task_sort_key, Task, TaskExtras, TaskStatus};
use crate::PlanError;

const DEFAULT_VERIFICATION: &[&str] = &["cargo test", "cargo clippy --all-targets -- -D warnings"];

/// A parsed batch together with its tasks, before IDs are assigned by the
/// orchestrator.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    /// Batch number from the header.
    pub number: u32,
    /// Batch title from the header.
    pub title: String,
    /// Batch numbers this batch depends on.
    pub dependencies: Vec<u32>,
    /// Tasks belonging to this batch, sorted per [`task_sort_key`].
    pub tasks: Vec<ParsedTask>,
}

/// A parsed task, before an ID is assigned.
#[derive(Debug, Clone)]
pub struct ParsedTask {
    /// Task number from the header (e.g. `"2.1"`).
    pub number: String,
    /// Task title from the header.
    pub title: String,
    /// Extracted payload.
    pub extras: TaskExtras,
}

/// Parse a plan document's full text into an ordered list of batches.
///
/// A batch that fails to parse is fatal (the whole document is rejected);
/// a task within a batch that fails to parse is dropped with a logged
/// warning, matching the original tool's behavior.
///
/// # Errors
///
/// Returns [`PlanError::Empty`] if no batch headers are found, or
/// [`PlanError::MalformedBatch`] if a batch section cannot be parsed.
pub fn parse_plan(content: &str) -> Result<Vec<ParsedBatch>, PlanError> {
    let batch_header = Regex::new(r"(?m)^#{2,3}\s*Batch\s+(\d+(?:\.\d+)?):\s*(.+)$").expect("valid regex");
    let matches: Vec<_> = batch_header.captures_iter(content).collect();

    if matches.is_empty() {
        return Err(PlanError::Empty);
    }

    let mut batches = Vec::with_capacity(matches.len());
    for (i, cap) in matches.iter().enumerate() {
        let number: u32 = cap[1]
            .split('.')
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| PlanError::MalformedBatch(0, format!("unparseable batch number: {}", &cap[1])))?;
        let title = cap[2].trim().to_string();

        let start = cap.get(0).expect("whole match").end();
        let end = matches
            .get(i + 1)
            .map_or(content.len(), |next| next.get(0).expect("whole match").start());
        let section = &content[start..end];

        let parsed = parse_batch_section(number, &title, section)
            .map_err(|e| PlanError::MalformedBatch(number, e))?;
        batches.push(parsed);
    }

    Ok(batches)
}

fn parse_batch_section(number: u32, title: &str, section: &str) -> Result<ParsedBatch, String> {
    let dependencies = extract_dependency_batches(section);

    let task_header = Regex::new(r"(?m)^#{3,4}\s*Task\s+([\d.a-z]+):\s*(.+)$").expect("valid regex");
    let matches: Vec<_> = task_header.captures_iter(section).collect();

    let mut tasks = Vec::with_capacity(matches.len());
    for (i, cap) in matches.iter().enumerate() {
        let task_number = cap[1].to_string();
        let task_title = cap[2].trim().to_string();

        let start = cap.get(0).expect("whole match").end();
        let end = matches
            .get(i + 1)
            .map_or(section.len(), |next| next.get(0).expect("whole match").start());
        let task_section = &section[start..end];

        match parse_task(&task_number, &task_title, task_section) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                tracing::warn!(batch = number, task = %task_number, error = %e, "dropping unparseable task");
            }
        }
    }

    tasks.sort_by_key(|t| task_sort_key(&t.number));

    Ok(ParsedBatch {
        number,
        title: title.to_string(),
        dependencies,
        tasks,
    })
}

fn extract_dependency_batches(section: &str) -> Vec<u32> {
    let field = Regex::new(r"(?m)^\*\*Dependencies:\*\*\s*(.+)$").expect("valid regex");
    let Some(cap) = field.captures(section) else {
        return Vec::new();
    };
    let text = cap[1].trim();
    if text.to_lowercase().contains("none") {
        return Vec::new();
    }
    let batch_ref = Regex::new(r"(?i)batch\s+(\d+)").expect("valid regex");
    batch_ref
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

fn parse_task(number: &str, title: &str, section: &str) -> Result<ParsedTask, String> {
    let files = extract_files(section);
    let verification_steps = extract_verification_steps(section);
    let depends_on = extract_task_dependencies(section);

    Ok(ParsedTask {
        number: number.to_string(),
        title: title.to_string(),
        extras: TaskExtras {
            implementation_text: section.trim().to_string(),
            files,
            verification_steps,
            depends_on,
            extra: serde_json::Map::new(),
        },
    })
}

fn extract_files(section: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut in_files_block = false;

    let header = Regex::new(r"(?i)^\*\*Files?(?:\s+to\s+(?:Create|Modify))?:\*\*").expect("valid regex");
    let inline = Regex::new(r"(?i)^\*\*File:\*\*\s*(.+)$").expect("valid regex");
    let bullet = Regex::new(r"^-\s*(?:Create|Modify|Update):?\s*`?([^`\n]+)`?").expect("valid regex");
    let bare_bullet = Regex::new(r"^-\s*`?([^`\n]+)`?\s*$").expect("valid regex");
    let other_header = Regex::new(r"^\*\*[A-Za-z]").expect("valid regex");

    for line in section.lines() {
        let line = line.trim();
        if header.is_match(line) {
            in_files_block = true;
            continue;
        }
        if let Some(cap) = inline.captures(line) {
            files.push(cap[1].trim().to_string());
            continue;
        }
        if in_files_block {
            if other_header.is_match(line) && !header.is_match(line) {
                in_files_block = false;
                continue;
            }
            if let Some(cap) = bullet.captures(line) {
                files.push(cap[1].trim().to_string());
            } else if let Some(cap) = bare_bullet.captures(line) {
                files.push(cap[1].trim().to_string());
            }
        }
    }

    files
}

fn extract_verification_steps(section: &str) -> Vec<String> {
    let mut steps = Vec::new();
    let mut in_block = false;

    let header = Regex::new(r"(?i)^\*\*(Verification|Test)").expect("valid regex");
    let bullet = Regex::new(r"^(?:-|\d+\.)\s*`?([^`\n]+)`?\s*$").expect("valid regex");
    let other_header = Regex::new(r"^\*\*[A-Za-z]").expect("valid regex");

    for line in section.lines() {
        let line = line.trim();
        if header.is_match(line) {
            in_block = true;
            continue;
        }
        if in_block {
            if other_header.is_match(line) && !header.is_match(line) {
                in_block = false;
                continue;
            }
            if let Some(cap) = bullet.captures(line) {
                steps.push(cap[1].trim().to_string());
            }
        }
    }

    if steps.is_empty() {
        DEFAULT_VERIFICATION.iter().map(|s| (*s).to_string()).collect()
    } else {
        steps
    }
}

fn extract_task_dependencies(section: &str) -> Vec<String> {
    let field = Regex::new(r"(?i)\*\*Depends on:\*\*\s*Task\s+([\d.]+)").expect("valid regex");
    field.captures_iter(section).map(|c| c[1].to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r"
## Batch 1: Bootstrap

**Dependencies:** none

### Task 1.1: Add config loader

**Files:**
- Create: `src/config.rs`
- `src/lib.rs`

**Implementation:**
Add a Config struct with serde support.

**Verification:**
- cargo check
- cargo test config

## Batch 2: Wire it up

**Dependencies:** batch 1

### Task 2.1: Use the loader

**Depends on:** Task 1.1

**Implementation:**
Call Config::load from main.
";

    #[test]
    fn parses_batches_in_document_order() {
        let batches = parse_plan(PLAN).expect("parse");
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].number, 1);
        assert_eq!(batches[1].number, 2);
        assert_eq!(batches[1].dependencies, vec![1]);
    }

    #[test]
    fn parses_task_files_and_verification() {
        let batches = parse_plan(PLAN).expect("parse");
        let task = &batches[0].tasks[0];
        assert_eq!(task.number, "1.1");
        assert_eq!(task.extras.files, vec!["src/config.rs", "src/lib.rs"]);
        assert_eq!(task.extras.verification_steps, vec!["cargo check", "cargo test config"]);
    }

    #[test]
    fn missing_verification_section_falls_back_to_defaults() {
        let batches = parse_plan(PLAN).expect("parse");
        let task = &batches[1].tasks[0];
        assert_eq!(task.extras.verification_steps, DEFAULT_VERIFICATION);
    }

    #[test]
    fn parses_intra_batch_task_dependency() {
        let batches = parse_plan(PLAN).expect("parse");
        assert_eq!(batches[1].tasks[0].extras.depends_on, vec!["1.1"]);
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(parse_plan("no batches here"), Err(PlanError::Empty)));
    }

    #[test]
    fn task_numbers_sort_by_numeric_then_alpha_suffix() {
        let plan = r"
## Batch 1: x

### Task 1.10: ten

body

### Task 1.2: two

body

### Task 1.1a: one-a

body
";
        let batches = parse_plan(plan).expect("parse");
        let numbers: Vec<&str> = batches[0].tasks.iter().map(|t| t.number.as_str()).collect();
        assert_eq!(numbers, vec!["1.1a", "1.2", "1.10"]);
    }
}
