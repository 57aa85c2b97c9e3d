//! Rendering of failures into readable, deduplicated report lines.

use crate::client::ApiFailure;
use crate::error::MigrateError;

/// Render a failure as one readable line.
///
/// Nested lists are flattened; identical lines are collapsed into
/// `"<message> (occurred N times)"` in first-occurrence order.
pub fn stringify(failure: &ApiFailure) -> String {
    match failure {
        ApiFailure::Message(message) => message.clone(),
        ApiFailure::Structured {
            message,
            status_code,
            fields,
        } => {
            let mut line = match status_code {
                Some(code) if !code.is_empty() => format!("{}: {}", code, message),
                _ => message.clone(),
            };
            if !fields.is_empty() {
                line.push_str(&format!(" [fields: {}]", fields.join(", ")));
            }
            line
        }
        ApiFailure::Http { status, message } => {
            if message.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, message)
            }
        }
        ApiFailure::Many(failures) => {
            let mut lines = Vec::new();
            flatten(failures, &mut lines);
            collapse(lines).join("; ")
        }
    }
}

fn flatten(failures: &[ApiFailure], out: &mut Vec<String>) {
    for failure in failures {
        match failure {
            ApiFailure::Many(nested) => flatten(nested, out),
            other => out.push(stringify(other)),
        }
    }
}

/// Collapse repeated lines, keeping the first occurrence's position.
pub fn collapse<I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut counted: Vec<(String, usize)> = Vec::new();
    for line in lines {
        match counted.iter_mut().find(|(seen, _)| *seen == line) {
            Some((_, count)) => *count += 1,
            None => counted.push((line, 1)),
        }
    }

    counted
        .into_iter()
        .map(|(line, count)| {
            if count > 1 {
                format!("{} (occurred {} times)", line, count)
            } else {
                line
            }
        })
        .collect()
}

/// Run-level accumulator for error lines.
#[derive(Debug, Default)]
pub struct ErrorReport {
    lines: Vec<String>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an engine error.
    pub fn push_error(&mut self, err: &MigrateError) {
        self.lines.push(err.to_string());
    }

    /// Append a raw line.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Final, collapsed list of lines.
    pub fn finish(self) -> Vec<String> {
        collapse(self.lines)
    }
}
