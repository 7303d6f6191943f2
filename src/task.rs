use serde::Deserialize;

use crate::language::Language;

/// A grading problem definition, supplied by the task-management side.
/// Immutable for the duration of a grading call.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub name: String,
    /// Difficulty rating, 1 to 5; the per-test time limit is derived from it.
    pub complexity: u32,
    /// Test inputs as newline-block-delimited text.
    #[serde(default)]
    pub input: String,
    /// Expected outputs, same block count and order as `input`.
    #[serde(default)]
    pub output: String,
    /// Reference solution, kept on the record for the surrounding
    /// application; the engine never runs it.
    #[serde(default)]
    pub solution: String,
}

/// One (input, expected output) pair, drawn by position from the task's
/// block lists.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

impl Task {
    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.complexity) * 1000
    }

    /// Pairs input and output blocks into ordered test cases.
    ///
    /// A count mismatch between the two lists is a caller-side data error;
    /// the pairing truncates at the shorter list instead of failing.
    pub fn test_cases(&self) -> Vec<TestCase> {
        split_blocks(&self.input)
            .into_iter()
            .zip(split_blocks(&self.output))
            .map(|(input, expected)| TestCase { input, expected })
            .collect()
    }
}

/// Splits a newline-block-delimited payload into its blocks.  Blocks are
/// separated by one blank line; CRLF payloads are normalized first.
fn split_blocks(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::to_string)
        .collect()
}

/// One grading call: the task to grade against, the submission itself, and
/// the identity whose token keeps scratch files collision-free.  Not
/// retained by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRequest {
    pub task: Task,
    pub language: Language,
    pub source_code: String,
    pub submitter: String,
}
