use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::LimitsConfig;
use crate::language::{LanguageRegistry, Toolchain};
use crate::runner::{self, RunnerError};
use crate::task::{GradeRequest, TestCase};
use crate::verdict::{Completion, GradeResult, Metric, Verdict};

/// The one stderr content tolerated from an otherwise failing toolchain
/// step: the JVM echoes `Picked up JAVA_TOOL_OPTIONS: ...` on startup in
/// environments that set that variable.
const BENIGN_STDERR_MARKER: &str = "JAVA_TOOL_OPTIONS";

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("failed to stage submission files: {0}")]
    Prepare(#[from] std::io::Error),
}

/// Pipeline position, advanced as the submission moves through grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preparing,
    Compiling,
    Running(usize),
    Completed,
}

/// Grades one submission against its task and returns the result.
///
/// Every failure mode is normalized into the returned [`GradeResult`];
/// nothing is propagated to the caller.  Scratch files are removed on every
/// exit path.
pub fn grade(registry: &LanguageRegistry, limits: &LimitsConfig, request: &GradeRequest) -> GradeResult {
    Checker::new(registry.get(request.language), limits, request).grade()
}

/// Variant of [`grade`] that uses the given toolchain directly instead of a
/// registry lookup.  This seam lets embedders supply nonstandard commands
/// and lets the pipeline be exercised without compilers installed.
pub fn grade_with_toolchain(
    toolchain: &Toolchain,
    limits: &LimitsConfig,
    request: &GradeRequest,
) -> GradeResult {
    Checker::new(toolchain, limits, request).grade()
}

struct Checker<'a> {
    toolchain: &'a Toolchain,
    limits: &'a LimitsConfig,
    request: &'a GradeRequest,
    state: State,
    completion: Completion,
}

impl<'a> Checker<'a> {
    fn new(toolchain: &'a Toolchain, limits: &'a LimitsConfig, request: &'a GradeRequest) -> Self {
        Self {
            toolchain,
            limits,
            request,
            state: State::Preparing,
            completion: Completion::Incomplete,
        }
    }

    fn grade(mut self) -> GradeResult {
        let tests = self.request.task.test_cases();

        let scratch = match self.prepare() {
            Ok(scratch) => scratch,
            Err(e) => {
                log::error!(
                    "failed to prepare submission from {}: {e}",
                    self.request.submitter
                );
                return self.fail(e.to_string());
            }
        };

        let result = self.run_pipeline(&scratch, &tests);
        log::info!(
            "submission from {} ({}): {} [{:?}]",
            self.request.submitter,
            self.toolchain.name,
            result.verdict,
            self.completion
        );
        result
        // the scratch guard drops here, removing every generated file
    }

    /// Preparing: stage the source file in a submission-unique scratch
    /// directory, renaming the entry point first where the language
    /// requires it.
    fn prepare(&mut self) -> Result<ScratchDir, CheckerError> {
        self.advance(State::Preparing);

        let stem = submission_stem(&self.request.submitter);
        let path = std::env::temp_dir().join("grader").join(&stem);
        fs::create_dir_all(&path)?;
        let scratch = ScratchDir { path, stem };

        let code = if self.toolchain.renames_entry_point {
            rename_entry_point(&self.request.source_code, &scratch.stem)
        } else {
            self.request.source_code.clone()
        };
        fs::write(
            scratch.path.join(self.toolchain.source_name(&scratch.stem)),
            format!("{code}\n"),
        )?;

        Ok(scratch)
    }

    fn run_pipeline(&mut self, scratch: &ScratchDir, tests: &[TestCase]) -> GradeResult {
        let time_limit_ms = self.request.task.time_limit_ms();
        let memory_limit_mb = self.limits.memory_limit_mb;
        let run_deadline = Duration::from_millis(time_limit_ms + self.limits.grace_ms);
        let run_command = self.toolchain.run_command(&scratch.stem);
        let smoke_input = tests.first().map(|test| test.input.as_bytes());

        // Compiling: build if the language needs it, then probe the program
        // once against the first test block before the official suite.
        self.advance(State::Compiling);
        if let Some(compile_command) = self.toolchain.compile_command(&scratch.stem) {
            let compile_deadline = Duration::from_millis(self.limits.compile_timeout_ms);
            let compiled = match runner::run(&compile_command, &scratch.path, None, compile_deadline) {
                Ok(execution) => execution,
                Err(e) => return self.runner_failure(e),
            };
            if let Some(message) = non_benign_stderr(&compiled.stderr) {
                return self.fail(message);
            }
            if !scratch
                .path
                .join(self.toolchain.artifact_name(&scratch.stem))
                .exists()
            {
                return self.fail("compiler produced no artifact".to_string());
            }
        }

        let smoke = match runner::run(&run_command, &scratch.path, smoke_input, run_deadline) {
            Ok(execution) => execution,
            Err(e) => return self.runner_failure(e),
        };
        if let Some(message) = non_benign_stderr(&smoke.stderr) {
            return self.fail(message);
        }

        // Running(i): every test in order.  Block 0 is executed again as
        // official test 1 even though the smoke run just used it; the
        // reference judge does the same and the duplication is kept.
        let mut max_time_ms = 0.0_f64;
        let mut max_memory_mb = 0.0_f64;
        let mut outputs = Vec::with_capacity(tests.len());

        for (idx, test) in tests.iter().enumerate() {
            self.advance(State::Running(idx + 1));
            let execution = match runner::run(
                &run_command,
                &scratch.path,
                Some(test.input.as_bytes()),
                run_deadline,
            ) {
                Ok(execution) => execution,
                Err(e) => return self.runner_failure(e),
            };
            log::debug!(
                "test {}/{}: {:.2} ms, {:.2} MB",
                idx + 1,
                tests.len(),
                execution.time_ms,
                execution.memory_mb
            );

            if execution.time_ms > time_limit_ms as f64 {
                return self.limit_exceeded(Verdict::TimeLimitExceeded);
            }
            if execution.memory_mb > memory_limit_mb {
                return self.limit_exceeded(Verdict::MemoryLimitExceeded);
            }

            max_time_ms = max_time_ms.max(execution.time_ms);
            max_memory_mb = max_memory_mb.max(execution.memory_mb);
            outputs.push(execution.stdout.trim().to_string());
        }

        self.advance(State::Completed);
        self.completion = Completion::Complete;

        let matched = outputs
            .iter()
            .zip(tests)
            .all(|(produced, test)| produced == test.expected.trim());
        let verdict = if matched {
            Verdict::Accepted
        } else {
            Verdict::WrongAnswer
        };

        GradeResult {
            verdict,
            time: Metric::Millis(max_time_ms),
            memory: Metric::Megabytes(max_memory_mb),
            message: verdict.to_string(),
        }
    }

    fn advance(&mut self, state: State) {
        self.state = state;
        log::debug!("{}: {:?}", self.request.submitter, self.state);
    }

    fn runner_failure(&mut self, error: RunnerError) -> GradeResult {
        match error {
            RunnerError::Timeout { .. } => self.limit_exceeded(Verdict::TimeLimitExceeded),
            RunnerError::Launch { .. } => self.fail(error.to_string()),
        }
    }

    /// A soft or hard limit breach.  The breaching test's own figures are
    /// not surfaced; both metrics reset to N/A.
    fn limit_exceeded(&mut self, verdict: Verdict) -> GradeResult {
        GradeResult {
            verdict,
            time: Metric::NotApplicable,
            memory: Metric::NotApplicable,
            message: verdict.to_string(),
        }
    }

    fn fail(&mut self, message: String) -> GradeResult {
        GradeResult {
            verdict: Verdict::SystemFailure,
            time: Metric::NotApplicable,
            memory: Metric::NotApplicable,
            message,
        }
    }
}

/// Scratch directory for one submission.  Dropping it removes the source,
/// compiled artifacts and anything else the toolchain left behind, on every
/// exit path.
struct ScratchDir {
    path: PathBuf,
    stem: String,
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            log::warn!("failed to remove scratch dir {}: {e}", self.path.display());
        }
    }
}

/// Submission-unique file stem derived from the submitter token.  Restricted
/// to identifier characters so it can double as the renamed Java class name.
fn submission_stem(submitter: &str) -> String {
    let sanitized: String = submitter
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "sub_anonymous".to_string()
    } else {
        format!("sub_{sanitized}")
    }
}

/// Many submissions compile concurrently in the same namespace; the public
/// entry-point class must carry the submission stem instead.
fn rename_entry_point(code: &str, stem: &str) -> String {
    code.replace("public class Main", &format!("class {stem}"))
}

/// Returns the trimmed stderr when it disqualifies a toolchain step, or
/// `None` when the step passed (empty stderr, or the known-benign JVM
/// notice).
fn non_benign_stderr(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() || trimmed.contains(BENIGN_STDERR_MARKER) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_is_sanitized_to_identifier_characters() {
        assert_eq!(submission_stem("42"), "sub_42");
        assert_eq!(submission_stem("alice@example.com"), "sub_alice_example_com");
        assert_eq!(submission_stem("a b/c"), "sub_a_b_c");
        assert_eq!(submission_stem(""), "sub_anonymous");
    }

    #[test]
    fn entry_point_rename_targets_the_public_main_class() {
        let code = "public class Main {\n  public static void main(String[] a) {}\n}";
        let renamed = rename_entry_point(code, "sub_9");
        assert!(renamed.starts_with("class sub_9 {"));
        assert!(!renamed.contains("public class Main"));
    }

    #[test]
    fn entry_point_rename_leaves_other_classes_alone() {
        let code = "class Helper {}\npublic class Main {}";
        assert_eq!(rename_entry_point(code, "sub_1"), "class Helper {}\nclass sub_1 {}");
    }

    #[test]
    fn empty_stderr_is_benign() {
        assert_eq!(non_benign_stderr(""), None);
        assert_eq!(non_benign_stderr("  \n"), None);
    }

    #[test]
    fn jvm_notice_is_benign() {
        let notice = "Picked up JAVA_TOOL_OPTIONS: -Xmx512m";
        assert_eq!(non_benign_stderr(notice), None);
    }

    #[test]
    fn real_diagnostics_are_not_benign() {
        let stderr = "  error: expected ';' before '}' token\n";
        assert_eq!(
            non_benign_stderr(stderr),
            Some("error: expected ';' before '}' token".to_string())
        );
    }
}
