//! Runs generated scripts found in the scratch directory.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::types::FileRun;
use crate::io::config::ScriptConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::workspace::{file_label, list_files_with_extensions};

pub const TIMEOUT_ERROR: &str = "Execution timeout";

/// Executes every matching file in a directory, one child process each.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    extensions: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ScriptRunner {
    pub fn new(config: &ScriptConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            extensions: config.extensions.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// Run all matching files in name order.
    ///
    /// Each file's outcome is independent: a timeout or launch failure is
    /// recorded for that file and the batch continues. Only failing to list
    /// `dir` is an error.
    #[instrument(skip_all, fields(dir = %dir.display(), interpreter = %self.interpreter))]
    pub fn run_all(&self, dir: &Path) -> Result<Vec<FileRun>> {
        let files = list_files_with_extensions(dir, &self.extensions)?;
        debug!(count = files.len(), "scripts found");
        Ok(files.iter().map(|path| self.run_one(dir, path)).collect())
    }

    fn run_one(&self, dir: &Path, path: &Path) -> FileRun {
        let file = file_label(path);
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(path).current_dir(dir);

        match run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes) {
            Ok(output) if output.timed_out => {
                warn!(file, timeout_secs = self.timeout.as_secs(), "script timed out");
                FileRun::Failed {
                    file,
                    error: TIMEOUT_ERROR.to_string(),
                }
            }
            Ok(output) => {
                let stderr = output.stderr_text("script");
                info!(file, return_code = output.exit_code(), "script finished");
                FileRun::Completed {
                    file,
                    stdout: output.stdout_text("script"),
                    stderr: (!stderr.is_empty()).then_some(stderr),
                    return_code: output.exit_code(),
                }
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(file, err = %error, "script failed to run");
                FileRun::Failed { file, error }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn runner(interpreter: &str, timeout: Duration) -> ScriptRunner {
        ScriptRunner {
            interpreter: interpreter.to_string(),
            extensions: vec!["sh".to_string()],
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn runs_files_in_name_order_and_isolates_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("b_fail.sh"), "echo bad >&2; exit 4").expect("write");
        fs::write(temp.path().join("a_ok.sh"), "echo hello").expect("write");
        fs::write(temp.path().join("c_slow.sh"), "sleep 2").expect("write");
        fs::write(temp.path().join("d_after.sh"), "echo after").expect("write");
        fs::write(temp.path().join("ignored.txt"), "echo nope").expect("write");

        let results = runner("sh", Duration::from_millis(300))
            .run_all(temp.path())
            .expect("run");

        let names: Vec<&str> = results.iter().map(FileRun::file).collect();
        assert_eq!(names, vec!["a_ok.sh", "b_fail.sh", "c_slow.sh", "d_after.sh"]);
        assert_eq!(
            results[0],
            FileRun::Completed {
                file: "a_ok.sh".to_string(),
                stdout: "hello\n".to_string(),
                stderr: None,
                return_code: 0,
            }
        );
        assert_eq!(
            results[1],
            FileRun::Completed {
                file: "b_fail.sh".to_string(),
                stdout: String::new(),
                stderr: Some("bad\n".to_string()),
                return_code: 4,
            }
        );
        assert_eq!(
            results[2],
            FileRun::Failed {
                file: "c_slow.sh".to_string(),
                error: TIMEOUT_ERROR.to_string(),
            }
        );
        assert!(
            matches!(&results[3], FileRun::Completed { stdout, return_code: 0, .. } if stdout == "after\n")
        );
    }

    #[test]
    fn timeout_holds_for_scripts_with_background_children() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.sh"), "sleep 6 &\nsleep 6\n").expect("write");
        fs::write(temp.path().join("b.sh"), "sleep 6 &\necho spawned\n").expect("write");

        let started = std::time::Instant::now();
        let results = runner("sh", Duration::from_millis(300))
            .run_all(temp.path())
            .expect("run");

        assert!(
            started.elapsed() < Duration::from_secs(4),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(
            results[0],
            FileRun::Failed {
                file: "a.sh".to_string(),
                error: TIMEOUT_ERROR.to_string(),
            }
        );
        assert!(
            matches!(&results[1], FileRun::Completed { stdout, return_code: 0, .. } if stdout == "spawned\n")
        );
    }

    #[test]
    fn missing_interpreter_is_recorded_per_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.sh"), "echo hi").expect("write");

        let results = runner("/nonexistent/interpreter", Duration::from_secs(5))
            .run_all(temp.path())
            .expect("run");
        match &results[0] {
            FileRun::Failed { file, error } => {
                assert_eq!(file, "a.sh");
                assert!(error.contains("spawn command"), "{error}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_directory_yields_no_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        let results = runner("sh", Duration::from_secs(5))
            .run_all(temp.path())
            .expect("run");
        assert!(results.is_empty());
    }

    #[test]
    fn unreadable_directory_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = runner("sh", Duration::from_secs(5))
            .run_all(&temp.path().join("missing"))
            .unwrap_err();
        assert!(err.to_string().contains("read dir"));
    }
}
