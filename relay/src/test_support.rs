//! Test-only helpers: scripted assistants, static secret stores, configs.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;

use crate::core::types::ExecutionResult;
use crate::io::assistant::{Assistant, AssistantError, AssistantRequest};
use crate::io::config::RelayConfig;
use crate::io::secrets::{SecretError, SecretStore};

/// Secret store returning a fixed value, or failing every call when `None`.
pub struct StaticSecretStore {
    value: Option<String>,
    calls: AtomicUsize,
}

impl StaticSecretStore {
    pub fn new(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            value: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecretStore for StaticSecretStore {
    fn fetch(&self, name: &str, _region: Option<&str>) -> Result<String, SecretError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value.clone().ok_or_else(|| SecretError::Status {
            status: 400,
            body: format!("ResourceNotFoundException: {name}"),
        })
    }
}

/// What a scripted assistant does when invoked.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Write `files` into the workdir, then return the given result.
    Complete {
        stdout: String,
        stderr: String,
        exit_code: i32,
        files: Vec<(String, String)>,
    },
    /// Fail as if the process timed out.
    Timeout,
    /// Fail as if the binary could not be launched.
    LaunchError(String),
}

impl ScriptedRun {
    pub fn ok(stdout: &str) -> Self {
        Self::Complete {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            files: Vec::new(),
        }
    }

    pub fn with_file(self, name: &str, contents: &str) -> Self {
        match self {
            Self::Complete {
                stdout,
                stderr,
                exit_code,
                mut files,
            } => {
                files.push((name.to_string(), contents.to_string()));
                Self::Complete {
                    stdout,
                    stderr,
                    exit_code,
                    files,
                }
            }
            other => other,
        }
    }

    pub fn exit_code(self, code: i32) -> Self {
        match self {
            Self::Complete {
                stdout,
                stderr,
                files,
                ..
            } => Self::Complete {
                stdout,
                stderr,
                exit_code: code,
                files,
            },
            other => other,
        }
    }
}

/// Details of an invocation seen by [`ScriptedAssistant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenInvocation {
    pub task: String,
    pub workdir: PathBuf,
    pub home: PathBuf,
    pub api_key: String,
}

/// Assistant that replays a fixed behavior and records every request.
pub struct ScriptedAssistant {
    run: ScriptedRun,
    seen: Mutex<Vec<SeenInvocation>>,
}

impl ScriptedAssistant {
    pub fn new(run: ScriptedRun) -> Self {
        Self {
            run,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<SeenInvocation> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl Assistant for ScriptedAssistant {
    fn invoke(&self, request: &AssistantRequest<'_>) -> Result<ExecutionResult, AssistantError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(SeenInvocation {
                task: request.task.to_string(),
                workdir: request.workdir.to_path_buf(),
                home: request.home.to_path_buf(),
                api_key: request.api_key.to_string(),
            });
        }
        match &self.run {
            ScriptedRun::Complete {
                stdout,
                stderr,
                exit_code,
                files,
            } => {
                for (name, contents) in files {
                    fs::write(request.workdir.join(name), contents)
                        .map_err(|e| AssistantError::Process(e.into()))?;
                }
                Ok(ExecutionResult {
                    stdout: stdout.clone(),
                    stderr: stderr.clone(),
                    exit_code: *exit_code,
                })
            }
            ScriptedRun::Timeout => Err(AssistantError::Timeout(Duration::from_secs(300))),
            ScriptedRun::LaunchError(message) => {
                Err(AssistantError::Process(anyhow!(message.clone())))
            }
        }
    }
}

/// Temporary workspace root plus a config pointing at it.
pub struct TestEnv {
    pub temp: tempfile::TempDir,
    pub config: RelayConfig,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        Ok(Self { temp, config })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }
}

/// Config with fast secret retries and workspaces under `root`.
pub fn test_config(root: &Path) -> RelayConfig {
    let mut cfg = RelayConfig::default();
    cfg.workspace.root = Some(root.to_path_buf());
    cfg.secret.max_attempts = 2;
    cfg.secret.initial_backoff_ms = 1;
    cfg.secret.max_backoff_ms = 2;
    cfg.scripts.timeout_secs = 10;
    cfg
}

/// Whether the default script interpreter (`python3`) can be launched.
pub fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Names of entries directly under `dir` (empty when missing).
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// One request received by [`serve_once`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request line and headers, CRLF-terminated.
    pub head: String,
    pub body: String,
}

/// Serve exactly one HTTP response on a loopback port.
///
/// Returns the `http://host:port` base URL and a handle yielding the request
/// the server received. `status_line` is e.g. `"HTTP/1.1 200 OK"`; each of
/// `headers` is a full `Name: value` line without CRLF.
///
/// Accepts a single connection carrying a single request whose body, if any,
/// is sized by `Content-Length` (no chunked encoding), then closes it. Any I/O
/// failure panics the server thread and surfaces on `join`.
pub fn serve_once(
    status_line: &str,
    headers: &[&str],
    body: &str,
) -> (String, thread::JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    let mut response = format!("{status_line}\r\n");
    for header in headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read line");
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().expect("content length");
            }
            head.push_str(&line);
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).expect("read body");
        stream.write_all(response.as_bytes()).expect("write response");
        CapturedRequest {
            head,
            body: String::from_utf8(body).expect("utf8 body"),
        }
    });
    (format!("http://{addr}"), handle)
}
