//! Full invocations through `Handler::handle_event` with scripted backends.

use relay::core::envelope::Envelope;
use relay::core::fallback::FALLBACK_MARKER;
use relay::core::types::{FileRun, ResponseRecord};
use relay::handler::Handler;
use relay::test_support::{
    ScriptedAssistant, ScriptedRun, StaticSecretStore, TestEnv, dir_entries, python_available,
};
use serde_json::{Value, json};

type TestHandler = Handler<StaticSecretStore, ScriptedAssistant>;

fn handler(env: &TestEnv, run: ScriptedRun) -> TestHandler {
    Handler::new(
        env.config.clone(),
        StaticSecretStore::new("sk-test"),
        ScriptedAssistant::new(run),
    )
}

fn ok_record(envelope: &Envelope) -> ResponseRecord {
    assert_eq!(envelope.status_code, 200, "body: {}", envelope.body);
    envelope.record().expect("record")
}

#[test]
fn missing_task_is_rejected_regardless_of_other_fields() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::ok("unused"));

    for event in [
        json!({}),
        json!({"task": ""}),
        json!({"task": "", "execute": true}),
        json!({"task": null}),
        json!({"execute": "garbage"}),
    ] {
        let envelope = handler.handle_event(&event);
        assert_eq!(envelope.status_code, 400, "event {event}");
        assert_eq!(envelope.error_message().as_deref(), Some("No task provided"));
    }

    assert!(handler.assistant().seen().is_empty());
    assert_eq!(handler.secrets().calls(), 0);
    assert!(dir_entries(env.root()).is_empty());
}

#[test]
fn malformed_execute_flag_is_a_bad_request() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::ok("unused"));

    let envelope = handler.handle_event(&json!({"task": "hi", "execute": "yes"}));

    assert_eq!(envelope.status_code, 400);
    let message = envelope.error_message().expect("error message");
    assert!(message.starts_with("Invalid request:"), "{message}");
    assert!(handler.assistant().seen().is_empty());
}

#[test]
fn assistant_output_is_adopted_and_files_are_collected() {
    let env = TestEnv::new().expect("env");
    let run = ScriptedRun::ok("wrote app.js\n")
        .with_file("app.js", "console.log('hi')")
        .with_file("notes.txt", "todo")
        .with_file("data.json", "{}");
    let handler = handler(&env, run);

    let record = ok_record(&handler.handle_event(&json!({"task": "build an app"})));

    assert_eq!(record.claude_output, "wrote app.js\n");
    assert_eq!(record.claude_error, None);
    assert_eq!(record.return_code, 0);
    assert!(record.execution_results.is_none());
    let files = record.created_files.expect("created files");
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["app.js", "notes.txt"]
    );
    assert_eq!(files["app.js"], "console.log('hi')");
}

#[test]
fn assistant_receives_task_key_and_private_home() {
    let env = TestEnv::new().expect("env");
    let handler = Handler::new(
        env.config.clone(),
        StaticSecretStore::new("sk-from-store"),
        ScriptedAssistant::new(ScriptedRun::ok("done")),
    );

    ok_record(&handler.handle_event(&json!({"task": "do the thing"})));

    let seen = handler.assistant().seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].task, "do the thing");
    assert_eq!(seen[0].api_key, "sk-from-store");
    assert!(seen[0].workdir.starts_with(env.root()));
    assert!(!seen[0].home.starts_with(&seen[0].workdir));
    assert_eq!(handler.secrets().calls(), 1);
}

#[test]
fn assistant_stderr_becomes_claude_error() {
    let env = TestEnv::new().expect("env");
    let run = ScriptedRun::Complete {
        stdout: "partial".to_string(),
        stderr: "rate limited".to_string(),
        exit_code: 0,
        files: Vec::new(),
    };

    let record = ok_record(&handler(&env, run).handle_event(&json!({"task": "x"})));

    assert_eq!(record.claude_output, "partial");
    assert_eq!(record.claude_error.as_deref(), Some("rate limited"));
}

#[test]
fn hello_world_fallback_on_timeout() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::Timeout);

    let record = ok_record(&handler.handle_event(&json!({"task": "Print Hello World"})));

    assert!(record.claude_output.starts_with(FALLBACK_MARKER));
    assert!(record.claude_output.contains("# Task: Print Hello World"));
    assert_eq!(record.return_code, 0);
    let error = record.claude_error.expect("claude error");
    assert!(
        error.starts_with("Claude CLI Error: Claude CLI execution timeout"),
        "{error}"
    );
    let files = record.created_files.expect("created files");
    assert_eq!(files.len(), 1);
    assert_eq!(files["hello_world.py"], r#"print("Hello, World!")"#);
}

#[test]
fn calculator_fallback_on_launch_error() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::LaunchError("No such file".to_string()));

    let record = ok_record(&handler.handle_event(&json!({"task": "a MATH helper"})));

    assert_eq!(record.return_code, 0);
    assert_eq!(
        record.claude_error.as_deref(),
        Some("Claude CLI Error: Claude CLI process error: No such file")
    );
    let files = record.created_files.expect("created files");
    assert!(files["calculator.py"].contains("'Cannot divide by zero'"));
}

#[test]
fn generic_fallback_embeds_task_text() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::Timeout);
    let task = "search the internet for the latest AI news and summarize it";

    let record = ok_record(&handler.handle_event(&json!({"task": task})));

    assert_eq!(record.return_code, 0);
    let files = record.created_files.expect("created files");
    assert!(files["generated_script.py"].contains(task));
}

#[test]
fn execute_false_never_attaches_execution_fields() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::Timeout);

    let envelope = handler.handle_event(&json!({"task": "hello world", "execute": false}));

    assert_eq!(envelope.status_code, 200);
    let body: Value = serde_json::from_str(&envelope.body).expect("body json");
    assert!(body.get("execution_results").is_none());
    assert!(body.get("execution_error").is_none());
    assert!(body.get("created_files").is_some());
}

#[test]
fn nonzero_exit_skips_execution() {
    let env = TestEnv::new().expect("env");
    let run = ScriptedRun::ok("failed run")
        .with_file("main.py", "print('should not run')")
        .exit_code(1);
    let handler = handler(&env, run);

    let record = ok_record(&handler.handle_event(&json!({"task": "x", "execute": true})));

    assert_eq!(record.return_code, 1);
    assert_eq!(record.claude_output, "failed run");
    assert!(record.execution_results.is_none());
    assert!(record.created_files.expect("files").contains_key("main.py"));
}

#[test]
fn missing_interpreter_is_reported_per_file() {
    let mut env = TestEnv::new().expect("env");
    env.config.scripts.interpreter = "/nonexistent/python".to_string();
    let handler = handler(&env, ScriptedRun::Timeout);

    let record = ok_record(&handler.handle_event(&json!({"task": "hello world", "execute": true})));

    assert!(record.execution_error.is_none());
    let results = record.execution_results.expect("results");
    assert_eq!(results.len(), 1);
    assert!(matches!(&results[0], FileRun::Failed { file, .. } if file == "hello_world.py"));
}

#[test]
fn secret_failure_is_fatal_and_still_cleans_up() {
    let env = TestEnv::new().expect("env");
    let handler = Handler::new(
        env.config.clone(),
        StaticSecretStore::failing(),
        ScriptedAssistant::new(ScriptedRun::ok("unused")),
    );

    let envelope = handler.handle_event(&json!({"task": "hello world"}));

    assert_eq!(envelope.status_code, 500);
    assert_eq!(
        envelope.error_message().as_deref(),
        Some("Lambda function error: Failed to retrieve ANTHROPIC_API_KEY from secrets manager")
    );
    // test_config allows two attempts.
    assert_eq!(handler.secrets().calls(), 2);
    assert!(handler.assistant().seen().is_empty());
    assert!(dir_entries(env.root()).is_empty());
}

#[test]
fn workspace_is_removed_on_success_and_fallback_paths() {
    let env = TestEnv::new().expect("env");

    let success = handler(&env, ScriptedRun::ok("ok").with_file("a.py", "print(1)"));
    ok_record(&success.handle_event(&json!({"task": "one"})));
    assert!(dir_entries(env.root()).is_empty());

    let fallback = handler(&env, ScriptedRun::Timeout);
    ok_record(&fallback.handle_event(&json!({"task": "two"})));
    assert!(dir_entries(env.root()).is_empty());
}

#[test]
fn sequential_requests_use_distinct_workspaces() {
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::ok("ok"));

    handler.handle_event(&json!({"task": "first task"}));
    handler.handle_event(&json!({"task": "second task"}));

    let seen = handler.assistant().seen();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0].workdir, seen[1].workdir);
    assert_ne!(seen[0].home, seen[1].home);
    assert_eq!(seen[1].task, "second task");
    for invocation in &seen {
        assert!(!invocation.workdir.exists());
        assert!(!invocation.home.exists());
    }
}

#[test]
fn hello_world_scenario_executes_fallback_script() {
    if !python_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::LaunchError("claude: not found".to_string()));

    let record = ok_record(&handler.handle_event(&json!({"task": "hello world", "execute": true})));

    assert!(record.claude_output.contains(FALLBACK_MARKER));
    let files = record.created_files.expect("created files");
    assert_eq!(files["hello_world.py"], r#"print("Hello, World!")"#);
    assert_eq!(
        record.execution_results.expect("execution results"),
        vec![FileRun::Completed {
            file: "hello_world.py".to_string(),
            stdout: "Hello, World!\n".to_string(),
            stderr: None,
            return_code: 0,
        }]
    );
    assert!(dir_entries(env.root()).is_empty());
}

#[test]
fn generic_fallback_script_prints_task_line() {
    if !python_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    let env = TestEnv::new().expect("env");
    let handler = handler(&env, ScriptedRun::Timeout);
    let task = "it's a \"quoted\" task\nwith two lines";

    let record = ok_record(&handler.handle_event(&json!({"task": task, "execute": true})));

    let results = record.execution_results.expect("execution results");
    match &results[0] {
        FileRun::Completed {
            file,
            stdout,
            return_code,
            ..
        } => {
            assert_eq!(file, "generated_script.py");
            assert_eq!(*return_code, 0);
            assert!(stdout.contains(&format!("Task: {task}")), "{stdout}");
        }
        other => panic!("unexpected {other:?}"),
    }
}
