//! Deterministic stand-in scripts for when the assistant cannot run.
//!
//! Planning is pure: the same task text always yields the same file name,
//! contents and summary. Writing the planned file happens in
//! [`crate::io::fallback`].

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::ExecutionResult;

pub const FALLBACK_MARKER: &str = "# Fallback: Claude Code not available or not authenticated";

pub const HELLO_WORLD_FILE: &str = "hello_world.py";
pub const CALCULATOR_FILE: &str = "calculator.py";
pub const GENERIC_FILE: &str = "generated_script.py";

const HELLO_WORLD_SCRIPT: &str = "print(\"Hello, World!\")";
const CALCULATOR_SCRIPT: &str = include_str!("templates/calculator.py");
const GENERIC_TEMPLATE: &str = include_str!("templates/generated_script.py.j2");

/// Which canned script a task maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    HelloWorld,
    Calculator,
    Generic,
}

impl FallbackKind {
    /// Case-insensitive keyword match, first rule wins.
    pub fn classify(task: &str) -> Self {
        let lowered = task.to_lowercase();
        if lowered.contains("hello world") {
            Self::HelloWorld
        } else if ["calculator", "math"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            Self::Calculator
        } else {
            Self::Generic
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::HelloWorld => HELLO_WORLD_FILE,
            Self::Calculator => CALCULATOR_FILE,
            Self::Generic => GENERIC_FILE,
        }
    }

    fn summary(self) -> &'static str {
        match self {
            Self::HelloWorld => "Created hello_world.py with basic Hello World script.",
            Self::Calculator => "Created calculator.py with basic calculator functionality.",
            Self::Generic => "Created generic Python script.",
        }
    }
}

/// A planned fallback file plus the output that reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPlan {
    pub kind: FallbackKind,
    pub file_name: &'static str,
    pub contents: String,
    pub output: ExecutionResult,
}

pub fn plan_fallback(task: &str) -> Result<FallbackPlan> {
    let kind = FallbackKind::classify(task);
    let contents = match kind {
        FallbackKind::HelloWorld => HELLO_WORLD_SCRIPT.to_string(),
        FallbackKind::Calculator => CALCULATOR_SCRIPT.to_string(),
        FallbackKind::Generic => render_generic(task)?,
    };

    let stdout = format!("{FALLBACK_MARKER}\n# Task: {task}\n\n{}\n", kind.summary());
    Ok(FallbackPlan {
        kind,
        file_name: kind.file_name(),
        contents,
        output: ExecutionResult {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        },
    })
}

fn render_generic(task: &str) -> Result<String> {
    // Every line of the task stays inside the header comment.
    let task_comment = task.split(['\r', '\n']).collect::<Vec<_>>().join("\n# ");
    // A JSON string literal is also a valid Python string literal.
    let task_literal =
        serde_json::to_string(&format!("Task: {task}")).context("encode task literal")?;

    let mut env = Environment::new();
    env.add_template(GENERIC_FILE, GENERIC_TEMPLATE)
        .context("parse generic script template")?;
    let template = env.get_template(GENERIC_FILE)?;
    let rendered = template
        .render(context! {
            task_comment => task_comment,
            task_literal => task_literal,
        })
        .context("render generic script")?;
    Ok(rendered)
}
