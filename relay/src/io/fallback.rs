//! Writes the planned fallback script into the scratch directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::fallback::plan_fallback;
use crate::core::types::ExecutionResult;

/// Plan and write the fallback script for `task`, returning the output that reports it.
pub fn write_fallback(task: &str, dir: &Path) -> Result<ExecutionResult> {
    let plan = plan_fallback(task)?;
    let path = dir.join(plan.file_name);
    fs::write(&path, &plan.contents)
        .with_context(|| format!("write fallback script {}", path.display()))?;
    info!(file = plan.file_name, kind = ?plan.kind, "wrote fallback script");
    Ok(plan.output)
}
