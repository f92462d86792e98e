//! Child process execution shared by the Terraform and git wrappers.

use crate::error::{truncate_stderr, CommandError};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

/// Render a command for logs and errors (program and arguments).
pub(crate) fn render(command: &Command) -> String {
    let std_command = command.as_std();
    std::iter::once(std_command.get_program().to_string_lossy().into_owned())
        .chain(
            std_command
                .get_args()
                .map(|a| a.to_string_lossy().into_owned()),
        )
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `command` to completion and return its stdout.
///
/// Non-zero exit is an error carrying the tail of stderr.
pub(crate) async fn run(mut command: Command) -> Result<String, CommandError> {
    let rendered = render(&command);
    let started = Instant::now();

    debug!(target: "testhelper.process", command = %rendered, "Running command");

    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            command: rendered.clone(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        warn!(
            target: "testhelper.process",
            command = %rendered,
            status = %output.status,
            elapsed_secs = started.elapsed().as_secs(),
            "Command failed"
        );
        return Err(CommandError::Failed {
            command: rendered,
            status: output.status.to_string(),
            stderr: truncate_stderr(&stderr),
        });
    }

    debug!(
        target: "testhelper.process",
        command = %rendered,
        elapsed_secs = started.elapsed().as_secs(),
        "Command finished"
    );

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
