use crate::errors::{NetStageError, Result};
use crate::host::{CommandOutput, CommandRunner, HostCommand};
use std::process::Command;

/// Runs commands on the local host via `std::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .map_err(|e| NetStageError::HostCommandSpawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            // Killed by signal when there is no exit code
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = SystemRunner
            .run(&HostCommand::new("netstage-definitely-not-a-binary"))
            .unwrap_err();
        assert!(matches!(err, NetStageError::HostCommandSpawn { .. }));
    }
}
