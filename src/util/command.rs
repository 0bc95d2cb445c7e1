use std::process::{Command, Stdio};

/// Output captured from a single dialog tool invocation.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub text: String,
    pub status: i32,
}

/// Runs `cmd` through the shell, blocking until it exits, and captures
/// everything it writes to stdout. A command that cannot be started yields an
/// empty output and a failure status; that is the only failure detected here.
pub fn run(cmd: &str) -> CommandOutput {
    let output = match Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            log::error!("failed to run {:?}: {}", cmd, e);
            return CommandOutput {
                text: String::new(),
                status: 1,
            };
        }
    };

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    // status is None when the process was killed by a signal
    let status = output.status.code().unwrap_or(1);
    log::debug!("cmd: {:?} status: {} output: {:?}", cmd, status, text);

    CommandOutput { text, status }
}
