//! Child hub bootstrap
//!
//! A parent spawns a peer hub as a subprocess and waits for it to print its
//! readiness line, `Listening at : <port>`, on stdout. Earlier lines are
//! ordinary log output; later lines keep being forwarded to `tracing`.

use crate::{Result, TransportError};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

const READY_MARKER: &str = "Listening at :";

/// The readiness line a hub prints once its server socket is bound
pub fn listening_line(port: u16) -> String {
    format!("{} {}", READY_MARKER, port)
}

/// Port announced by a readiness line, None for any other line
pub fn parse_listening_line(line: &str) -> Option<u16> {
    line.trim_end()
        .strip_prefix(READY_MARKER)?
        .trim()
        .parse()
        .ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildLauncher {
    command: String,
    args: Vec<String>,
}

impl ChildLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Spawn the child and wait up to `timeout` for its readiness line
    ///
    /// The child is killed if it is not ready in time, and whenever the
    /// returned [`ChildHub`] is dropped.
    pub async fn launch(&self, timeout: Duration) -> Result<ChildHub> {
        info!(command = %self.command, args = ?self.args, "Launching child hub");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::child_process(&self.command, e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::child_process(&self.command, "stdout not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let port = tokio::time::timeout(timeout, self.await_ready(&mut lines))
            .await
            .map_err(|_| TransportError::timeout("child hub readiness", timeout.as_millis() as u64))??;

        let command = self.command.clone();
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                info!(child = %command, "{}", line);
            }
            debug!(child = %command, "Child hub closed stdout");
        });

        info!(command = %self.command, port, pid = ?child.id(), "Child hub ready");
        Ok(ChildHub { child, port })
    }

    async fn await_ready(&self, lines: &mut Lines<BufReader<ChildStdout>>) -> Result<u16> {
        while let Some(line) = lines.next_line().await? {
            match parse_listening_line(&line) {
                Some(port) => return Ok(port),
                None => info!(child = %self.command, "{}", line),
            }
        }
        Err(TransportError::child_process(
            &self.command,
            "exited before printing its listening line",
        ))
    }
}

/// Running child hub; killed on drop
#[derive(Debug)]
pub struct ChildHub {
    child: Child,
    port: u16,
}

impl ChildHub {
    /// Port the child reported in its readiness line
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(e) => {
                warn!(error = %e, "Failed to poll child hub");
                true
            }
        }
    }

    pub async fn kill(mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listening_line() {
        assert_eq!(parse_listening_line("Listening at : 4100"), Some(4100));
        assert_eq!(parse_listening_line("Listening at : 4100\r"), Some(4100));
        assert_eq!(parse_listening_line(&listening_line(65535)), Some(65535));
        assert_eq!(parse_listening_line("Loading config"), None);
        assert_eq!(parse_listening_line("Listening at : soon"), None);
        assert_eq!(parse_listening_line("Listening at : 70000"), None);
        assert_eq!(parse_listening_line("  Listening at : 1"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_skips_earlier_lines() {
        let hub = ChildLauncher::new("sh")
            .arg("-c")
            .arg("echo starting; echo 'Listening at : 4321'; sleep 5")
            .launch(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(hub.port(), 4321);
        hub.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_fails_when_child_exits_early() {
        let result = ChildLauncher::new("sh")
            .args(["-c", "echo nothing to see"])
            .launch(Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(TransportError::ChildProcess { .. })));
    }
}
