//! Elevated execution on the machine running the CLI.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CommandChannel, HTTPS_PROXY_VAR};
use crate::ctl::error::ExecError;

/// How the child process gets superuser rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elevation {
    /// `sudo -E`, keeping the environment so `https_proxy` survives.
    #[default]
    Sudo,
    /// Run the program directly (already privileged, or tests).
    None,
}

pub struct LocalChannel {
    proxy_url: String,
    elevation: Elevation,
    timeout: Duration,
}

impl LocalChannel {
    pub fn new(proxy_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            elevation: Elevation::Sudo,
            timeout,
        }
    }

    pub fn with_elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    /// Program and argv actually spawned for `name args..`.
    pub(crate) fn program_and_args(&self, name: &str, args: &[&str]) -> (String, Vec<String>) {
        let args = args.iter().map(|a| a.to_string());
        match self.elevation {
            Elevation::Sudo => {
                let mut argv = vec!["-E".to_string(), name.to_string()];
                argv.extend(args);
                ("sudo".to_string(), argv)
            }
            Elevation::None => (name.to_string(), args.collect()),
        }
    }

    fn command(&self, name: &str, args: &[&str]) -> (String, Command) {
        let (program, argv) = self.program_and_args(name, args);
        let rendered = std::iter::once(program.as_str())
            .chain(argv.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let mut command = Command::new(&program);
        command
            .args(&argv)
            // Only the child sees the proxy; our own environment is untouched
            .env(HTTPS_PROXY_VAR, &self.proxy_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        (rendered, command)
    }
}

#[async_trait]
impl CommandChannel for LocalChannel {
    async fn run_captured(
        &self,
        name: &str,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, ExecError> {
        let (rendered, mut command) = self.command(name, args);

        let child = command.spawn().map_err(|e| ExecError::Spawn {
            command: rendered.clone(),
            reason: e.to_string(),
        })?;

        let output = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ExecError::Cancelled),

            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => result
                .map_err(|_| ExecError::TimedOut(self.timeout))?
                .map_err(|e| ExecError::Spawn {
                    command: rendered.clone(),
                    reason: e.to_string(),
                })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!("Ran command {}", rendered);
        debug!("stdout: {} stderr: {}", stdout, stderr);

        if !output.status.success() {
            return Err(ExecError::Failed {
                command: rendered,
                exit_code: output.status.code(),
                stderr,
            });
        }

        Ok(stdout)
    }

    fn describe(&self) -> String {
        "localhost".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::config::tests::ENV_TEST_MUTEX;

    fn direct(proxy: &str) -> LocalChannel {
        LocalChannel::new(proxy, Duration::from_secs(10)).with_elevation(Elevation::None)
    }

    mod argv {
        use super::*;

        #[test]
        fn test_sudo_preserves_environment() {
            let channel = LocalChannel::new("", Duration::from_secs(1));
            let (program, args) = channel.program_and_args("systemctl", &["restart", "kubelet"]);
            assert_eq!(program, "sudo");
            assert_eq!(args, vec!["-E", "systemctl", "restart", "kubelet"]);
        }

        #[test]
        fn test_direct_execution() {
            let (program, args) = direct("").program_and_args("true", &[]);
            assert_eq!(program, "true");
            assert!(args.is_empty());
        }
    }

    mod execution {
        use super::*;

        #[tokio::test]
        async fn test_child_sees_proxy_but_parent_env_unchanged() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            let before = std::env::var_os(HTTPS_PROXY_VAR);

            let stdout = direct("http://proxy.corp:3128")
                .run_captured(
                    "sh",
                    &["-c", "printf %s \"$https_proxy\""],
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            assert_eq!(stdout, "http://proxy.corp:3128");
            assert_eq!(std::env::var_os(HTTPS_PROXY_VAR), before);
        }

        #[tokio::test]
        async fn test_empty_proxy_is_still_set() {
            let stdout = direct("")
                .run_captured(
                    "sh",
                    &["-c", "if [ -z \"${https_proxy+x}\" ]; then echo unset; else echo set; fi"],
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(stdout.trim(), "set");
        }

        #[tokio::test]
        async fn test_run_succeeds_on_zero_exit() {
            direct("")
                .run("true", &[], &CancellationToken::new())
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_nonzero_exit_carries_stderr() {
            let err = direct("")
                .run_captured(
                    "sh",
                    &["-c", "echo out; echo broken >&2; exit 3"],
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();

            match err {
                ExecError::Failed {
                    exit_code, stderr, ..
                } => {
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(stderr.trim(), "broken");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_missing_program_is_spawn_error() {
            let err = direct("")
                .run("definitely-not-a-real-binary-42", &[], &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ExecError::Spawn { .. }));
        }
    }

    mod cancellation {
        use super::*;

        #[tokio::test]
        async fn test_cancelled_token_stops_command() {
            let cancel = CancellationToken::new();
            cancel.cancel();
            let err = direct("")
                .run("sleep", &["5"], &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, ExecError::Cancelled));
        }

        #[tokio::test]
        async fn test_timeout() {
            let channel = LocalChannel::new("", Duration::from_millis(100)).with_elevation(Elevation::None);
            let err = channel
                .run("sleep", &["5"], &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ExecError::TimedOut(_)));
            assert!(err.is_cancelled());
        }
    }
}
