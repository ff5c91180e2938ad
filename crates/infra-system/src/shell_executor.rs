// Shell executor implementation
// reason: tokio::process for async command execution, local or over ssh
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use chaos_core::domain::CommandResult;
use chaos_core::port::remote_executor::{ExecutionError, RemoteExecutor};

/// Exit status ssh reserves for its own connection failures
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Output fragments meaning the CLI never reached its backend
const UNREACHABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "Unable to connect to the server",
    "The connection to the server",
];

/// Environment passed through to child processes by default
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "KUBECONFIG",
    "DOCKER_HOST",
    "SSH_AUTH_SOCK",
];

/// Where commands run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellTransport {
    /// `sh -c` on the orchestrator host (kubectl, docker CLIs)
    Local,
    /// `ssh` to a remote machine
    Ssh {
        destination: String,
        options: Vec<String>,
    },
}

/// Shell executor
///
/// Runs one resolved command per call and returns the merged stdout and
/// stderr with the exit code. A non-zero exit is a normal result.
pub struct ShellExecutor {
    transport: ShellTransport,
    default_timeout: Duration,
    env_allowlist: Vec<String>,
    extra_env: HashMap<String, String>,
}

impl ShellExecutor {
    pub fn new(transport: ShellTransport, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            extra_env: HashMap::new(),
        }
    }

    pub fn local(default_timeout: Duration) -> Self {
        Self::new(ShellTransport::Local, default_timeout)
    }

    pub fn with_env_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.env_allowlist = allowlist;
        self
    }

    /// Variables set on every child regardless of the allowlist (e.g. a per-cluster KUBECONFIG)
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.extra_env = env;
        self
    }

    /// Inherited environment filtered to the allowlist, then overlaid with explicit variables
    fn filter_env(&self, inherited: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = inherited
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect();
        env.extend(self.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Program and argv for the transport
    fn argv(&self, command: &str) -> (String, Vec<String>) {
        match &self.transport {
            ShellTransport::Local => (
                "sh".to_string(),
                vec!["-c".to_string(), command.to_string()],
            ),
            ShellTransport::Ssh {
                destination,
                options,
            } => {
                let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
                args.extend(options.iter().cloned());
                args.push(destination.clone());
                args.push("--".to_string());
                args.push(command.to_string());
                ("ssh".to_string(), args)
            }
        }
    }

    async fn spawn_and_wait(
        &self,
        command: &str,
        limit: Duration,
    ) -> Result<std::process::Output, ExecutionError> {
        let (program, args) = self.argv(command);

        let child = Command::new(&program)
            .args(&args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match self.transport {
                ShellTransport::Ssh { .. } => {
                    ExecutionError::Unreachable(format!("failed to start ssh: {}", e))
                }
                ShellTransport::Local => ExecutionError::Io(e.to_string()),
            })?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecutionError::Io(e.to_string())),
            Err(_) => Err(ExecutionError::Timeout(limit.as_secs())),
        }
    }

    /// Merge streams and detect transport failures hidden behind an exit code
    fn build_result(&self, output: std::process::Output) -> Result<CommandResult, ExecutionError> {
        let exit_code = output.status.code().unwrap_or(-1);
        let mut merged = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !merged.is_empty() && !merged.ends_with('\n') {
                merged.push('\n');
            }
            merged.push_str(&stderr);
        }

        if matches!(self.transport, ShellTransport::Ssh { .. }) && exit_code == SSH_CONNECTION_FAILURE
        {
            return Err(ExecutionError::Unreachable(merged.trim().to_string()));
        }
        if exit_code != 0 && UNREACHABLE_MARKERS.iter().any(|m| merged.contains(m)) {
            return Err(ExecutionError::Unreachable(merged.trim().to_string()));
        }

        Ok(CommandResult::new(exit_code, merged))
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecutionError> {
        if command.trim().is_empty() {
            return Err(ExecutionError::InvalidCommand("empty command".to_string()));
        }
        let limit = timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();

        debug!(command = %command, timeout_secs = limit.as_secs(), "Running shell command");

        let output = self.spawn_and_wait(command, limit).await;
        let result = output.and_then(|o| self.build_result(o));

        match &result {
            Ok(r) => info!(
                exit_code = r.exit_code,
                duration_ms = started.elapsed().as_millis() as u64,
                "Shell command finished"
            ),
            Err(e) => warn!(error = %e, "Shell command did not complete"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> ShellExecutor {
        ShellExecutor::local(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_execute_success() {
        let result = local().execute("echo hello", None).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.raw_output.contains("hello"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result() {
        let result = local()
            .execute("echo 'No fault found' >&2; exit 3", None)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(result.raw_output.contains("No fault found"));
    }

    #[tokio::test]
    async fn test_streams_are_merged() {
        let result = local()
            .execute("echo out; echo err >&2", None)
            .await
            .unwrap();

        assert_eq!(result.raw_output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let result = local()
            .execute("sleep 10", Some(Duration::from_millis(100)))
            .await;

        assert!(matches!(result, Err(ExecutionError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_daemon_unreachable_output_maps_to_unreachable() {
        let result = local()
            .execute(
                "echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock' >&2; exit 1",
                None,
            )
            .await;

        assert!(matches!(result, Err(ExecutionError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_empty_command_is_invalid() {
        let result = local().execute("   ", None).await;
        assert!(matches!(result, Err(ExecutionError::InvalidCommand(_))));
    }

    #[tokio::test]
    async fn test_explicit_env_reaches_child() {
        let mut env = HashMap::new();
        env.insert("KUBECONFIG".to_string(), "/etc/chaos/cluster-a".to_string());
        let executor = local().with_env(env);

        let result = executor.execute("echo $KUBECONFIG", None).await.unwrap();

        assert_eq!(result.raw_output.trim(), "/etc/chaos/cluster-a");
    }

    #[test]
    fn test_env_filtering() {
        let executor = local().with_env_allowlist(vec!["ALLOWED_VAR".to_string()]);
        let inherited = vec![
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ];

        let filtered = executor.filter_env(inherited.into_iter());

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
    }

    #[test]
    fn test_ssh_argv() {
        let executor = ShellExecutor::new(
            ShellTransport::Ssh {
                destination: "root@10.0.0.5".to_string(),
                options: vec!["-p".to_string(), "2222".to_string()],
            },
            Duration::from_secs(5),
        );

        let (program, args) = executor.argv("uptime");

        assert_eq!(program, "ssh");
        assert_eq!(
            args,
            vec!["-o", "BatchMode=yes", "-p", "2222", "root@10.0.0.5", "--", "uptime"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_ssh_exit_255_is_unreachable() {
        use std::os::unix::process::ExitStatusExt;

        let executor = ShellExecutor::new(
            ShellTransport::Ssh {
                destination: "host".to_string(),
                options: vec![],
            },
            Duration::from_secs(5),
        );
        let output = std::process::Output {
            status: std::process::ExitStatus::from_raw(255 << 8),
            stdout: vec![],
            stderr: b"ssh: connect to host host port 22: Connection refused".to_vec(),
        };

        assert!(matches!(
            executor.build_result(output),
            Err(ExecutionError::Unreachable(_))
        ));
    }
}
