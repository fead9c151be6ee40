use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub pid_file: PathBuf,
    pub log_file: Option<PathBuf>,
}

pub struct Supervisor {
    primary: ProcessSpec,
    replica: ProcessSpec,
    warmup: Duration,
}

impl Supervisor {
    pub fn new(primary: ProcessSpec, replica: ProcessSpec, warmup: Duration) -> Self {
        Self {
            primary,
            replica,
            warmup,
        }
    }

    pub async fn start_primary(&self) -> Result<u32> {
        let pid = spawn_managed(&self.primary).await?;
        info!(pid, "primary started");
        tokio::time::sleep(self.warmup).await;
        Ok(pid)
    }

    pub async fn start_replica(&self) -> Result<u32> {
        let pid = spawn_managed(&self.replica).await?;
        info!(pid, "replica started");
        tokio::time::sleep(self.warmup).await;
        Ok(pid)
    }

    // A pid that is already gone is absorbed: the replica dying on its
    // own between cycles is not a failure of this cycle.
    pub async fn stop_replica(&self, pid: u32) {
        if kill(pid).await {
            info!(pid, "replica stopped");
        } else {
            warn!(pid, "replica was already gone");
        }
    }

    pub fn last_replica_pid(&self) -> Option<u32> {
        read_pid_file(&self.replica.pid_file)
    }

    // Kill whatever a previous run recorded before starting fresh
    // processes, so a scheduler crash cannot leak a stray server.
    pub async fn recover_stale(&self) {
        for spec in [&self.primary, &self.replica] {
            if let Some(pid) = read_pid_file(&spec.pid_file) {
                if kill(pid).await {
                    warn!(
                        pid,
                        pid_file = %spec.pid_file.display(),
                        "killed stray process recorded by a previous run"
                    );
                }
            }
        }
    }
}

async fn spawn_managed(spec: &ProcessSpec) -> Result<u32> {
    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args);
    match &spec.log_file {
        Some(path) => {
            let log = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            let err = log
                .try_clone()
                .with_context(|| format!("failed to clone log handle: {}", path.display()))?;
            cmd.stdout(Stdio::from(log)).stderr(Stdio::from(err));
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", spec.command))?;
    let pid = child
        .id()
        .ok_or_else(|| anyhow!("{} exited before its pid could be read", spec.command))?;
    write_pid_file(&spec.pid_file, pid)?;
    // The process is managed by pid from here on and must outlive this
    // handle; the detached task reaps it whenever it exits.
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(pid)
}

pub fn read_pid_file(path: &Path) -> Option<u32> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

fn write_pid_file(path: &Path, pid: u32) -> Result<()> {
    std::fs::write(path, format!("{pid}\n"))
        .with_context(|| format!("failed to write pid file: {}", path.display()))
}

// SIGKILL by pid; a non-zero status means the pid no longer exists.
async fn kill(pid: u32) -> bool {
    let status = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) => status.success(),
        Err(err) => {
            warn!(pid, "failed to run kill: {err}");
            false
        }
    }
}

pub struct BackupCommand {
    command: String,
    url: String,
    user: String,
    password: String,
}

impl BackupCommand {
    pub fn new(
        command: impl Into<String>,
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            url: url.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    pub async fn run(&self, dest: &Path) -> Result<()> {
        let status = Command::new(&self.command)
            .arg(&self.url)
            .arg(&self.user)
            .arg(&self.password)
            .arg(dest)
            .status()
            .await
            .with_context(|| format!("failed to run backup command: {}", self.command))?;
        if !status.success() {
            return Err(anyhow!("backup command failed with {status}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn spec(dir: &Path, command: &str, args: &[&str]) -> ProcessSpec {
        ProcessSpec {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            pid_file: dir.join("proc.pid"),
            log_file: None,
        }
    }

    #[test]
    fn pid_files_round_trip_with_trailing_newline() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("replica.pid");
        write_pid_file(&path, 4242).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242\n");
        assert_eq!(read_pid_file(&path), Some(4242));
    }

    #[test]
    fn unreadable_pid_file_reads_as_none() {
        let tmp = tempdir().unwrap();
        assert_eq!(read_pid_file(&tmp.path().join("absent.pid")), None);
        let garbled = tmp.path().join("garbled.pid");
        std::fs::write(&garbled, "not a pid\n").unwrap();
        assert_eq!(read_pid_file(&garbled), None);
    }

    #[tokio::test]
    async fn spawn_records_the_pid_and_stop_kills_it() {
        let tmp = tempdir().unwrap();
        let replica = spec(tmp.path(), "sleep", &["60"]);
        let supervisor = Supervisor::new(replica.clone(), replica, Duration::ZERO);

        let pid = supervisor.start_replica().await.unwrap();
        assert_eq!(supervisor.last_replica_pid(), Some(pid));

        supervisor.stop_replica(pid).await;
        // absorbed, not an error, on the second attempt
        supervisor.stop_replica(pid).await;
    }

    #[tokio::test]
    async fn killing_a_nonexistent_pid_is_absorbed() {
        // pid 0 would signal our own process group; use an id no live
        // process on a test host will hold
        assert!(!kill(u32::MAX - 1).await);
    }

    #[tokio::test]
    async fn backup_command_maps_exit_status_to_result() {
        let tmp = tempdir().unwrap();
        let ok = BackupCommand::new("true", "url", "user", "password");
        assert!(ok.run(&tmp.path().join("last.zip")).await.is_ok());

        let failing = BackupCommand::new("false", "url", "user", "password");
        assert!(failing.run(&tmp.path().join("last.zip")).await.is_err());
    }
}
