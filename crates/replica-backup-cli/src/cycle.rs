use anyhow::Result;
use replica_backup_core::archive::SnapshotArchiver;
use replica_backup_core::prune::RetentionPruner;
use replica_backup_process::{BackupCommand, Supervisor};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

pub struct BackupCycleRunner {
    supervisor: Supervisor,
    backup: BackupCommand,
    archiver: SnapshotArchiver,
    pruner: RetentionPruner,
    quiesce: Duration,
    last_archive: PathBuf,
}

impl BackupCycleRunner {
    pub fn new(
        supervisor: Supervisor,
        backup: BackupCommand,
        archiver: SnapshotArchiver,
        pruner: RetentionPruner,
        quiesce: Duration,
        last_archive: PathBuf,
    ) -> Self {
        Self {
            supervisor,
            backup,
            archiver,
            pruner,
            quiesce,
            last_archive,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    // One cycle: stop the old replica, snapshot the live primary, rotate
    // the retention tree, bring a new replica up. The clock is read once
    // so every bucket decision in the cycle sees the same instant. A
    // failed backup or archive step ends the cycle with no restart; the
    // next tick is the retry.
    pub async fn run(&self, prev_pid: Option<u32>) -> Result<u32> {
        let now = OffsetDateTime::now_utc();
        if let Some(pid) = prev_pid {
            self.supervisor.stop_replica(pid).await;
            // let the storage engine release the locks the replica held
            tokio::time::sleep(self.quiesce).await;
        }
        self.backup.run(&self.last_archive).await?;
        let written = self.archiver.archive(now, &self.last_archive)?;
        for path in &written {
            info!(path = %path.display(), "snapshot archived");
        }
        match self.pruner.prune(now) {
            Ok(removed) => {
                for dir in &removed {
                    info!(dir = %dir.display(), "expired bucket pruned");
                }
            }
            // the new snapshot is already on disk; a failed prune must
            // not take the cycle down with it
            Err(err) => warn!("pruning failed: {err:#}"),
        }
        let pid = self.supervisor.start_replica().await?;
        Ok(pid)
    }
}
