use crate::rotation::{self, Granularity};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub struct RetentionPruner {
    root: PathBuf,
}

impl RetentionPruner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    // Called only after the archiver succeeded for the same timestamp, so
    // an expired bucket is never removed before its successor exists. A
    // bucket already gone is not an error.
    pub fn prune(&self, ts: OffsetDateTime) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        if rotation::is_day_rollover(ts) {
            let expired = self
                .root
                .join(Granularity::Hour.folder(rotation::previous_day(ts)));
            if remove_tree(&expired)? {
                removed.push(expired);
            }
        }
        if rotation::is_month_rollover(ts) {
            let expired = self
                .root
                .join(Granularity::Day.folder(rotation::previous_month(ts)));
            if remove_tree(&expired)? {
                removed.push(expired);
            }
        }
        Ok(removed)
    }
}

fn remove_tree(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(dir)
        .with_context(|| format!("failed to remove expired bucket: {}", dir.display()))?;
    Ok(true)
}
