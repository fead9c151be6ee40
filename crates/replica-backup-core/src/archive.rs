use crate::rotation::{self, Granularity};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub struct SnapshotArchiver {
    root: PathBuf,
}

impl SnapshotArchiver {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    // The hour bucket is written every cycle; day and month buckets only
    // when their window closes at this timestamp. The source file stays
    // where it is.
    pub fn archive(&self, ts: OffsetDateTime, source: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        written.push(self.write_bucket(Granularity::Hour, ts, source)?);
        if rotation::is_day_rollover(ts) {
            written.push(self.write_bucket(Granularity::Day, ts, source)?);
        }
        if rotation::is_month_rollover(ts) {
            written.push(self.write_bucket(Granularity::Month, ts, source)?);
        }
        Ok(written)
    }

    fn write_bucket(
        &self,
        bucket: Granularity,
        ts: OffsetDateTime,
        source: &Path,
    ) -> Result<PathBuf> {
        let folder = self.root.join(bucket.folder(ts));
        fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create bucket directory: {}", folder.display()))?;
        let dest = self.root.join(bucket.leaf(ts));
        fs::copy(source, &dest).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                dest.display()
            )
        })?;
        Ok(dest)
    }
}
