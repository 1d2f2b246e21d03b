//! Garbage collection.

use crate::error::Result;
use crate::hash::ContentId;
use crate::store::ContentStore;
use std::collections::HashSet;
use std::fs;
use tracing::debug;

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of objects kept because they are roots.
    pub objects_kept: usize,
    /// Number of objects deleted.
    pub objects_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

impl ContentStore {
    /// Delete every object whose id is not in `roots`.
    ///
    /// Stored objects do not reference each other, so the root set is the
    /// whole reachable set. If `dry_run` is true, reports what would be
    /// deleted without deleting.
    pub fn gc(&self, roots: &HashSet<ContentId>, dry_run: bool) -> Result<GcStats> {
        let mut stats = GcStats::default();

        for id in self.list()? {
            if roots.contains(&id) {
                stats.objects_kept += 1;
                continue;
            }

            let obj_path = self.object_path(&id);
            stats.bytes_freed += fs::metadata(&obj_path)?.len();
            stats.objects_deleted += 1;

            if !dry_run {
                fs::remove_file(&obj_path)?;
                debug!(%id, "deleted unreferenced object");

                // Remove empty shard directories
                if let Some(shard) = obj_path.parent()
                    && let Ok(mut entries) = fs::read_dir(shard)
                    && entries.next().is_none()
                {
                    let _ = fs::remove_dir(shard);
                }
            }
        }

        Ok(stats)
    }
}
