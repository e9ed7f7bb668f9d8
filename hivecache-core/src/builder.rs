//! Cache build orchestration.
//!
//! The builder is the single writer of the archive. It computes the
//! pending index set, enqueues all batches up front so workers never
//! starve, drains results one at a time into the archive, and finishes
//! with a label pass that re-reads every example from the completed
//! archive, so labels reflect exactly the bytes future readers will see.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::archive::{self, Archive, ArchiveWriter};
use crate::config::CacheConfig;
use crate::dataset::SourceDataset;
use crate::error::{CacheError, Result};
use crate::example::{
    self, deserialize_example, example_key, parse_example_key, serialize_labels, Labels,
};
use crate::queue::{QueueHandle, QueueService};

/// How the archive is opened for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// No archive yet; create it and cache the full range.
    Fresh,
    /// Archive exists; append only the missing indices.
    Resume,
    /// Archive exists but is rebuilt from scratch.
    Rebuild,
}

/// Work remaining for one build.
#[derive(Debug)]
pub struct BuildPlan {
    pub mode: BuildMode,
    /// Indices to compute, ascending.
    pub pending: Vec<u64>,
}

/// Summary of a finished build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Dataset length.
    pub total: u64,
    /// Examples computed during this run.
    pub built: u64,
    /// Examples kept from a previous run.
    pub kept: u64,
    /// Whether the build was skipped because the archive already existed.
    pub skipped: bool,
}

/// Orchestrates a distributed cache build for one source dataset.
pub struct CacheBuilder {
    source: Arc<dyn SourceDataset>,
    config: CacheConfig,
}

impl CacheBuilder {
    pub fn new(source: Arc<dyn SourceDataset>, config: CacheConfig) -> Self {
        Self { source, config }
    }

    /// Path of the archive this builder writes.
    pub fn store_path(&self) -> PathBuf {
        archive::store_path(self.source.root(), self.source.name())
    }

    /// Decides the build mode and pending index set.
    ///
    /// Returns `None` when an archive exists and the configuration asks
    /// for neither resume nor rebuild; the cache is trusted as complete.
    /// Resume trusts key presence alone: entries are never re-validated
    /// against the source, so a changed source leaves stale entries in
    /// place.
    pub fn plan(&self) -> Result<Option<BuildPlan>> {
        let store_path = self.store_path();
        let total = self.source.len() as u64;

        if !store_path.exists() {
            return Ok(Some(BuildPlan {
                mode: BuildMode::Fresh,
                pending: (0..total).collect(),
            }));
        }

        if self.config.build.force && !self.config.build.resume {
            return Ok(Some(BuildPlan {
                mode: BuildMode::Rebuild,
                pending: (0..total).collect(),
            }));
        }

        if self.config.build.resume {
            let archive = Archive::open_with(&store_path, &self.config.storage)?;
            let existing: BTreeSet<u64> =
                archive.keys().filter_map(parse_example_key).collect();
            let pending = (0..total).filter(|i| !existing.contains(i)).collect();
            return Ok(Some(BuildPlan {
                mode: BuildMode::Resume,
                pending,
            }));
        }

        Ok(None)
    }

    /// Enqueues every pending batch onto the task channel.
    ///
    /// All batches go out before any result is drained, so workers never
    /// starve waiting on the builder.
    pub fn enqueue(&self, plan: &BuildPlan, handle: &QueueHandle) {
        for batch in plan.pending.chunks(self.config.build.batch_size) {
            handle.enqueue(batch.to_vec());
        }
        info!(
            batches = handle.pending_batches(),
            batch_size = self.config.build.batch_size,
            "enqueued pending work"
        );
    }

    /// Drains `plan.pending.len()` results into the archive.
    ///
    /// Results arrive in any order; each is written immediately. This is
    /// the only writer of the archive. Blocks until the expected count is
    /// reached; there is no timeout, so a crashed worker stalls the
    /// build.
    pub async fn drain(&self, plan: &BuildPlan, handle: &mut QueueHandle) -> Result<()> {
        let mut writer = match plan.mode {
            BuildMode::Fresh | BuildMode::Rebuild => ArchiveWriter::create(self.store_path())?,
            BuildMode::Resume => ArchiveWriter::append(self.store_path())?,
        };

        let expected = plan.pending.len() as u64;
        let mut done = 0u64;
        while done < expected {
            let Some((key, payload)) = handle.next_result().await else {
                return Err(CacheError::queue(
                    "result channel closed before the build completed",
                ));
            };
            writer.write(&key, &payload)?;
            done += 1;
            if done % 1024 == 0 {
                debug!(done, expected, "drained results");
            }
        }

        writer.finish()?;
        info!(done, "all results archived");
        Ok(())
    }

    /// Builds the label sidecar from the completed archive and appends it
    /// as the final entry.
    ///
    /// Runs row by row in index order over the archived bytes, never the
    /// source. The sidecar is written even when the source declares no
    /// in-memory keys, so readers can always rely on its presence.
    pub fn extract_labels(&self) -> Result<()> {
        let store_path = self.store_path();
        let keys = self.source.in_memory_keys();

        let mut labels = Labels::new();
        if !keys.is_empty() {
            info!(dataset = self.source.name(), ?keys, "caching labels");
            let archive = Archive::open_with(&store_path, &self.config.storage)?;
            for index in 0..self.source.len() as u64 {
                let bytes = archive.read(&example_key(index))?;
                let example = deserialize_example(&bytes)?;
                for key in keys {
                    let value = example
                        .get(key)
                        .ok_or_else(|| CacheError::missing_label(key, index))?;
                    labels.entry(key.clone()).or_default().push(value.clone());
                }
            }
        }

        let mut writer = ArchiveWriter::append(&store_path)?;
        writer.write(example::LABELS_KEY, &serialize_labels(&labels)?)?;
        writer.finish()
    }

    /// Runs a complete build: plan, host the queue, enqueue, drain, label
    /// pass.
    ///
    /// Workers are started separately and attach to the bind address from
    /// the queue configuration. When nothing is pending (an archive
    /// resumed past its end), the queue is not started at all and only the
    /// label pass runs.
    pub async fn build(&self) -> Result<BuildReport> {
        let total = self.source.len() as u64;

        let Some(plan) = self.plan()? else {
            info!(
                dataset = self.source.name(),
                "archive already cached; skipping build"
            );
            return Ok(BuildReport {
                total,
                built: 0,
                kept: total,
                skipped: true,
            });
        };

        let built = plan.pending.len() as u64;
        let kept = total - built;
        info!(
            dataset = self.source.name(),
            total, built, kept, mode = ?plan.mode, "caching dataset"
        );

        if built > 0 {
            let mut handle = QueueService::start(
                &self.config.queue.bind_addr(),
                &self.config.queue.auth_token,
            )
            .await?;
            self.enqueue(&plan, &handle);
            info!(addr = %handle.local_addr(), "waiting for workers");
            self.drain(&plan, &mut handle).await?;
            // The service stays up through the label pass so idle workers
            // can observe the drained task channel and exit cleanly.
            self.extract_labels()?;
            handle.shutdown().await;
        } else {
            if plan.mode != BuildMode::Resume {
                // Empty dataset: materialize the archive without workers.
                ArchiveWriter::create(self.store_path())?.finish()?;
            }
            self.extract_labels()?;
        }
        info!(dataset = self.source.name(), "finished caching");

        Ok(BuildReport {
            total,
            built,
            kept,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SyntheticDataset;
    use crate::example::{deserialize_labels, serialize_example, Example, Value};
    use std::path::Path;
    use tempfile::TempDir;

    fn builder_for(dir: &TempDir, len: usize) -> (CacheBuilder, Arc<SyntheticDataset>) {
        let source = Arc::new(SyntheticDataset::new(dir.path(), "synthetic", len));
        let builder = CacheBuilder::new(source.clone(), CacheConfig::default());
        (builder, source)
    }

    /// Writes `indices` of the source into the archive, as a worker would.
    fn seed_archive(builder: &CacheBuilder, source: &SyntheticDataset, indices: &[u64]) {
        let mut writer = ArchiveWriter::create(builder.store_path()).unwrap();
        for &i in indices {
            let example = source.get(i as usize).unwrap();
            writer
                .write(&example_key(i), &serialize_example(&example).unwrap())
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_plan_fresh() {
        let dir = TempDir::new().unwrap();
        let (builder, _) = builder_for(&dir, 5);

        let plan = builder.plan().unwrap().unwrap();
        assert_eq!(plan.mode, BuildMode::Fresh);
        assert_eq!(plan.pending, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_plan_resume_is_exact_complement() {
        let dir = TempDir::new().unwrap();
        let (builder, source) = builder_for(&dir, 6);
        seed_archive(&builder, &source, &[0, 2, 5]);

        let plan = builder.plan().unwrap().unwrap();
        assert_eq!(plan.mode, BuildMode::Resume);
        assert_eq!(plan.pending, vec![1, 3, 4]);
    }

    #[test]
    fn test_plan_skip_when_not_resuming() {
        let dir = TempDir::new().unwrap();
        let (seed_builder, source) = builder_for(&dir, 4);
        seed_archive(&seed_builder, &source, &[0, 1]);

        let mut config = CacheConfig::default();
        config.build.resume = false;
        let builder = CacheBuilder::new(source, config);
        assert!(builder.plan().unwrap().is_none());
    }

    #[test]
    fn test_plan_rebuild_on_force() {
        let dir = TempDir::new().unwrap();
        let (seed_builder, source) = builder_for(&dir, 4);
        seed_archive(&seed_builder, &source, &[0, 1, 2, 3]);

        let mut config = CacheConfig::default();
        config.build.resume = false;
        config.build.force = true;
        let builder = CacheBuilder::new(source, config);

        let plan = builder.plan().unwrap().unwrap();
        assert_eq!(plan.mode, BuildMode::Rebuild);
        assert_eq!(plan.pending.len(), 4);
    }

    #[test]
    fn test_extract_labels_alignment() {
        let dir = TempDir::new().unwrap();
        let (builder, source) = builder_for(&dir, 7);
        seed_archive(&builder, &source, &[0, 1, 2, 3, 4, 5, 6]);

        builder.extract_labels().unwrap();

        let archive = Archive::open(builder.store_path()).unwrap();
        let labels = deserialize_labels(&archive.read(example::LABELS_KEY).unwrap()).unwrap();
        assert_eq!(labels["label"].len(), 7);
        for i in 0..7 {
            assert_eq!(labels["label"][i], source.get(i).unwrap()["label"]);
        }
    }

    #[test]
    fn test_extract_labels_missing_field() {
        struct Unlabeled {
            root: std::path::PathBuf,
            keys: Vec<String>,
        }

        impl SourceDataset for Unlabeled {
            fn root(&self) -> &Path {
                &self.root
            }
            fn name(&self) -> &str {
                "unlabeled"
            }
            fn len(&self) -> usize {
                1
            }
            fn get(&self, _index: usize) -> Result<Example> {
                let mut example = Example::new();
                example.insert("index".to_string(), Value::Int(0));
                Ok(example)
            }
            fn in_memory_keys(&self) -> &[String] {
                &self.keys
            }
        }

        let dir = TempDir::new().unwrap();
        let source = Arc::new(Unlabeled {
            root: dir.path().to_path_buf(),
            keys: vec!["label".to_string()],
        });
        let builder = CacheBuilder::new(source.clone(), CacheConfig::default());

        let mut writer = ArchiveWriter::create(builder.store_path()).unwrap();
        writer
            .write(
                &example_key(0),
                &serialize_example(&source.get(0).unwrap()).unwrap(),
            )
            .unwrap();
        writer.finish().unwrap();

        let err = builder.extract_labels().unwrap_err();
        assert!(matches!(err, CacheError::MissingLabel { index: 0, .. }));
    }

    #[test]
    fn test_extract_labels_writes_empty_sidecar() {
        struct NoKeys {
            root: std::path::PathBuf,
        }

        impl SourceDataset for NoKeys {
            fn root(&self) -> &Path {
                &self.root
            }
            fn name(&self) -> &str {
                "nokeys"
            }
            fn len(&self) -> usize {
                0
            }
            fn get(&self, index: usize) -> Result<Example> {
                Err(CacheError::index_out_of_range(index, 0))
            }
        }

        let dir = TempDir::new().unwrap();
        let source = Arc::new(NoKeys {
            root: dir.path().to_path_buf(),
        });
        let builder = CacheBuilder::new(source, CacheConfig::default());

        ArchiveWriter::create(builder.store_path())
            .unwrap()
            .finish()
            .unwrap();
        builder.extract_labels().unwrap();

        let archive = Archive::open(builder.store_path()).unwrap();
        let labels = deserialize_labels(&archive.read(example::LABELS_KEY).unwrap()).unwrap();
        assert!(labels.is_empty());
    }
}
