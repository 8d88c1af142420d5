/// Progress events sent from the loader and publish workers to the
/// progress-bar task. Purely informational; dropping the receiver never
/// affects the outcome of a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// One load chunk was committed to the sink
    ChunkLoaded { chunk_index: usize, rows: usize },
    /// A publish worker picked up a partition
    PartitionStarted { key: String },
    /// A partition finished download + convert
    PartitionConverted { key: String, rows: usize },
    /// A partition's parquet file landed in the object store
    PartitionUploaded { key: String },
    /// A partition failed and was skipped
    PartitionFailed { key: String },
}

/// Statistics aggregated from progress events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub chunks_loaded: usize,
    pub rows_loaded: u64,
    pub partitions_started: usize,
    pub partitions_converted: usize,
    pub partitions_uploaded: usize,
    pub partitions_failed: usize,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a progress event
    pub fn update(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::ChunkLoaded { rows, .. } => {
                self.chunks_loaded += 1;
                self.rows_loaded += *rows as u64;
            }
            ProgressEvent::PartitionStarted { .. } => {
                self.partitions_started += 1;
            }
            ProgressEvent::PartitionConverted { .. } => {
                self.partitions_converted += 1;
            }
            ProgressEvent::PartitionUploaded { .. } => {
                self.partitions_uploaded += 1;
            }
            ProgressEvent::PartitionFailed { .. } => {
                self.partitions_failed += 1;
            }
        }
    }

    /// Partitions that are done one way or the other
    pub fn partitions_settled(&self) -> usize {
        self.partitions_uploaded + self.partitions_failed
    }
}
