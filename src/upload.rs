//! Upload multiplexing: N asynchronous file reads become one binary frame.
//!
//! Metadata is fixed when the batch starts, in call order. Reads complete in
//! any order and are slotted by index; the frame is built once, when the last
//! slot fills, so its layout never depends on completion order.
//!
//! Any failed read, or a read whose length differs from the recorded size,
//! aborts the batch: it is dropped, no frame is ever produced for it, and
//! completions that arrive afterwards are ignored.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FeedError, Result};
use crate::protocol::{encode_upload_frame, FileMeta, UploadHeader};

/// Name and size of a file on disk. Read synchronously, so a batch's
/// metadata is always in call order.
pub fn file_meta(path: &Path) -> Result<FileMeta> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(FeedError::UploadRead {
            name,
            detail: "not a regular file".into(),
        });
    }
    Ok(FileMeta {
        name,
        size: metadata.len(),
    })
}

#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub id: Uuid,
    pub module: String,
    pub partition_id: u64,
    files: Vec<FileMeta>,
    slots: Vec<Option<Vec<u8>>>,
}

impl UploadBatch {
    fn new(module: &str, partition_id: u64, files: Vec<FileMeta>) -> Self {
        let slots = vec![None; files.len()];
        Self {
            id: Uuid::new_v4(),
            module: module.to_owned(),
            partition_id,
            files,
            slots,
        }
    }

    pub fn files(&self) -> &[FileMeta] {
        &self.files
    }

    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    fn frame(&self) -> Result<Vec<u8>> {
        let payloads: Vec<&[u8]> = self.slots.iter().flatten().map(Vec::as_slice).collect();
        let header = UploadHeader::new(self.module.clone(), self.partition_id, self.files.clone());
        encode_upload_frame(&header, &payloads)
    }
}

#[derive(Debug, Default)]
pub struct UploadMultiplexer {
    batches: HashMap<Uuid, UploadBatch>,
}

impl UploadMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch. Returns `None` for an empty file list.
    pub fn begin(&mut self, module: &str, partition_id: u64, files: Vec<FileMeta>) -> Option<Uuid> {
        if files.is_empty() {
            return None;
        }
        let batch = UploadBatch::new(module, partition_id, files);
        let id = batch.id;
        debug!(batch = %id, files = batch.files.len(), partition_id, "upload batch started");
        self.batches.insert(id, batch);
        Some(id)
    }

    pub fn pending(&self) -> usize {
        self.batches.len()
    }

    pub fn batch(&self, id: &Uuid) -> Option<&UploadBatch> {
        self.batches.get(id)
    }

    /// Record the outcome of read `index` of `batch`.
    ///
    /// `Ok(Some(frame))` when this was the last outstanding read, `Ok(None)`
    /// while reads are still pending or when the batch is unknown (already
    /// sent or aborted). An `Err` means the batch was aborted by this read.
    pub fn read_completed(
        &mut self,
        batch_id: Uuid,
        index: usize,
        outcome: std::result::Result<Vec<u8>, String>,
    ) -> Result<Option<Vec<u8>>> {
        let Some(batch) = self.batches.get_mut(&batch_id) else {
            debug!(batch = %batch_id, index, "read for finished or aborted batch ignored");
            return Ok(None);
        };
        let Some(meta) = batch.files.get(index) else {
            return Err(FeedError::UploadRead {
                name: format!("#{index}"),
                detail: "no such file in batch".into(),
            });
        };

        let failure = match outcome {
            Err(detail) => Some(FeedError::UploadRead {
                name: meta.name.clone(),
                detail,
            }),
            Ok(bytes) if bytes.len() as u64 != meta.size => Some(FeedError::UploadSizeMismatch {
                name: meta.name.clone(),
                expected: meta.size,
                actual: bytes.len() as u64,
            }),
            Ok(bytes) => {
                batch.slots[index] = Some(bytes);
                None
            }
        };
        if let Some(err) = failure {
            warn!(batch = %batch_id, error = %err, "upload batch aborted");
            self.batches.remove(&batch_id);
            return Err(err);
        }

        if batch.remaining() > 0 {
            return Ok(None);
        }
        let frame = batch.frame();
        self.batches.remove(&batch_id);
        frame.map(Some)
    }
}
