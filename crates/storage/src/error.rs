//! Error taxonomy for storage operations.
//!
//! A closed, flat set of domain errors. Public client methods never let
//! a raw SDK error escape; everything is translated here or in
//! [`crate::error_map`].

use thiserror::Error;

/// Errors surfaced by the object storage client.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Generic backend or network failure. The catch-all kind.
    #[error("storage access failure: {message}")]
    Access { message: String },

    /// Bucket missing or access to it denied.
    #[error("bucket invalid or inaccessible: {bucket}")]
    BucketInvalid { bucket: String },

    /// Object not found under the given key.
    #[error("object not found: s3://{bucket}/{key}")]
    KeyNotFound { bucket: String, key: String },

    /// Multipart upload session missing, expired, or already settled.
    #[error("multipart upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    /// Recursive copy destination already contains objects.
    #[error("destination prefix not empty: s3://{bucket}/{prefix}")]
    DestinationNotEmpty { bucket: String, prefix: String },

    /// Requested page size exceeds the backend hard maximum.
    #[error("page size {requested} exceeds backend maximum {max}")]
    InvalidPageSize { requested: i32, max: i32 },

    /// File too large for a single presigned PUT.
    #[error("file of {file_size} bytes exceeds the single-upload limit of {limit} bytes")]
    SingleUploadTooLarge { file_size: u64, limit: u64 },

    /// File too large to chunk under the part-count ceiling.
    #[error(transparent)]
    ChunkPlanning(#[from] ChunkPlanError),
}

impl StorageError {
    /// Build the catch-all kind from anything displayable.
    pub fn access(message: impl ToString) -> Self {
        StorageError::Access {
            message: message.to_string(),
        }
    }
}

/// No ladder candidate keeps the part count under the backend ceiling.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("file of {file_size} bytes cannot be uploaded in fewer than {max_parts} parts")]
pub struct ChunkPlanError {
    /// The declared file size that could not be planned.
    pub file_size: u64,
    /// The part-count ceiling that was exceeded.
    pub max_parts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err: StorageError = StorageError::KeyNotFound {
            bucket: "b".into(),
            key: "k/v".into(),
        };
        assert_eq!(err.to_string(), "object not found: s3://b/k/v");
    }

    #[test]
    fn test_chunk_plan_error_converts() {
        let err: StorageError = ChunkPlanError {
            file_size: 1,
            max_parts: 10_000,
        }
        .into();
        assert!(matches!(err, StorageError::ChunkPlanning(_)));
    }
}
