//! Object storage client layer over S3-compatible backends.
//!
//! Exposes a single facade, [`ObjectStorageClient`], covering bucket
//! management, object metadata and listing, presigned link issuance,
//! the multipart-upload lifecycle, and managed upload/copy transfers.
//! All backend failures are mapped into the [`StorageError`] taxonomy.

mod chunking;
mod client;
mod error;
mod error_map;
mod types;

pub use chunking::{
    compute_chunk_plan, is_multipart, ChunkPlan, CHUNK_SIZE_LADDER, MAX_MULTIPART_PARTS,
    MULTIPART_THRESHOLD, PRESIGNED_PUT_SIZE_LIMIT,
};
pub use client::ObjectStorageClient;
pub use error::{ChunkPlanError, StorageError};
pub use error_map::{map_sdk_error, map_status, ErrorContext, S3Operation};
pub use types::{
    compute_s3_url, DirectoryMetadata, MultipartUploadSession, ObjectMetadata, S3Credentials,
    StorageSettings, TransferProgress, UploadedPart, DEFAULT_ITEMS_PER_PAGE, MAX_DELETE_BATCH,
    MAX_ITEMS_PER_PAGE, RECURSIVE_COPY_CONCURRENCY,
};
