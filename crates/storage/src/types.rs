//! Shared data structures for the object storage client.

use chrono::{DateTime, Utc};

/// Backend hard maximum for a single listing page.
pub const MAX_ITEMS_PER_PAGE: i32 = 1000;

/// Default page size for listings when the caller does not care.
pub const DEFAULT_ITEMS_PER_PAGE: i32 = 500;

/// Backend hard maximum for keys in one batch-delete call.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Hard ceiling on simultaneous object copies during a recursive copy.
/// Deliberate backpressure to protect the backend connection pool.
pub const RECURSIVE_COPY_CONCURRENCY: usize = 4;

/// Point-in-time snapshot of a stored object.
///
/// Created from a backend response and never mutated; this is not a
/// live handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    /// Object key within its bucket.
    pub key: String,
    /// Last modification timestamp, when the backend reported one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Content ETag with surrounding quotes stripped.
    pub etag: Option<String>,
    /// SHA-256 checksum, when one was attached at upload time.
    pub sha256_checksum: Option<String>,
    /// Object size in bytes.
    pub size_bytes: u64,
}

/// Aggregate view over a prefix, derived by summing a full listing.
///
/// Recomputed on demand, never cached across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMetadata {
    /// The prefix the aggregate was computed over.
    pub prefix: String,
    /// Total size in bytes, or `None` when unknown.
    pub size_bytes: Option<u64>,
}

/// An initiated multipart upload with presigned per-part URLs.
///
/// Parts are uploaded out-of-band by the caller, who collects one ETag
/// per part and then either completes or aborts the session. A session
/// left neither completed nor aborted stays discoverable via
/// `list_ongoing_multipart_uploads`; reconciling orphans is the
/// caller's responsibility.
#[derive(Debug, Clone)]
pub struct MultipartUploadSession {
    /// Backend-issued opaque session token.
    pub upload_id: String,
    /// Uniform part size in bytes; the last part may be shorter.
    pub chunk_size: u64,
    /// One presigned upload URL per part, in part order.
    pub part_urls: Vec<String>,
}

/// A part the caller finished uploading, for session completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// 1-based part number.
    pub number: i32,
    /// ETag returned by the backend for this part.
    pub etag: String,
}

/// Progress update emitted by managed transfers.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Object key being transferred.
    pub key: String,
    /// Bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total bytes for the transfer.
    pub total_bytes: u64,
}

/// Static AWS credentials for environments without a credential chain.
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Configuration for the object storage client.
///
/// Immutable once the client is constructed. Tests shrink
/// `multipart_threshold` to exercise multipart paths cheaply.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// AWS region.
    pub region: String,
    /// Static credentials; `None` uses the default credential chain.
    pub credentials: Option<S3Credentials>,
    /// Concurrency degree for managed transfers (upload/copy parts).
    pub max_transfer_concurrency: usize,
    /// File sizes above this go through the multipart protocol.
    pub multipart_threshold: u64,
    /// Maximum object size for a single presigned PUT.
    pub presigned_size_limit: u64,
    /// Page size used by listings when the caller does not specify one.
    pub default_page_size: i32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            credentials: None,
            max_transfer_concurrency: 10,
            multipart_threshold: crate::chunking::MULTIPART_THRESHOLD,
            presigned_size_limit: crate::chunking::PRESIGNED_PUT_SIZE_LIMIT,
            default_page_size: DEFAULT_ITEMS_PER_PAGE,
        }
    }
}

impl StorageSettings {
    /// Set the AWS region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set static credentials.
    pub fn with_credentials(mut self, credentials: S3Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the managed-transfer concurrency degree.
    pub fn with_max_transfer_concurrency(mut self, concurrency: usize) -> Self {
        self.max_transfer_concurrency = concurrency.max(1);
        self
    }

    /// Set the multipart threshold in bytes.
    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    /// Set the single-PUT size limit in bytes.
    pub fn with_presigned_size_limit(mut self, limit: u64) -> Self {
        self.presigned_size_limit = limit;
        self
    }

    /// Set the page size used when a listing caller does not pick one.
    pub fn with_default_page_size(mut self, page_size: i32) -> Self {
        self.default_page_size = page_size.clamp(1, MAX_ITEMS_PER_PAGE);
        self
    }
}

/// Build an `s3://bucket/key` URI with the key percent-encoded.
pub fn compute_s3_url(bucket: &str, key: &str) -> String {
    let encoded: String = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<String>>()
        .join("/");
    format!("s3://{}/{}", bucket, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_s3_url_plain() {
        assert_eq!(
            compute_s3_url("bucket", "path/to/file.bin"),
            "s3://bucket/path/to/file.bin"
        );
    }

    #[test]
    fn test_compute_s3_url_encodes_segments() {
        assert_eq!(
            compute_s3_url("bucket", "dir with space/file#1.txt"),
            "s3://bucket/dir%20with%20space/file%231.txt"
        );
    }

    #[test]
    fn test_compute_s3_url_preserves_separators() {
        // Slashes delimit the key hierarchy and stay unencoded.
        let url: String = compute_s3_url("b", "a/b/c");
        assert_eq!(url.matches('/').count(), 4);
    }

    #[test]
    fn test_settings_builders() {
        let settings: StorageSettings = StorageSettings::default()
            .with_region("eu-west-1")
            .with_multipart_threshold(1024)
            .with_presigned_size_limit(2048)
            .with_default_page_size(25)
            .with_max_transfer_concurrency(0);
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.multipart_threshold, 1024);
        assert_eq!(settings.presigned_size_limit, 2048);
        assert_eq!(settings.default_page_size, 25);
        // Concurrency is floored at 1.
        assert_eq!(settings.max_transfer_concurrency, 1);
    }

    #[test]
    fn test_default_page_size_clamped_to_backend_maximum() {
        let settings: StorageSettings =
            StorageSettings::default().with_default_page_size(50_000);
        assert_eq!(settings.default_page_size, MAX_ITEMS_PER_PAGE);
        let settings: StorageSettings = StorageSettings::default().with_default_page_size(0);
        assert_eq!(settings.default_page_size, 1);
    }
}
