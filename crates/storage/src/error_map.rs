//! Translation of backend failures into the domain taxonomy.
//!
//! The mapping from `(HTTP status, operation)` to an error kind lives in
//! one `match` over the tuple, so new pairs can be added without one
//! check shadowing another. [`map_sdk_error`] adapts AWS SDK error
//! shapes onto that pure lookup.

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;

use crate::error::StorageError;

/// Client operations that participate in error mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Operation {
    HeadBucket,
    CreateBucket,
    ListBuckets,
    HeadObject,
    GetObject,
    PutObject,
    ListObjectsV2,
    ListObjectVersions,
    DeleteObject,
    DeleteObjects,
    CopyObject,
    UploadPartCopy,
    CreateMultipartUpload,
    UploadPart,
    AbortMultipartUpload,
    CompleteMultipartUpload,
    ListMultipartUploads,
    Presign,
}

impl S3Operation {
    /// Wire-style operation name, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            S3Operation::HeadBucket => "HeadBucket",
            S3Operation::CreateBucket => "CreateBucket",
            S3Operation::ListBuckets => "ListBuckets",
            S3Operation::HeadObject => "HeadObject",
            S3Operation::GetObject => "GetObject",
            S3Operation::PutObject => "PutObject",
            S3Operation::ListObjectsV2 => "ListObjectsV2",
            S3Operation::ListObjectVersions => "ListObjectVersions",
            S3Operation::DeleteObject => "DeleteObject",
            S3Operation::DeleteObjects => "DeleteObjects",
            S3Operation::CopyObject => "CopyObject",
            S3Operation::UploadPartCopy => "UploadPartCopy",
            S3Operation::CreateMultipartUpload => "CreateMultipartUpload",
            S3Operation::UploadPart => "UploadPart",
            S3Operation::AbortMultipartUpload => "AbortMultipartUpload",
            S3Operation::CompleteMultipartUpload => "CompleteMultipartUpload",
            S3Operation::ListMultipartUploads => "ListMultipartUploads",
            S3Operation::Presign => "Presign",
        }
    }
}

/// Call-site context threaded into mapped errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub upload_id: Option<String>,
}

impl ErrorContext {
    pub fn bucket(bucket: &str) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            ..Default::default()
        }
    }

    pub fn object(bucket: &str, key: &str) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            key: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn upload(bucket: &str, key: &str, upload_id: &str) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            key: Some(key.to_string()),
            upload_id: Some(upload_id.to_string()),
        }
    }

    fn bucket_or_unknown(&self) -> String {
        self.bucket.clone().unwrap_or_else(|| "<unknown>".into())
    }

    fn key_or_unknown(&self) -> String {
        self.key.clone().unwrap_or_else(|| "<unknown>".into())
    }

    fn upload_id_or_unknown(&self) -> String {
        self.upload_id.clone().unwrap_or_else(|| "<unknown>".into())
    }
}

/// Pure lookup from `(status, operation)` to a domain error.
///
/// Anything not matched falls through to [`StorageError::Access`].
pub fn map_status(
    status: u16,
    op: S3Operation,
    ctx: &ErrorContext,
    message: &str,
) -> StorageError {
    use S3Operation::*;

    match (status, op) {
        // Bucket-level probes: both "missing" and "forbidden" read as
        // an invalid bucket.
        (404, HeadBucket) | (403, HeadBucket) => StorageError::BucketInvalid {
            bucket: ctx.bucket_or_unknown(),
        },
        // Object-level 404s.
        (404, HeadObject)
        | (404, GetObject)
        | (404, DeleteObject)
        | (404, CopyObject)
        | (404, UploadPartCopy)
        | (404, ListObjectVersions) => StorageError::KeyNotFound {
            bucket: ctx.bucket_or_unknown(),
            key: ctx.key_or_unknown(),
        },
        // Multipart session gone: 404 on abort, 500 on an invalid or
        // already-settled completion. A 404 on completion deliberately
        // falls through to Access (see the non-idempotent completion
        // note on ObjectStorageClient::complete_multipart_upload).
        (404, AbortMultipartUpload) | (500, CompleteMultipartUpload) => {
            StorageError::UploadNotFound {
                upload_id: ctx.upload_id_or_unknown(),
            }
        }
        _ => StorageError::Access {
            message: format!("{} failed with status {}: {}", op.as_str(), status, message),
        },
    }
}

/// Map an AWS SDK error onto the domain taxonomy.
///
/// Service errors carry an HTTP status and go through [`map_status`],
/// except that a `NoSuchBucket` error code short-circuits to
/// [`StorageError::BucketInvalid`] on any operation. Connection-level
/// failures become [`StorageError::Access`]; anything unexpected is
/// logged at error severity before surfacing as `Access`.
pub fn map_sdk_error<E>(
    err: SdkError<E, HttpResponse>,
    op: S3Operation,
    ctx: &ErrorContext,
) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::ServiceError(service_err) => {
            if service_err.err().code() == Some("NoSuchBucket") {
                return StorageError::BucketInvalid {
                    bucket: ctx.bucket_or_unknown(),
                };
            }
            let status: u16 = service_err.raw().status().as_u16();
            let message: String = service_err.err().to_string();
            map_status(status, op, ctx, &message)
        }
        SdkError::DispatchFailure(dispatch) => StorageError::Access {
            message: format!("{}: connection failure: {:?}", op.as_str(), dispatch),
        },
        SdkError::TimeoutError(_) => StorageError::Access {
            message: format!("{}: request timed out", op.as_str()),
        },
        other => {
            tracing::error!(
                operation = op.as_str(),
                error = %other,
                "unexpected backend error"
            );
            StorageError::Access {
                message: format!("{}: {}", op.as_str(), other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::upload("bkt", "path/to/key", "upload-1")
    }

    #[test]
    fn test_bucket_probe_404_and_403_both_invalid() {
        for status in [404u16, 403] {
            let err: StorageError = map_status(status, S3Operation::HeadBucket, &ctx(), "");
            assert!(matches!(err, StorageError::BucketInvalid { ref bucket } if bucket == "bkt"));
        }
    }

    #[test]
    fn test_object_404_is_key_not_found() {
        for op in [
            S3Operation::HeadObject,
            S3Operation::GetObject,
            S3Operation::CopyObject,
        ] {
            let err: StorageError = map_status(404, op, &ctx(), "");
            assert!(matches!(err, StorageError::KeyNotFound { .. }), "{:?}", op);
        }
    }

    #[test]
    fn test_multipart_session_mapping() {
        let err: StorageError = map_status(404, S3Operation::AbortMultipartUpload, &ctx(), "");
        assert!(
            matches!(err, StorageError::UploadNotFound { ref upload_id } if upload_id == "upload-1")
        );

        let err: StorageError = map_status(500, S3Operation::CompleteMultipartUpload, &ctx(), "");
        assert!(matches!(err, StorageError::UploadNotFound { .. }));
    }

    #[test]
    fn test_completion_404_falls_through_to_access() {
        // Second completion attempt against a settled upload_id.
        let err: StorageError = map_status(404, S3Operation::CompleteMultipartUpload, &ctx(), "");
        assert!(matches!(err, StorageError::Access { .. }));
    }

    #[test]
    fn test_unmatched_pairs_fall_through() {
        let err: StorageError = map_status(503, S3Operation::PutObject, &ctx(), "slow down");
        match err {
            StorageError::Access { message } => {
                assert!(message.contains("PutObject"));
                assert!(message.contains("503"));
            }
            other => panic!("expected Access, got {:?}", other),
        }
    }

    #[test]
    fn test_403_on_object_op_is_not_key_not_found() {
        let err: StorageError = map_status(403, S3Operation::HeadObject, &ctx(), "denied");
        assert!(matches!(err, StorageError::Access { .. }));
    }
}
