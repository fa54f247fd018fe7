//! Single-connection facade over an S3-compatible backend.
//!
//! Covers bucket probes, object metadata, recursive listing/delete,
//! presigned link issuance, the full multipart-upload lifecycle,
//! managed whole-file uploads, and single/recursive copy. Every public
//! method routes backend failures through the error mapper; no raw SDK
//! error escapes this module.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, Object, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::Length;
use futures::future::try_join_all;
use futures::stream::{self, Stream, StreamExt};

use stowage_common::ProgressCallback;

use crate::chunking::{compute_chunk_plan, ChunkPlan};
use crate::error::StorageError;
use crate::error_map::{map_sdk_error, ErrorContext, S3Operation};
use crate::types::{
    DirectoryMetadata, MultipartUploadSession, ObjectMetadata, StorageSettings, TransferProgress,
    UploadedPart, MAX_DELETE_BATCH, MAX_ITEMS_PER_PAGE, RECURSIVE_COPY_CONCURRENCY,
};

/// Client facade over one S3 connection.
///
/// The underlying SDK client is safe for concurrent independent calls;
/// the connection pool is released when the client is dropped, on every
/// exit path.
pub struct ObjectStorageClient {
    /// The underlying S3 client.
    client: Client,
    /// Immutable client configuration.
    settings: StorageSettings,
}

impl ObjectStorageClient {
    /// Create a client and verify connectivity.
    ///
    /// Construction is async because it performs a lightweight
    /// `ListBuckets` probe; an unreachable or misconfigured backend
    /// fails here rather than on first use.
    pub async fn new(settings: StorageSettings) -> Result<Self, StorageError> {
        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()));

        let config_loader = if let Some(ref creds) = settings.credentials {
            let credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "stowage",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let client = Client::new(&sdk_config);

        client.list_buckets().send().await.map_err(|err| {
            map_sdk_error(err, S3Operation::ListBuckets, &ErrorContext::default())
        })?;

        Ok(Self { client, settings })
    }

    /// Create a client from an existing SDK client (for testing).
    pub fn from_client(client: Client, settings: StorageSettings) -> Self {
        Self { client, settings }
    }

    /// The client's immutable configuration.
    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------

    /// Check whether a bucket exists.
    ///
    /// A 404 yields `Ok(false)`; any other failure, including a 403,
    /// surfaces as an error. A permission problem must not read as
    /// "bucket missing".
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if let SdkError::ServiceError(service_err) = &err {
                    if service_err.raw().status().as_u16() == 404 {
                        return Ok(false);
                    }
                }
                Err(map_sdk_error(
                    err,
                    S3Operation::HeadBucket,
                    &ErrorContext::bucket(bucket),
                ))
            }
        }
    }

    /// Create a bucket in the configured region.
    ///
    /// The location constraint must be omitted for the default region
    /// and included otherwise; the backend rejects the opposite. A
    /// bucket already owned by the caller is not an error.
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.settings.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.settings.region.as_str());
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                if let SdkError::ServiceError(service_err) = &err {
                    if service_err.err().is_bucket_already_owned_by_you() {
                        return Ok(());
                    }
                }
                Err(map_sdk_error(
                    err,
                    S3Operation::CreateBucket,
                    &ErrorContext::bucket(bucket),
                ))
            }
        }
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Check whether anything exists under `key` as a prefix.
    ///
    /// Implemented as a listing, not a HEAD: `object_exists(b, "foo")`
    /// is true when `foo.txt` exists. Callers relying on "does anything
    /// under this prefix exist" depend on this; use
    /// [`Self::object_exists_exact`] for a literal-key check.
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(key)
            .max_keys(1)
            .send()
            .await
            .map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::ListObjectsV2,
                    &ErrorContext::object(bucket, key),
                )
            })?;
        Ok(output.key_count().unwrap_or(0) > 0)
    }

    /// Check whether the literal key exists.
    pub async fn object_exists_exact(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let SdkError::ServiceError(service_err) = &err {
                    if service_err.err().is_not_found() {
                        return Ok(false);
                    }
                }
                Err(map_sdk_error(
                    err,
                    S3Operation::HeadObject,
                    &ErrorContext::object(bucket, key),
                ))
            }
        }
    }

    /// Fetch a point-in-time metadata snapshot of an object.
    pub async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::HeadObject,
                    &ErrorContext::object(bucket, key),
                )
            })?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            last_modified: output.last_modified().and_then(to_chrono),
            etag: output.e_tag().map(strip_etag_quotes),
            sha256_checksum: output.checksum_sha256().map(str::to_string),
            size_bytes: output.content_length().unwrap_or(0).max(0) as u64,
        })
    }

    /// Aggregate size of everything under a prefix.
    ///
    /// Sums a full paginated listing on every call; the result is a
    /// snapshot, never cached. Size is `None` when the backend omits a
    /// size for any listed object.
    pub async fn get_directory_metadata(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<DirectoryMetadata, StorageError> {
        let mut total: Option<u64> = Some(0);
        let mut token: Option<String> = None;
        loop {
            let (objects, next) = self
                .list_page(bucket, Some(prefix), token.as_deref(), MAX_ITEMS_PER_PAGE)
                .await?;
            for object in &objects {
                total = match (total, object.size().map(|s| s.max(0) as u64)) {
                    (Some(sum), Some(size)) => Some(sum + size),
                    _ => None,
                };
            }
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(DirectoryMetadata {
            prefix: prefix.to_string(),
            size_bytes: total,
        })
    }

    /// Stream the objects under a prefix, one page at a time.
    ///
    /// `None` for the page size falls back to the configured
    /// `default_page_size`. An explicit page size is validated against
    /// the backend hard maximum before any network call. Failures can
    /// surface mid-stream - each page fetch is individually mapped into
    /// the domain taxonomy.
    pub fn list_objects_paginated(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        items_per_page: Option<i32>,
    ) -> Result<impl Stream<Item = Result<Vec<ObjectMetadata>, StorageError>> + Send + 'static, StorageError>
    {
        let items_per_page: i32 = items_per_page.unwrap_or(self.settings.default_page_size);
        if items_per_page > MAX_ITEMS_PER_PAGE || items_per_page < 1 {
            return Err(StorageError::InvalidPageSize {
                requested: items_per_page,
                max: MAX_ITEMS_PER_PAGE,
            });
        }

        struct PageCursor {
            client: Client,
            bucket: String,
            prefix: Option<String>,
            page_size: i32,
            token: Option<String>,
            done: bool,
        }

        let cursor = PageCursor {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            prefix: prefix.map(str::to_string),
            page_size: items_per_page,
            token: None,
            done: false,
        };

        Ok(stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.done {
                return Ok(None);
            }

            let mut request = cursor
                .client
                .list_objects_v2()
                .bucket(&cursor.bucket)
                .max_keys(cursor.page_size);
            if let Some(ref prefix) = cursor.prefix {
                request = request.prefix(prefix);
            }
            if let Some(ref token) = cursor.token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::ListObjectsV2,
                    &ErrorContext::bucket(&cursor.bucket),
                )
            })?;

            let page: Vec<ObjectMetadata> =
                output.contents().iter().map(from_listed_object).collect();

            cursor.token = output.next_continuation_token().map(str::to_string);
            cursor.done = !output.is_truncated().unwrap_or(false) || cursor.token.is_none();

            Ok(Some((page, cursor)))
        }))
    }

    /// Delete everything under a prefix, in batches.
    ///
    /// Pages through the listing and issues batch deletes of at most
    /// [`MAX_DELETE_BATCH`] keys. An empty prefix is a no-op.
    pub async fn delete_objects_recursively(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<(), StorageError> {
        let mut token: Option<String> = None;
        loop {
            let (objects, next) = self
                .list_page(
                    bucket,
                    Some(prefix),
                    token.as_deref(),
                    MAX_DELETE_BATCH as i32,
                )
                .await?;

            if !objects.is_empty() {
                let identifiers: Vec<ObjectIdentifier> = objects
                    .iter()
                    .filter_map(|o| o.key())
                    .map(|key| {
                        ObjectIdentifier::builder()
                            .key(key)
                            .build()
                            .map_err(StorageError::access)
                    })
                    .collect::<Result<_, _>>()?;

                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .quiet(true)
                    .build()
                    .map_err(StorageError::access)?;

                self.client
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|err| {
                        map_sdk_error(
                            err,
                            S3Operation::DeleteObjects,
                            &ErrorContext::bucket(bucket),
                        )
                    })?;
            }

            match next {
                Some(t) => token = Some(t),
                None => return Ok(()),
            }
        }
    }

    /// Restore an object hidden by a delete marker.
    ///
    /// Removes the most recent delete marker on the exact key, exposing
    /// the previous live version. Restoring older content versions is
    /// not supported. Does nothing when the object was never deleted;
    /// callers who care must check existence first.
    ///
    /// # Errors
    /// [`StorageError::KeyNotFound`] when the key has no versions and
    /// no delete markers at all.
    pub async fn undelete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(key)
            .send()
            .await
            .map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::ListObjectVersions,
                    &ErrorContext::object(bucket, key),
                )
            })?;

        // The listing is prefix-based; keep only the exact key.
        let versions: Vec<_> = output
            .versions()
            .iter()
            .filter(|v| v.key() == Some(key))
            .collect();
        let markers: Vec<_> = output
            .delete_markers()
            .iter()
            .filter(|m| m.key() == Some(key))
            .collect();

        if versions.is_empty() && markers.is_empty() {
            return Err(StorageError::KeyNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let latest_marker = markers.iter().find(|m| m.is_latest().unwrap_or(false));
        if let Some(marker) = latest_marker {
            let mut request = self.client.delete_object().bucket(bucket).key(key);
            if let Some(version_id) = marker.version_id() {
                request = request.version_id(version_id);
            }
            request.send().await.map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::DeleteObject,
                    &ErrorContext::object(bucket, key),
                )
            })?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Presigned links
    // ------------------------------------------------------------------

    /// Presign a time-limited download URL.
    ///
    /// Verifies both the bucket and the object exist before signing.
    pub async fn create_single_presigned_download_link(
        &self,
        bucket: &str,
        key: &str,
        expiration_secs: u64,
    ) -> Result<String, StorageError> {
        if !self.bucket_exists(bucket).await? {
            return Err(StorageError::BucketInvalid {
                bucket: bucket.to_string(),
            });
        }
        // Raises KeyNotFound when the object is missing.
        self.get_object_metadata(bucket, key).await?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config(expiration_secs)?)
            .await
            .map_err(|err| {
                map_sdk_error(err, S3Operation::Presign, &ErrorContext::object(bucket, key))
            })?;
        Ok(request.uri().to_string())
    }

    /// Presign a time-limited upload URL for a file of known size.
    ///
    /// Verifies only the bucket; the object need not exist yet. A
    /// single presigned PUT is capped at the configured size limit
    /// (5GiB on real S3) - larger files must use a multipart session.
    /// The size check runs before any network call.
    pub async fn create_single_presigned_upload_link(
        &self,
        bucket: &str,
        key: &str,
        file_size: u64,
        expiration_secs: u64,
    ) -> Result<String, StorageError> {
        if file_size > self.settings.presigned_size_limit {
            return Err(StorageError::SingleUploadTooLarge {
                file_size,
                limit: self.settings.presigned_size_limit,
            });
        }
        if !self.bucket_exists(bucket).await? {
            return Err(StorageError::BucketInvalid {
                bucket: bucket.to_string(),
            });
        }

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config(expiration_secs)?)
            .await
            .map_err(|err| {
                map_sdk_error(err, S3Operation::Presign, &ErrorContext::object(bucket, key))
            })?;
        Ok(request.uri().to_string())
    }

    // ------------------------------------------------------------------
    // Multipart uploads
    // ------------------------------------------------------------------

    /// Initiate a multipart session and presign every part URL.
    ///
    /// Computes the chunk plan from the declared size, then issues the
    /// per-part URLs concurrently - each presign is an independent
    /// round-trip with no ordering dependency. An optional SHA-256 is
    /// attached as object metadata at initiation, not at completion.
    pub async fn create_multipart_upload_links(
        &self,
        bucket: &str,
        key: &str,
        file_size: u64,
        expiration_secs: u64,
        sha256_checksum: Option<&str>,
    ) -> Result<MultipartUploadSession, StorageError> {
        if !self.bucket_exists(bucket).await? {
            return Err(StorageError::BucketInvalid {
                bucket: bucket.to_string(),
            });
        }

        let plan: ChunkPlan = compute_chunk_plan(file_size)?;
        let upload_id: String = self
            .initiate_multipart_upload(bucket, key, sha256_checksum)
            .await?;

        let config = presigning_config(expiration_secs)?;
        let part_futures = (1..=plan.num_parts as i32).map(|part_number| {
            let config = config.clone();
            let upload_id = upload_id.clone();
            async move {
                let request = self
                    .client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .part_number(part_number)
                    .presigned(config)
                    .await
                    .map_err(|err| {
                        map_sdk_error(
                            err,
                            S3Operation::Presign,
                            &ErrorContext::upload(bucket, key, &upload_id),
                        )
                    })?;
                Ok::<String, StorageError>(request.uri().to_string())
            }
        });
        let part_urls: Vec<String> = try_join_all(part_futures).await?;

        Ok(MultipartUploadSession {
            upload_id,
            chunk_size: plan.chunk_size,
            part_urls,
        })
    }

    /// List multipart sessions that are neither completed nor aborted.
    ///
    /// Returns `(upload_id, key)` pairs. Some S3-compatible backends do
    /// not enumerate ongoing uploads without a key prefix filter; pass
    /// one when targeting such a deployment.
    pub async fn list_ongoing_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StorageError> {
        let mut request = self.client.list_multipart_uploads().bucket(bucket);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        let output = request.send().await.map_err(|err| {
            map_sdk_error(
                err,
                S3Operation::ListMultipartUploads,
                &ErrorContext::bucket(bucket),
            )
        })?;

        Ok(output
            .uploads()
            .iter()
            .filter_map(|upload| {
                Some((
                    upload.upload_id()?.to_string(),
                    upload.key()?.to_string(),
                ))
            })
            .collect())
    }

    /// Abort a multipart session, discarding all uploaded parts.
    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::AbortMultipartUpload,
                    &ErrorContext::upload(bucket, key, upload_id),
                )
            })?;
        Ok(())
    }

    /// Complete a multipart session and return the final object ETag.
    ///
    /// Parts are forwarded in caller-given order; part-number
    /// correctness is the caller's responsibility.
    ///
    /// Backend quirk, preserved for compatibility: completion is bound
    /// to the upload_id, not the key. Completing with a mismatched key
    /// succeeds once against whatever object the upload_id belongs to,
    /// and a second attempt on the settled upload_id fails as a generic
    /// access error. Do not write new call sites that rely on this.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<String, StorageError> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| {
                map_sdk_error(
                    err,
                    S3Operation::CompleteMultipartUpload,
                    &ErrorContext::upload(bucket, key, upload_id),
                )
            })?;

        output
            .e_tag()
            .map(strip_etag_quotes)
            .ok_or_else(|| StorageError::access("completion response carried no ETag"))
    }

    // ------------------------------------------------------------------
    // Managed transfers
    // ------------------------------------------------------------------

    /// Upload a whole file through a managed transfer.
    ///
    /// Files at or below both the multipart threshold and the
    /// single-PUT size limit go up as one PUT; larger files are split
    /// per the chunk plan and uploaded with the configured transfer
    /// concurrency, so files past the single-PUT ceiling are handled.
    /// The progress callback fires per completed part; returning
    /// `false` cancels the transfer and aborts the session.
    pub async fn upload_file(
        &self,
        bucket: &str,
        file_path: &Path,
        key: &str,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<(), StorageError> {
        let file_size: u64 = tokio::fs::metadata(file_path)
            .await
            .map_err(StorageError::access)?
            .len();

        let single_put_ceiling: u64 = self
            .settings
            .multipart_threshold
            .min(self.settings.presigned_size_limit);
        if file_size <= single_put_ceiling {
            let body = ByteStream::from_path(file_path)
                .await
                .map_err(StorageError::access)?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|err| {
                    map_sdk_error(
                        err,
                        S3Operation::PutObject,
                        &ErrorContext::object(bucket, key),
                    )
                })?;
            notify_progress(progress, key, file_size, file_size);
            return Ok(());
        }

        let plan: ChunkPlan = compute_chunk_plan(file_size)?;
        let upload_id: String = self.initiate_multipart_upload(bucket, key, None).await?;

        match self
            .upload_parts_from_file(bucket, key, &upload_id, file_path, file_size, plan, progress)
            .await
        {
            Ok(parts) => {
                self.complete_multipart_upload(bucket, key, &upload_id, &parts)
                    .await?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_multipart_upload(bucket, key, &upload_id).await {
                    tracing::warn!(
                        bucket,
                        key,
                        upload_id = %upload_id,
                        error = %abort_err,
                        "failed to abort multipart session after upload failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// Copy one object within a bucket.
    ///
    /// Switches from a single-shot copy to a multipart copy above the
    /// configured threshold. The backend's copy call furnishes no
    /// incremental progress, so the callback fires at most once, at
    /// full completion - only uploads get intermediate ticks.
    pub async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
        src_metadata: Option<&ObjectMetadata>,
    ) -> Result<(), StorageError> {
        let size_bytes: u64 = match src_metadata {
            Some(metadata) => metadata.size_bytes,
            None => self.get_object_metadata(bucket, src_key).await?.size_bytes,
        };

        if size_bytes <= self.settings.multipart_threshold {
            self.client
                .copy_object()
                .copy_source(encode_copy_source(bucket, src_key))
                .bucket(bucket)
                .key(dst_key)
                .send()
                .await
                .map_err(|err| {
                    map_sdk_error(
                        err,
                        S3Operation::CopyObject,
                        &ErrorContext::object(bucket, src_key),
                    )
                })?;
        } else {
            self.multipart_copy(bucket, src_key, dst_key, size_bytes)
                .await?;
        }

        notify_progress(progress, dst_key, size_bytes, size_bytes);
        Ok(())
    }

    /// Copy everything under a prefix, preserving structure.
    ///
    /// The destination prefix must be empty - this is a strict guard,
    /// not a merge. Individual copies fan out under a hard ceiling of
    /// [`RECURSIVE_COPY_CONCURRENCY`] simultaneous operations.
    pub async fn copy_objects_recursively(
        &self,
        bucket: &str,
        src_prefix: &str,
        dst_prefix: &str,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<(), StorageError> {
        let destination = self.get_directory_metadata(bucket, dst_prefix).await?;
        if destination.size_bytes != Some(0) {
            return Err(StorageError::DestinationNotEmpty {
                bucket: bucket.to_string(),
                prefix: dst_prefix.to_string(),
            });
        }

        let mut sources: Vec<ObjectMetadata> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let (objects, next) = self
                .list_page(bucket, Some(src_prefix), token.as_deref(), MAX_ITEMS_PER_PAGE)
                .await?;
            sources.extend(objects.iter().map(from_listed_object));
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        let total_bytes: u64 = sources.iter().map(|o| o.size_bytes).sum();
        let copied_bytes = Arc::new(AtomicU64::new(0));

        let results: Vec<Result<(), StorageError>> = stream::iter(sources)
            .map(|source| {
                let copied_bytes = Arc::clone(&copied_bytes);
                async move {
                    let suffix: &str = source
                        .key
                        .strip_prefix(src_prefix)
                        .unwrap_or(source.key.as_str());
                    let dst_key: String = format!("{}{}", dst_prefix, suffix);
                    self.copy_object(bucket, &source.key, &dst_key, None, Some(&source))
                        .await?;

                    let done: u64 =
                        copied_bytes.fetch_add(source.size_bytes, Ordering::Relaxed)
                            + source.size_bytes;
                    notify_progress(progress, dst_prefix, done, total_bytes);
                    Ok(())
                }
            })
            .buffer_unordered(RECURSIVE_COPY_CONCURRENCY)
            .collect()
            .await;

        results.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Fetch one listing page, returning raw objects and the next token.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: i32,
    ) -> Result<(Vec<Object>, Option<String>), StorageError> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(page_size);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        if let Some(token) = token {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(|err| {
            map_sdk_error(
                err,
                S3Operation::ListObjectsV2,
                &ErrorContext::bucket(bucket),
            )
        })?;

        let next: Option<String> = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok((output.contents().to_vec(), next))
    }

    /// Initiate a multipart session, optionally tagging a checksum.
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        sha256_checksum: Option<&str>,
    ) -> Result<String, StorageError> {
        let mut request = self.client.create_multipart_upload().bucket(bucket).key(key);
        if let Some(checksum) = sha256_checksum {
            request = request.metadata("sha256-checksum", checksum);
        }
        let output = request.send().await.map_err(|err| {
            map_sdk_error(
                err,
                S3Operation::CreateMultipartUpload,
                &ErrorContext::object(bucket, key),
            )
        })?;
        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::access("multipart initiation returned no upload id"))
    }

    /// Upload all parts of a file concurrently, bounded by settings.
    #[allow(clippy::too_many_arguments)]
    async fn upload_parts_from_file(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        file_path: &Path,
        file_size: u64,
        plan: ChunkPlan,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<Vec<UploadedPart>, StorageError> {
        let transferred = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));

        let results: Vec<Result<UploadedPart, StorageError>> = stream::iter(0..plan.num_parts)
            .map(|index| {
                let transferred = Arc::clone(&transferred);
                let cancelled = Arc::clone(&cancelled);
                async move {
                    if cancelled.load(Ordering::Relaxed) {
                        return Err(StorageError::access("transfer cancelled by caller"));
                    }

                    let (offset, length) = plan.part_range(index, file_size);
                    // Parts stream straight from disk; nothing is
                    // buffered whole in memory.
                    let body: ByteStream = file_range_stream(file_path, offset, length).await?;

                    let output = self
                        .client
                        .upload_part()
                        .bucket(bucket)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number((index + 1) as i32)
                        .body(body)
                        .send()
                        .await
                        .map_err(|err| {
                            map_sdk_error(
                                err,
                                S3Operation::UploadPart,
                                &ErrorContext::upload(bucket, key, upload_id),
                            )
                        })?;

                    let etag: String = output
                        .e_tag()
                        .map(strip_etag_quotes)
                        .ok_or_else(|| StorageError::access("part upload returned no ETag"))?;

                    let done: u64 = transferred.fetch_add(length, Ordering::Relaxed) + length;
                    if let Some(cb) = progress {
                        let update = TransferProgress {
                            key: key.to_string(),
                            bytes_transferred: done,
                            total_bytes: file_size,
                        };
                        if !cb.on_progress(&update) {
                            cancelled.store(true, Ordering::Relaxed);
                            return Err(StorageError::access("transfer cancelled by caller"));
                        }
                    }

                    Ok(UploadedPart {
                        number: (index + 1) as i32,
                        etag,
                    })
                }
            })
            .buffer_unordered(self.settings.max_transfer_concurrency)
            .collect()
            .await;

        let mut parts: Vec<UploadedPart> = results.into_iter().collect::<Result<_, _>>()?;
        parts.sort_by_key(|part| part.number);
        Ok(parts)
    }

    /// Server-side multipart copy for objects above the threshold.
    async fn multipart_copy(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
        size_bytes: u64,
    ) -> Result<(), StorageError> {
        let plan: ChunkPlan = compute_chunk_plan(size_bytes)?;
        let upload_id: String = self.initiate_multipart_upload(bucket, dst_key, None).await?;

        let copy_source: String = encode_copy_source(bucket, src_key);
        let part_results: Vec<Result<UploadedPart, StorageError>> =
            stream::iter(0..plan.num_parts)
                .map(|index| {
                    let copy_source = copy_source.clone();
                    let upload_id = upload_id.clone();
                    async move {
                        let (offset, length) = plan.part_range(index, size_bytes);
                        let range: String =
                            format!("bytes={}-{}", offset, offset + length - 1);

                        let output = self
                            .client
                            .upload_part_copy()
                            .bucket(bucket)
                            .key(dst_key)
                            .upload_id(&upload_id)
                            .part_number((index + 1) as i32)
                            .copy_source(&copy_source)
                            .copy_source_range(range)
                            .send()
                            .await
                            .map_err(|err| {
                                map_sdk_error(
                                    err,
                                    S3Operation::UploadPartCopy,
                                    &ErrorContext::upload(bucket, dst_key, &upload_id),
                                )
                            })?;

                        let etag: String = output
                            .copy_part_result()
                            .and_then(|r| r.e_tag())
                            .map(strip_etag_quotes)
                            .ok_or_else(|| {
                                StorageError::access("part copy returned no ETag")
                            })?;

                        Ok(UploadedPart {
                            number: (index + 1) as i32,
                            etag,
                        })
                    }
                })
                .buffer_unordered(self.settings.max_transfer_concurrency)
                .collect()
                .await;

        let collected: Result<Vec<UploadedPart>, StorageError> =
            part_results.into_iter().collect();
        match collected {
            Ok(mut parts) => {
                parts.sort_by_key(|part| part.number);
                self.complete_multipart_upload(bucket, dst_key, &upload_id, &parts)
                    .await?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .abort_multipart_upload(bucket, dst_key, &upload_id)
                    .await
                {
                    tracing::warn!(
                        bucket,
                        dst_key,
                        upload_id = %upload_id,
                        error = %abort_err,
                        "failed to abort multipart session after copy failure"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Strip the surrounding quotes the backend puts on ETags.
fn strip_etag_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Build a `CopySource` header value with the key percent-encoded.
fn encode_copy_source(bucket: &str, key: &str) -> String {
    let encoded: String = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<String>>()
        .join("/");
    format!("{}/{}", bucket, encoded)
}

/// Presigning configuration with a caller-bounded expiry.
fn presigning_config(expiration_secs: u64) -> Result<PresigningConfig, StorageError> {
    PresigningConfig::expires_in(Duration::from_secs(expiration_secs))
        .map_err(StorageError::access)
}

/// Metadata snapshot from a listing entry.
fn from_listed_object(object: &Object) -> ObjectMetadata {
    ObjectMetadata {
        key: object.key().unwrap_or_default().to_string(),
        last_modified: object.last_modified().and_then(to_chrono),
        etag: object.e_tag().map(strip_etag_quotes),
        sha256_checksum: None,
        size_bytes: object.size().unwrap_or(0).max(0) as u64,
    }
}

/// Convert an SDK timestamp into a chrono timestamp.
fn to_chrono(timestamp: &aws_sdk_s3::primitives::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// Stream an exact byte range from a file without buffering it whole.
async fn file_range_stream(
    path: &Path,
    offset: u64,
    length: u64,
) -> Result<ByteStream, StorageError> {
    ByteStream::read_from()
        .path(path)
        .offset(offset)
        .length(Length::Exact(length))
        .build()
        .await
        .map_err(StorageError::access)
}

/// Fire a progress callback when one is attached, ignoring the verdict.
fn notify_progress(
    progress: Option<&dyn ProgressCallback<TransferProgress>>,
    key: &str,
    bytes_transferred: u64,
    total_bytes: u64,
) {
    if let Some(cb) = progress {
        cb.on_progress(&TransferProgress {
            key: key.to_string(),
            bytes_transferred,
            total_bytes,
        });
    }
}
