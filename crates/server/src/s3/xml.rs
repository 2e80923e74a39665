//! XML bodies for the S3 API, serialized via `quick-xml` + `serde`.

use super::error::S3Error;
use hoard_metadata::models::{BucketRow, ObjectRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Owner reported in bucket listings. There is a single tenant.
const OWNER_ID: &str = "hoard";

/// Serialize a struct to an S3 XML string with `<?xml ...?>` header.
fn to_xml<T: Serialize>(value: &T) -> Result<String, S3Error> {
    let body = quick_xml::se::to_string(value).map_err(|e| S3Error::Internal {
        message: format!("XML serialization failed: {e}"),
    })?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

/// Timestamp in the ISO 8601 form S3 uses inside XML bodies.
pub(crate) fn iso8601(at: OffsetDateTime) -> Result<String, S3Error> {
    at.to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .map_err(|e| S3Error::Internal {
            message: format!("timestamp formatting failed: {e}"),
        })
}

/// Timestamp in the RFC 7231 HTTP-date form used by `Last-Modified`.
pub(crate) fn http_date(at: OffsetDateTime) -> Result<String, S3Error> {
    at.to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        ))
        .map_err(|e| S3Error::Internal {
            message: format!("timestamp formatting failed: {e}"),
        })
}

// -----------------------------------------------------------------------
// S3 Error
// -----------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "Error")]
struct S3ErrorXml<'a> {
    #[serde(rename = "Code")]
    code: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
    #[serde(rename = "Resource")]
    resource: &'a str,
    #[serde(rename = "RequestId")]
    request_id: &'a str,
}

pub(crate) fn error_xml(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    to_xml(&S3ErrorXml {
        code,
        message,
        resource,
        request_id,
    })
    .unwrap_or_else(|_| {
        // Codes are plain ASCII identifiers, so this cannot need escaping.
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{code}</Code></Error>")
    })
}

// -----------------------------------------------------------------------
// ListAllMyBucketsResult (GET /)
// -----------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "ListAllMyBucketsResult")]
struct ListAllMyBucketsResult {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "Owner")]
    owner: Owner,
    #[serde(rename = "Buckets")]
    buckets: Buckets,
}

#[derive(Serialize)]
struct Owner {
    #[serde(rename = "ID")]
    id: &'static str,
    #[serde(rename = "DisplayName")]
    display_name: &'static str,
}

#[derive(Serialize)]
struct Buckets {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketEntry>,
}

#[derive(Serialize)]
struct BucketEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CreationDate")]
    creation_date: String,
}

pub(crate) fn list_all_my_buckets(buckets: &[BucketRow]) -> Result<String, S3Error> {
    let bucket = buckets
        .iter()
        .map(|b| {
            Ok(BucketEntry {
                name: b.name.clone(),
                creation_date: iso8601(b.created_at)?,
            })
        })
        .collect::<Result<Vec<_>, S3Error>>()?;

    to_xml(&ListAllMyBucketsResult {
        xmlns: S3_XMLNS,
        owner: Owner {
            id: OWNER_ID,
            display_name: OWNER_ID,
        },
        buckets: Buckets { bucket },
    })
}

// -----------------------------------------------------------------------
// ListBucketResult (ListObjectsV2)
// -----------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "ListBucketResult")]
struct ListBucketResult {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Prefix")]
    prefix: String,
    #[serde(rename = "KeyCount")]
    key_count: usize,
    #[serde(rename = "MaxKeys")]
    max_keys: u32,
    #[serde(rename = "IsTruncated")]
    is_truncated: bool,
    #[serde(rename = "ContinuationToken", skip_serializing_if = "Option::is_none")]
    continuation_token: Option<String>,
    #[serde(rename = "NextContinuationToken", skip_serializing_if = "Option::is_none")]
    next_continuation_token: Option<String>,
    #[serde(rename = "StartAfter", skip_serializing_if = "Option::is_none")]
    start_after: Option<String>,
    #[serde(rename = "Contents", default)]
    contents: Vec<Contents>,
}

#[derive(Serialize)]
struct Contents {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "LastModified")]
    last_modified: String,
    #[serde(rename = "ETag")]
    etag: String,
    #[serde(rename = "Size")]
    size: i64,
    #[serde(rename = "StorageClass")]
    storage_class: &'static str,
}

/// Everything a ListObjectsV2 response echoes or returns.
pub(crate) struct ListObjectsV2<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    pub continuation_token: Option<&'a str>,
    pub start_after: Option<&'a str>,
    pub max_keys: u32,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    pub objects: &'a [ObjectRow],
}

pub(crate) fn list_objects_v2(listing: ListObjectsV2<'_>) -> Result<String, S3Error> {
    let contents = listing
        .objects
        .iter()
        .map(|o| {
            Ok(Contents {
                key: o.key.clone(),
                last_modified: iso8601(o.updated_at)?,
                etag: format!("\"{}\"", o.etag),
                size: o.size_bytes,
                storage_class: "STANDARD",
            })
        })
        .collect::<Result<Vec<_>, S3Error>>()?;

    to_xml(&ListBucketResult {
        xmlns: S3_XMLNS,
        name: listing.bucket.to_string(),
        prefix: listing.prefix.to_string(),
        key_count: contents.len(),
        max_keys: listing.max_keys,
        is_truncated: listing.is_truncated,
        continuation_token: listing.continuation_token.map(str::to_string),
        next_continuation_token: listing.next_continuation_token,
        start_after: listing.start_after.map(str::to_string),
        contents,
    })
}

// -----------------------------------------------------------------------
// InitiateMultipartUploadResult
// -----------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
struct InitiateMultipartUploadResult {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "Bucket")]
    bucket: String,
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "UploadId")]
    upload_id: String,
}

pub(crate) fn initiate_multipart_upload(bucket: &str, key: &str, upload_id: &str) -> Result<String, S3Error> {
    to_xml(&InitiateMultipartUploadResult {
        xmlns: S3_XMLNS,
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id: upload_id.to_string(),
    })
}

// -----------------------------------------------------------------------
// CompleteMultipartUploadResult
// -----------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
struct CompleteMultipartUploadResult {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Bucket")]
    bucket: String,
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "ETag")]
    etag: String,
}

pub(crate) fn complete_multipart_upload(
    location: &str,
    bucket: &str,
    key: &str,
    etag: &str,
) -> Result<String, S3Error> {
    to_xml(&CompleteMultipartUploadResult {
        xmlns: S3_XMLNS,
        location: location.to_string(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        etag: format!("\"{etag}\""),
    })
}

// -----------------------------------------------------------------------
// DeleteResult (POST /{bucket}?delete)
// -----------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "DeleteResult")]
struct DeleteResult {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "Deleted", default)]
    deleted: Vec<DeletedEntry>,
    #[serde(rename = "Error", default)]
    errors: Vec<DeleteErrorEntry>,
}

#[derive(Serialize)]
struct DeletedEntry {
    #[serde(rename = "Key")]
    key: String,
}

#[derive(Serialize)]
struct DeleteErrorEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

/// Per-key failure of a batch delete: `(key, code, message)`.
pub(crate) type DeleteFailure = (String, &'static str, String);

pub(crate) fn delete_result(deleted: Vec<String>, failed: Vec<DeleteFailure>) -> Result<String, S3Error> {
    to_xml(&DeleteResult {
        xmlns: S3_XMLNS,
        deleted: deleted.into_iter().map(|key| DeletedEntry { key }).collect(),
        errors: failed
            .into_iter()
            .map(|(key, code, message)| DeleteErrorEntry {
                key,
                code: code.to_string(),
                message,
            })
            .collect(),
    })
}

// -----------------------------------------------------------------------
// Incoming request bodies
// -----------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUploadRequest {
    #[serde(rename = "Part", default)]
    parts: Vec<PartInfo>,
}

#[derive(Deserialize)]
struct PartInfo {
    #[serde(rename = "PartNumber")]
    part_number: u32,
    #[serde(rename = "ETag", default)]
    etag: Option<String>,
}

/// Parse `(part number, entity tag)` pairs from a `CompleteMultipartUpload` body, in document order.
pub(crate) fn parse_complete_multipart_request(body: &str) -> Result<Vec<(u32, Option<String>)>, S3Error> {
    let request: CompleteMultipartUploadRequest =
        quick_xml::de::from_str(body).map_err(|e| S3Error::MalformedXml {
            message: e.to_string(),
        })?;
    Ok(request
        .parts
        .into_iter()
        .map(|p| (p.part_number, p.etag))
        .collect())
}

#[derive(Deserialize)]
#[serde(rename = "Delete")]
struct DeleteRequest {
    #[serde(rename = "Quiet", default)]
    quiet: bool,
    #[serde(rename = "Object", default)]
    objects: Vec<ObjectIdentifier>,
}

#[derive(Deserialize)]
struct ObjectIdentifier {
    #[serde(rename = "Key")]
    key: String,
}

/// Parse a batch delete body into `(quiet, keys)`.
pub(crate) fn parse_delete_request(body: &str) -> Result<(bool, Vec<String>), S3Error> {
    let request: DeleteRequest = quick_xml::de::from_str(body).map_err(|e| S3Error::MalformedXml {
        message: e.to_string(),
    })?;
    Ok((
        request.quiet,
        request.objects.into_iter().map(|o| o.key).collect(),
    ))
}
