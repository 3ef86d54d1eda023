//! Byte-range delivery of media blobs

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use common::storage::{BlobRange, BlobStore};
use futures::TryStreamExt;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// How a `Range` header applies to an object of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range, serve the whole object
    Full,
    Partial(BlobRange),
    Unsatisfiable,
}

/// Interpret a `Range` header against an object of `total` bytes
///
/// Only a single `bytes=` range is honored; anything else is ignored. An
/// explicit end offset is exclusive and is clamped to `total`.
pub fn parse_range(header: &str, total: u64) -> RangeRequest {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    let (start, end) = if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeRequest::Full;
        };
        (total.saturating_sub(suffix), total)
    } else {
        let Ok(start) = start.parse::<u64>() else {
            return RangeRequest::Full;
        };
        let end = if end.is_empty() {
            total
        } else {
            match end.parse::<u64>() {
                Ok(end) => end.min(total),
                Err(_) => return RangeRequest::Full,
            }
        };
        (start, end)
    };

    if start >= total || end <= start {
        return RangeRequest::Unsatisfiable;
    }

    RangeRequest::Partial(BlobRange::new(start, end))
}

/// MIME type for a stored object, guessed from its name
pub fn content_type_for(filename: &str, fallback: &'static str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(fallback)
        .to_string()
}

fn header_value(value: impl ToString) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&value.to_string())
        .map_err(|e| ApiError::internal("Invalid response header", e))
}

async fn open_body(
    store: &dyn BlobStore,
    filename: &str,
    range: Option<BlobRange>,
) -> ApiResult<(Option<u64>, Body)> {
    let blob = store.open(filename, range).await?;

    let bucket = store.bucket().to_string();
    let name = filename.to_string();
    let stream = blob.stream.inspect_err(move |e| {
        warn!("Stream of {}/{} aborted: {}", bucket, name, e);
    });

    Ok((blob.content_length, Body::from_stream(stream)))
}

/// Serve a blob of declared size `total`, honoring an optional `Range` header
pub async fn serve_range(
    store: &dyn BlobStore,
    filename: &str,
    total: u64,
    range_header: Option<&HeaderValue>,
    content_type: &str,
) -> ApiResult<Response> {
    let request = range_header
        .and_then(|value| value.to_str().ok())
        .map(|value| parse_range(value, total))
        .unwrap_or(RangeRequest::Full);

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, header_value(content_type)?);

    let body = match request {
        RangeRequest::Unsatisfiable => {
            debug!("Unsatisfiable range for {} of {} bytes", filename, total);
            return Err(ApiError::RangeNotSatisfiable { total });
        }
        RangeRequest::Full => {
            let (_, body) = open_body(store, filename, None).await?;
            builder = builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, header_value(total)?);
            body
        }
        RangeRequest::Partial(range) => {
            let (_, body) = open_body(store, filename, Some(range)).await?;
            builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    header_value(format!("bytes {}-{}/{}", range.start, range.end - 1, total))?,
                )
                .header(header::CONTENT_LENGTH, header_value(range.len())?);
            body
        }
    };

    builder
        .body(body)
        .map_err(|e| ApiError::internal("Failed to build media response", e))
}

/// Serve a whole blob, sized by the bucket
pub async fn serve_whole(
    store: &dyn BlobStore,
    filename: &str,
    content_type: &str,
) -> ApiResult<Response> {
    let (content_length, body) = open_body(store, filename, None).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, header_value(content_type)?);
    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, header_value(length)?);
    }

    builder
        .body(body)
        .map_err(|e| ApiError::internal("Failed to build media response", e))
}
