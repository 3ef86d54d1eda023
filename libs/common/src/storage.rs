//! Media bucket abstraction
//!
//! Videos, thumbnails and meditation images live in two named buckets. A
//! bucket maps a filename to an immutable byte sequence and can open a
//! read stream over the whole object or a bounded byte interval of it.
//! Buckets are backed either by an S3-compatible object store or by a
//! directory on the local filesystem.

use std::{
    fmt,
    io::{self, SeekFrom},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Half-open byte interval `[start, end)` within an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRange {
    pub start: u64,
    pub end: u64,
}

// Ranges are never empty, see `new`
#[allow(clippy::len_without_is_empty)]
impl BlobRange {
    /// Create a range; callers guarantee `start < end`
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end, "empty blob range {}..{}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// HTTP `Range` request value; HTTP byte positions are inclusive
    pub fn to_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

/// Byte stream produced by a bucket read
pub type BlobStream = BoxStream<'static, io::Result<Bytes>>;

/// An opened object
pub struct Blob {
    /// Number of bytes the stream yields, when the backend reports it
    pub content_length: Option<u64>,
    pub stream: BlobStream,
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A named bucket of media objects
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket name
    fn bucket(&self) -> &str;

    /// Open `name` for reading, optionally bounded to `range`
    ///
    /// Returns [`StorageError::NotFound`] when no such object exists.
    async fn open(&self, name: &str, range: Option<BlobRange>) -> StorageResult<Blob>;
}

/// Object names are flat filenames; anything that could escape the
/// bucket is refused.
fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name == "."
        || name == ".."
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Bucket stored as a directory of files
#[derive(Debug, Clone)]
pub struct LocalBucket {
    name: String,
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Create the bucket directory if needed and return the bucket
    pub async fn create(name: impl Into<String>, root: impl Into<PathBuf>) -> StorageResult<Self> {
        let bucket = Self::new(name, root);
        tokio::fs::create_dir_all(&bucket.root).await?;
        info!(
            "Local bucket {} ready at {}",
            bucket.name,
            bucket.root.display()
        );
        Ok(bucket)
    }
}

#[async_trait]
impl BlobStore for LocalBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn open(&self, name: &str, range: Option<BlobRange>) -> StorageResult<Blob> {
        validate_name(name)?;
        let path = self.root.join(name);

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        let size = metadata.len();

        let Some(range) = range else {
            return Ok(Blob {
                content_length: Some(size),
                stream: ReaderStream::new(file).boxed(),
            });
        };

        let start = range.start.min(size);
        let end = range.end.min(size);
        debug!("Reading {}[{}..{}) from bucket {}", name, start, end, self.name);

        file.seek(SeekFrom::Start(start)).await?;
        Ok(Blob {
            content_length: Some(end - start),
            stream: ReaderStream::new(file.take(end - start)).boxed(),
        })
    }
}

/// Bucket stored in an S3-compatible object store
#[derive(Debug, Clone)]
pub struct S3Bucket {
    client: Client,
    bucket: String,
}

impl S3Bucket {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3Bucket {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn open(&self, name: &str, range: Option<BlobRange>) -> StorageResult<Blob> {
        validate_name(name)?;

        let mut request = self.client.get_object().bucket(&self.bucket).key(name);
        if let Some(range) = range {
            request = request.range(range.to_header_value());
        }

        let output = request.send().await.map_err(|e| {
            let service_error = e.into_service_error();
            if service_error.is_no_such_key() {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Backend(service_error.to_string())
            }
        })?;

        let content_length = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok());

        Ok(Blob {
            content_length,
            stream: ReaderStream::new(output.body.into_async_read()).boxed(),
        })
    }
}

/// Which backend holds the media buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Filesystem,
    S3,
}

impl FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filesystem" | "local" => Ok(StorageBackend::Filesystem),
            "s3" => Ok(StorageBackend::S3),
            other => Err(StorageError::Configuration(format!(
                "unknown storage backend: {}",
                other
            ))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Parent directory of the bucket directories (filesystem backend)
    pub root: PathBuf,
    pub video_bucket: String,
    pub image_bucket: String,
    /// Custom endpoint (MinIO, LocalStack, ...)
    pub s3_endpoint_url: Option<String>,
    pub s3_force_path_style: bool,
}

impl StorageConfig {
    /// Create a new StorageConfig from environment variables
    ///
    /// # Environment Variables
    /// - `STORAGE_BACKEND`: `filesystem` or `s3` (default: filesystem)
    /// - `STORAGE_ROOT`: directory holding the buckets (default: ./media)
    /// - `VIDEO_BUCKET`: video and thumbnail bucket (default: videobucket)
    /// - `IMAGE_BUCKET`: meditation image bucket (default: imagebucket)
    /// - `S3_ENDPOINT_URL`: optional S3 endpoint override
    /// - `S3_FORCE_PATH_STYLE`: use path-style addressing (default: false)
    pub fn from_env() -> StorageResult<Self> {
        let backend = std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "filesystem".to_string())
            .parse()?;

        let root = std::env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./media"));

        let video_bucket =
            std::env::var("VIDEO_BUCKET").unwrap_or_else(|_| "videobucket".to_string());
        let image_bucket =
            std::env::var("IMAGE_BUCKET").unwrap_or_else(|_| "imagebucket".to_string());

        if video_bucket == image_bucket {
            return Err(StorageError::Configuration(
                "VIDEO_BUCKET and IMAGE_BUCKET must differ".to_string(),
            ));
        }

        let s3_endpoint_url = std::env::var("S3_ENDPOINT_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let s3_force_path_style = std::env::var("S3_FORCE_PATH_STYLE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        Ok(Self {
            backend,
            root,
            video_bucket,
            image_bucket,
            s3_endpoint_url,
            s3_force_path_style,
        })
    }
}

/// The two buckets the application reads from
#[derive(Clone)]
pub struct MediaBuckets {
    /// Videos and their thumbnails
    pub video: Arc<dyn BlobStore>,
    /// Meditation images
    pub image: Arc<dyn BlobStore>,
}

/// Open both media buckets for the configured backend
pub async fn open_buckets(config: &StorageConfig) -> StorageResult<MediaBuckets> {
    match config.backend {
        StorageBackend::Filesystem => {
            let video = LocalBucket::create(
                config.video_bucket.clone(),
                config.root.join(&config.video_bucket),
            )
            .await?;
            let image = LocalBucket::create(
                config.image_bucket.clone(),
                config.root.join(&config.image_bucket),
            )
            .await?;

            Ok(MediaBuckets {
                video: Arc::new(video),
                image: Arc::new(image),
            })
        }
        StorageBackend::S3 => {
            let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(config.s3_force_path_style);
            if let Some(endpoint) = &config.s3_endpoint_url {
                builder = builder.endpoint_url(endpoint);
            }
            let client = Client::from_conf(builder.build());

            info!(
                "S3 buckets configured: video={}, image={}",
                config.video_bucket, config.image_bucket
            );

            Ok(MediaBuckets {
                video: Arc::new(S3Bucket::new(client.clone(), config.video_bucket.clone())),
                image: Arc::new(S3Bucket::new(client, config.image_bucket.clone())),
            })
        }
    }
}
