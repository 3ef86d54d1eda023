//! Shared fixtures for unit tests

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::{StorageError, StorageResult},
    storage::{Blob, BlobRange, BlobStore},
};
use futures::stream;
use std::collections::HashMap;

/// In-memory bucket
#[derive(Debug, Default)]
pub struct MemoryBucket {
    name: String,
    objects: HashMap<String, Bytes>,
}

impl MemoryBucket {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: HashMap::new(),
        }
    }

    pub fn with_object(mut self, name: &str, contents: Vec<u8>) -> Self {
        self.objects.insert(name.to_string(), Bytes::from(contents));
        self
    }
}

#[async_trait]
impl BlobStore for MemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn open(&self, name: &str, range: Option<BlobRange>) -> StorageResult<Blob> {
        let object = self
            .objects
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let len = object.len() as u64;
        let (start, end) = match range {
            Some(range) => (range.start.min(len), range.end.min(len)),
            None => (0, len),
        };
        let slice = object.slice(start as usize..end as usize);

        // Two chunks, so readers see a multi-part stream
        let middle = slice.len() / 2;
        let chunks = vec![Ok(slice.slice(..middle)), Ok(slice.slice(middle..))];

        Ok(Blob {
            content_length: Some(end - start),
            stream: Box::pin(stream::iter(chunks)),
        })
    }
}
