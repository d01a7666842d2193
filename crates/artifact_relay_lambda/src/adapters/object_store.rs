use crate::runtime::contract::UploadError;

/// Unconditional object writes into the consumer bucket.
pub trait ArtifactStore {
    fn put_object(&self, key: &str, body: &[u8]) -> Result<(), UploadError>;
}

pub trait BucketContents {
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, String>;

    /// Returns the number of deleted objects.
    fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<usize, String>;
}
