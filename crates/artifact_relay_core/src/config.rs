use thiserror::Error;

pub const ARTIFACTS_BUCKET_ENV: &str = "ARTIFACTS_BUCKET";
pub const DISTRIBUTOR_BUCKET_ENV: &str = "DISTRIBUTOR_BUCKET";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be configured")]
    Missing { key: &'static str },
}

/// Source and destination bucket names used when rewriting template references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketIdentity {
    distributor_bucket_name: String,
    consumer_bucket_name: String,
}

impl BucketIdentity {
    pub fn new(
        distributor_bucket_name: impl Into<String>,
        consumer_bucket_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let distributor_bucket_name = distributor_bucket_name.into();
        let consumer_bucket_name = consumer_bucket_name.into();
        if distributor_bucket_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: DISTRIBUTOR_BUCKET_ENV,
            });
        }
        if consumer_bucket_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: ARTIFACTS_BUCKET_ENV,
            });
        }

        Ok(Self {
            distributor_bucket_name,
            consumer_bucket_name,
        })
    }

    pub fn distributor_bucket_name(&self) -> &str {
        &self.distributor_bucket_name
    }

    pub fn consumer_bucket_name(&self) -> &str {
        &self.consumer_bucket_name
    }

    /// Rewriting is a no-op when both names are the same.
    pub fn is_identity(&self) -> bool {
        self.distributor_bucket_name == self.consumer_bucket_name
    }
}

/// Process-wide relay settings, read once at cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    artifacts_bucket: String,
    distributor_bucket: Option<String>,
}

impl RelayConfig {
    pub fn new(
        artifacts_bucket: impl Into<String>,
        distributor_bucket: Option<String>,
    ) -> Result<Self, ConfigError> {
        let artifacts_bucket = artifacts_bucket.into();
        if artifacts_bucket.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: ARTIFACTS_BUCKET_ENV,
            });
        }

        Ok(Self {
            artifacts_bucket,
            distributor_bucket: distributor_bucket.filter(|name| !name.trim().is_empty()),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let artifacts_bucket = lookup(ARTIFACTS_BUCKET_ENV).ok_or(ConfigError::Missing {
            key: ARTIFACTS_BUCKET_ENV,
        })?;
        Self::new(artifacts_bucket, lookup(DISTRIBUTOR_BUCKET_ENV))
    }

    pub fn artifacts_bucket(&self) -> &str {
        &self.artifacts_bucket
    }

    pub fn distributor_bucket(&self) -> Option<&str> {
        self.distributor_bucket.as_deref()
    }

    /// `None` until a distributor bucket is configured.
    pub fn bucket_identity(&self) -> Option<BucketIdentity> {
        self.distributor_bucket.as_ref().map(|distributor| BucketIdentity {
            distributor_bucket_name: distributor.clone(),
            consumer_bucket_name: self.artifacts_bucket.clone(),
        })
    }
}
