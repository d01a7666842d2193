//! Bucket reference rewriting for relayed templates.
//!
//! Rules are a flat table applied in order. `{bucket}` in a pattern stands for
//! the distributor bucket, in a replacement for the consumer bucket. `{region}`
//! is a wildcard that is matched lazily and discarded.

use regex::bytes::{NoExpand, Regex};
use thiserror::Error;

use crate::config::BucketIdentity;

pub const BUCKET_PLACEHOLDER: &str = "{bucket}";
pub const REGION_PLACEHOLDER: &str = "{region}";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("bucket names used for rewriting must be non-empty")]
    EmptyBucketName,
    #[error("rewrite rule `{pattern}` is not a valid pattern: {source}")]
    InvalidPattern {
        pattern: &'static str,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Literal,
    RegionalEndpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRule {
    pub kind: PatternKind,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

impl RewriteRule {
    const fn literal(prefix_pattern: &'static str, replacement: &'static str) -> Self {
        Self {
            kind: PatternKind::Literal,
            pattern: prefix_pattern,
            replacement,
        }
    }
}

pub const REFERENCE_RULES: &[RewriteRule] = &[
    RewriteRule::literal("Bucket: {bucket}", "Bucket: {bucket}"),
    RewriteRule::literal("S3Bucket: {bucket}", "S3Bucket: {bucket}"),
    RewriteRule::literal("s3://{bucket}", "s3://{bucket}"),
    RewriteRule::literal("https://{bucket}", "https://{bucket}"),
    RewriteRule::literal("Default: {bucket}", "Default: {bucket}"),
    RewriteRule {
        kind: PatternKind::RegionalEndpoint,
        pattern: "https://s3.{region}.amazonaws.com/{bucket}",
        replacement: "https://{bucket}.s3.amazonaws.com",
    },
];

#[derive(Debug, Clone)]
struct CompiledRule {
    matcher: Regex,
    replacement: Vec<u8>,
}

impl CompiledRule {
    fn compile(
        rule: &RewriteRule,
        distributor: &str,
        consumer: &str,
    ) -> Result<Self, RewriteError> {
        let source = match rule.kind {
            PatternKind::Literal => {
                regex::escape(&rule.pattern.replace(BUCKET_PLACEHOLDER, distributor))
            }
            PatternKind::RegionalEndpoint => rule
                .pattern
                .split(REGION_PLACEHOLDER)
                .map(|segment| regex::escape(&segment.replace(BUCKET_PLACEHOLDER, distributor)))
                .collect::<Vec<_>>()
                .join("(?-u:.*?)"),
        };

        let matcher = Regex::new(&source).map_err(|source| RewriteError::InvalidPattern {
            pattern: rule.pattern,
            source,
        })?;

        Ok(Self {
            matcher,
            replacement: rule
                .replacement
                .replace(BUCKET_PLACEHOLDER, consumer)
                .into_bytes(),
        })
    }
}

/// Compiled rule table for one distributor/consumer bucket pair.
#[derive(Debug, Clone)]
pub struct ReferenceRewriter {
    rules: Vec<CompiledRule>,
    identity: bool,
}

impl ReferenceRewriter {
    pub fn new(identity: &BucketIdentity) -> Result<Self, RewriteError> {
        Self::for_buckets(
            identity.distributor_bucket_name(),
            identity.consumer_bucket_name(),
        )
    }

    pub fn for_buckets(distributor: &str, consumer: &str) -> Result<Self, RewriteError> {
        Self::with_rules(distributor, consumer, REFERENCE_RULES)
    }

    pub fn with_rules(
        distributor: &str,
        consumer: &str,
        rules: &[RewriteRule],
    ) -> Result<Self, RewriteError> {
        if distributor.is_empty() || consumer.is_empty() {
            return Err(RewriteError::EmptyBucketName);
        }

        let rules = rules
            .iter()
            .map(|rule| CompiledRule::compile(rule, distributor, consumer))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            identity: distributor == consumer,
        })
    }

    /// Apply every rule in order. Bytes outside a match are left untouched.
    ///
    /// A rewriter whose distributor and consumer buckets are the same returns
    /// the payload unchanged, including regional endpoint URLs.
    pub fn rewrite(&self, payload: &[u8]) -> Vec<u8> {
        if self.identity {
            return payload.to_vec();
        }

        let mut output = payload.to_vec();
        for rule in &self.rules {
            output = rule
                .matcher
                .replace_all(&output, NoExpand(&rule.replacement))
                .into_owned();
        }
        output
    }
}

pub fn rewrite_references(
    payload: &[u8],
    distributor: &str,
    consumer: &str,
) -> Result<Vec<u8>, RewriteError> {
    Ok(ReferenceRewriter::for_buckets(distributor, consumer)?.rewrite(payload))
}
