use anyhow::Result;
use opendal::{services::S3, Operator};

use crate::fs::backend::OpendalStore;

/// S3-compatible storage providers
#[derive(Debug, Clone, PartialEq)]
pub enum S3Provider {
    Aws,
    DigitalOcean,
    Hetzner,
    MinIO,
    CloudflareR2,
    Wasabi,
    Custom { name: String, endpoint: String },
}

impl S3Provider {
    /// Get the endpoint URL for this provider
    pub fn endpoint(&self, region: &str) -> Option<String> {
        match self {
            S3Provider::Aws => None, // Use default AWS endpoint
            S3Provider::DigitalOcean => Some(format!("https://{}.digitaloceanspaces.com", region)),
            S3Provider::Hetzner => Some(format!("https://{}.your-objectstorage.com", region)),
            S3Provider::MinIO => Some("http://localhost:9000".to_string()),
            S3Provider::CloudflareR2 => Some(format!("https://{}.r2.cloudflarestorage.com", region)),
            S3Provider::Wasabi => Some(format!("https://s3.{}.wasabisys.com", region)),
            S3Provider::Custom { endpoint, .. } => Some(endpoint.clone()),
        }
    }

    /// Get display name for the provider
    pub fn display_name(&self) -> &str {
        match self {
            S3Provider::Aws => "AWS S3",
            S3Provider::DigitalOcean => "DigitalOcean Spaces",
            S3Provider::Hetzner => "Hetzner Object Storage",
            S3Provider::MinIO => "MinIO",
            S3Provider::CloudflareR2 => "Cloudflare R2",
            S3Provider::Wasabi => "Wasabi",
            S3Provider::Custom { name, .. } => name,
        }
    }
}

impl OpendalStore {
    /// Create an S3-compatible store with explicit credentials.
    pub fn s3(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        provider: S3Provider,
    ) -> Result<Self> {
        let mut builder = S3::default()
            .bucket(bucket)
            .region(region)
            .access_key_id(access_key)
            .secret_access_key(secret_key);

        // Set custom endpoint for S3-compatible providers
        if let Some(endpoint) = provider.endpoint(region) {
            builder = builder.endpoint(&endpoint);
        }

        let operator = Operator::new(builder)?.finish();

        Ok(Self::new(operator, format!("s3://{}", bucket)))
    }

    /// Create an S3 store using the standard AWS credential chain:
    ///
    /// 1. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
    /// 2. Shared credentials file (~/.aws/credentials)
    /// 3. EC2 Instance Profile / ECS Task Role / EKS Pod Identity
    pub fn s3_with_iam(bucket: &str, region: &str) -> Result<Self> {
        let builder = S3::default().bucket(bucket).region(region);
        // Don't set access_key_id/secret_access_key - let OpenDAL auto-detect

        let operator = Operator::new(builder)?.finish();

        Ok(Self::new(operator, format!("s3://{}", bucket)))
    }

    /// Create a store against a custom S3-compatible endpoint, using the
    /// ambient credential chain for keys.
    pub fn s3_with_endpoint(bucket: &str, region: &str, endpoint: &str) -> Result<Self> {
        let builder = S3::default()
            .bucket(bucket)
            .region(region)
            .endpoint(endpoint);

        let operator = Operator::new(builder)?.finish();

        Ok(Self::new(operator, format!("s3://{}", bucket)))
    }

    /// Create a store for MinIO (local development).
    pub fn minio(bucket: &str, access_key: &str, secret_key: &str) -> Result<Self> {
        Self::s3(bucket, "us-east-1", access_key, secret_key, S3Provider::MinIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_endpoints() {
        assert_eq!(S3Provider::Aws.endpoint("eu-west-1"), None);
        assert_eq!(
            S3Provider::Wasabi.endpoint("us-east-1").as_deref(),
            Some("https://s3.us-east-1.wasabisys.com")
        );
        assert_eq!(
            S3Provider::Custom {
                name: "garage".to_string(),
                endpoint: "http://garage:3900".to_string(),
            }
            .endpoint("ignored")
            .as_deref(),
            Some("http://garage:3900")
        );
    }

    #[test]
    fn test_provider_display_names() {
        assert_eq!(S3Provider::MinIO.display_name(), "MinIO");
        assert_eq!(S3Provider::CloudflareR2.display_name(), "Cloudflare R2");
    }
}
