use anyhow::{Context, Result};
use opendal::{services::Gcs, Operator};

use crate::fs::backend::OpendalStore;

impl OpendalStore {
    /// Create a Google Cloud Storage store.
    ///
    /// Uses Application Default Credentials if no service account is
    /// provided. Set GOOGLE_APPLICATION_CREDENTIALS or pass the JSON content.
    pub fn gcs(bucket: &str, credential: Option<&str>) -> Result<Self> {
        let mut builder = Gcs::default().bucket(bucket);

        if let Some(cred) = credential {
            builder = builder.credential(cred);
        }

        let operator = Operator::new(builder)?.finish();

        Ok(Self::new(operator, format!("gs://{}", bucket)))
    }

    /// Create a GCS store using a service account JSON file.
    pub fn gcs_from_service_account(bucket: &str, service_account_path: &str) -> Result<Self> {
        let credential = std::fs::read_to_string(service_account_path)
            .context("Failed to read service account file")?;

        Self::gcs(bucket, Some(&credential))
    }
}
