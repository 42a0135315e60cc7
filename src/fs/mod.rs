pub mod backend;
pub mod gcs;
pub mod s3;
pub mod types;

pub use backend::{ObjectStore, OpendalStore};
pub use s3::S3Provider;
pub use types::RemoteObject;
