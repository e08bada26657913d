mod identity;
mod reports;
mod storage;

pub use identity::CognitoIdentity;
pub use reports::DynamoReports;
pub use storage::S3BlobStore;
