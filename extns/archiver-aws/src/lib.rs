//! AWS backends for the archiver: archives are written to S3 and invocation metrics are sent
//! to CloudWatch.
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

pub mod client;
pub mod cloudwatch;
pub mod s3;

pub use crate::client::{AwsConfig, load_sdk_config};
pub use crate::cloudwatch::CloudWatchMetricsSink;
pub use crate::s3::S3ObjectStore;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Failed with S3 error - {0}")]
    S3(String),

    #[error("Failed with CloudWatch error - {0}")]
    CloudWatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<Error> for archiver_core::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::S3(_) => archiver_core::Error::Store(value.to_string()),
            Error::CloudWatch(_) => archiver_core::Error::Metrics(value.to_string()),
            Error::InvalidConfig(_) => archiver_core::Error::Config(value.to_string()),
        }
    }
}

/// "code: message" of an SDK error, falling back to its display form when the service sent
/// no error metadata.
pub(crate) fn extract_aws_error<E>(err: &E) -> String
where
    E: ProvideErrorMetadata + std::fmt::Display,
{
    match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use aws_smithy_types::error::ErrorMetadata;

    use super::*;

    #[test]
    fn test_extract_aws_error() {
        let err = aws_sdk_s3::operation::put_object::PutObjectError::generic(
            ErrorMetadata::builder()
                .code("SlowDown")
                .message("Please reduce your request rate.")
                .build(),
        );
        assert_eq!(
            extract_aws_error(&err),
            "SlowDown: Please reduce your request rate."
        );

        let err = aws_sdk_s3::operation::put_object::PutObjectError::generic(
            ErrorMetadata::builder().code("AccessDenied").build(),
        );
        assert_eq!(extract_aws_error(&err), "AccessDenied");
    }

    #[test]
    fn test_core_error_conversion() {
        let err: archiver_core::Error = Error::S3("SlowDown".to_string()).into();
        assert!(matches!(err, archiver_core::Error::Store(_)));
        assert_eq!(
            err.to_string(),
            "Store Error - Failed with S3 error - SlowDown"
        );

        let err: archiver_core::Error = Error::CloudWatch("Throttling".to_string()).into();
        assert!(matches!(err, archiver_core::Error::Metrics(_)));

        let err: archiver_core::Error = Error::InvalidConfig("region".to_string()).into();
        assert!(matches!(err, archiver_core::Error::Config(_)));
    }
}
