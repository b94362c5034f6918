use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::{Error, Result};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Overrides applied on top of the default AWS provider chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwsConfig {
    pub region: Option<String>,
    /// Custom endpoint, e.g. a local S3-compatible store.
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn validate(&self) -> Result<()> {
        if let Some(region) = &self.region
            && region.trim().is_empty()
        {
            return Err(Error::InvalidConfig("region must not be empty".to_string()));
        }
        if let Some(endpoint_url) = &self.endpoint_url
            && endpoint_url.trim().is_empty()
        {
            return Err(Error::InvalidConfig(
                "endpoint url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads the shared SDK configuration. Credentials come from the default provider chain.
pub async fn load_sdk_config(config: &AwsConfig) -> Result<SdkConfig> {
    config.validate()?;

    tracing::info!(
        region = config.region.as_deref().unwrap_or("<default>"),
        endpoint_url = config.endpoint_url.as_deref().unwrap_or("<default>"),
        "Loading AWS configuration"
    );

    let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let mut config_builder =
        aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
    if let Some(endpoint_url) = &config.endpoint_url {
        config_builder = config_builder.endpoint_url(endpoint_url);
    }

    Ok(config_builder.load().await)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test(tokio::test)]
    async fn test_load_with_overrides() {
        let config = AwsConfig {
            region: Some("eu-west-1".to_string()),
            endpoint_url: Some("http://localhost:4566".to_string()),
        };

        let sdk_config = load_sdk_config(&config).await.unwrap();
        assert_eq!(sdk_config.region(), Some(&Region::new("eu-west-1")));
        assert_eq!(sdk_config.endpoint_url(), Some("http://localhost:4566"));
    }

    #[test(tokio::test)]
    async fn test_validation_failures() {
        let config = AwsConfig {
            region: Some(" ".to_string()),
            endpoint_url: None,
        };
        assert!(matches!(
            load_sdk_config(&config).await,
            Err(Error::InvalidConfig(_))
        ));

        let config = AwsConfig {
            region: None,
            endpoint_url: Some(String::new()),
        };
        assert!(matches!(
            load_sdk_config(&config).await,
            Err(Error::InvalidConfig(_))
        ));
    }
}
