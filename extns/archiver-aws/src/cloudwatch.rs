//! [MetricsSink] backed by CloudWatch `PutMetricData`.
//!
//! Every datum is published under the configured namespace with a single `Environment`
//! dimension. A failed submission is logged and dropped.

use std::time::SystemTime;

use archiver_core::metrics::{ENVIRONMENT_DIMENSION, MetricDatum, MetricUnit, MetricsSink};
use aws_config::SdkConfig;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{self, Dimension, StandardUnit};
use tracing::{debug, warn};

use crate::{Error, extract_aws_error};

/// Upper bound of data points in one `PutMetricData` call.
const MAX_DATA_PER_REQUEST: usize = 1000;

#[derive(Clone, Debug)]
pub struct CloudWatchMetricsSink {
    client: Client,
    namespace: String,
    environment: String,
}

impl CloudWatchMetricsSink {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            environment: environment.into(),
        }
    }

    pub fn from_sdk_config(
        sdk_config: &SdkConfig,
        namespace: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self::new(Client::new(sdk_config), namespace, environment)
    }

    fn to_cloudwatch(&self, datum: &MetricDatum, timestamp: DateTime) -> types::MetricDatum {
        types::MetricDatum::builder()
            .metric_name(datum.name.as_str())
            .value(datum.value)
            .unit(standard_unit(datum.name.unit()))
            .timestamp(timestamp)
            .dimensions(
                Dimension::builder()
                    .name(ENVIRONMENT_DIMENSION)
                    .value(&self.environment)
                    .build(),
            )
            .build()
    }
}

fn standard_unit(unit: MetricUnit) -> StandardUnit {
    match unit {
        MetricUnit::Count => StandardUnit::Count,
        MetricUnit::Bytes => StandardUnit::Bytes,
        MetricUnit::Milliseconds => StandardUnit::Milliseconds,
    }
}

impl MetricsSink for CloudWatchMetricsSink {
    async fn emit(&self, data: Vec<MetricDatum>) {
        let timestamp = DateTime::from(SystemTime::now());

        for chunk in data.chunks(MAX_DATA_PER_REQUEST) {
            let metric_data = chunk
                .iter()
                .map(|datum| self.to_cloudwatch(datum, timestamp))
                .collect::<Vec<_>>();

            match self
                .client
                .put_metric_data()
                .namespace(&self.namespace)
                .set_metric_data(Some(metric_data))
                .send()
                .await
            {
                Ok(_) => debug!(
                    namespace = %self.namespace,
                    count = chunk.len(),
                    "Metrics submitted to CloudWatch"
                ),
                Err(e) => warn!(
                    namespace = %self.namespace,
                    count = chunk.len(),
                    error = %Error::CloudWatch(extract_aws_error(&e)),
                    "Failed to submit metrics, dropping them"
                ),
            }
        }
    }
}
