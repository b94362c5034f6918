use std::error::Error;

use archiver_aws::{AwsConfig, CloudWatchMetricsSink, S3ObjectStore, load_sdk_config};
use archiver_core::config::Settings;
use archiver_core::event::InvocationEvent;
use archiver_core::metrics::{MetricsSink, PrometheusMetricsSink};
use archiver_core::processor::Processor;
use archiver_core::store::{MemoryObjectStore, ObjectStore};
use archiver_core::tracker::InvocationResult;
use clap::ArgMatches;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

mod cmdline;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e}");
        return Err(e);
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let matches = cmdline::root_cli().get_matches();
    match matches.subcommand() {
        Some((cmdline::PROCESS, args)) => process(args).await,
        Some((name, _)) => Err(format!("Unknown subcommand {name}").into()),
        None => Err("A subcommand is required".into()),
    }
}

async fn process(args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;
    let event = read_event(
        args.get_one::<String>(cmdline::ARG_EVENT)
            .map(String::as_str)
            .unwrap_or("-"),
    )
    .await?;

    let result = if args.get_flag(cmdline::ARG_DRY_RUN) {
        let store = MemoryObjectStore::new();
        let metrics =
            PrometheusMetricsSink::new(&settings.metrics_namespace, &settings.environment);
        let result = invoke(&settings, store.clone(), metrics.clone(), event).await?;

        for object in store.objects() {
            info!(
                bucket = %object.bucket,
                key = %object.key,
                size = object.body.len(),
                "Dry run archive"
            );
        }
        eprint!("{}", metrics.encode()?);
        result
    } else {
        let aws_config = AwsConfig {
            region: args.get_one::<String>(cmdline::ARG_REGION).cloned(),
            endpoint_url: args.get_one::<String>(cmdline::ARG_ENDPOINT_URL).cloned(),
        };
        let sdk_config = load_sdk_config(&aws_config).await?;
        let store = S3ObjectStore::from_sdk_config(&sdk_config);
        let metrics = CloudWatchMetricsSink::from_sdk_config(
            &sdk_config,
            settings.metrics_namespace.clone(),
            settings.environment.clone(),
        );
        invoke(&settings, store, metrics, event).await?
    };

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

async fn invoke<S, M>(
    settings: &Settings,
    store: S,
    metrics: M,
    event: InvocationEvent,
) -> archiver_core::Result<InvocationResult>
where
    S: ObjectStore,
    M: MetricsSink + Clone,
{
    Processor::new(settings, store, metrics)
        .process_event(event)
        .await
}

async fn read_event(path: &str) -> Result<InvocationEvent, Box<dyn Error>> {
    let data = if path == "-" {
        let mut data = Vec::new();
        tokio::io::stdin().read_to_end(&mut data).await?;
        data
    } else {
        tokio::fs::read(path)
            .await
            .map_err(|e| format!("Failed to read event file {path}: {e}"))?
    };
    Ok(InvocationEvent::from_slice(&data)?)
}
