use clap::{Arg, ArgAction, Command};

pub(super) const PROCESS: &str = "process";
pub(super) const ARG_EVENT: &str = "event";
pub(super) const ARG_DRY_RUN: &str = "dry-run";
pub(super) const ARG_REGION: &str = "region";
pub(super) const ARG_ENDPOINT_URL: &str = "endpoint-url";

pub(super) fn root_cli() -> Command {
    Command::new("archiver")
        .about("Archives batches of stream records to S3 and reports the records that failed")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_process_subcommand())
}

fn add_process_subcommand() -> Command {
    Command::new(PROCESS)
        .about("Processes one invocation event and prints the failed item ids as JSON")
        .arg(
            Arg::new(ARG_EVENT)
                .long(ARG_EVENT)
                .short('e')
                .value_name("FILE")
                .required(true)
                .help("Path of the invocation event, or - to read it from stdin"),
        )
        .arg(
            Arg::new(ARG_DRY_RUN)
                .long(ARG_DRY_RUN)
                .action(ArgAction::SetTrue)
                .help("Keep archives in memory and print the metrics instead of sending them"),
        )
        .arg(
            Arg::new(ARG_REGION)
                .long(ARG_REGION)
                .value_name("REGION")
                .help("AWS region, overrides the default provider chain"),
        )
        .arg(
            Arg::new(ARG_ENDPOINT_URL)
                .long(ARG_ENDPOINT_URL)
                .value_name("URL")
                .help("Custom AWS endpoint, e.g. a local S3-compatible store"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        root_cli().debug_assert();
    }

    #[test]
    fn test_process_args() {
        let matches = root_cli()
            .try_get_matches_from(["archiver", "process", "--event", "-", "--dry-run"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, PROCESS);
        assert_eq!(args.get_one::<String>(ARG_EVENT).unwrap(), "-");
        assert!(args.get_flag(ARG_DRY_RUN));
        assert!(args.get_one::<String>(ARG_REGION).is_none());
    }

    #[test]
    fn test_event_is_required() {
        assert!(
            root_cli()
                .try_get_matches_from(["archiver", "process"])
                .is_err()
        );
    }
}
