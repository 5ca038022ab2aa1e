use clap::{Arg, Command};

pub(super) const RUN_SUBCOMMAND: &str = "run";
pub(super) const NAME_ARG: &str = "name";
pub(super) const SINK_ARG: &str = "sink";

pub(super) const LOG_SINK: &str = "log";
pub(super) const BLACKHOLE_SINK: &str = "blackhole";

pub(super) fn root_cli() -> Command {
    Command::new("river")
        .about("Generates records and ingests them in batches under admission control")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_run_subcommand())
}

fn add_run_subcommand() -> Command {
    Command::new(RUN_SUBCOMMAND)
        .about("Runs a simple stream river until interrupted or its configured cycles are done")
        .arg(
            Arg::new(NAME_ARG)
                .long(NAME_ARG)
                .required(true)
                .help("Name of the river, also the default destination index"),
        )
        .arg(
            Arg::new(SINK_ARG)
                .long(SINK_ARG)
                .default_value(LOG_SINK)
                .value_parser([LOG_SINK, BLACKHOLE_SINK])
                .help("Sink the batches are written to"),
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
    fn test_run_defaults_to_log_sink() {
        let matches = root_cli()
            .try_get_matches_from(["river", "run", "--name", "my-river"])
            .unwrap();
        let (name, run) = matches.subcommand().unwrap();
        assert_eq!(name, RUN_SUBCOMMAND);
        assert_eq!(
            run.get_one::<String>(NAME_ARG).map(String::as_str),
            Some("my-river")
        );
        assert_eq!(
            run.get_one::<String>(SINK_ARG).map(String::as_str),
            Some(LOG_SINK)
        );
    }

    #[test]
    fn test_run_requires_name() {
        assert!(root_cli().try_get_matches_from(["river", "run"]).is_err());
        assert!(
            root_cli()
                .try_get_matches_from(["river", "run", "--name", "r", "--sink", "kafka"])
                .is_err()
        );
    }
}
