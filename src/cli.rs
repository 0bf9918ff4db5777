//! Command-line surface.

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("fanart-sync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keeps artist artwork in a local catalog in sync with fanart.tv")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to config.toml (defaults to the platform config directory)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("add-artist")
                .about("Add an artist to the catalog")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .required(true)
                        .help("Display name"),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_parser(value_parser!(PathBuf))
                        .help("Artist folder on disk"),
                )
                .arg(
                    Arg::new("mbid")
                        .long("mbid")
                        .help("MusicBrainz artist id"),
                ),
        )
        .subcommand(
            Command::new("list").about("List catalog artists").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Output as JSON"),
            ),
        )
        .subcommand(
            Command::new("lock")
                .about("Stop or resume online refreshes for one artist")
                .arg(Arg::new("artist").required(true).help("Artist id"))
                .arg(
                    Arg::new("unlock")
                        .long("unlock")
                        .action(ArgAction::SetTrue)
                        .help("Allow refreshes again"),
                ),
        )
        .subcommand(
            Command::new("refresh")
                .about("Refresh fanart for stale artists")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Refresh even when the stored record is current"),
                )
                .arg(
                    Arg::new("artist")
                        .long("artist")
                        .help("Only refresh this artist id"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output cycle reports as JSON"),
                ),
        )
        .subcommand(
            Command::new("set-api-key")
                .about("Store the fanart.tv API key in the OS keyring")
                .arg(Arg::new("key").required_unless_present("clear"))
                .arg(
                    Arg::new("clear")
                        .long("clear")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("key")
                        .help("Remove the stored key"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::build_cli;
    use std::path::PathBuf;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_refresh_flags_and_global_options_parse() {
        let matches = build_cli()
            .try_get_matches_from([
                "fanart-sync",
                "refresh",
                "--force",
                "--artist",
                "a1",
                "--json",
                "--config",
                "/tmp/config.toml",
                "-v",
            ])
            .expect("valid arguments");

        assert!(matches.get_flag("verbose"));
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("/tmp/config.toml"))
        );
        let (name, args) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "refresh");
        assert!(args.get_flag("force"));
        assert!(args.get_flag("json"));
        assert_eq!(args.get_one::<String>("artist").map(String::as_str), Some("a1"));
    }

    #[test]
    fn test_add_artist_requires_name() {
        assert!(build_cli()
            .try_get_matches_from(["fanart-sync", "add-artist", "--mbid", "x"])
            .is_err());
    }

    #[test]
    fn test_set_api_key_requires_key_or_clear() {
        assert!(build_cli()
            .try_get_matches_from(["fanart-sync", "set-api-key"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["fanart-sync", "set-api-key", "--clear"])
            .is_ok());
        assert!(build_cli()
            .try_get_matches_from(["fanart-sync", "set-api-key", "abc", "--clear"])
            .is_err());
    }
}
