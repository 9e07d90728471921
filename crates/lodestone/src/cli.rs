//! Command-line interface handling for the Lodestone server.
//!
//! Arguments are parsed with `clap`, but the server is lenient in a way clap
//! is not: unknown options and a trailing option with no value are reported
//! on stderr and ignored instead of aborting startup. The raw arguments are
//! therefore sanitized before clap sees them.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use game_server::config::{ConfigOverrides, ConfigSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE};
use std::io::Write;
use std::path::PathBuf;

/// What the process should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    /// Start the server with this configuration source.
    Run(ConfigSource),
    /// Print the text and exit successfully.
    Help(String),
    Version(String),
}

/// Options that take a value, as (long, short) pairs.
const VALUE_OPTIONS: &[(&str, Option<char>)] = &[
    ("configdir", None),
    ("configfile", None),
    ("port", Some('p')),
    ("host", Some('H')),
    ("onlinemode", Some('o')),
    ("console", None),
    ("plugins-dir", Some('P')),
    ("worlds-dir", Some('W')),
    ("update-dir", Some('U')),
    ("max-players", Some('M')),
    ("world-name", Some('N')),
    ("log-pattern", Some('L')),
];

fn version_string() -> String {
    format!("Lodestone {}", env!("CARGO_PKG_VERSION"))
}

/// Builds the clap command definition.
pub fn command() -> Command {
    Command::new("lodestone")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lodestone game server")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .help("Shows this help message")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .help("Shows version information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("configdir")
                .long("configdir")
                .value_name("DIR")
                .help("Sets the configuration directory")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("configfile")
                .long("configfile")
                .value_name("FILE")
                .help("Sets the configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Sets the server listening port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("IP")
                .help("Sets the server listening address"),
        )
        .arg(
            Arg::new("onlinemode")
                .short('o')
                .long("onlinemode")
                .value_name("true|false")
                .help("Sets the server's online-mode")
                .value_parser(value_parser!(bool)),
        )
        .arg(
            Arg::new("console")
                .long("console")
                .value_name("true|false")
                .help("Enables or disables the console input")
                .value_parser(value_parser!(bool)),
        )
        .arg(
            Arg::new("plugins-dir")
                .short('P')
                .long("plugins-dir")
                .value_name("DIR")
                .help("Sets the plugin directory to use"),
        )
        .arg(
            Arg::new("worlds-dir")
                .short('W')
                .long("worlds-dir")
                .value_name("DIR")
                .help("Sets the world container directory to use"),
        )
        .arg(
            Arg::new("update-dir")
                .short('U')
                .long("update-dir")
                .value_name("DIR")
                .help("Sets the plugin update folder to use"),
        )
        .arg(
            Arg::new("max-players")
                .short('M')
                .long("max-players")
                .value_name("N")
                .help("Sets the maximum amount of online players")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("world-name")
                .short('N')
                .long("world-name")
                .value_name("NAME")
                .help("Sets the main world name"),
        )
        .arg(
            Arg::new("log-pattern")
                .short('L')
                .long("log-pattern")
                .value_name("PATTERN")
                .help("Sets the log file pattern (%D for date)"),
        )
}

/// Resolves `-x` or `--long` to the canonical long name of a known option.
fn lookup(flag: &str) -> Option<(&'static str, bool)> {
    match flag {
        "-h" | "-?" | "--help" => return Some(("help", false)),
        "-v" | "--version" => return Some(("version", false)),
        _ => {}
    }
    if let Some(long) = flag.strip_prefix("--") {
        return VALUE_OPTIONS
            .iter()
            .find(|(name, _)| *name == long)
            .map(|(name, _)| (*name, true));
    }
    let mut chars = flag.strip_prefix('-')?.chars();
    let (short, None) = (chars.next()?, chars.next()) else {
        return None;
    };
    VALUE_OPTIONS
        .iter()
        .find(|(_, s)| *s == Some(short))
        .map(|(name, _)| (*name, true))
}

/// Drops what clap would reject, reporting each drop to `warnings`.
///
/// Returns the arguments to hand to clap, program name excluded, with every
/// recognised option normalised to its `--long` form.
pub fn sanitize(args: &[String], warnings: &mut impl Write) -> Vec<String> {
    let mut kept = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        i += 1;

        // --name=value keeps its inline value
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if arg.starts_with("--") => (flag, Some(value)),
            _ => (arg.as_str(), None),
        };

        match lookup(flag) {
            Some((name, false)) => kept.push(format!("--{name}")),
            Some((name, true)) => {
                let next = args.get(i).filter(|next| lookup(next).is_none());
                if let Some(value) = inline {
                    kept.push(format!("--{name}={value}"));
                } else if let Some(value) = next {
                    kept.push(format!("--{name}={value}"));
                    i += 1;
                } else {
                    let _ = writeln!(warnings, "Ignored option specified without value: {arg}");
                }
            }
            None => {
                let _ = writeln!(warnings, "Ignored invalid option: {arg}");
            }
        }
    }
    kept
}

fn string(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn source_from(matches: &ArgMatches) -> ConfigSource {
    let overrides = ConfigOverrides {
        host: string(matches, "host"),
        port: matches.get_one::<u16>("port").copied(),
        online_mode: matches.get_one::<bool>("onlinemode").copied(),
        console: matches.get_one::<bool>("console").copied(),
        plugins_dir: string(matches, "plugins-dir"),
        worlds_dir: string(matches, "worlds-dir"),
        update_dir: string(matches, "update-dir"),
        max_players: matches.get_one::<u32>("max-players").copied(),
        world_name: string(matches, "world-name"),
        log_pattern: string(matches, "log-pattern"),
    };
    ConfigSource {
        dir: matches
            .get_one::<PathBuf>("configdir")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
        file: matches
            .get_one::<PathBuf>("configfile")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        overrides,
    }
}

/// Parses `args` (program name excluded).
///
/// # Arguments
///
/// * `args` - The raw command-line arguments
/// * `warnings` - Where to report ignored options, normally stderr
///
/// # Returns
///
/// The action to take, or the clap error for values that do not parse
/// (for example a non-numeric port).
pub fn parse_args(args: &[String], warnings: &mut impl Write) -> Result<CliAction, clap::Error> {
    let sanitized = sanitize(args, warnings);
    let mut command = command();
    let matches = command.try_get_matches_from_mut(
        std::iter::once("lodestone".to_string()).chain(sanitized),
    )?;

    if matches.get_flag("help") {
        return Ok(CliAction::Help(command.render_help().to_string()));
    }
    if matches.get_flag("version") {
        return Ok(CliAction::Version(version_string()));
    }
    Ok(CliAction::Run(source_from(&matches)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run(list: &[&str]) -> (ConfigSource, String) {
        let mut warnings = Vec::new();
        let action = parse_args(&args(list), &mut warnings).unwrap();
        let CliAction::Run(source) = action else {
            panic!("expected run, got {action:?}");
        };
        (source, String::from_utf8(warnings).unwrap())
    }

    #[test]
    fn test_defaults() {
        let (source, warnings) = run(&[]);
        assert_eq!(source, ConfigSource::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_overrides() {
        let (source, _) = run(&[
            "--configdir", "/srv/conf", "-p", "25570", "-H", "10.0.0.2", "-o", "false",
            "--console=false", "-M", "50", "-N", "survival", "-L", "logs/%D.log",
        ]);
        assert_eq!(source.dir, PathBuf::from("/srv/conf"));
        assert_eq!(source.file, PathBuf::from(DEFAULT_CONFIG_FILE));
        let o = &source.overrides;
        assert_eq!(o.port, Some(25570));
        assert_eq!(o.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(o.online_mode, Some(false));
        assert_eq!(o.console, Some(false));
        assert_eq!(o.max_players, Some(50));
        assert_eq!(o.world_name.as_deref(), Some("survival"));
        assert_eq!(o.log_pattern.as_deref(), Some("logs/%D.log"));
        assert_eq!(o.plugins_dir, None);
    }

    #[test]
    fn test_unknown_option_is_ignored() {
        let (source, warnings) = run(&["--bogus", "-p", "25570"]);
        assert_eq!(source.overrides.port, Some(25570));
        assert_eq!(warnings, "Ignored invalid option: --bogus\n");
    }

    #[test]
    fn test_trailing_option_without_value_is_ignored() {
        let (source, warnings) = run(&["-W", "/srv/worlds", "--port"]);
        assert_eq!(source.overrides.worlds_dir.as_deref(), Some("/srv/worlds"));
        assert_eq!(source.overrides.port, None);
        assert_eq!(warnings, "Ignored option specified without value: --port\n");
    }

    #[test]
    fn test_option_followed_by_option_has_no_value() {
        let (source, warnings) = run(&["--host", "-p", "25570"]);
        assert_eq!(source.overrides.host, None);
        assert_eq!(source.overrides.port, Some(25570));
        assert_eq!(warnings, "Ignored option specified without value: --host\n");
    }

    #[test]
    fn test_help_and_version() {
        let mut sink = Vec::new();
        for flag in ["-h", "-?", "--help"] {
            let action = parse_args(&args(&[flag]), &mut sink).unwrap();
            let CliAction::Help(text) = action else {
                panic!("expected help for {flag}");
            };
            assert!(text.contains("--configdir"));
        }
        for flag in ["-v", "--version"] {
            let action = parse_args(&args(&[flag]), &mut sink).unwrap();
            assert!(matches!(action, CliAction::Version(v) if v.starts_with("Lodestone ")));
        }
    }

    #[test]
    fn test_bad_value_is_an_error() {
        let mut sink = Vec::new();
        assert!(parse_args(&args(&["--port", "lots"]), &mut sink).is_err());
    }
}
