//! Command-line surface for the `dgfsd` binary.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command, value_parser};
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_PORT, DaemonConfig};
use crate::semantics::InvocationSemantics;

fn command() -> Command {
    Command::new("dgfsd")
        .about("dgfs remote file access daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .default_value("7878")
                .help("UDP port to listen on (0 picks an ephemeral port)"),
        )
        .arg(
            Arg::new("semantics")
                .long("semantics")
                .value_name("MODE")
                .value_parser(["at-least-once", "at-most-once"])
                .default_value("at-most-once")
                .help("Invocation semantics for inbound requests"),
        )
        .arg(
            Arg::new("send-prob")
                .long("send-prob")
                .value_name("PROB")
                .value_parser(value_parser!(f64))
                .default_value("1.0")
                .help("Probability that an outbound datagram is sent (loss simulation)"),
        )
        .arg(
            Arg::new("recv-prob")
                .long("recv-prob")
                .value_name("PROB")
                .value_parser(value_parser!(f64))
                .default_value("1.0")
                .help("Probability that an inbound datagram is processed (loss simulation)"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .default_value("/")
                .help("Directory request paths are resolved beneath"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parses `dgfsd` arguments and serves until shutdown.
///
/// Returns a process exit status: 0 on clean shutdown (or help/version
/// output), nonzero on argument or socket failure.
pub fn run<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(error) => {
            return if error.use_stderr() {
                let _ = write!(stderr, "{error}");
                1
            } else {
                let _ = write!(stdout, "{error}");
                0
            };
        }
    };

    let verbosity = matches.get_count("verbose");
    init_tracing(verbosity);

    let semantics: InvocationSemantics = matches
        .get_one::<String>("semantics")
        .map(String::as_str)
        .unwrap_or("at-most-once")
        .parse()
        .unwrap_or(InvocationSemantics::AtMostOnce);
    let config = DaemonConfig {
        port: matches.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT),
        semantics,
        send_prob: matches.get_one::<f64>("send-prob").copied().unwrap_or(1.0),
        recv_prob: matches.get_one::<f64>("recv-prob").copied().unwrap_or(1.0),
        root: matches
            .get_one::<PathBuf>("root")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("/")),
    };

    if config.semantics == InvocationSemantics::AtLeastOnce {
        crate::write_semantics_warning(stderr);
    }

    match crate::serve(&config) {
        Ok(()) => 0,
        Err(error) => {
            let _ = writeln!(stderr, "dgfsd: {error}");
            1
        }
    }
}

/// Maps a `run` status onto a process [`ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> ExitCode {
    if status == 0 {
        ExitCode::SUCCESS
    } else {
        u8::try_from(status).map_or(ExitCode::FAILURE, ExitCode::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_flag_prints_to_stdout_and_succeeds() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["dgfsd", "--version"], &mut stdout, &mut stderr);
        assert_eq!(status, 0);
        assert!(!stdout.is_empty());
        assert!(stderr.is_empty());
    }

    #[test]
    fn help_flag_documents_the_semantics_option() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["dgfsd", "--help"], &mut stdout, &mut stderr);
        assert_eq!(status, 0);
        let rendered = String::from_utf8(stdout).expect("utf-8 help");
        assert!(rendered.contains("--semantics"));
        assert!(rendered.contains("at-most-once"));
    }

    #[test]
    fn unknown_flags_fail_with_a_diagnostic() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["dgfsd", "--bogus"], &mut stdout, &mut stderr);
        assert_eq!(status, 1);
        assert!(!stderr.is_empty());
    }

    #[test]
    fn invalid_semantics_value_is_rejected() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(
            ["dgfsd", "--semantics", "exactly-once"],
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(status, 1);
    }

    #[test]
    fn exit_codes_map_onto_process_codes() {
        assert_eq!(exit_code_from(0), ExitCode::SUCCESS);
        assert_eq!(exit_code_from(1), ExitCode::from(1));
        assert_eq!(exit_code_from(-1), ExitCode::FAILURE);
    }
}
