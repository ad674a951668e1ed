#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dgfs_cli` is the thin command-line front-end for the dgfs client. It
//! recognises the connection flags (`--server`, `--port`, `--timeout-ms`,
//! `--retries`, `--freshness-ms`, `--send-prob`, `--recv-prob`, `-v`) and one
//! subcommand per file operation (`read`, `insert`, `delete`, `info`,
//! `monitor`, `shutdown`), then delegates to [`dgfs_core::ClientSession`]
//! and renders the reply.
//!
//! # Design
//!
//! [`run`] accepts an argument iterator together with output handles and
//! returns a process status, so the binary stays a two-line wrapper and
//! tests can drive the whole surface in-process.

use std::ffi::OsString;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing_subscriber::EnvFilter;

use dgfs_core::{ClientConfig, ClientSession};
use dgfs_protocol::{Response, Status};

fn command() -> Command {
    Command::new("dgfs")
        .about("dgfs remote file access client")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("server")
                .long("server")
                .value_name("ADDR")
                .value_parser(value_parser!(IpAddr))
                .default_value("127.0.0.1")
                .global(true)
                .help("Daemon address"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .default_value("7878")
                .global(true)
                .help("Daemon UDP port"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("2000")
                .global(true)
                .help("Receive timeout per exchange round"),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("N")
                .value_parser(value_parser!(u32))
                .default_value("3")
                .global(true)
                .help("Exchange rounds per invocation"),
        )
        .arg(
            Arg::new("freshness-ms")
                .long("freshness-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .default_value("5000")
                .global(true)
                .help("Cache freshness interval"),
        )
        .arg(
            Arg::new("send-prob")
                .long("send-prob")
                .value_name("PROB")
                .value_parser(value_parser!(f64))
                .default_value("1.0")
                .global(true)
                .help("Probability that an outbound datagram is sent (loss simulation)"),
        )
        .arg(
            Arg::new("recv-prob")
                .long("recv-prob")
                .value_name("PROB")
                .value_parser(value_parser!(f64))
                .default_value("1.0")
                .global(true)
                .help("Probability that an inbound datagram is kept (loss simulation)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .subcommand(
            Command::new("read")
                .about("Read a byte range from a file")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("offset")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("length")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("insert")
                .about("Insert bytes at an offset, shifting the suffix right")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("offset")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                )
                .arg(Arg::new("data").required(true)),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a byte range, shifting the suffix left")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("offset")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("length")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show file attributes")
                .arg(Arg::new("path").required(true)),
        )
        .subcommand(
            Command::new("monitor")
                .about("Listen for update callbacks on a file")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("duration-ms")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(Command::new("shutdown").about("Ask the daemon to terminate"))
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn config_from(matches: &ArgMatches) -> ClientConfig {
    let server = matches
        .get_one::<IpAddr>("server")
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let port = matches.get_one::<u16>("port").copied().unwrap_or(7878);
    ClientConfig::builder(SocketAddr::from((server, port)))
        .timeout(Duration::from_millis(
            matches.get_one::<u64>("timeout-ms").copied().unwrap_or(2000),
        ))
        .max_retries(matches.get_one::<u32>("retries").copied().unwrap_or(3))
        .freshness(Duration::from_millis(
            matches
                .get_one::<u64>("freshness-ms")
                .copied()
                .unwrap_or(5000),
        ))
        .send_prob(matches.get_one::<f64>("send-prob").copied().unwrap_or(1.0))
        .recv_prob(matches.get_one::<f64>("recv-prob").copied().unwrap_or(1.0))
        .build()
}

/// Parses arguments, performs one client operation, and renders the reply.
///
/// Returns a process status: 0 when the daemon reported success, 1 for
/// error replies and connection failures.
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

    init_tracing(matches.get_count("verbose"));
    let config = config_from(&matches);
    let mut session = match ClientSession::connect(config) {
        Ok(session) => session,
        Err(error) => {
            let _ = writeln!(stderr, "dgfs: {error}");
            return 1;
        }
    };

    let response = match matches.subcommand() {
        Some(("read", sub)) => session.read(
            path_of(sub),
            arg_u64(sub, "offset"),
            arg_u64(sub, "length"),
        ),
        Some(("insert", sub)) => {
            let data = sub
                .get_one::<String>("data")
                .cloned()
                .unwrap_or_default()
                .into_bytes();
            session.write_insert(path_of(sub), arg_u64(sub, "offset"), data)
        }
        Some(("delete", sub)) => session.write_delete(
            path_of(sub),
            arg_u64(sub, "offset"),
            arg_u64(sub, "length"),
        ),
        Some(("info", sub)) => session.file_info(path_of(sub)),
        Some(("monitor", sub)) => {
            let duration = Duration::from_millis(arg_u64(sub, "duration-ms"));
            session.monitor(path_of(sub), duration, |callback| {
                let _ = writeln!(
                    stdout,
                    "callback: {} ({} byte(s))",
                    callback.message,
                    callback.payload.len()
                );
                let _ = stdout.write_all(&callback.payload);
                let _ = writeln!(stdout);
            })
        }
        Some(("shutdown", _)) => session.shutdown_server(),
        _ => return 1,
    };

    render(&response, stdout, stderr)
}

fn path_of(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("path")
        .map_or("", String::as_str)
}

fn arg_u64(matches: &ArgMatches, name: &str) -> u64 {
    matches.get_one::<u64>(name).copied().unwrap_or(0)
}

fn render<Out: Write, Err: Write>(response: &Response, stdout: &mut Out, stderr: &mut Err) -> i32 {
    if response.status.is_error() {
        let _ = writeln!(
            stderr,
            "dgfs: {}: {}",
            response.status.name(),
            response.message
        );
        return 1;
    }
    let _ = writeln!(stdout, "{}: {}", response.status.name(), response.message);
    if !response.payload.is_empty() {
        let _ = stdout.write_all(&response.payload);
        let _ = writeln!(stdout);
    }
    0
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
