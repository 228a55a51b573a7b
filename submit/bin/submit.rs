//! A sendmail replacement for multi-user desktop systems
//!
//! Accepts the sendmail command line used by mail clients, plus a few
//! options of its own for managing the password caching daemon.

#![allow(clippy::struct_excessive_bools)]

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::{ArgAction, Parser};
use submit::{Frontend, Outcome, ui};
use submit_common::{Config, Message, logging, tracing::metadata::LevelFilter};
use submit_daemon::{Daemon, DaemonContext, handle_signals, notify_ready};
use submit_delivery::Submission;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "submit")]
#[command(about = "Submit mail, caching passwords between submissions", long_about = None)]
#[command(version, disable_help_flag = true)]
struct Cli {
    /// Start the daemon if it is not running (`-bd`)
    #[arg(long)]
    daemon: bool,

    /// Sendmail mode; only `-bd` (start the daemon) has an effect
    #[arg(short = 'b', value_name = "MODE")]
    mode: Option<String>,

    /// Authenticate against METHOD, or every method with `all`, without
    /// sending anything
    #[arg(long, value_name = "METHOD")]
    unlock: Option<String>,

    /// Stop the daemon
    #[arg(long)]
    shutdown: bool,

    /// Configuration directory
    #[arg(short = 'C', value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Envelope sender
    #[arg(short = 'f', short_alias = 'r', value_name = "ADDRESS")]
    from: Option<String>,

    /// A line with a single dot does not end the message
    #[arg(short = 'i')]
    ignore_dots: bool,

    /// Sendmail options; only `-oi` has an effect
    #[arg(short = 'o', value_name = "OPTION", action = ArgAction::Append)]
    options: Vec<String>,

    /// Add the addresses in `To:`, `Cc:` and `Bcc:` to the recipients
    #[arg(short = 't')]
    parse_recipients: bool,

    /// Process the queue; there is none, so this does nothing
    #[arg(short = 'q')]
    queue: bool,

    #[arg(short = 'G', hide = true)]
    ignored_g: bool,
    #[arg(short = 'm', hide = true)]
    ignored_m: bool,
    #[arg(short = 'n', hide = true)]
    ignored_n: bool,
    #[arg(short = 'U', hide = true)]
    ignored_u: bool,
    #[arg(short = 'A', hide = true, action = ArgAction::Append)]
    ignored_a: Vec<String>,
    #[arg(short = 'F', hide = true, action = ArgAction::Append)]
    ignored_f: Vec<String>,
    #[arg(short = 'h', hide = true, action = ArgAction::Append)]
    ignored_h: Vec<String>,
    #[arg(short = 'L', hide = true, action = ArgAction::Append)]
    ignored_l: Vec<String>,
    #[arg(short = 'N', hide = true, action = ArgAction::Append)]
    ignored_n_arg: Vec<String>,
    #[arg(short = 'R', hide = true, action = ArgAction::Append)]
    ignored_r: Vec<String>,
    #[arg(short = 'X', hide = true, action = ArgAction::Append)]
    ignored_x: Vec<String>,

    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Run the daemon in the foreground on the inherited pipe
    #[arg(long, hide = true)]
    serve: bool,

    /// Socket for `--serve`; defaults to the configured one
    #[arg(long, hide = true, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Log file for `--serve`
    #[arg(long, hide = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Recipient addresses
    recipients: Vec<String>,
}

impl Cli {
    fn daemon_only(&self) -> bool {
        self.daemon || self.mode.as_deref() == Some("d")
    }

    fn period_ends_message(&self) -> bool {
        !(self.ignore_dots || self.options.iter().any(|option| option == "i"))
    }

    fn unlock_method(&self) -> Option<Option<String>> {
        self.unlock
            .as_ref()
            .map(|method| (method != "all").then(|| method.clone()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if cli.serve {
        match &cli.log_file {
            Some(file) => logging::init_with_file(LevelFilter::INFO, file),
            None => logging::init(LevelFilter::INFO),
        }
        serve(&cli).await?;
        return Ok(ExitCode::SUCCESS);
    }

    logging::init(LevelFilter::WARN);

    if cli.queue {
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(cli.config_dir.as_deref())?;
    let interface = ui::detect(&config);
    let mut frontend = Frontend::new(config, interface);

    if cli.shutdown {
        frontend.shutdown().await?;
        return Ok(ExitCode::SUCCESS);
    }

    frontend.prepare().await?;

    if cli.daemon_only() {
        frontend.start_daemon().await?;
        return Ok(ExitCode::SUCCESS);
    }

    let submission = match cli.unlock_method() {
        Some(method) => Submission::Unlock { method },
        None => {
            let text = read_message(cli.period_ends_message()).await?;
            Submission::Message(Message::compose(
                frontend.config(),
                &text,
                &cli.recipients,
                cli.parse_recipients,
                cli.from.clone(),
            )?)
        }
    };

    match frontend.deliver(submission).await? {
        Outcome::Success => Ok(ExitCode::SUCCESS),
        Outcome::Failure => Ok(ExitCode::FAILURE),
    }
}

/// The message on standard input, up to end of file or, if
/// `period_ends_message`, a line holding a single dot.
async fn read_message(period_ends_message: bool) -> anyhow::Result<Vec<u8>> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut text = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if stdin.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let content = line
            .strip_suffix(b"\n")
            .map_or(line.as_slice(), |l| l.strip_suffix(b"\r").unwrap_or(l));
        if period_ends_message && content == b"." {
            break;
        }
        text.extend_from_slice(&line);
    }

    Ok(text)
}

/// The daemon side of a detached launch
async fn serve(cli: &Cli) -> anyhow::Result<()> {
    let socket = match &cli.socket {
        Some(socket) => socket.clone(),
        None => Config::load(cli.config_dir.as_deref())?.socket_path(),
    };

    let context = Arc::new(DaemonContext::default());
    let daemon = Daemon::bind(&socket, Arc::clone(&context))
        .await
        .with_context(|| format!("Unable to listen on {}", socket.display()))?;

    notify_ready().context("Unable to signal readiness")?;
    let signals = handle_signals(context)?;

    daemon.serve().await?;
    signals.abort();

    Ok(())
}
