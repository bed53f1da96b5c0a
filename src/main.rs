use std::{error::Error, net::SocketAddr, process, sync::Arc};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use nowplayd::{
    broadcast::Broadcaster,
    config::{Config, Credentials},
    gateway::Gateway,
    http,
    poll::{PollLoop, SpotifySource},
    server::{self, AppState},
    signal,
    tokens::TokenCache,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as it
    /// contains credentials that grant read access to the linked Spotify
    /// account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Address to serve the HTTP and websocket endpoints on
    ///
    /// [default: 0.0.0.0:8000]
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Main application loop.
///
/// Builds the shared components, spawns the poll and server tasks, and
/// supervises them: a shutdown signal cancels both cooperatively, and a
/// fatal poll or server failure cancels the other task and surfaces the
/// error instead of relying on an uncaught panic to tear things down.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let credentials = Credentials::load(&args.secrets_file)?;
    let mut config = Config::with_credentials(credentials);
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let http_client = http::Client::new(&config)?;
    let gateway = Arc::new(Gateway::new(http_client));
    let tokens = Arc::new(TokenCache::new(config.credentials.clone()));
    let broadcaster = Arc::new(Broadcaster::new());
    let now_playing = Arc::new(RwLock::new(None));

    let cancel = CancellationToken::new();

    let poll = PollLoop::new(
        SpotifySource::new(Arc::clone(&gateway), Arc::clone(&tokens)),
        Arc::clone(&broadcaster),
        Arc::clone(&now_playing),
        config.poll_interval,
        config.palette_size,
    );
    let mut poll_task = tokio::spawn(poll.run(cancel.clone()));

    let state = Arc::new(AppState {
        now_playing,
        broadcaster,
        gateway,
        tokens,
        list_length: config.list_length,
    });
    let mut server_task = tokio::spawn(server::serve(state, config.bind_address, cancel.clone()));

    let mut signals = signal::Handler::new()?;

    tokio::select! {
        // Prioritize shutdown signals.
        biased;

        signal = signals.recv() => {
            info!("received {signal}, shutting down gracefully");
            cancel.cancel();
            let _ = poll_task.await;
            let _ = server_task.await;
            Ok(())
        }

        result = &mut poll_task => {
            cancel.cancel();
            let _ = server_task.await;
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }

        result = &mut server_task => {
            cancel.cancel();
            let _ = poll_task.await;
            match result {
                Ok(Ok(())) => Err("server stopped unexpectedly".into()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Main entry point of the application.
///
/// Initializes the logger facade, parses the command line arguments, and
/// starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {args:#?}");

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
