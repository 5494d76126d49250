//! qrtrace-scan - QR decode-and-verify command line
//!
//! Resolves a product QR code (camera frames, an uploaded image, or typed
//! text) to its canonical hash and looks it up on the traceability backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use qrtrace_common::config::{
    default_config_path, load_or_default, write_toml_config, CompiledDefaults, TomlConfig,
};
use qrtrace_common::events::EventBus;
use qrtrace_common::{normalize, wrap_payload, AuthSession, CanonicalHash, ScanMethod, VerifiedEntityRecord};
use qrtrace_scan::auth_client::AuthClient;
use qrtrace_scan::camera::FrameDirectoryCamera;
use qrtrace_scan::capture::CaptureLoop;
use qrtrace_scan::session::{ScanSession, Scanner};
use qrtrace_scan::settings::{CliOverrides, ScanSettings};
use qrtrace_scan::{build_scanner, EVENT_BUS_CAPACITY};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Command-line arguments for qrtrace-scan
#[derive(Parser, Debug)]
#[command(name = "qrtrace-scan")]
#[command(about = "Decode and verify supply-chain QR codes")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/qrtrace/qrtrace.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Lookup path template containing {hash}
    #[arg(long, global = true)]
    lookup_path: Option<String>,

    /// Bearer token from a previous login
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize raw QR text offline and print the canonical hash
    Normalize { text: String },

    /// Print the JSON payload to embed in a QR code for a hash
    Payload { hash: String },

    /// Verify typed QR text (JSON payload or bare hash)
    Manual { text: String },

    /// Decode and verify a QR code image
    Upload { file: PathBuf },

    /// Poll camera frames until a QR code is found, then verify it
    Camera {
        /// Directory of frame images served as the camera stream
        #[arg(long)]
        frames: PathBuf,

        /// Polling interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Log in and print the issued token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Show the profile of the --token user
    Profile,

    /// Write a config file with the built-in defaults
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            format!("qrtrace_scan={lvl},qrtrace_common={lvl},warn", lvl = default_level).into()
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_record(record: &VerifiedEntityRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    println!("Verified: {}", record.kind());
    if let Some(id) = record.entity_id() {
        println!("Entity ID: {}", id);
    }
    if let Some(qr) = &record.qr {
        if let Some(hash) = &qr.qr_hash {
            println!("QR hash: {}", hash);
        }
        if let Some(count) = qr.scan_count {
            println!("Scan count: {}", count);
        }
    }
    println!("Events: {}", record.events.len());
    Ok(())
}

/// Forward session events to the log
fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => debug!(event = %line, "Scan event"),
                Err(e) => warn!(error = %e, "Could not serialize scan event"),
            }
        }
    });
}

/// Print the session outcome; error if the session failed
fn finish(session: &ScanSession, record: Option<&VerifiedEntityRecord>, json: bool) -> Result<()> {
    match record {
        Some(record) => print_record(record, json),
        None => match &session.last_error {
            Some(message) => Err(anyhow!("{} scan failed: {}", session.method, message)),
            None => {
                println!("Scan stopped, no QR code detected");
                Ok(())
            }
        },
    }
}

fn scanner_for(settings: &ScanSettings, auth: Option<AuthSession>) -> Result<Scanner> {
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    spawn_event_logger(&event_bus);
    Ok(build_scanner(settings, auth, event_bus)?)
}

async fn run_camera(
    scanner: &Scanner,
    settings: &ScanSettings,
    frames: PathBuf,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    let capture = CaptureLoop::new(
        Arc::new(FrameDirectoryCamera::new(frames)),
        scanner.decoder(),
    )
    .with_poll_interval(settings.poll_interval);

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        let timeout = async {
            match timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C, stopping capture"),
            _ = timeout => info!("Capture timeout reached, stopping"),
            _ = stopper.cancelled() => {}
        }
        stopper.cancel();
    });

    let mut session = scanner.open_session(ScanMethod::Camera);
    let result = scanner.run_camera(&mut session, &capture, cancel.clone()).await;
    cancel.cancel();
    finish(&session, result.ok().flatten().as_ref(), json)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Offline commands need neither settings nor logging
    match &args.command {
        Command::Normalize { text } => {
            let hash = normalize(text)?;
            println!("{}", hash);
            return Ok(());
        }
        Command::Payload { hash } => {
            let hash = CanonicalHash::new(hash)?;
            println!("{}", wrap_payload(&hash));
            return Ok(());
        }
        Command::InitConfig { force } => {
            let path = match args.config.clone().or_else(default_config_path) {
                Some(path) => path,
                None => bail!("no config directory on this platform; pass --config"),
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_toml_config(&TomlConfig::from(&CompiledDefaults::default()), &path)?;
            println!("Wrote {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let toml_config = load_or_default(args.config.as_deref()).context("Failed to load config")?;
    let poll_override = match &args.command {
        Command::Camera { poll_interval_ms, .. } => *poll_interval_ms,
        _ => None,
    };
    let overrides = CliOverrides {
        api_url: args.api_url.clone(),
        lookup_path: args.lookup_path.clone(),
        poll_interval_ms: poll_override,
        log_level: args.log_level.clone(),
        token: args.token.clone(),
    };
    let settings = ScanSettings::resolve(&overrides, &toml_config).context("Invalid settings")?;

    init_tracing(&settings.log_level);
    info!(
        "Starting qrtrace-scan v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("QRTRACE_GIT_HASH"),
        env!("QRTRACE_BUILD_TIMESTAMP"),
        env!("QRTRACE_BUILD_PROFILE")
    );
    info!("Backend: {}", settings.api_base_url);

    let auth = settings.token.clone().map(AuthSession::from_token);

    match args.command {
        Command::Login { email, password } => {
            let client = AuthClient::new(settings.api_base_url.clone(), settings.request_timeout)?;
            let session = client.login(&email, &password).await?;
            let token = session
                .bearer_token()
                .ok_or_else(|| anyhow!("login returned an inactive session"))?;
            if args.json {
                let out = serde_json::json!({ "token": token, "user": session.user() });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Logged in as {} ({})", session.user().email, session.user().role);
                println!("{}", token);
            }
            Ok(())
        }
        Command::Profile => {
            let Some(session) = auth else {
                bail!("profile needs --token or QRTRACE_TOKEN");
            };
            let client = AuthClient::new(settings.api_base_url.clone(), settings.request_timeout)?;
            let user = client.profile(&session).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Manual { text } => {
            let scanner = scanner_for(&settings, auth)?;
            let mut session = scanner.open_session(ScanMethod::Manual);
            let record = scanner.submit_manual(&mut session, &text).await.ok();
            finish(&session, record.as_ref(), args.json)
        }
        Command::Upload { file } => {
            let scanner = scanner_for(&settings, auth)?;
            let mut session = scanner.open_session(ScanMethod::Upload);
            let record = scanner.submit_upload(&mut session, &file).await.ok();
            finish(&session, record.as_ref(), args.json)
        }
        Command::Camera {
            frames,
            timeout_secs,
            ..
        } => {
            let scanner = scanner_for(&settings, auth)?;
            run_camera(&scanner, &settings, frames, timeout_secs, args.json).await
        }
        Command::Normalize { .. } | Command::Payload { .. } | Command::InitConfig { .. } => Ok(()),
    }
}
