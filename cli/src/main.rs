use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use client::ClientError;
use client::api::{HistoryApi, HttpApi, SessionApi};
use client::config::ClientConfig;
use client::history::HistoryStore;
use client::position::ScriptedPositionSource;
use client::store::SessionStore;
use client::transport::WsConnector;
use client::types::{
    FinishSessionRequest, LatLng, LoginRequest, PhotoUpload, SessionEndReason, SignupRequest,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid route `{0}`; expected `lat,lng;lat,lng;...`")]
    InvalidRoute(String),
    #[error("invalid end reason `{0}`; expected meet, timeout, or cancel")]
    InvalidReason(String),
    #[error("failed to read `{path}`: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "meet-cli", about = "Meet-up session API and location-sharing CLI")]
struct Cli {
    #[arg(long, env = "MEET_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Bearer token from a previous `login`.
    #[arg(long, env = "MEET_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and print the auth response.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        nickname: String,
    },
    /// Log in and print the auth response (token included).
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Print the authenticated user.
    Me,
    /// Create a pairing invite code for the partner.
    Invite,
    /// Redeem the partner's invite code.
    Join { code: String },
    /// List the couple's sessions.
    Sessions,
    /// Print one session's current status.
    Status { session_id: i64 },
    /// Print one session's recorded points.
    History { session_id: i64 },
    /// Finish a session over REST without the meet-confirm broadcast.
    Finish {
        session_id: i64,
        /// meet, timeout, or cancel
        #[arg(long, default_value = "cancel")]
        reason: String,
    },
    /// Upload a photo to a session.
    Photo {
        session_id: i64,
        file: PathBuf,
        #[arg(long)]
        text: Option<String>,
    },
    /// Print finished-encounter summaries and dashboard totals.
    Story,
    /// Start or accept a session and share a scripted route until it ends.
    Share(ShareArgs),
}

#[derive(Args, Debug)]
struct ShareArgs {
    /// Accept this pending session instead of creating a new one.
    #[arg(long, required_unless_present = "create")]
    session_id: Option<i64>,

    /// Create a new session and print its id.
    #[arg(long, default_value_t = false)]
    create: bool,

    /// Positions to walk through, cycled until the session ends.
    #[arg(long, default_value = "37.5665,126.9780;37.5651,126.9895")]
    route: String,

    /// Seconds between scripted position fixes.
    #[arg(long, default_value_t = 2)]
    fix_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ClientConfig::new(cli.base_url, cli.token);
    let api = HttpApi::new(&config)?;

    match cli.command {
        Command::Signup {
            email,
            password,
            nickname,
        } => {
            let response = api
                .signup(&SignupRequest {
                    email,
                    password,
                    nickname,
                })
                .await?;
            print_json(&response)
        }
        Command::Login { email, password } => {
            let response = api.login(&LoginRequest { email, password }).await?;
            eprintln!("export MEET_TOKEN={}", response.access_token);
            print_json(&response)
        }
        Command::Me => print_json(&api.me().await?),
        Command::Invite => print_json(&api.create_invite_code().await?),
        Command::Join { code } => print_json(&api.join_invite_code(&code).await?),
        Command::Sessions => print_json(&api.sessions().await?),
        Command::Status { session_id } => print_json(&api.session_status(session_id).await?),
        Command::History { session_id } => print_json(&api.session_history(session_id).await?),
        Command::Finish { session_id, reason } => {
            let reason = parse_reason(&reason)?;
            api.finish_session(session_id, FinishSessionRequest { reason })
                .await?;
            println!("finished session {session_id} ({reason:?})");
            Ok(())
        }
        Command::Photo {
            session_id,
            file,
            text,
        } => {
            let bytes = std::fs::read(&file).map_err(|source| CliError::ReadFile {
                path: file.display().to_string(),
                source,
            })?;
            let file_name = file
                .file_name()
                .map_or_else(|| "photo.jpg".to_owned(), |n| n.to_string_lossy().into_owned());
            let upload = PhotoUpload {
                file_name,
                bytes,
                text,
            };
            let point = api.upload_photo(session_id, upload).await?;
            print_json(&point)
        }
        Command::Story => run_story(api).await,
        Command::Share(args) => run_share(config, api, args).await,
    }
}

async fn run_story(api: HttpApi) -> Result<(), CliError> {
    let api: Arc<dyn HistoryApi> = Arc::new(api);
    let mut store = HistoryStore::new(api);
    let rows = store.fetch_list().await?;
    for row in rows {
        println!(
            "#{} {}: {:.0} min, {:.0} m",
            row.id, row.date, row.travel_minutes, row.distance
        );
    }
    let stats = store.dashboard();
    println!(
        "total: {:.0} min / {:.0} m; average: {:.0} min / {:.0} m",
        stats.total_minutes, stats.total_distance_m, stats.avg_minutes, stats.avg_distance_m
    );
    if let Some(fastest) = stats.fastest_minutes {
        println!("fastest encounter: {fastest:.0} min");
    }
    Ok(())
}

async fn run_share(config: ClientConfig, api: HttpApi, args: ShareArgs) -> Result<(), CliError> {
    let route = parse_route(&args.route)?;
    let source = Box::new(ScriptedPositionSource::new(
        route,
        Duration::from_secs(args.fix_interval.max(1)),
    ));
    let mut store = SessionStore::new(config, Arc::new(api.clone()), Arc::new(WsConnector), source);

    match api.me().await {
        Ok(user) => store.set_user_id(user.id),
        Err(e) => tracing::warn!(error = %e, "could not resolve own user id; echoes will repaint"),
    }

    if args.create {
        let session = store.create_and_start().await?;
        eprintln!("created session {}; waiting for the partner to accept", session.id);
    } else if let Some(session_id) = args.session_id {
        store.accept_and_start(session_id).await?;
        eprintln!("accepted session {session_id}");
    }

    tokio::select! {
        () = store.run() => {}
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; leaving the session running on the server");
            store.stop_sharing();
        }
    }

    let snapshot = store.snapshot();
    eprintln!(
        "done: status={:?} points={} last_error={:?}",
        snapshot.status,
        snapshot.history.len(),
        snapshot.last_error
    );
    Ok(())
}

fn parse_reason(raw: &str) -> Result<SessionEndReason, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "meet" | "meet_confirmed" => Ok(SessionEndReason::MeetConfirmed),
        "timeout" => Ok(SessionEndReason::Timeout),
        "cancel" | "manual_cancel" => Ok(SessionEndReason::ManualCancel),
        _ => Err(CliError::InvalidReason(raw.to_owned())),
    }
}

fn parse_route(raw: &str) -> Result<Vec<LatLng>, CliError> {
    let mut route = Vec::new();
    for pair in raw.split(';').filter(|p| !p.trim().is_empty()) {
        let Some((lat, lng)) = pair.split_once(',') else {
            return Err(CliError::InvalidRoute(raw.to_owned()));
        };
        let (Ok(lat), Ok(lng)) = (lat.trim().parse::<f64>(), lng.trim().parse::<f64>()) else {
            return Err(CliError::InvalidRoute(raw.to_owned()));
        };
        route.push(LatLng { lat, lng });
    }
    if route.is_empty() {
        return Err(CliError::InvalidRoute(raw.to_owned()));
    }
    Ok(route)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
