#![forbid(unsafe_code)]

//! `dsp-courier`: headless driver session.
//!
//! Loads configuration, authenticates (or restores the stored session),
//! starts the driver session and logs its events until ctrl-c / SIGTERM.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use dsp_courier::config::GlobalConfig;
use dsp_courier::credentials::KeyringStore;
use dsp_courier::models::delivery::DeliveryStatus;
use dsp_courier::models::location::GeoPoint;
use dsp_courier::models::offer::Offer;
use dsp_courier::session::bootstrap::{self, Login};
use dsp_courier::session::{DriverSession, SessionEvent};
use dsp_courier::{AppError, Result};

const DEMO_DRIVER_ID: &str = "demo-driver";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dsp-courier", about = "Driver-side delivery session", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run offline with synthetic offers, driving each accepted delivery
    /// to completion.
    #[arg(long)]
    demo: bool,

    /// Log out and clear stored credentials on exit.
    #[arg(long)]
    logout: bool,

    /// Current position as `lat,lng`; logs the route for each delivery
    /// update when a maps key is configured.
    #[arg(long, value_parser = parse_origin)]
    origin: Option<GeoPoint>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("dsp-courier bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await;
    info!("configuration loaded");

    if args.demo {
        let (session, events) = bootstrap::connect_offline(&config, DEMO_DRIVER_ID);
        info!("demo session ready");
        drive(&session, events, true, args.origin).await;
        session.shutdown().await;
        return Ok(());
    }

    let store = KeyringStore;
    let login = login_from_env();
    let connection = bootstrap::authenticate(&config, &store, login.as_ref()).await?;

    match connection.profile().await {
        Ok(profile) => info!(
            name = %profile.name,
            vehicle = profile.vehicle.as_deref().unwrap_or("-"),
            "profile loaded"
        ),
        Err(err) => warn!(%err, "profile unavailable"),
    }

    let (session, events) = bootstrap::connect(&config, &connection);
    info!("driver session ready");
    drive(&session, events, false, args.origin).await;

    if args.logout {
        if let Err(err) = bootstrap::logout(session, &connection, &store).await {
            error!(%err, "logout failed");
        }
    } else {
        session.shutdown().await;
    }
    info!("dsp-courier shut down");
    Ok(())
}

/// Log session events until a shutdown signal arrives.
async fn drive(
    session: &DriverSession,
    mut events: tokio::sync::mpsc::Receiver<SessionEvent>,
    demo: bool,
    origin: Option<GeoPoint>,
) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                return;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            return;
        };

        match event {
            SessionEvent::OfferSurfaced(offer) => {
                info!(offer_id = %offer.id, pay = %offer.pay, pickup = %offer.pickup, "new offer");
                if demo {
                    demo_step(session, &offer).await;
                }
            }
            SessionEvent::DeliveryUpdated(delivery) => {
                info!(delivery_id = %delivery.id, status = delivery.status.as_str(), "delivery updated");
                if let Some(origin) = origin {
                    log_route(session, origin).await;
                }
            }
            SessionEvent::DeliveryReleased(delivery) => {
                info!(delivery_id = %delivery.id, "delivery released");
            }
            SessionEvent::EarningsRecorded(record) => {
                info!(amount = record.amount, dropoff = %record.dropoff, "earnings recorded");
            }
            SessionEvent::MessageReceived { message, alert } => {
                info!(message_id = %message.id, alert, text = %message.text, "message received");
            }
            SessionEvent::Alert(text) => warn!(alert = %text, "session alert"),
        }
    }
}

/// Move the demo delivery one step forward per surfaced offer.
async fn demo_step(session: &DriverSession, offer: &Offer) {
    let status = session.snapshot().await.active.map(|d| d.status);
    let result = match status {
        None => session.accept(&offer.id).await.map(drop),
        Some(DeliveryStatus::AcceptedEnRouteToPickup) => session.confirm_pickup().await.map(drop),
        Some(DeliveryStatus::PickedUpEnRouteToCustomer) => {
            session.confirm_delivery().await.map(drop)
        }
        Some(DeliveryStatus::Delivered) => Ok(()),
    };
    if let Err(err) = result {
        warn!(%err, "demo step failed");
    }
}

async fn log_route(session: &DriverSession, origin: GeoPoint) {
    match session.route(origin).await {
        Ok(Some(route)) => info!(
            meters = route.total_distance_meters(),
            seconds = route.total_duration().as_secs(),
            points = route.path.len(),
            "route to destination"
        ),
        Ok(None) => {}
        Err(err) => warn!(%err, "route unavailable"),
    }
}

fn parse_origin(raw: &str) -> std::result::Result<GeoPoint, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng, got {raw:?}"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .map_err(|err| format!("invalid coordinate {part:?}: {err}"))
    };
    Ok(GeoPoint::new(parse(lat)?, parse(lng)?))
}

fn login_from_env() -> Option<Login> {
    let email = std::env::var("DSP_EMAIL").ok().filter(|v| !v.is_empty())?;
    let password = std::env::var("DSP_PASSWORD").ok().filter(|v| !v.is_empty())?;
    Some(Login { email, password })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
