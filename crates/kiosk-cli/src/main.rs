//! Ride reservation kiosk.
//!
//! Guests tap a card, pick an attraction, and leave with the reservation
//! written back to the card. Settings come from `KIOSK_*` environment
//! variables (see [`config`]); `KIOSK_MOCK_NFC=1` and `KIOSK_MOCK_API=1` run
//! the kiosk without a reader or network.

mod config;
mod demo;
mod shell;

use anyhow::Context;
use config::KioskConfig;
use demo::DemoCard;
use kiosk_controller::{CardPoller, CardWriter, IdleTimer, KioskController, Navigator, ReaderGate};
use kiosk_hardware::{
    devices::AnyCardReader, simulated::SimulatedReader, traits::CardReader,
    transport::AnyCardTransport,
};
use kiosk_network::{AnyReservationApi, HttpTransport, MockReservationApi, SessionClient};
use kiosk_protocol::AnyRecordLayout;
use shell::Shell;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub(crate) type Transport = AnyCardTransport<AnyCardReader>;
pub(crate) type Gate = ReaderGate<Transport>;
pub(crate) type Kiosk = KioskController<AnyReservationApi, Transport>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "kiosk=info".into()),
        )
        .init();

    let config = KioskConfig::from_env().context("Invalid kiosk configuration")?;
    info!(
        version = kiosk_core::VERSION,
        format = %config.card_format,
        reader_filter = ?config.reader_filter,
        mock_nfc = config.mock_nfc,
        mock_api = config.mock_api,
        "Starting ride kiosk"
    );

    let (reader, demo) = open_reader(&config)?;
    let info = reader.reader_info();
    info!(reader = %info.name, driver = %info.driver, "Card reader ready");

    let layout = AnyRecordLayout::for_format(config.card_format);
    let gate = Arc::new(ReaderGate::new(AnyCardTransport::new(
        config.card_format,
        reader,
        config.transport(),
    )));

    let (navigator, routes) = Navigator::channel();
    let controller = Arc::new(KioskController::new(
        open_api(&config)?,
        CardWriter::new(Arc::clone(&gate), layout),
        navigator,
        config.controller(),
    ));

    let idle = {
        let controller = Arc::clone(&controller);
        Arc::new(IdleTimer::new(move || controller.end_session()))
    };

    let shutdown = CancellationToken::new();
    let poller = CardPoller::new(
        Arc::clone(&gate),
        layout,
        Arc::clone(&controller),
        config.poller(),
    );
    let polling = tokio::spawn(poller.run(shutdown.clone()));
    let screens = tokio::spawn(shell::show_routes(
        routes,
        Arc::clone(&idle),
        config.controller(),
    ));

    controller.end_session();

    let shell = Shell::new(controller, gate, idle, config.idle_reset, demo);
    tokio::select! {
        result = shell.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    shutdown.cancel();
    polling.await.context("Card poller task failed")?;
    screens.abort();
    info!("Kiosk stopped");
    Ok(())
}

fn open_reader(config: &KioskConfig) -> anyhow::Result<(AnyCardReader, Option<DemoCard>)> {
    if config.mock_nfc {
        let (reader, handle) = SimulatedReader::new();
        let demo = DemoCard::new(handle, config.card_format)?;
        info!(uid = demo::DEMO_UID, "Simulated reader, type 'tap' to present the demo card");
        return Ok((AnyCardReader::Simulated(reader), Some(demo)));
    }
    Ok((open_hardware_reader(config)?, None))
}

#[cfg(feature = "hardware-pcsc")]
fn open_hardware_reader(config: &KioskConfig) -> anyhow::Result<AnyCardReader> {
    let reader = kiosk_hardware::pcsc::PcscReader::open(config.reader_filter.as_deref())
        .context("Opening PC/SC reader")?;
    Ok(AnyCardReader::Pcsc(reader))
}

#[cfg(not(feature = "hardware-pcsc"))]
fn open_hardware_reader(_config: &KioskConfig) -> anyhow::Result<AnyCardReader> {
    anyhow::bail!(
        "Built without PC/SC support: set {}=1 or rebuild with --features hardware-pcsc",
        config::MOCK_NFC
    )
}

fn open_api(config: &KioskConfig) -> anyhow::Result<AnyReservationApi> {
    match config.client() {
        Some(client) if !config.mock_api => {
            info!(api_root = %client.api_root, "Using reservation API");
            let transport = HttpTransport::new(client.timeout)?;
            Ok(AnyReservationApi::Http(SessionClient::new(transport, client)))
        }
        _ => {
            info!("Using the offline mock API");
            Ok(AnyReservationApi::Mock(MockReservationApi::new()))
        }
    }
}
