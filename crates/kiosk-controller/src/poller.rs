//! Background card polling.
//!
//! Each cycle runs `Idle → WaitingForCard → CardDetected → Delivering → Idle`:
//!
//! 1. skip the cycle if a write is pending or the reader is in use
//! 2. wait (bounded by the transport's timeout) for a card
//! 3. read the UID; a card still sitting on the reader is not delivered again
//! 4. read the reservation and guest email, release the reader, and hand the
//!    result to the [`CardHandler`]
//!
//! The reader is locked only for steps 2–4 and never across the idle sleep.
//! Handler errors and panics are logged and never stop the loop.

#![allow(async_fn_in_trait)]

use crate::{config::PollerConfig, error::Result, gate::ReaderGate};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use kiosk_core::{GuestEmail, Reservation, TagUid};
use kiosk_hardware::{CardConnection, CardTransport, HardwareError};
use kiosk_protocol::{AnyRecordLayout, CardImage, RecordLayout};
use serde::{Deserialize, Serialize};
use std::{fmt, panic::AssertUnwindSafe, sync::Arc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// What was found on a tapped card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardEvent {
    pub uid: TagUid,
    pub reservation: Option<Reservation>,
    pub email: Option<GuestEmail>,
    pub tapped_at: DateTime<Utc>,
}

/// Receives card events from the poller.
pub trait CardHandler: Send + Sync {
    /// Called once per newly tapped card.
    ///
    /// # Errors
    ///
    /// Errors are logged by the poller and otherwise ignored.
    async fn handle_card(&self, event: CardEvent) -> Result<()>;
}

/// Poller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    WaitingForCard,
    CardDetected,
    Delivering,
}

impl PollState {
    pub fn can_transition_to(&self, target: &PollState) -> bool {
        matches!(
            (self, target),
            (PollState::Idle, PollState::WaitingForCard)
                | (PollState::WaitingForCard, PollState::CardDetected | PollState::Idle)
                | (PollState::CardDetected, PollState::Delivering | PollState::Idle)
                | (PollState::Delivering, PollState::Idle)
        )
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Idle => "Idle",
            PollState::WaitingForCard => "WaitingForCard",
            PollState::CardDetected => "CardDetected",
            PollState::Delivering => "Delivering",
        };
        f.write_str(name)
    }
}

/// Result of one poll cycle.
#[derive(Debug)]
pub enum PollOutcome {
    /// A write is pending; the reader was not touched.
    Paused,
    /// The reader was locked by someone else; it was not touched.
    Busy,
    /// No card arrived before the transport timed out.
    NoCard,
    /// The card on the reader was already delivered.
    Duplicate(TagUid),
    /// The card was read and handed to the handler.
    Delivered(TagUid),
    /// The reader or card failed mid-cycle.
    Failed(HardwareError),
}

/// Polls the reader and delivers newly tapped cards.
pub struct CardPoller<T, H> {
    gate: Arc<ReaderGate<T>>,
    layout: AnyRecordLayout,
    handler: Arc<H>,
    config: PollerConfig,
    state: PollState,
    last_uid: Option<TagUid>,
}

impl<T, H> fmt::Debug for CardPoller<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardPoller")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("last_uid", &self.last_uid)
            .finish()
    }
}

impl<T, H> CardPoller<T, H>
where
    T: CardTransport,
    H: CardHandler,
{
    pub fn new(
        gate: Arc<ReaderGate<T>>,
        layout: AnyRecordLayout,
        handler: Arc<H>,
        config: PollerConfig,
    ) -> Self {
        Self {
            gate,
            layout,
            handler,
            config,
            state: PollState::Idle,
            last_uid: None,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// UID of the last delivered card, while it stays on the reader.
    pub fn last_uid(&self) -> Option<&TagUid> {
        self.last_uid.as_ref()
    }

    fn transition(&mut self, target: PollState) {
        if self.state.can_transition_to(&target) {
            trace!(from = %self.state, to = %target, "Poll state");
            self.state = target;
        } else {
            warn!(from = %self.state, to = %target, "Invalid poll transition, resetting");
            self.state = PollState::Idle;
        }
    }

    /// Run a single poll cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let gate = Arc::clone(&self.gate);
        if gate.is_paused() {
            debug!("Polling paused while writing");
            return PollOutcome::Paused;
        }
        let Some(mut transport) = gate.try_acquire() else {
            debug!("Reader busy, skipping poll");
            return PollOutcome::Busy;
        };

        self.transition(PollState::WaitingForCard);
        let connected = tokio::select! {
            biased;
            _ = gate.paused() => {
                debug!("Write requested, abandoning wait for card");
                self.transition(PollState::Idle);
                return PollOutcome::Paused;
            }
            result = transport.connect() => result,
        };

        let mut connection = match connected {
            Ok(connection) => connection,
            Err(e) if e.is_no_card() => {
                self.last_uid = None;
                self.transition(PollState::Idle);
                return PollOutcome::NoCard;
            }
            Err(e) => {
                warn!(error = %e, "Card connection failed");
                self.transition(PollState::Idle);
                return PollOutcome::Failed(e);
            }
        };

        self.transition(PollState::CardDetected);
        let uid = connection.uid().clone();

        if self.last_uid.as_ref() == Some(&uid) {
            release(connection).await;
            self.transition(PollState::Idle);
            return PollOutcome::Duplicate(uid);
        }

        let read = read_card(&mut connection, &self.layout).await;
        release(connection).await;
        drop(transport);

        let (reservation, email) = match read {
            Ok(found) => found,
            Err(e) => {
                warn!(uid = %uid, error = %e, "Reading card failed");
                self.transition(PollState::Idle);
                return PollOutcome::Failed(e);
            }
        };

        info!(
            uid = %uid,
            reservation = ?reservation.as_ref().map(ToString::to_string),
            email = ?email.as_ref().map(GuestEmail::as_str),
            "Card tapped"
        );

        self.last_uid = Some(uid.clone());
        self.transition(PollState::Delivering);

        let event = CardEvent {
            uid: uid.clone(),
            reservation,
            email,
            tapped_at: Utc::now(),
        };
        match AssertUnwindSafe(self.handler.handle_card(event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(uid = %uid, error = %e, "Card handler failed"),
            Err(_) => error!(uid = %uid, "Card handler panicked"),
        }

        self.transition(PollState::Idle);
        PollOutcome::Delivered(uid)
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(interval = ?self.config.poll_interval, "Card polling started");
        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };
            trace!(?outcome, "Poll cycle finished");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }
        info!("Card polling stopped");
    }
}

async fn release<C: CardConnection>(connection: C) {
    if let Err(e) = connection.release().await {
        warn!(error = %e, "Releasing card failed");
    }
}

/// Read every region the layout needs, then decode.
async fn read_card<C: CardConnection>(
    connection: &mut C,
    layout: &AnyRecordLayout,
) -> std::result::Result<(Option<Reservation>, Option<GuestEmail>), HardwareError> {
    let mut image = CardImage::new();

    let header = layout.header_region();
    image.insert(header.offset, connection.read(header.offset, header.len).await?);

    let regions = layout.reservation_regions(&image);
    for region in regions {
        image.insert(region.offset, connection.read(region.offset, region.len).await?);
    }
    let regions = layout.email_regions(&image);
    for region in regions {
        if !image.covers(region) {
            image.insert(region.offset, connection.read(region.offset, region.len).await?);
        }
    }

    Ok((layout.decode_reservation(&image), layout.decode_email(&image)))
}
