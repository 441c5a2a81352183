//! Guest session orchestration.
//!
//! The controller reacts to card taps from the poller and to actions from the
//! UI shell, drives the reservation API, and asks the writer to put the
//! result on the card. It tells the UI what to show through a [`Navigator`].

use crate::{
    config::ControllerConfig,
    error::{ControllerError, Result},
    navigation::{AttractionChoice, Navigator, Route},
    poller::{CardEvent, CardHandler},
    writer::CardWriter,
};
use chrono::{DateTime, Utc};
use kiosk_core::{GuestEmail, Reservation, TagUid, constants::MAX_WAIT_TIME_MINUTES};
use kiosk_hardware::CardTransport;
use kiosk_network::ReservationApi;
use kiosk_protocol::RecordLayout;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// A reservation accepted by the server, shaped for the card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedReservation {
    /// Server-side attraction id.
    pub ride_id: String,
    pub confirmation_id: Option<String>,
    pub reservation: Reservation,
    pub reserved_at: DateTime<Utc>,
}

/// Result of [`KioskController::confirm_and_write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub confirmed: ConfirmedReservation,
    /// `false` when the server accepted the reservation but the card write
    /// failed.
    pub card_written: bool,
}

/// State for the guest currently at the kiosk.
#[derive(Debug, Default)]
struct Session {
    last_tag: Option<TagUid>,
    device_id: Option<String>,
    email: Option<GuestEmail>,
    existing_reservation: Option<Reservation>,
    attractions: Vec<AttractionChoice>,
    pending: Option<ConfirmedReservation>,
}

/// Kiosk controller.
///
/// Shared between the poller (as its [`CardHandler`]) and the UI shell, so
/// every operation takes `&self`.
#[derive(Debug)]
pub struct KioskController<A, T> {
    api: A,
    writer: CardWriter<T>,
    navigator: Navigator,
    config: ControllerConfig,
    session: Mutex<Session>,
}

impl<A, T> KioskController<A, T>
where
    A: ReservationApi,
    T: CardTransport,
{
    pub fn new(api: A, writer: CardWriter<T>, navigator: Navigator, config: ControllerConfig) -> Self {
        Self {
            api,
            writer,
            navigator,
            config,
            session: Mutex::default(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// UID of the card that started the current session.
    pub fn last_tag(&self) -> Option<TagUid> {
        self.session().last_tag.clone()
    }

    /// Reservation found on the card, while the replace prompt is pending.
    pub fn existing_reservation(&self) -> Option<Reservation> {
        self.session().existing_reservation.clone()
    }

    /// Show the error screen for `err` and hand it back.
    fn fail(&self, err: ControllerError) -> ControllerError {
        error!(error = %err, "Kiosk operation failed");
        self.navigator.navigate(Route::Error {
            message: err.guest_message(),
        });
        err
    }

    /// Handle a card delivered by the poller.
    ///
    /// Ignored while a write is in progress or when the card already started
    /// the current session. Otherwise the guest is logged in with the email
    /// stored on the card (the UID stands in for the password) and sent to
    /// the replace prompt if the card already holds a reservation, or to
    /// attraction selection if it does not.
    ///
    /// # Errors
    ///
    /// `CardNotRegistered` when the card has no email, API errors from login
    /// or listing. The error screen is shown in every case.
    pub async fn on_card_poll(&self, event: CardEvent) -> Result<()> {
        if self.writer.is_writing() {
            debug!(uid = %event.uid, "Skipping card poll during write");
            return Ok(());
        }

        {
            let mut session = self.session();
            if session.last_tag.as_ref() == Some(&event.uid) {
                return Ok(());
            }
            *session = Session {
                last_tag: Some(event.uid.clone()),
                ..Session::default()
            };
        }

        info!(uid = %event.uid, tapped_at = %event.tapped_at, "New guest session");
        self.navigator.navigate(Route::Processing);

        self.start_session(event).await.map_err(|e| self.fail(e))
    }

    async fn start_session(&self, event: CardEvent) -> Result<()> {
        let Some(email) = event.email else {
            return Err(ControllerError::CardNotRegistered {
                uid: event.uid.to_hex(),
            });
        };

        let device_id = self.api.login(email.as_str(), &event.uid.to_hex()).await?;
        info!(user = %email, "Guest logged in");

        {
            let mut session = self.session();
            session.device_id = Some(device_id);
            session.email = Some(email);
        }

        match event.reservation.filter(Reservation::has_ride) {
            Some(existing) => {
                info!(reservation = %existing, "Card already holds a reservation");
                self.session().existing_reservation = Some(existing.clone());
                self.navigator.navigate(Route::ReplacePrompt {
                    reservation: existing,
                });
            }
            None => {
                let attractions = self.load_attractions().await?;
                self.navigator.navigate(Route::Select { attractions });
            }
        }
        Ok(())
    }

    /// Attractions sorted by name, numbered in that order.
    ///
    /// The number is the on-card `attraction_id`; only the first 256 fit.
    ///
    /// # Errors
    ///
    /// API errors from listing.
    pub async fn attractions(&self) -> Result<Vec<AttractionChoice>> {
        self.load_attractions().await.map_err(|e| self.fail(e))
    }

    async fn load_attractions(&self) -> Result<Vec<AttractionChoice>> {
        let mut list = self.api.fetch_attractions().await?;
        list.sort_by_key(|a| a.name.to_lowercase());
        if list.len() > usize::from(u8::MAX) + 1 {
            warn!(count = list.len(), "Too many attractions, extra entries dropped");
        }

        let choices: Vec<AttractionChoice> = (0..=u8::MAX)
            .zip(list)
            .map(|(attraction_id, attraction)| AttractionChoice {
                attraction_id,
                attraction,
            })
            .collect();

        debug!(count = choices.len(), "Attractions loaded");
        self.session().attractions = choices.clone();
        Ok(choices)
    }

    async fn attraction_number(&self, ride_id: &str) -> Result<u8> {
        let find = |choices: &[AttractionChoice]| {
            choices
                .iter()
                .find(|c| c.attraction.id == ride_id)
                .map(|c| c.attraction_id)
        };

        let cached = find(&self.session().attractions);
        if let Some(number) = cached {
            return Ok(number);
        }
        let fresh = self.load_attractions().await?;
        find(&fresh).ok_or_else(|| ControllerError::UnknownAttraction {
            id: ride_id.to_string(),
        })
    }

    /// Reserve `ride_id` for the current guest.
    ///
    /// The result is kept as the pending reservation for
    /// [`KioskController::confirm_and_write`]; nothing is written to the card.
    ///
    /// # Errors
    ///
    /// `NoSession` before a guest logged in, `UnknownAttraction`, and API
    /// errors. The error screen is shown in every case.
    pub async fn make_reservation(&self, ride_id: &str) -> Result<ConfirmedReservation> {
        self.reserve(ride_id).await.map_err(|e| self.fail(e))
    }

    async fn reserve(&self, ride_id: &str) -> Result<ConfirmedReservation> {
        let device_id = self
            .session()
            .device_id
            .clone()
            .ok_or(ControllerError::NoSession)?;

        let attraction_id = self.attraction_number(ride_id).await?;
        let details = self.api.fetch_attraction_details(ride_id).await?;
        let receipt = self
            .api
            .make_reservation(&device_id, ride_id, self.config.guest_count)
            .await?;

        let mut reservation = Reservation::new(
            attraction_id,
            &details.data.name,
            details.data.wait_time_mins.min(MAX_WAIT_TIME_MINUTES),
        )
        .with_command_sequence(rand::random());
        reservation
            .ride_name
            .truncate(self.writer.layout().max_ride_name_len());

        let confirmed = ConfirmedReservation {
            ride_id: ride_id.to_string(),
            confirmation_id: receipt.confirmation_id,
            reservation,
            reserved_at: Utc::now(),
        };
        info!(
            ride_id,
            reservation = %confirmed.reservation,
            confirmation = ?confirmed.confirmation_id,
            "Reservation made"
        );

        self.session().pending = Some(confirmed.clone());
        Ok(confirmed)
    }

    /// Finalize the reservation for `ride_id` and write it to the card.
    ///
    /// A reservation already made for the same ride by
    /// [`KioskController::make_reservation`] is reused; otherwise one is made
    /// now. The guest email is written back alongside it.
    ///
    /// # Errors
    ///
    /// Only reservation errors. A failed card write is reported through
    /// [`WriteOutcome::card_written`].
    pub async fn confirm_and_write(&self, ride_id: &str) -> Result<WriteOutcome> {
        let pending = self
            .session()
            .pending
            .clone()
            .filter(|p| p.ride_id == ride_id);
        let confirmed = match pending {
            Some(confirmed) => confirmed,
            None => self.reserve(ride_id).await.map_err(|e| self.fail(e))?,
        };

        let email = self.session().email.clone();
        let card_written = self
            .writer
            .write(&confirmed.reservation, email.as_ref())
            .await;

        // Product decision: the reservation exists server-side whatever
        // happened to the card, so the guest still sees the success screen.
        // `card_written` lets the UI warn that the card was not updated.
        if !card_written {
            error!(
                ride_id,
                confirmation = ?confirmed.confirmation_id,
                "Reservation confirmed but not written to card"
            );
        }

        {
            let mut session = self.session();
            session.pending = None;
            session.existing_reservation = None;
        }

        self.navigator.navigate(Route::Success {
            reservation: confirmed.reservation.clone(),
            confirmation_id: confirmed.confirmation_id.clone(),
            card_written,
        });
        Ok(WriteOutcome {
            confirmed,
            card_written,
        })
    }

    /// Answer the "replace existing reservation?" prompt.
    ///
    /// `true` moves on to attraction selection; `false` ends the session.
    ///
    /// # Errors
    ///
    /// `NothingToReplace` without a pending prompt, API errors from listing.
    pub async fn answer_replace_prompt(&self, replace: bool) -> Result<()> {
        if !replace {
            info!("Guest kept existing reservation");
            self.end_session();
            return Ok(());
        }

        if self.session().existing_reservation.is_none() {
            return Err(self.fail(ControllerError::NothingToReplace));
        }
        let attractions = self.attractions().await?;
        self.navigator.navigate(Route::Select { attractions });
        Ok(())
    }

    /// Forget the current guest and return to the welcome screen.
    ///
    /// The same card can start a new session afterwards.
    pub fn end_session(&self) {
        *self.session() = Session::default();
        info!("Session ended");
        self.navigator.navigate(Route::Welcome);
    }
}

impl<A, T> CardHandler for KioskController<A, T>
where
    A: ReservationApi,
    T: CardTransport,
{
    async fn handle_card(&self, event: CardEvent) -> Result<()> {
        self.on_card_poll(event).await
    }
}
