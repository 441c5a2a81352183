//! On-demand reservation writes.

use crate::gate::ReaderGate;
use kiosk_core::{GuestEmail, Reservation};
use kiosk_hardware::{CardConnection, CardTransport, HardwareError};
use kiosk_protocol::{AnyRecordLayout, RecordLayout, WritePlan};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Writes reservations to the card on the reader.
///
/// The poller is paused for the whole write and every write opens its own
/// connection. Failures are logged and reported as `false`; nothing is
/// retried, the guest taps again.
#[derive(Debug)]
pub struct CardWriter<T> {
    gate: Arc<ReaderGate<T>>,
    layout: AnyRecordLayout,
}

impl<T: CardTransport> CardWriter<T> {
    pub fn new(gate: Arc<ReaderGate<T>>, layout: AnyRecordLayout) -> Self {
        Self { gate, layout }
    }

    pub fn layout(&self) -> AnyRecordLayout {
        self.layout
    }

    /// Returns `true` while a write holds the reader.
    pub fn is_writing(&self) -> bool {
        self.gate.is_paused()
    }

    /// Write `reservation` (and the guest email, if given) to the card.
    ///
    /// The header is cleared first and written last, so an interrupted write
    /// leaves a card that reads as blank.
    pub async fn write(&self, reservation: &Reservation, email: Option<&GuestEmail>) -> bool {
        let plan = match self.layout.encode(reservation, email) {
            Ok(plan) => plan,
            Err(e) => {
                error!(reservation = %reservation, error = %e, "Reservation does not fit the card");
                return false;
            }
        };

        let _pause = self.gate.pause();
        let mut transport = self.gate.acquire().await;

        let mut connection = match transport.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                error!(error = %e, "No card to write to");
                return false;
            }
        };
        let uid = connection.uid().clone();

        let result = apply(&mut connection, &plan).await;
        if let Err(e) = connection.release().await {
            warn!(uid = %uid, error = %e, "Releasing card after write failed");
        }

        match result {
            Ok(()) => {
                info!(
                    uid = %uid,
                    reservation = %reservation,
                    bytes = plan.total_bytes(),
                    "Reservation written to card"
                );
                true
            }
            Err(e) => {
                error!(uid = %uid, error = %e, "Writing reservation failed");
                false
            }
        }
    }
}

async fn apply<C: CardConnection>(connection: &mut C, plan: &WritePlan) -> Result<(), HardwareError> {
    for step in plan.steps() {
        connection.write(step.offset, &step.bytes).await?;
    }
    Ok(())
}
