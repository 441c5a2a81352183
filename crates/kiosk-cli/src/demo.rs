//! Demo card for running without a reader.

use kiosk_core::{GuestEmail, Reservation, TagUid};
use kiosk_hardware::simulated::{SimulatedCard, SimulatedReaderHandle};
use kiosk_protocol::{AnyRecordLayout, CardFormat, RecordLayout};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEMO_UID: &str = "04DE110C2A5B80";
pub const DEMO_EMAIL: &str = "mock@example.com";

/// A registered card that can be tapped on and taken off the simulated
/// reader from the shell. It keeps whatever was written to it.
#[derive(Debug)]
pub struct DemoCard {
    handle: SimulatedReaderHandle,
    parked: Mutex<Option<SimulatedCard>>,
}

impl DemoCard {
    /// Seed a card carrying only the demo guest email.
    pub fn new(handle: SimulatedReaderHandle, format: CardFormat) -> anyhow::Result<Self> {
        let uid = TagUid::from_hex(DEMO_UID)?;
        let email = GuestEmail::new(DEMO_EMAIL)?;
        let plan = AnyRecordLayout::for_format(format).encode(&Reservation::new(0, "", 0), Some(&email))?;

        Ok(Self {
            handle,
            parked: Mutex::new(Some(SimulatedCard::blank(format, uid).with_plan(&plan))),
        })
    }

    fn parked(&self) -> MutexGuard<'_, Option<SimulatedCard>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put the card on the reader. Returns `false` if it already is.
    pub fn tap(&self) -> bool {
        match self.parked().take() {
            Some(card) => {
                self.handle.present(card);
                true
            }
            None => false,
        }
    }

    /// Take the card off the reader. Returns `false` if it was not there.
    pub fn remove(&self) -> bool {
        match self.handle.remove() {
            Some(card) => {
                *self.parked() = Some(card);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_hardware::simulated::SimulatedReader;

    #[test]
    fn test_tap_and_remove() {
        let (_reader, handle) = SimulatedReader::new();
        let demo = DemoCard::new(handle.clone(), CardFormat::Classic).unwrap();
        assert!(!handle.is_card_present());

        assert!(demo.tap());
        assert!(!demo.tap());
        assert_eq!(handle.card().unwrap().uid().to_hex(), DEMO_UID);

        assert!(demo.remove());
        assert!(!demo.remove());
        assert!(!handle.is_card_present());
        assert!(demo.tap());
    }

    #[test]
    fn test_card_keeps_writes() {
        let (_reader, handle) = SimulatedReader::new();
        let demo = DemoCard::new(handle.clone(), CardFormat::Ndef).unwrap();
        demo.tap();

        let mut card = handle.remove().unwrap();
        card.poke(0x300, b"written");
        handle.present(card);

        demo.remove();
        demo.tap();
        assert_eq!(&handle.card().unwrap().memory()[0x300..0x307], b"written");
    }
}
