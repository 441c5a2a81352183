use super::card::{CardSession, SimulatedCard};
use crate::{
    error::{HardwareError, Result},
    traits::{ApduChannel, CardReader},
    types::ReaderInfo,
};
use kiosk_core::TagUid;
use kiosk_protocol::{ApduCommand, ApduResponse, StatusWord};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::{Instant, sleep};
use tracing::debug;

#[derive(Debug, Default)]
struct ReaderState {
    card: Option<SimulatedCard>,
    log: Vec<ApduCommand>,
    faults: VecDeque<Fault>,
    latency: Duration,
    wait_calls: usize,
    open_channels: usize,
    unplugged: bool,
}

/// A queued failure: after `skip` more commands succeed, answer `status`.
#[derive(Debug, Clone, Copy)]
struct Fault {
    skip: usize,
    status: StatusWord,
}

type Shared = Arc<Mutex<ReaderState>>;

fn lock(state: &Shared) -> MutexGuard<'_, ReaderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated reader for development and testing.
///
/// Cards are placed on and removed from the reader through the
/// [`SimulatedReaderHandle`]. Every command transmitted is logged so tests
/// can assert on the exact APDU traffic.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::simulated::{SimulatedCard, SimulatedReader};
/// use kiosk_core::TagUid;
///
/// let (reader, handle) = SimulatedReader::new();
/// let uid = TagUid::from_hex("04A1B2C3").unwrap();
/// handle.present(SimulatedCard::blank_classic(uid));
/// assert!(handle.is_card_present());
/// ```
#[derive(Debug)]
pub struct SimulatedReader {
    name: String,
    state: Shared,
}

impl SimulatedReader {
    /// Create a reader with the default name.
    pub fn new() -> (Self, SimulatedReaderHandle) {
        Self::with_name("Simulated Reader Slot:CL")
    }

    /// Create a reader with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, SimulatedReaderHandle) {
        let state = Shared::default();
        let reader = Self {
            name: name.into(),
            state: Arc::clone(&state),
        };
        (reader, SimulatedReaderHandle { state })
    }
}

impl CardReader for SimulatedReader {
    type Channel = SimulatedChannel;

    async fn wait_for_card(
        &mut self,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<Self::Channel> {
        let deadline = Instant::now() + timeout;
        lock(&self.state).wait_calls += 1;

        loop {
            {
                let mut state = lock(&self.state);
                if state.unplugged {
                    return Err(HardwareError::connection("reader unplugged"));
                }
                if let Some(uid) = state.card.as_ref().map(|c| c.uid().clone()) {
                    state.open_channels += 1;
                    debug!(uid = %uid, reader = %self.name, "Simulated card detected");
                    return Ok(SimulatedChannel {
                        state: Arc::clone(&self.state),
                        uid,
                        session: CardSession::default(),
                        open: true,
                    });
                }
            }

            if Instant::now() >= deadline {
                return Err(HardwareError::NoCardPresent);
            }
            sleep(retry_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    fn reader_info(&self) -> ReaderInfo {
        ReaderInfo::new(self.name.clone(), "simulated")
    }
}

/// Session with the card currently on a [`SimulatedReader`].
#[derive(Debug)]
pub struct SimulatedChannel {
    state: Shared,
    uid: TagUid,
    session: CardSession,
    open: bool,
}

impl ApduChannel for SimulatedChannel {
    async fn transmit(&mut self, command: &ApduCommand) -> Result<ApduResponse> {
        let latency = lock(&self.state).latency;
        if !latency.is_zero() {
            sleep(latency).await;
        }

        let mut state = lock(&self.state);
        if state.unplugged {
            return Err(HardwareError::connection("reader unplugged"));
        }
        state.log.push(command.clone());

        if let Some(fault) = state.faults.front_mut() {
            if fault.skip == 0 {
                let status = fault.status;
                state.faults.pop_front();
                return Ok(ApduResponse::new(Vec::new(), status));
            }
            fault.skip -= 1;
        }

        let uid = &self.uid;
        match state.card.as_mut().filter(|c| c.uid() == uid) {
            Some(card) => Ok(card.execute(&mut self.session, command)),
            None => Err(HardwareError::NotConnected),
        }
    }

    async fn disconnect(mut self) -> Result<()> {
        self.close();
        Ok(())
    }
}

impl SimulatedChannel {
    fn close(&mut self) {
        if self.open {
            self.open = false;
            let mut state = lock(&self.state);
            state.open_channels = state.open_channels.saturating_sub(1);
        }
    }
}

impl Drop for SimulatedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle for controlling a [`SimulatedReader`].
#[derive(Debug, Clone)]
pub struct SimulatedReaderHandle {
    state: Shared,
}

impl SimulatedReaderHandle {
    /// Place a card on the reader, replacing any card already there.
    pub fn present(&self, card: SimulatedCard) {
        lock(&self.state).card = Some(card);
    }

    /// Take the card off the reader, returning it with its memory.
    pub fn remove(&self) -> Option<SimulatedCard> {
        lock(&self.state).card.take()
    }

    pub fn is_card_present(&self) -> bool {
        lock(&self.state).card.is_some()
    }

    /// Snapshot of the card currently on the reader.
    pub fn card(&self) -> Option<SimulatedCard> {
        lock(&self.state).card.clone()
    }

    /// Every command transmitted so far.
    pub fn commands(&self) -> Vec<ApduCommand> {
        lock(&self.state).log.clone()
    }

    pub fn transmit_count(&self) -> usize {
        lock(&self.state).log.len()
    }

    pub fn clear_log(&self) {
        lock(&self.state).log.clear();
    }

    /// Number of `wait_for_card` calls made on the reader.
    pub fn wait_calls(&self) -> usize {
        lock(&self.state).wait_calls
    }

    /// Channels opened and not yet disconnected or dropped.
    pub fn open_channels(&self) -> usize {
        lock(&self.state).open_channels
    }

    /// Let `skip` further commands succeed, then answer the next with `status`.
    pub fn fail_after(&self, skip: usize, status: StatusWord) {
        lock(&self.state).faults.push_back(Fault { skip, status });
    }

    /// Delay every transmit by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).latency = latency;
    }

    /// Simulate unplugging (or replugging) the reader.
    pub fn set_unplugged(&self, unplugged: bool) {
        lock(&self.state).unplugged = unplugged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> TagUid {
        TagUid::from_hex("04A1B2C3").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_card() {
        let (mut reader, handle) = SimulatedReader::new();
        let start = Instant::now();

        let result = reader
            .wait_for_card(Duration::from_secs(10), Duration::from_millis(300))
            .await;

        assert!(matches!(result, Err(HardwareError::NoCardPresent)));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(handle.wait_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_arrives_during_wait() {
        let (mut reader, handle) = SimulatedReader::new();

        let presenter = handle.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1_000)).await;
            presenter.present(SimulatedCard::blank_ndef(uid()));
        });

        let channel = reader
            .wait_for_card(Duration::from_secs(10), Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(handle.open_channels(), 1);
        channel.disconnect().await.unwrap();
        assert_eq!(handle.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_removed_card_breaks_channel() {
        let (mut reader, handle) = SimulatedReader::new();
        handle.present(SimulatedCard::blank_ndef(uid()));

        let mut channel = reader
            .wait_for_card(Duration::from_secs(1), Duration::from_millis(200))
            .await
            .unwrap();
        handle.remove();

        let result = channel.transmit(&ApduCommand::get_uid()).await;
        assert!(matches!(result, Err(HardwareError::NotConnected)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (mut reader, handle) = SimulatedReader::new();
        handle.present(SimulatedCard::blank_ndef(uid()));
        handle.fail_after(1, StatusWord::new(0x6F, 0x00));

        let mut channel = reader
            .wait_for_card(Duration::from_secs(1), Duration::from_millis(200))
            .await
            .unwrap();

        let first = channel.transmit(&ApduCommand::get_uid()).await.unwrap();
        assert!(first.status().is_success());
        let second = channel.transmit(&ApduCommand::get_uid()).await.unwrap();
        assert_eq!(second.status(), StatusWord::new(0x6F, 0x00));
        let third = channel.transmit(&ApduCommand::get_uid()).await.unwrap();
        assert!(third.status().is_success());

        assert_eq!(handle.transmit_count(), 3);
    }

    #[tokio::test]
    async fn test_unplugged_reader() {
        let (mut reader, handle) = SimulatedReader::new();
        handle.set_unplugged(true);

        let result = reader
            .wait_for_card(Duration::from_secs(1), Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(HardwareError::Connection { .. })));
    }
}
