//! PC/SC reader support.
//!
//! The pcsc crate is blocking, so every driver call runs on tokio's blocking
//! pool. A reader is chosen by substring match on its name (for example
//! `"Slot:CL"` for the contactless slot of a dual-interface reader), or the
//! first reader when no filter is configured.

use crate::{
    error::{HardwareError, Result},
    traits::{ApduChannel, CardReader},
    types::ReaderInfo,
};
use kiosk_protocol::{ApduCommand, ApduResponse};
use pcsc::{Card, Context, Disposition, MAX_BUFFER_SIZE, Protocols, Scope, ShareMode};
use std::{ffi::CString, sync::Arc, time::Duration};
use tokio::{
    task,
    time::{Instant, sleep},
};
use tracing::{debug, info, warn};

/// A PC/SC reader selected by name.
pub struct PcscReader {
    context: Context,
    reader: CString,
}

impl std::fmt::Debug for PcscReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscReader")
            .field("reader", &self.reader)
            .finish()
    }
}

impl PcscReader {
    /// Establish a PC/SC context and pick a reader.
    ///
    /// # Errors
    ///
    /// - `Connection` if the PC/SC service is unavailable
    /// - `ReaderNotFound` if no reader name contains `filter`
    pub fn open(filter: Option<&str>) -> Result<Self> {
        let context = Context::establish(Scope::User)?;
        let readers = context.list_readers_owned()?;

        let reader = readers
            .into_iter()
            .find(|name| match filter {
                Some(filter) => name.to_string_lossy().contains(filter),
                None => true,
            })
            .ok_or_else(|| HardwareError::reader_not_found(filter.unwrap_or("<any>")))?;

        info!(reader = %reader.to_string_lossy(), "Using PC/SC reader");
        Ok(Self { context, reader })
    }

    /// Names of every connected reader.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the PC/SC service is unavailable.
    pub fn list() -> Result<Vec<String>> {
        let context = Context::establish(Scope::User)?;
        Ok(context
            .list_readers_owned()?
            .into_iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }
}

impl CardReader for PcscReader {
    type Channel = PcscChannel;

    async fn wait_for_card(
        &mut self,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<Self::Channel> {
        let deadline = Instant::now() + timeout;

        loop {
            let context = self.context.clone();
            let reader = self.reader.clone();
            let attempt = task::spawn_blocking(move || {
                context.connect(&reader, ShareMode::Shared, Protocols::ANY)
            })
            .await
            .map_err(|e| HardwareError::connection(format!("PC/SC task failed: {e}")))?;

            match attempt {
                Ok(card) => {
                    debug!("Card connected");
                    return Ok(PcscChannel {
                        card: Arc::new(card),
                    });
                }
                Err(pcsc::Error::NoSmartcard) | Err(pcsc::Error::RemovedCard) => {
                    if Instant::now() >= deadline {
                        return Err(HardwareError::NoCardPresent);
                    }
                    sleep(retry_interval.min(deadline.saturating_duration_since(Instant::now())))
                        .await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn reader_info(&self) -> ReaderInfo {
        ReaderInfo::new(self.reader.to_string_lossy(), "pcsc")
    }
}

/// A connected card on a PC/SC reader.
#[derive(Debug)]
pub struct PcscChannel {
    card: Arc<Card>,
}

impl ApduChannel for PcscChannel {
    async fn transmit(&mut self, command: &ApduCommand) -> Result<ApduResponse> {
        let card = Arc::clone(&self.card);
        let bytes = command.to_bytes();

        let raw = task::spawn_blocking(move || {
            let mut buffer = [0u8; MAX_BUFFER_SIZE];
            card.transmit(&bytes, &mut buffer).map(<[u8]>::to_vec)
        })
        .await
        .map_err(|e| HardwareError::connection(format!("PC/SC task failed: {e}")))??;

        Ok(ApduResponse::parse(&raw)?)
    }

    async fn disconnect(self) -> Result<()> {
        match Arc::try_unwrap(self.card) {
            Ok(card) => task::spawn_blocking(move || {
                card.disconnect(Disposition::LeaveCard)
                    .map_err(|(_, e)| HardwareError::from(e))
            })
            .await
            .map_err(|e| HardwareError::connection(format!("PC/SC task failed: {e}")))?,
            Err(_) => {
                warn!("Card handle still shared, dropping instead of disconnecting");
                Ok(())
            }
        }
    }
}
