//! Poller and writer sharing one simulated reader.

use kiosk_controller::{
    CardEvent, CardHandler, CardPoller, CardWriter, ControllerError, PollOutcome, PollState,
    PollerConfig, ReaderGate,
};
use kiosk_core::{GuestEmail, Reservation, TagUid};
use kiosk_hardware::{
    CardConnection, CardTransport, TransportConfig,
    simulated::{SimulatedCard, SimulatedReader, SimulatedReaderHandle},
    transport::AnyCardTransport,
};
use kiosk_protocol::{AnyRecordLayout, CardFormat, CardImage, RecordLayout};
use rstest::rstest;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

type Transport = AnyCardTransport<SimulatedReader>;

fn uid(hex: &str) -> TagUid {
    TagUid::from_hex(hex).unwrap()
}

fn email() -> GuestEmail {
    GuestEmail::new("guest@example.com").unwrap()
}

/// Records every event; optionally fails or panics.
#[derive(Debug, Default)]
struct Recorder {
    events: Mutex<Vec<CardEvent>>,
    panic_on_first: bool,
}

impl Recorder {
    fn events(&self) -> Vec<CardEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CardHandler for Recorder {
    async fn handle_card(&self, event: CardEvent) -> kiosk_controller::Result<()> {
        let first = {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            events.len() == 1
        };
        if first && self.panic_on_first {
            panic!("handler blew up");
        }
        Err(ControllerError::NoSession)
    }
}

struct Rig {
    gate: Arc<ReaderGate<Transport>>,
    handle: SimulatedReaderHandle,
    layout: AnyRecordLayout,
}

fn rig(format: CardFormat) -> Rig {
    let (reader, handle) = SimulatedReader::new();
    let config = TransportConfig::default().with_card_timeout(Duration::from_millis(1_000));
    Rig {
        gate: Arc::new(ReaderGate::new(AnyCardTransport::new(format, reader, config))),
        handle,
        layout: AnyRecordLayout::for_format(format),
    }
}

impl Rig {
    fn poller(&self, handler: Arc<Recorder>) -> CardPoller<Transport, Recorder> {
        CardPoller::new(
            Arc::clone(&self.gate),
            self.layout,
            handler,
            PollerConfig {
                poll_interval: Duration::from_millis(100),
            },
        )
    }

    fn writer(&self) -> CardWriter<Transport> {
        CardWriter::new(Arc::clone(&self.gate), self.layout)
    }

    async fn read_back(&self) -> (Option<Reservation>, Option<GuestEmail>) {
        let mut transport = self.gate.acquire().await;
        let mut connection = transport.connect().await.unwrap();

        let mut image = CardImage::new();
        let header = self.layout.header_region();
        image.insert(header.offset, connection.read(header.offset, header.len).await.unwrap());
        for region in self.layout.reservation_regions(&image) {
            let bytes = connection.read(region.offset, region.len).await.unwrap();
            image.insert(region.offset, bytes);
        }
        for region in self.layout.email_regions(&image) {
            if !image.covers(region) {
                let bytes = connection.read(region.offset, region.len).await.unwrap();
                image.insert(region.offset, bytes);
            }
        }
        connection.release().await.unwrap();
        (
            self.layout.decode_reservation(&image),
            self.layout.decode_email(&image),
        )
    }
}

#[rstest]
#[case(CardFormat::Ndef)]
#[case(CardFormat::Classic)]
#[tokio::test(start_paused = true)]
async fn test_card_delivered_once_while_on_reader(#[case] format: CardFormat) {
    let rig = rig(format);
    let reservation = Reservation::new(3, "Log Flume", 20);
    let plan = rig.layout.encode(&reservation, Some(&email())).unwrap();
    rig.handle
        .present(SimulatedCard::blank(format, uid("04A1B2C3")).with_plan(&plan));

    let recorder = Arc::new(Recorder::default());
    let mut poller = rig.poller(Arc::clone(&recorder));

    assert!(matches!(poller.poll_once().await, PollOutcome::Delivered(_)));
    assert!(matches!(poller.poll_once().await, PollOutcome::Duplicate(_)));
    assert_eq!(poller.state(), PollState::Idle);
    assert_eq!(rig.handle.open_channels(), 0);

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid, uid("04A1B2C3"));
    assert_eq!(events[0].reservation.as_ref(), Some(&reservation));
    assert_eq!(events[0].email, Some(email()));
}

#[tokio::test(start_paused = true)]
async fn test_same_card_delivered_again_after_removal() {
    let rig = rig(CardFormat::Ndef);
    let recorder = Arc::new(Recorder::default());
    let mut poller = rig.poller(Arc::clone(&recorder));

    rig.handle.present(SimulatedCard::blank_ndef(uid("04A1B2C3")));
    assert!(matches!(poller.poll_once().await, PollOutcome::Delivered(_)));

    let card = rig.handle.remove().unwrap();
    assert!(matches!(poller.poll_once().await, PollOutcome::NoCard));
    assert!(poller.last_uid().is_none());

    rig.handle.present(card);
    assert!(matches!(poller.poll_once().await, PollOutcome::Delivered(_)));
    assert_eq!(recorder.events().len(), 2);

    // A blank card has neither reservation nor email.
    assert_eq!(recorder.events()[0].reservation, None);
    assert_eq!(recorder.events()[0].email, None);
}

#[tokio::test(start_paused = true)]
async fn test_paused_poll_never_touches_reader() {
    let rig = rig(CardFormat::Ndef);
    rig.handle.present(SimulatedCard::blank_ndef(uid("04A1B2C3")));
    let recorder = Arc::new(Recorder::default());
    let mut poller = rig.poller(Arc::clone(&recorder));

    let pause = rig.gate.pause();
    for _ in 0..3 {
        assert!(matches!(poller.poll_once().await, PollOutcome::Paused));
    }
    assert_eq!(rig.handle.wait_calls(), 0);
    assert_eq!(rig.handle.transmit_count(), 0);
    assert!(recorder.events().is_empty());

    drop(pause);
    assert!(matches!(poller.poll_once().await, PollOutcome::Delivered(_)));
}

#[tokio::test(start_paused = true)]
async fn test_locked_reader_skips_poll() {
    let rig = rig(CardFormat::Ndef);
    let recorder = Arc::new(Recorder::default());
    let mut poller = rig.poller(recorder);

    let held = rig.gate.acquire().await;
    assert!(matches!(poller.poll_once().await, PollOutcome::Busy));
    drop(held);
    assert_eq!(rig.handle.wait_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_polls_during_write_are_skipped() {
    let rig = rig(CardFormat::Ndef);
    rig.handle.present(SimulatedCard::blank_ndef(uid("04A1B2C3")));
    rig.handle.set_latency(Duration::from_millis(50));

    let writer = Arc::new(rig.writer());
    let write = {
        let writer = Arc::clone(&writer);
        tokio::spawn(async move {
            writer
                .write(&Reservation::new(1, "Coaster", 10), Some(&email()))
                .await
        })
    };

    sleep(Duration::from_millis(10)).await;
    assert!(writer.is_writing());
    let wait_calls = rig.handle.wait_calls();

    let recorder = Arc::new(Recorder::default());
    let mut poller = rig.poller(Arc::clone(&recorder));
    while writer.is_writing() {
        assert!(matches!(poller.poll_once().await, PollOutcome::Paused));
        assert_eq!(rig.handle.wait_calls(), wait_calls);
        sleep(Duration::from_millis(20)).await;
    }

    assert!(write.await.unwrap());
    assert!(recorder.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_write_interrupts_wait_for_card() {
    let rig = rig(CardFormat::Ndef);
    let recorder = Arc::new(Recorder::default());
    let mut poller = rig.poller(Arc::clone(&recorder));

    let polling = tokio::spawn(async move {
        let outcome = poller.poll_once().await;
        (poller, outcome)
    });
    sleep(Duration::from_millis(100)).await;
    assert!(!polling.is_finished());

    let writer = Arc::new(rig.writer());
    let write = {
        let writer = Arc::clone(&writer);
        tokio::spawn(async move { writer.write(&Reservation::new(2, "Flume", 5), None).await })
    };

    let (poller, outcome) = polling.await.unwrap();
    assert!(matches!(outcome, PollOutcome::Paused));
    assert_eq!(poller.state(), PollState::Idle);

    rig.handle.present(SimulatedCard::blank_ndef(uid("04A1B2C3")));
    assert!(write.await.unwrap());
    assert!(!writer.is_writing());

    let (reservation, _) = rig.read_back().await;
    assert_eq!(reservation.unwrap().ride_name, "Flume");
}

#[tokio::test(start_paused = true)]
async fn test_handler_panic_does_not_stop_polling() {
    let rig = rig(CardFormat::Ndef);
    let recorder = Arc::new(Recorder {
        panic_on_first: true,
        ..Recorder::default()
    });
    let poller = rig.poller(Arc::clone(&recorder));
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(poller.run(shutdown.clone()));

    rig.handle.present(SimulatedCard::blank_ndef(uid("04A1B2C3")));
    sleep(Duration::from_millis(500)).await;
    rig.handle.remove();
    sleep(Duration::from_millis(2_500)).await;
    rig.handle.present(SimulatedCard::blank_ndef(uid("04D4E5F6")));
    sleep(Duration::from_millis(500)).await;

    shutdown.cancel();
    running.await.unwrap();

    let uids: Vec<TagUid> = recorder.events().into_iter().map(|e| e.uid).collect();
    assert_eq!(uids, vec![uid("04A1B2C3"), uid("04D4E5F6")]);
}

#[rstest]
#[case(CardFormat::Ndef)]
#[case(CardFormat::Classic)]
#[tokio::test(start_paused = true)]
async fn test_writer_roundtrip(#[case] format: CardFormat) {
    let rig = rig(format);
    rig.handle.present(SimulatedCard::blank(format, uid("04A1B2C3")));
    let writer = rig.writer();

    let reservation = Reservation::new(9, "Haunted Mansion", 45).with_command_sequence(0x21);
    assert!(writer.write(&reservation, Some(&email())).await);
    assert!(!writer.is_writing());
    assert_eq!(rig.handle.open_channels(), 0);

    let (read, email_read) = rig.read_back().await;
    assert_eq!(read, Some(reservation));
    assert_eq!(email_read, Some(email()));
}

#[tokio::test(start_paused = true)]
async fn test_writer_without_card_fails_and_unpauses() {
    let rig = rig(CardFormat::Ndef);
    let writer = rig.writer();

    assert!(!writer.write(&Reservation::new(1, "Coaster", 10), None).await);
    assert!(!writer.is_writing());
    assert!(rig.gate.try_acquire().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_writer_rejects_oversized_name_without_touching_card() {
    let rig = rig(CardFormat::Classic);
    rig.handle
        .present(SimulatedCard::blank_classic(uid("04A1B2C3")));
    let writer = rig.writer();

    let name = "X".repeat(rig.layout.max_ride_name_len() + 1);
    assert!(!writer.write(&Reservation::new(1, &name, 10), None).await);
    assert_eq!(rig.handle.transmit_count(), 0);
}
