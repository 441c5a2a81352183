//! Guest sessions driven through the controller against a simulated reader
//! and the mock reservation API.

use chrono::Utc;
use kiosk_controller::{
    CardEvent, CardPoller, CardWriter, ControllerConfig, ControllerError, KioskController,
    Navigator, PollerConfig, ReaderGate, Route,
};
use kiosk_core::{GuestEmail, Reservation, TagUid};
use kiosk_hardware::{
    CardConnection, CardTransport, TransportConfig,
    simulated::{SimulatedCard, SimulatedReader, SimulatedReaderHandle},
    transport::AnyCardTransport,
};
use kiosk_network::{ApiError, Attraction, MOCK_CONFIRMATION_ID, MockReservationApi};
use kiosk_protocol::{AnyRecordLayout, CardFormat, CardImage, RecordLayout};
use rstest::rstest;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};
use tokio_util::sync::CancellationToken;

type Transport = AnyCardTransport<SimulatedReader>;
type Controller = KioskController<MockReservationApi, Transport>;

const UID: &str = "04A1B2C3D4E5F6";

fn uid() -> TagUid {
    TagUid::from_hex(UID).unwrap()
}

fn email() -> GuestEmail {
    GuestEmail::new("guest@example.com").unwrap()
}

fn attraction(id: &str, name: &str, wait: u16) -> Attraction {
    Attraction {
        id: id.to_string(),
        name: name.to_string(),
        wait_time_minutes: wait,
        image_url: None,
    }
}

fn park() -> MockReservationApi {
    MockReservationApi::with_attractions(vec![
        attraction("r-flume", "log Flume", 25),
        attraction("r-coaster", "Big Coaster", 40),
        attraction("r-carousel", "Carousel", 5),
    ])
}

struct Kiosk {
    controller: Arc<Controller>,
    gate: Arc<ReaderGate<Transport>>,
    handle: SimulatedReaderHandle,
    routes: UnboundedReceiver<Route>,
    layout: AnyRecordLayout,
}

fn kiosk(format: CardFormat, api: MockReservationApi) -> Kiosk {
    let (reader, handle) = SimulatedReader::new();
    let config = TransportConfig::default().with_card_timeout(Duration::from_millis(500));
    let gate = Arc::new(ReaderGate::new(AnyCardTransport::new(format, reader, config)));
    let layout = AnyRecordLayout::for_format(format);
    let (navigator, routes) = Navigator::channel();

    let controller = KioskController::new(
        api,
        CardWriter::new(Arc::clone(&gate), layout),
        navigator,
        ControllerConfig::default(),
    );
    Kiosk {
        controller: Arc::new(controller),
        gate,
        handle,
        routes,
        layout,
    }
}

impl Kiosk {
    fn drain(&mut self) -> Vec<Route> {
        let mut routes = Vec::new();
        loop {
            match self.routes.try_recv() {
                Ok(route) => routes.push(route),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return routes,
            }
        }
    }

    fn paths(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(Route::path).collect()
    }

    /// Place a registered card holding `reservation` on the reader.
    fn present(&self, format: CardFormat, reservation: &Reservation) {
        let plan = self.layout.encode(reservation, Some(&email())).unwrap();
        self.handle
            .present(SimulatedCard::blank(format, uid()).with_plan(&plan));
    }

    async fn card_contents(&self) -> (Option<Reservation>, Option<GuestEmail>) {
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

fn registered() -> CardEvent {
    CardEvent {
        uid: uid(),
        reservation: None,
        email: Some(email()),
        tapped_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_new_guest_lands_on_sorted_selection() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.controller.on_card_poll(registered()).await.unwrap();

    let routes = kiosk.drain();
    assert_eq!(routes[0], Route::Processing);
    let Route::Select { attractions } = &routes[1] else {
        panic!("expected selection, got {:?}", routes[1]);
    };
    let names: Vec<&str> = attractions.iter().map(|a| a.attraction.name.as_str()).collect();
    assert_eq!(names, ["Big Coaster", "Carousel", "log Flume"]);
    let ids: Vec<u8> = attractions.iter().map(|a| a.attraction_id).collect();
    assert_eq!(ids, [0, 1, 2]);

    // The UID is the password.
    assert_eq!(
        kiosk.controller.api().logins(),
        vec![("guest@example.com".to_string(), UID.to_string())]
    );
    assert_eq!(kiosk.controller.last_tag(), Some(uid()));
}

#[tokio::test]
async fn test_card_without_ride_counts_as_new_guest() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    let event = CardEvent {
        reservation: Some(Reservation::new(0, "", 0)),
        ..registered()
    };
    kiosk.controller.on_card_poll(event).await.unwrap();
    assert_eq!(kiosk.paths(), ["/processing", "/select"]);
}

#[tokio::test]
async fn test_existing_reservation_prompts_for_replace() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    let existing = Reservation::new(1, "Carousel", 5);
    let event = CardEvent {
        reservation: Some(existing.clone()),
        ..registered()
    };
    kiosk.controller.on_card_poll(event).await.unwrap();

    let routes = kiosk.drain();
    assert_eq!(
        routes,
        vec![
            Route::Processing,
            Route::ReplacePrompt {
                reservation: existing.clone()
            }
        ]
    );
    assert_eq!(kiosk.controller.existing_reservation(), Some(existing));

    kiosk.controller.answer_replace_prompt(true).await.unwrap();
    assert_eq!(kiosk.paths(), ["/select"]);
}

#[tokio::test]
async fn test_declining_replace_ends_session() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    let event = CardEvent {
        reservation: Some(Reservation::new(1, "Carousel", 5)),
        ..registered()
    };
    kiosk.controller.on_card_poll(event).await.unwrap();
    kiosk.drain();

    kiosk.controller.answer_replace_prompt(false).await.unwrap();
    assert_eq!(kiosk.paths(), ["/"]);
    assert!(kiosk.controller.last_tag().is_none());
    assert!(kiosk.controller.existing_reservation().is_none());
}

#[tokio::test]
async fn test_replace_without_prompt_is_an_error() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    kiosk.drain();

    let err = kiosk.controller.answer_replace_prompt(true).await.unwrap_err();
    assert!(matches!(err, ControllerError::NothingToReplace));
    assert_eq!(kiosk.paths(), ["/error"]);
}

#[tokio::test]
async fn test_unregistered_card_shows_error() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    let event = CardEvent {
        email: None,
        ..registered()
    };

    let err = kiosk.controller.on_card_poll(event).await.unwrap_err();
    assert!(matches!(err, ControllerError::CardNotRegistered { ref uid } if uid == UID));
    assert_eq!(
        kiosk.drain(),
        vec![
            Route::Processing,
            Route::Error {
                message: "This card is not registered".to_string()
            }
        ]
    );
    assert!(kiosk.controller.api().logins().is_empty());
}

#[tokio::test]
async fn test_login_failure_shows_error() {
    let api = park();
    api.fail_logins("Unexpected action type: forgot_password");
    let mut kiosk = kiosk(CardFormat::Ndef, api);

    let err = kiosk.controller.on_card_poll(registered()).await.unwrap_err();
    assert!(matches!(err, ControllerError::Api(ApiError::Auth { .. })));
    assert_eq!(
        kiosk.drain().last(),
        Some(&Route::Error {
            message: "Login failed: Unexpected action type: forgot_password".to_string()
        })
    );
}

#[tokio::test]
async fn test_repeat_tap_is_ignored_until_session_ends() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    assert_eq!(kiosk.controller.api().logins().len(), 1);
    assert_eq!(kiosk.paths(), ["/processing", "/select"]);

    kiosk.controller.end_session();
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    assert_eq!(kiosk.controller.api().logins().len(), 2);
    assert_eq!(kiosk.paths(), ["/", "/processing", "/select"]);
}

#[tokio::test]
async fn test_tap_ignored_while_writing() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    let gate = Arc::clone(&kiosk.gate);
    let pause = gate.pause();

    kiosk.controller.on_card_poll(registered()).await.unwrap();
    assert!(kiosk.controller.api().logins().is_empty());
    assert!(kiosk.drain().is_empty());
    drop(pause);
}

#[tokio::test]
async fn test_reservation_requires_session() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    let err = kiosk.controller.make_reservation("r-flume").await.unwrap_err();
    assert!(matches!(err, ControllerError::NoSession));
    assert_eq!(kiosk.paths(), ["/error"]);
}

#[tokio::test]
async fn test_unknown_ride_is_rejected() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    kiosk.drain();

    let err = kiosk.controller.make_reservation("r-closed").await.unwrap_err();
    assert!(matches!(err, ControllerError::UnknownAttraction { ref id } if id == "r-closed"));
    assert!(kiosk.controller.api().reservations().is_empty());
}

#[tokio::test]
async fn test_reservation_failure_shows_server_message() {
    let api = park();
    api.fail_reservations("No reservation action available");
    let mut kiosk = kiosk(CardFormat::Ndef, api);
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    kiosk.drain();

    assert!(kiosk.controller.confirm_and_write("r-flume").await.is_err());
    assert_eq!(
        kiosk.drain(),
        vec![Route::Error {
            message: "No reservation action available".to_string()
        }]
    );
}

#[rstest]
#[case(CardFormat::Ndef)]
#[case(CardFormat::Classic)]
#[tokio::test(start_paused = true)]
async fn test_confirm_writes_card(#[case] format: CardFormat) {
    let mut kiosk = kiosk(format, park());
    kiosk.present(format, &Reservation::new(0, "", 0));
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    kiosk.drain();

    let confirmed = kiosk.controller.make_reservation("r-flume").await.unwrap();
    assert_eq!(confirmed.confirmation_id.as_deref(), Some(MOCK_CONFIRMATION_ID));
    assert_eq!(confirmed.reservation.attraction_id, 2);
    assert_eq!(confirmed.reservation.ride_name, "log Flume");
    assert_eq!(confirmed.reservation.wait_time_minutes, 25);

    let outcome = kiosk.controller.confirm_and_write("r-flume").await.unwrap();
    assert!(outcome.card_written);
    assert_eq!(outcome.confirmed, confirmed);

    // The pending reservation was reused.
    assert_eq!(kiosk.controller.api().reservations(), vec!["r-flume".to_string()]);

    assert_eq!(
        kiosk.drain(),
        vec![Route::Success {
            reservation: confirmed.reservation.clone(),
            confirmation_id: Some(MOCK_CONFIRMATION_ID.to_string()),
            card_written: true,
        }]
    );

    let (reservation, card_email) = kiosk.card_contents().await;
    assert_eq!(reservation, Some(confirmed.reservation));
    assert_eq!(card_email, Some(email()));
}

#[tokio::test(start_paused = true)]
async fn test_confirm_without_prior_reservation_reserves() {
    let kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.present(CardFormat::Ndef, &Reservation::new(0, "", 0));
    kiosk.controller.on_card_poll(registered()).await.unwrap();

    let outcome = kiosk.controller.confirm_and_write("r-carousel").await.unwrap();
    assert!(outcome.card_written);
    assert_eq!(outcome.confirmed.reservation.attraction_id, 1);
    assert_eq!(kiosk.controller.api().reservations(), vec!["r-carousel".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_card_still_confirms() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.controller.on_card_poll(registered()).await.unwrap();
    kiosk.drain();

    let outcome = kiosk.controller.confirm_and_write("r-coaster").await.unwrap();
    assert!(!outcome.card_written);
    assert_eq!(outcome.confirmed.ride_id, "r-coaster");

    let routes = kiosk.drain();
    assert!(matches!(
        routes.as_slice(),
        [Route::Success {
            card_written: false,
            ..
        }]
    ));
    assert!(kiosk.gate.try_acquire().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_long_ride_name_is_truncated_to_fit() {
    let long = "The Extraordinarily Long Named Adventure Ride";
    let api = MockReservationApi::with_attractions(vec![attraction("r-long", long, 15)]);
    let kiosk = kiosk(CardFormat::Classic, api);
    kiosk.present(CardFormat::Classic, &Reservation::new(0, "", 0));
    kiosk.controller.on_card_poll(registered()).await.unwrap();

    let outcome = kiosk.controller.confirm_and_write("r-long").await.unwrap();
    assert!(outcome.card_written);
    let max = kiosk.layout.max_ride_name_len();
    assert_eq!(outcome.confirmed.reservation.ride_name, long[..max]);
}

#[tokio::test(start_paused = true)]
async fn test_poller_drives_controller() {
    let mut kiosk = kiosk(CardFormat::Ndef, park());
    kiosk.present(CardFormat::Ndef, &Reservation::new(0, "", 0));

    let poller = CardPoller::new(
        Arc::clone(&kiosk.gate),
        kiosk.layout,
        Arc::clone(&kiosk.controller),
        PollerConfig::default(),
    );
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(poller.run(shutdown.clone()));

    let first = kiosk.routes.recv().await.unwrap();
    assert_eq!(first, Route::Processing);
    let second = kiosk.routes.recv().await.unwrap();
    assert_eq!(second.path(), "/select");

    // The card stays on the reader: no second session.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(kiosk.controller.api().logins().len(), 1);
    assert_eq!(
        kiosk.controller.api().logins()[0].0,
        "guest@example.com".to_string()
    );

    shutdown.cancel();
    running.await.unwrap();
}
