//! The reservation API as the controller sees it.

#![allow(async_fn_in_trait)]

use crate::{
    error::{ApiError, Result},
    models::{ActionDescriptor, Attraction, AttractionData, AttractionDetails, ReservationReceipt},
    session::SessionClient,
    transport::{HttpTransport, JsonTransport},
};
use serde_json::json;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Operations the kiosk needs from the reservation backend.
///
/// Not object-safe; use generics or [`AnyReservationApi`].
pub trait ReservationApi: Send + Sync {
    /// Log a guest in, returning the session token.
    async fn login(&self, username: &str, password: &str) -> Result<String>;

    async fn fetch_attractions(&self) -> Result<Vec<Attraction>>;

    async fn fetch_attraction_details(&self, attraction_id: &str) -> Result<AttractionDetails>;

    async fn make_reservation(
        &self,
        device_id: &str,
        attraction_id: &str,
        guest_count: u8,
    ) -> Result<ReservationReceipt>;
}

impl<T: JsonTransport> ReservationApi for SessionClient<T> {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        SessionClient::login(self, username, password).await
    }

    async fn fetch_attractions(&self) -> Result<Vec<Attraction>> {
        SessionClient::fetch_attractions(self).await
    }

    async fn fetch_attraction_details(&self, attraction_id: &str) -> Result<AttractionDetails> {
        SessionClient::fetch_attraction_details(self, attraction_id).await
    }

    async fn make_reservation(
        &self,
        device_id: &str,
        attraction_id: &str,
        guest_count: u8,
    ) -> Result<ReservationReceipt> {
        SessionClient::make_reservation(self, device_id, attraction_id, guest_count).await
    }
}

/// Device id returned by the offline API's login.
pub const MOCK_DEVICE_ID: &str = "MOCK-DEVICE-ID";

/// Confirmation id of every offline reservation.
pub const MOCK_CONFIRMATION_ID: &str = "MOCK-RESERVATION-001";

#[derive(Debug, Default)]
struct MockState {
    logins: Vec<(String, String)>,
    reservations: Vec<String>,
    login_error: Option<String>,
    reservation_error: Option<String>,
}

/// Offline API with canned attractions.
///
/// Used when the kiosk runs without a backend, and by tests to script
/// login and reservation failures.
///
/// # Examples
///
/// ```
/// use kiosk_network::{MockReservationApi, ReservationApi};
///
/// #[tokio::main]
/// async fn main() -> kiosk_network::Result<()> {
///     let api = MockReservationApi::new();
///     api.login("guest@example.com", "04A1B2C3").await?;
///     let attractions = api.fetch_attractions().await?;
///     assert_eq!(attractions[0].name, "Mock Coaster");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReservationApi {
    attractions: Vec<Attraction>,
    state: Mutex<MockState>,
}

impl Default for MockReservationApi {
    fn default() -> Self {
        Self::with_attractions(vec![
            Attraction {
                id: "mock1".to_string(),
                name: "Mock Coaster".to_string(),
                wait_time_minutes: 5,
                image_url: None,
            },
            Attraction {
                id: "mock2".to_string(),
                name: "Mock Flume".to_string(),
                wait_time_minutes: 12,
                image_url: None,
            },
        ])
    }
}

impl MockReservationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attractions(attractions: Vec<Attraction>) -> Self {
        Self {
            attractions,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later login fail with `message`.
    pub fn fail_logins(&self, message: impl Into<String>) {
        self.state().login_error = Some(message.into());
    }

    /// Make every later reservation fail with `message`.
    pub fn fail_reservations(&self, message: impl Into<String>) {
        self.state().reservation_error = Some(message.into());
    }

    /// `(username, password)` of every login attempt.
    pub fn logins(&self) -> Vec<(String, String)> {
        self.state().logins.clone()
    }

    /// Attraction ids of every successful reservation.
    pub fn reservations(&self) -> Vec<String> {
        self.state().reservations.clone()
    }
}

impl ReservationApi for MockReservationApi {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        let mut state = self.state();
        state
            .logins
            .push((username.to_string(), password.to_string()));
        match &state.login_error {
            Some(message) => Err(ApiError::auth(message.clone())),
            None => {
                info!(user = username, "Mock login");
                Ok(MOCK_DEVICE_ID.to_string())
            }
        }
    }

    async fn fetch_attractions(&self) -> Result<Vec<Attraction>> {
        Ok(self.attractions.clone())
    }

    async fn fetch_attraction_details(&self, attraction_id: &str) -> Result<AttractionDetails> {
        let (name, wait) = self
            .attractions
            .iter()
            .find(|a| a.id == attraction_id)
            .map(|a| (a.name.clone(), a.wait_time_minutes))
            .unwrap_or_else(|| ("Mock Ride".to_string(), 0));

        let data: AttractionData = serde_json::from_value(json!({
            "id": attraction_id,
            "name": name,
            "wait_time_mins": wait,
        }))?;
        Ok(AttractionDetails {
            data,
            actions: vec![ActionDescriptor {
                kind: "reserve".to_string(),
                href: "https://mock.api/reserve".to_string(),
                method: "post".to_string(),
            }],
        })
    }

    async fn make_reservation(
        &self,
        _device_id: &str,
        attraction_id: &str,
        _guest_count: u8,
    ) -> Result<ReservationReceipt> {
        let mut state = self.state();
        if let Some(message) = &state.reservation_error {
            return Err(ApiError::reservation(message.clone()));
        }
        state.reservations.push(attraction_id.to_string());
        info!(attraction_id, "Mock reservation");
        Ok(ReservationReceipt::from_body(json!({
            "ride_id": attraction_id,
            "wait_time": 15,
            "confirmation_id": MOCK_CONFIRMATION_ID,
        })))
    }
}

/// Backend selected from configuration.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReservationApi {
    /// The live API over HTTPS.
    Http(SessionClient<HttpTransport>),
    /// Canned offline data.
    Mock(MockReservationApi),
}

impl ReservationApi for AnyReservationApi {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        match self {
            Self::Http(api) => ReservationApi::login(api, username, password).await,
            Self::Mock(api) => api.login(username, password).await,
        }
    }

    async fn fetch_attractions(&self) -> Result<Vec<Attraction>> {
        match self {
            Self::Http(api) => ReservationApi::fetch_attractions(api).await,
            Self::Mock(api) => api.fetch_attractions().await,
        }
    }

    async fn fetch_attraction_details(&self, attraction_id: &str) -> Result<AttractionDetails> {
        match self {
            Self::Http(api) => ReservationApi::fetch_attraction_details(api, attraction_id).await,
            Self::Mock(api) => api.fetch_attraction_details(attraction_id).await,
        }
    }

    async fn make_reservation(
        &self,
        device_id: &str,
        attraction_id: &str,
        guest_count: u8,
    ) -> Result<ReservationReceipt> {
        match self {
            Self::Http(api) => {
                ReservationApi::make_reservation(api, device_id, attraction_id, guest_count).await
            }
            Self::Mock(api) => {
                api.make_reservation(device_id, attraction_id, guest_count)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_login_records_credentials() {
        let api = MockReservationApi::new();
        let device = api.login("guest@example.com", "04A1B2C3").await.unwrap();
        assert_eq!(device, MOCK_DEVICE_ID);
        assert_eq!(
            api.logins(),
            vec![("guest@example.com".to_string(), "04A1B2C3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mock_login_failure() {
        let api = MockReservationApi::new();
        api.fail_logins("bad password");
        let result = api.login("guest@example.com", "x").await;
        assert!(matches!(result, Err(ApiError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_mock_details_use_attraction_name() {
        let api = MockReservationApi::new();
        let details = api.fetch_attraction_details("mock2").await.unwrap();
        assert_eq!(details.data.name, "Mock Flume");
        assert_eq!(details.data.wait_time_mins, 12);
        assert!(details.action("reserve").is_some());

        let unknown = api.fetch_attraction_details("zzz").await.unwrap();
        assert_eq!(unknown.data.name, "Mock Ride");
    }

    #[tokio::test]
    async fn test_mock_reservation() {
        let api = AnyReservationApi::Mock(MockReservationApi::new());
        let receipt = api.make_reservation(MOCK_DEVICE_ID, "mock1", 1).await.unwrap();
        assert_eq!(receipt.confirmation_id.as_deref(), Some(MOCK_CONFIRMATION_ID));
    }
}
