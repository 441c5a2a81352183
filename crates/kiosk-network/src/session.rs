//! Stateful client for the reservation API.
//!
//! Login is a two-step exchange:
//!
//! ```text
//! POST {root}/root/actions/signin.password   {"username": ...}
//!   <- {"action": {"type": "signin.password", "href": ".../?action_invocation_id=...",
//!                  "data": {"resultCode": "registration" | ...}}}
//! POST {href}                                 {"password": ..., ["terms_and_conditions": true]}
//!   <- {"storedResponseData": {"authCode": "<token>"}}
//! ```
//!
//! The token and the credentials that produced it are cached; later calls
//! reuse the token and log in again only when it is missing.

use crate::{
    error::{ApiError, Result},
    models::{
        ActionEnvelope, Attraction, AttractionDetails, AttractionList, PasswordResponse,
        ReservationReceipt,
    },
    transport::JsonTransport,
};
use serde_json::json;
use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::{debug, info, warn};

/// Result code telling the client the username is new.
const REGISTRATION: &str = "registration";

/// Action type expected from login step 1.
const SIGNIN_PASSWORD: &str = "signin.password";

/// Action type returned when the email belongs to an existing account that
/// must recover its password.
const FORGOT_PASSWORD: &str = "forgot_password";

/// Marker every step-1 follow-up URL carries.
const INVOCATION_MARKER: &str = "action_invocation_id=";

/// Configuration for the session client.
///
/// # Example
///
/// ```
/// use kiosk_network::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     api_root: "https://api.example.com/v1".to_string(),
///     timeout: Duration::from_secs(5),
/// };
/// assert_eq!(config.url("/attractions"), "https://api.example.com/v1/attractions");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, without a trailing slash.
    pub api_root: String,

    /// Timeout for each HTTP request.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_root: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Join `path` onto the API root.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    credentials: Option<Credentials>,
}

/// Reservation API client with a cached login.
#[derive(Debug)]
pub struct SessionClient<T> {
    transport: T,
    config: ClientConfig,
    state: Mutex<SessionState>,
}

impl<T: JsonTransport> SessionClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the cached token and credentials.
    pub fn logout(&self) {
        *self.state() = SessionState::default();
    }

    /// Log in (registering the account if the server asks for it).
    ///
    /// Any previous session is dropped first, so a failed login never leaves
    /// the previous guest's token behind.
    ///
    /// # Errors
    ///
    /// - `Auth` when the server's action descriptor is missing or unexpected,
    ///   or no auth code comes back
    /// - `Http` / `Transport` / `Decode` for failed exchanges
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        self.logout();

        let step1 = self
            .transport
            .post(
                &self.config.url("/root/actions/signin.password"),
                Some(&json!({ "username": username })),
                None,
            )
            .await?;

        let action = serde_json::from_value::<ActionEnvelope>(step1)?
            .action
            .unwrap_or_default();
        let result_code = action.data.and_then(|d| d.result_code);
        debug!(
            action_type = ?action.kind,
            result_code = ?result_code,
            "Sign-in action received"
        );

        let href = action
            .href
            .filter(|href| href.contains(INVOCATION_MARKER))
            .ok_or_else(|| {
                ApiError::auth("Login step 1 failed: missing or invalid action_invocation_id")
            })?;

        match action.kind.as_deref() {
            Some(SIGNIN_PASSWORD) => {}
            Some(FORGOT_PASSWORD) => {
                return Err(ApiError::auth(
                    "Email already registered. Use password recovery or login flow.",
                ));
            }
            other => {
                return Err(ApiError::auth(format!(
                    "Unexpected action type: {}",
                    other.unwrap_or("<none>")
                )));
            }
        }

        let registering = result_code.as_deref() == Some(REGISTRATION);
        let payload = if registering {
            json!({ "password": password, "terms_and_conditions": true })
        } else {
            json!({ "password": password })
        };

        let step2 = self.transport.post(&href, Some(&payload), None).await?;
        let token = serde_json::from_value::<PasswordResponse>(step2)?
            .stored_response_data
            .and_then(|data| data.auth_code)
            .ok_or_else(|| ApiError::auth("Login step 2 failed: missing authCode"))?;

        *self.state() = SessionState {
            token: Some(token.clone()),
            credentials: Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        };

        if registering {
            info!(user = username, "Account created and logged in");
        } else {
            info!(user = username, "Login successful");
        }
        Ok(token)
    }

    /// The cached token, logging in again with the cached credentials if the
    /// token was dropped.
    ///
    /// # Errors
    ///
    /// `Auth` when nobody has logged in yet, or any [`SessionClient::login`]
    /// error.
    pub async fn token(&self) -> Result<String> {
        let (token, credentials) = {
            let state = self.state();
            (state.token.clone(), state.credentials.clone())
        };

        match (token, credentials) {
            (Some(token), _) => Ok(token),
            (None, Some(c)) => self.login(&c.username, &c.password).await,
            (None, None) => Err(ApiError::auth("Not logged in")),
        }
    }

    /// All attractions, in server order.
    ///
    /// # Errors
    ///
    /// `Auth` without a session; exchange errors otherwise.
    pub async fn fetch_attractions(&self) -> Result<Vec<Attraction>> {
        let token = self.token().await?;
        let body = self
            .transport
            .get(&self.config.url("/attractions"), Some(&token))
            .await?;
        let list: AttractionList = serde_json::from_value(body)?;
        Ok(list.items.into_iter().map(|item| item.data.into()).collect())
    }

    /// Detail record for one attraction.
    ///
    /// # Errors
    ///
    /// `Auth` without a session; exchange errors otherwise.
    pub async fn fetch_attraction_details(&self, attraction_id: &str) -> Result<AttractionDetails> {
        let token = self.token().await?;
        self.details(attraction_id, &token).await
    }

    async fn details(&self, attraction_id: &str, token: &str) -> Result<AttractionDetails> {
        let body = self
            .transport
            .get(
                &self.config.url(&format!("/attractions/{attraction_id}")),
                Some(token),
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Reserve `attraction_id` for `guest_count` guests.
    ///
    /// Follows the attraction's `reserve` action. When the server answers with
    /// a further action (the guest already holds a reservation elsewhere), it
    /// is confirmed immediately and its response is returned instead.
    ///
    /// # Errors
    ///
    /// - `Reservation` when the attraction has no `reserve` action or the
    ///   action is not a POST
    /// - `Auth` without a session; exchange errors otherwise
    pub async fn make_reservation(
        &self,
        device_id: &str,
        attraction_id: &str,
        guest_count: u8,
    ) -> Result<ReservationReceipt> {
        let token = self.token().await?;
        let details = self.details(attraction_id, &token).await?;

        let action = details
            .action("reserve")
            .ok_or_else(|| ApiError::reservation("No reservation action available"))?;
        if !action.method.eq_ignore_ascii_case("post") {
            return Err(ApiError::reservation(format!(
                "Unsupported reservation method: {}",
                action.method
            )));
        }

        debug!(device_id, attraction_id, guest_count, "Reserving");
        let response = self
            .transport
            .post(
                &action.href,
                Some(&json!({ "guest_count": guest_count })),
                Some(&token),
            )
            .await?;

        let follow_up = serde_json::from_value::<ActionEnvelope>(response.clone())
            .unwrap_or_default()
            .action
            .and_then(|action| action.href);

        if let Some(href) = follow_up {
            warn!(attraction_id, "Replacing existing reservation");
            let confirmed = self.transport.post(&href, None, Some(&token)).await?;
            return Ok(ReservationReceipt::from_body(confirmed));
        }

        Ok(ReservationReceipt::from_body(response))
    }
}
