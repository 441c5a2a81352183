//! Screen changes requested by the controller.
//!
//! The UI shell owns rendering; the controller only tells it which screen to
//! show next, over a channel.

use kiosk_core::Reservation;
use kiosk_network::Attraction;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// An attraction as offered on the selection screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttractionChoice {
    /// On-card attraction number (position in the sorted list).
    pub attraction_id: u8,

    #[serde(flatten)]
    pub attraction: Attraction,
}

/// Logical screen routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Welcome,

    /// A card was tapped and login is in progress.
    Processing,

    /// The card already holds a reservation; ask whether to replace it.
    ReplacePrompt { reservation: Reservation },

    Select { attractions: Vec<AttractionChoice> },

    Success {
        reservation: Reservation,
        confirmation_id: Option<String>,
        card_written: bool,
    },

    Error { message: String },
}

impl Route {
    /// Path of the page for this route.
    pub fn path(&self) -> &'static str {
        match self {
            Route::Welcome => "/",
            Route::Processing => "/processing",
            Route::ReplacePrompt { .. } => "/replace_prompt",
            Route::Select { .. } => "/select",
            Route::Success { .. } => "/success",
            Route::Error { .. } => "/error",
        }
    }
}

/// Sending half of the navigation channel.
#[derive(Debug, Clone)]
pub struct Navigator {
    tx: mpsc::UnboundedSender<Route>,
}

impl Navigator {
    /// Create a navigator and the receiver the UI shell listens on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Route>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask the UI to show `route`. A closed UI is logged, not an error.
    pub fn navigate(&self, route: Route) {
        debug!(path = route.path(), "Navigate");
        if self.tx.send(route).is_err() {
            warn!("UI shell is gone, navigation dropped");
        }
    }
}
