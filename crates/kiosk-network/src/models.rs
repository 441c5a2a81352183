//! API payloads.
//!
//! Only the fields the kiosk reads are modelled; everything else in the
//! server's envelopes is ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An attraction offered on the selection screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attraction {
    /// Server-side attraction id.
    pub id: String,
    pub name: String,
    pub wait_time_minutes: u16,
    /// Banner image, when the server provides one.
    pub image_url: Option<String>,
}

/// Hypermedia action attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub href: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "post".to_string()
}

/// Attraction detail record with the actions available to the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttractionDetails {
    pub data: AttractionData,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

impl AttractionDetails {
    /// First action of the given type.
    pub fn action(&self, kind: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.kind == kind)
    }
}

/// The `data` block shared by list items and detail records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttractionData {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default = "unknown_ride")]
    pub name: String,
    #[serde(default, deserialize_with = "minutes")]
    pub wait_time_mins: u16,
    #[serde(default, skip_serializing)]
    images: Images,
}

fn unknown_ride() -> String {
    "Unknown Ride".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct Images {
    #[serde(default)]
    qng_attraction_banner: Vec<ImageLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ImageLink {
    href: Option<String>,
}

impl From<AttractionData> for Attraction {
    fn from(data: AttractionData) -> Self {
        let image_url = data
            .images
            .qng_attraction_banner
            .into_iter()
            .next()
            .and_then(|link| link.href);
        Self {
            id: data.id,
            name: data.name,
            wait_time_minutes: data.wait_time_mins,
            image_url,
        }
    }
}

/// `GET /attractions` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct AttractionList {
    pub items: Vec<AttractionItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttractionItem {
    pub data: AttractionData,
}

/// Reservation as acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationReceipt {
    /// Server confirmation id, when the response carries one.
    pub confirmation_id: Option<String>,
    /// Full response body.
    pub body: Value,
}

impl ReservationReceipt {
    pub fn from_body(body: Value) -> Self {
        let confirmation_id = body
            .get("id")
            .or_else(|| body.get("confirmation_id"))
            .and_then(value_to_string);
        Self {
            confirmation_id,
            body,
        }
    }
}

/// Step-1 login response, and the reserve response's follow-up action.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ActionEnvelope {
    #[serde(default)]
    pub action: Option<PendingAction>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PendingAction {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<ActionData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActionData {
    #[serde(default)]
    pub result_code: Option<String>,
}

/// Step-2 login response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PasswordResponse {
    pub stored_response_data: Option<StoredResponseData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredResponseData {
    pub auth_code: Option<String>,
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number, got {value}")))
}

/// Wait times arrive as numbers or numeric strings; anything else is 0.
fn minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let minutes = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(minutes
        .filter(|m| m.is_finite() && *m >= 0.0)
        .map(|m| m.min(f64::from(u16::MAX)) as u16)
        .unwrap_or(0))
}
