use crate::{
    Result,
    constants::{
        FLAG_RESERVATION_VALID, MAX_GUEST_EMAIL_LENGTH, MAX_UID_LENGTH, MAX_WAIT_TIME_MINUTES,
        MIN_UID_LENGTH,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Drop every non-ASCII character from `input`.
///
/// Card fields are plain ASCII; anything else is silently discarded rather
/// than rejected.
///
/// # Examples
///
/// ```
/// use kiosk_core::ascii_only;
///
/// assert_eq!(ascii_only("Café Coaster"), "Caf Coaster");
/// ```
#[must_use]
pub fn ascii_only(input: &str) -> String {
    input.chars().filter(char::is_ascii).collect()
}

/// Unique identifier broadcast by a contactless card (4-10 bytes).
///
/// Used as the de-duplication key for repeated taps and, when logging in,
/// as the guest's password surrogate in its hexadecimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagUid(Vec<u8>);

impl TagUid {
    /// Create a tag UID with length validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if the UID is not 4-10 bytes long.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&bytes.len()) {
            return Err(Error::InvalidUid(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(TagUid(bytes))
    }

    /// Parse a UID from its hexadecimal representation (e.g. `04A1B2C3`).
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` for odd-length or non-hex input, or a
    /// decoded length outside 4-10 bytes.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() % 2 != 0 {
            return Err(Error::InvalidUid(format!("Odd-length hex UID: {hex}")));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidUid(format!("Non-hex UID: {hex}")));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| Error::InvalidUid(format!("Non-hex UID: {hex}")))?;
        TagUid::new(bytes)
    }

    /// Raw UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Uppercase hexadecimal form without separators.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for TagUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagUid::from_hex(s)
    }
}

/// Guest email stored on the card (ASCII, 1-127 bytes).
///
/// Serves as the login username for the reservation API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestEmail(String);

impl GuestEmail {
    /// Create a guest email with validation.
    ///
    /// The input is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidEmail` if the email is empty, longer than
    /// 127 bytes, or contains non-ASCII characters.
    pub fn new(email: &str) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::InvalidEmail("Email cannot be empty".to_string()));
        }
        if !email.is_ascii() {
            return Err(Error::InvalidEmail("Email must be ASCII".to_string()));
        }
        if email.len() > MAX_GUEST_EMAIL_LENGTH {
            return Err(Error::InvalidEmail(format!(
                "Email must be at most {MAX_GUEST_EMAIL_LENGTH} bytes, got {}",
                email.len()
            )));
        }
        Ok(GuestEmail(email.to_string()))
    }

    /// Build an email from raw card bytes, dropping non-ASCII bytes.
    ///
    /// Returns `None` when nothing usable remains.
    #[must_use]
    pub fn from_card_bytes(bytes: &[u8]) -> Option<Self> {
        let text: String = bytes
            .iter()
            .filter(|b| b.is_ascii() && **b != 0)
            .map(|&b| b as char)
            .collect();
        GuestEmail::new(&text).ok()
    }

    /// Get the email as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the email in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; an empty email cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GuestEmail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GuestEmail {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GuestEmail::new(s)
    }
}

/// Bitfield read by card firmware to interpret the reservation fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CommandFlags(u8);

impl CommandFlags {
    /// No flags set.
    pub const NONE: CommandFlags = CommandFlags(0);

    /// The reservation fields hold a valid reservation.
    pub const RESERVATION_VALID: CommandFlags = CommandFlags(FLAG_RESERVATION_VALID);

    /// Wrap raw flag bits as read from a card.
    #[inline]
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        CommandFlags(bits)
    }

    /// Raw flag bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub fn contains(self, other: CommandFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CommandFlags {
    type Output = CommandFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        CommandFlags(self.0 | rhs.0)
    }
}

/// A ride reservation as held by the kiosk and persisted on the card.
///
/// The wait time is kept in minutes here; the card stores seconds and the
/// codec converts at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Freshness tag for card firmware. Written, never validated.
    pub command_sequence: u8,

    /// Validity/type bits for card firmware.
    pub command_flags: CommandFlags,

    /// Small on-card attraction number.
    pub attraction_id: u8,

    /// ASCII ride name.
    pub ride_name: String,

    /// Expected wait, in minutes.
    pub wait_time_minutes: u16,
}

impl Reservation {
    /// Create a valid reservation with sequence 0.
    ///
    /// Non-ASCII characters in `ride_name` are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_core::{CommandFlags, Reservation};
    ///
    /// let r = Reservation::new(7, "Log Flume", 12);
    /// assert_eq!(r.ride_name, "Log Flume");
    /// assert!(r.command_flags.contains(CommandFlags::RESERVATION_VALID));
    /// ```
    #[must_use]
    pub fn new(attraction_id: u8, ride_name: &str, wait_time_minutes: u16) -> Self {
        Self {
            command_sequence: 0,
            command_flags: CommandFlags::RESERVATION_VALID,
            attraction_id,
            ride_name: ascii_only(ride_name),
            wait_time_minutes,
        }
    }

    /// Set the command sequence tag.
    #[must_use]
    pub fn with_command_sequence(mut self, sequence: u8) -> Self {
        self.command_sequence = sequence;
        self
    }

    /// Replace the command flags.
    #[must_use]
    pub fn with_command_flags(mut self, flags: CommandFlags) -> Self {
        self.command_flags = flags;
        self
    }

    /// Returns `true` when the record names a ride.
    #[must_use]
    pub fn has_ride(&self) -> bool {
        !self.ride_name.is_empty()
    }

    /// Wait time in seconds, as stored on card.
    ///
    /// # Errors
    /// Returns `Error::InvalidRecord` if the wait time exceeds what the
    /// 16-bit seconds field can hold.
    pub fn wait_time_seconds(&self) -> Result<u16> {
        if self.wait_time_minutes > MAX_WAIT_TIME_MINUTES {
            return Err(Error::InvalidRecord(format!(
                "Wait time must be at most {MAX_WAIT_TIME_MINUTES} minutes, got {}",
                self.wait_time_minutes
            )));
        }
        Ok(self.wait_time_minutes * 60)
    }

    /// Convert an on-card seconds value back to whole minutes.
    #[inline]
    #[must_use]
    pub fn minutes_from_seconds(seconds: u16) -> u16 {
        seconds / 60
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (#{}, {} min)",
            self.ride_name, self.attraction_id, self.wait_time_minutes
        )
    }
}
