use crate::{Result, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a device identifier.
const MAX_DEVICE_ID_LENGTH: usize = 64;

/// Identifier of one reader instance (e.g. `"dock-door-3"`).
///
/// Every event carries the id of the device it originated from so that a
/// host driving several readers can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the id is empty, longer than 64
    /// characters, or contains whitespace or non-ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        if id.is_empty() || id.len() > MAX_DEVICE_ID_LENGTH {
            return Err(Error::InvalidDeviceId(format!(
                "Device id must be 1-{MAX_DEVICE_ID_LENGTH} chars, got {}",
                id.len()
            )));
        }

        if !id.chars().all(|c| c.is_ascii_graphic()) {
            return Err(Error::InvalidDeviceId(format!(
                "Device id must be printable ASCII without spaces: {id:?}"
            )));
        }

        Ok(DeviceId(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        DeviceId::new(&s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId("reader".to_string())
    }
}

/// Tag identifier (EPC or UID) in upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(String);

impl TagId {
    /// Create a new tag id.
    ///
    /// The id is normalized (trimmed and converted to uppercase) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTagId` if the id is empty or not hexadecimal.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim().to_uppercase();

        if id.is_empty() {
            return Err(Error::InvalidTagId("Tag id must not be empty".to_string()));
        }

        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidTagId(format!("Tag id must be hex: {id}")));
        }

        Ok(TagId(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagId::new(s)
    }
}

/// One sighting of a tag, as decoded from an inventory reply or a tag event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagObservation {
    pub id: TagId,
    pub antenna: u8,
    pub rssi: Option<i16>,
    /// Contents of the TID membank, when the reader was asked for it.
    pub tid: Option<String>,
    /// Contents of the user membank, when the reader was asked for it.
    pub user_data: Option<String>,
}

impl TagObservation {
    /// Observation on antenna 1 without membank data.
    pub fn new(id: TagId) -> Self {
        Self {
            id,
            antenna: 1,
            rssi: None,
            tid: None,
            user_data: None,
        }
    }

    #[must_use]
    pub fn with_antenna(mut self, antenna: u8) -> Self {
        self.antenna = antenna;
        self
    }

    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    #[must_use]
    pub fn with_tid(mut self, tid: impl Into<String>) -> Self {
        self.tid = Some(tid.into());
        self
    }

    #[must_use]
    pub fn with_user_data(mut self, data: impl Into<String>) -> Self {
        self.user_data = Some(data.into());
        self
    }
}

/// A tag currently in view of the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub antenna: u8,
    pub rssi: Option<i16>,
    pub tid: Option<String>,
    pub user_data: Option<String>,
    pub seen_count: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Tag {
    /// Start tracking a tag from its first observation.
    pub fn first_seen(observation: TagObservation, now: DateTime<Utc>) -> Self {
        Self {
            id: observation.id,
            antenna: observation.antenna,
            rssi: observation.rssi,
            tid: observation.tid,
            user_data: observation.user_data,
            seen_count: 1,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Fold a re-observation into the tag.
    ///
    /// `last_seen_at` never moves backwards, even if the wall clock does.
    /// Membank data is only replaced when the new observation carries some.
    pub fn seen_again(&mut self, observation: TagObservation, now: DateTime<Utc>) {
        self.seen_count += 1;
        self.last_seen_at = self.last_seen_at.max(now);
        self.antenna = observation.antenna;
        if observation.rssi.is_some() {
            self.rssi = observation.rssi;
        }
        if observation.tid.is_some() {
            self.tid = observation.tid;
        }
        if observation.user_data.is_some() {
            self.user_data = observation.user_data;
        }
    }
}

/// Which observation fields make up a tag's identity.
///
/// Some reader families report the same tag once per antenna and are best
/// tracked per antenna; others should merge sightings across antennas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagIdentity {
    /// The tag id alone.
    #[default]
    Id,
    /// Tag id plus antenna number.
    IdAndAntenna,
}

impl TagIdentity {
    /// Key under which an observation is tracked.
    pub fn key(&self, observation: &TagObservation) -> TagKey {
        TagKey {
            id: observation.id.clone(),
            antenna: match self {
                TagIdentity::Id => None,
                TagIdentity::IdAndAntenna => Some(observation.antenna),
            },
        }
    }
}

/// Identity key of a tracked tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagKey {
    pub id: TagId,
    pub antenna: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rstest::rstest;

    #[rstest]
    #[case("reader-1")]
    #[case("DOCK_03")]
    #[case("a")]
    fn test_device_id_valid(#[case] input: &str) {
        let id: DeviceId = input.parse().unwrap();
        assert_eq!(id.as_str(), input);
        assert_eq!(id.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("with space")]
    #[case("tür")]
    fn test_device_id_invalid(#[case] input: &str) {
        let result: Result<DeviceId> = input.parse();
        assert!(result.is_err());
    }

    #[rstest]
    #[case("e2003412b802011a", "E2003412B802011A")]
    #[case("  3000AB  ", "3000AB")]
    fn test_tag_id_normalized(#[case] input: &str, #[case] expected: &str) {
        let id = TagId::new(input).unwrap();
        assert_eq!(id.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("XYZ")]
    #[case("12 34")]
    fn test_tag_id_invalid(#[case] input: &str) {
        assert!(matches!(TagId::new(input), Err(Error::InvalidTagId(_))));
    }

    #[test]
    fn test_tag_seen_again_keeps_first_seen() {
        let t0 = Utc::now();
        let obs = TagObservation::new(TagId::new("AB01").unwrap()).with_rssi(-60);
        let mut tag = Tag::first_seen(obs.clone(), t0);

        let t1 = t0 + TimeDelta::milliseconds(250);
        tag.seen_again(obs.clone().with_antenna(2), t1);

        assert_eq!(tag.seen_count, 2);
        assert_eq!(tag.first_seen_at, t0);
        assert_eq!(tag.last_seen_at, t1);
        assert_eq!(tag.antenna, 2);
        assert_eq!(tag.rssi, Some(-60));
    }

    #[test]
    fn test_tag_last_seen_never_moves_backwards() {
        let t0 = Utc::now();
        let obs = TagObservation::new(TagId::new("AB01").unwrap());
        let mut tag = Tag::first_seen(obs.clone(), t0);

        tag.seen_again(obs, t0 - TimeDelta::seconds(5));
        assert_eq!(tag.last_seen_at, t0);
    }

    #[test]
    fn test_tag_identity_key() {
        let obs = TagObservation::new(TagId::new("01").unwrap()).with_antenna(3);
        assert_eq!(TagIdentity::Id.key(&obs).antenna, None);
        assert_eq!(TagIdentity::IdAndAntenna.key(&obs).antenna, Some(3));
    }

    #[test]
    fn test_device_id_deserialize_validates() {
        let id: DeviceId = serde_json::from_str("\"gate-1\"").unwrap();
        assert_eq!(id.as_str(), "gate-1");
        assert!(serde_json::from_str::<DeviceId>("\"has space\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"gate-1\"");
    }

    #[test]
    fn test_tag_identity_serde() {
        let json = serde_json::to_string(&TagIdentity::IdAndAntenna).unwrap();
        assert_eq!(json, "\"id_and_antenna\"");
    }
}
