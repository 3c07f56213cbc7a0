//! Card record domain model.
//!
//! # Responsibility
//! - Define the canonical persisted record shared by sound/timer/notepad
//!   cards and its per-type payloads.
//! - Provide id minting/parsing and shallow-merge patch semantics.
//!
//! # Invariants
//! - `id` is stable, globally unique, and never reused for another card.
//! - The `id` prefix always matches the record's `type` tag.
//! - `id` and `type` are immutable after creation; patches never touch them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every card, shaped as `<type>-<suffix>`.
///
/// Kept as a type alias because ids travel as plain strings through storage,
/// layout nodes, and command ids.
pub type CardId = String;

/// JSON object shape used for record bodies, patches, and ticket args.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

static CARD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(sound|timer|notepad)-[A-Za-z0-9-]+$").expect("valid card id regex"));

/// Closed tag set selecting the concrete card implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    /// One-shot or looping sound button.
    Sound,
    /// Countdown/stopwatch timer, optionally bound to sound commands.
    Timer,
    /// Free-form text notepad.
    Notepad,
}

impl CardKind {
    /// Stable string tag used as id prefix and `type` value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sound => "sound",
            Self::Timer => "timer",
            Self::Notepad => "notepad",
        }
    }

    /// Parses one tag; unknown tags return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sound" => Some(Self::Sound),
            "timer" => Some(Self::Timer),
            "notepad" => Some(Self::Notepad),
            _ => None,
        }
    }

    /// All known tags in registry order.
    pub fn all() -> &'static [CardKind] {
        &[Self::Sound, Self::Timer, Self::Notepad]
    }

    /// Title used for freshly created cards of this kind.
    pub fn default_title(self) -> &'static str {
        match self {
            Self::Sound => "New sound",
            Self::Timer => "New timer",
            Self::Notepad => "New notepad",
        }
    }
}

impl Display for CardKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mints a fresh card id as `<type>-<uuid>`.
pub fn mint_card_id(kind: CardKind) -> CardId {
    format!("{}-{}", kind.as_str(), Uuid::new_v4())
}

/// Derives the card kind from an id prefix, if the prefix is a known tag.
pub fn kind_of_id(id: &str) -> Option<CardKind> {
    let (prefix, _) = id.split_once('-')?;
    CardKind::parse(prefix)
}

/// Returns whether the id has a valid `<type>-<suffix>` shape.
pub fn is_valid_card_id(id: &str) -> bool {
    CARD_ID_RE.is_match(id)
}

/// Canonical persisted record for one card.
///
/// Serializes flat: `{ "id": ..., "title": ..., "type": ..., <payload> }`,
/// which is the document shape the storage gateway and export files carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Stable type-prefixed id.
    pub id: CardId,
    /// Display title; mutable, drives command display names.
    pub title: String,
    /// Type tag plus type-specific payload.
    #[serde(flatten)]
    pub data: CardData,
}

/// Per-type payload, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardData {
    Sound(SoundData),
    Timer(TimerData),
    Notepad(NotepadData),
}

impl CardData {
    /// Kind tag carried by this payload.
    pub fn kind(&self) -> CardKind {
        match self {
            Self::Sound(_) => CardKind::Sound,
            Self::Timer(_) => CardKind::Timer,
            Self::Notepad(_) => CardKind::Notepad,
        }
    }

    /// Default persisted payload for one kind.
    pub fn default_for(kind: CardKind) -> Self {
        match kind {
            CardKind::Sound => Self::Sound(SoundData::default()),
            CardKind::Timer => Self::Timer(TimerData::default()),
            CardKind::Notepad => Self::Notepad(NotepadData::default()),
        }
    }
}

/// Sound card payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundData {
    /// Base gain in `0.0..=1.0`.
    pub volume: f64,
    /// Playback speed multiplier, strictly positive.
    pub playback_rate: f64,
    /// Pick files uniformly at random instead of sequentially.
    pub shuffle: bool,
    /// Restart playback when a file ends.
    #[serde(rename = "loop")]
    pub looped: bool,
    /// Ducks every non-priority playback while this card plays.
    pub priority: bool,
    /// Fire this card's play command once when the board attaches it.
    pub autoplay: bool,
    /// Uploaded audio files, in upload order.
    pub files: Vec<SoundFile>,
}

impl Default for SoundData {
    fn default() -> Self {
        Self {
            volume: 1.0,
            playback_rate: 1.0,
            shuffle: false,
            looped: false,
            priority: false,
            autoplay: false,
            files: Vec::new(),
        }
    }
}

/// One uploaded audio file carried inside a sound record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundFile {
    /// Original file name; unique within one card's file list.
    pub name: String,
    /// MIME type reported at upload time.
    #[serde(default)]
    pub mime: String,
    /// Raw audio payload; base64 text in serialized form.
    #[serde(with = "base64_bytes", default)]
    pub bytes: Vec<u8>,
    /// Probed duration; `None` until the background probe fills it in.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Timer card payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerData {
    /// Configured run length for countdown mode.
    pub duration_ms: u64,
    pub mode: TimerMode,
    /// Restart automatically after a countdown elapses.
    #[serde(rename = "loop")]
    pub looped: bool,
    /// Command id executed when the timer starts.
    pub start_command: Option<String>,
    /// Command id executed when a countdown reaches zero.
    pub end_command: Option<String>,
}

impl Default for TimerData {
    fn default() -> Self {
        Self {
            duration_ms: 60_000,
            mode: TimerMode::Countdown,
            looped: false,
            start_command: None,
            end_command: None,
        }
    }
}

/// Timer direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    #[default]
    Countdown,
    Stopwatch,
}

/// Notepad card payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotepadData {
    pub text: String,
}

/// Validation failures for card records.
#[derive(Debug, Clone, PartialEq)]
pub enum CardValidationError {
    EmptyId,
    MalformedId(String),
    /// `id` prefix and `type` tag disagree.
    KindMismatch {
        id: CardId,
        data_kind: CardKind,
    },
    VolumeOutOfRange(f64),
    PlaybackRateNotPositive(f64),
}

impl Display for CardValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "card id must not be empty"),
            Self::MalformedId(id) => write!(f, "card id is malformed: `{id}`"),
            Self::KindMismatch { id, data_kind } => write!(
                f,
                "card id `{id}` does not match payload type `{data_kind}`"
            ),
            Self::VolumeOutOfRange(value) => {
                write!(f, "volume must be within 0.0..=1.0, got {value}")
            }
            Self::PlaybackRateNotPositive(value) => {
                write!(f, "playback rate must be positive, got {value}")
            }
        }
    }
}

impl Error for CardValidationError {}

/// Failures converting between records and JSON document shapes.
#[derive(Debug)]
pub enum CardDataError {
    /// A record body or merge result is not a JSON object.
    NotAnObject,
    /// The document does not deserialize into a valid record shape.
    Invalid(String),
}

impl Display for CardDataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "card record body must be a JSON object"),
            Self::Invalid(message) => write!(f, "invalid card record data: {message}"),
        }
    }
}

impl Error for CardDataError {}

impl CardRecord {
    /// Builds a fresh record with default payload and a minted id.
    pub fn new(kind: CardKind) -> Self {
        Self {
            id: mint_card_id(kind),
            title: kind.default_title().to_string(),
            data: CardData::default_for(kind),
        }
    }

    /// Kind tag of this record's payload.
    pub fn kind(&self) -> CardKind {
        self.data.kind()
    }

    /// Checks id shape, id/type agreement, and payload ranges.
    pub fn validate(&self) -> Result<(), CardValidationError> {
        if self.id.is_empty() {
            return Err(CardValidationError::EmptyId);
        }
        if !is_valid_card_id(&self.id) {
            return Err(CardValidationError::MalformedId(self.id.clone()));
        }
        if kind_of_id(&self.id) != Some(self.kind()) {
            return Err(CardValidationError::KindMismatch {
                id: self.id.clone(),
                data_kind: self.kind(),
            });
        }
        if let CardData::Sound(sound) = &self.data {
            if !(0.0..=1.0).contains(&sound.volume) {
                return Err(CardValidationError::VolumeOutOfRange(sound.volume));
            }
            if sound.playback_rate <= 0.0 {
                return Err(CardValidationError::PlaybackRateNotPositive(
                    sound.playback_rate,
                ));
            }
        }
        Ok(())
    }
}

/// Serializes one record into its JSON document shape.
pub fn record_to_map(record: &CardRecord) -> Result<JsonMap, CardDataError> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(CardDataError::NotAnObject),
        Err(err) => Err(CardDataError::Invalid(err.to_string())),
    }
}

/// Deserializes one JSON document into a record.
pub fn record_from_map(map: JsonMap) -> Result<CardRecord, CardDataError> {
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|err| CardDataError::Invalid(err.to_string()))
}

/// Keys a patch can never change.
pub const PROTECTED_RECORD_KEYS: &[&str] = &["id", "type"];

/// Shallow-merges `patch` into a record document, last write wins per key.
///
/// `id` and `type` entries in the patch are ignored to keep the immutability
/// invariant; everything else replaces the existing value wholesale.
pub fn merge_patch(base: &mut JsonMap, patch: &JsonMap) {
    for (key, value) in patch {
        if PROTECTED_RECORD_KEYS.contains(&key.as_str()) {
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Serde helper storing `Vec<u8>` as standard-alphabet base64 text.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_valid_card_id, kind_of_id, merge_patch, mint_card_id, record_from_map, record_to_map,
        CardData, CardKind, CardRecord, CardValidationError, SoundFile,
    };
    use serde_json::json;

    #[test]
    fn minted_id_prefix_matches_kind() {
        for kind in CardKind::all() {
            let id = mint_card_id(*kind);
            assert_eq!(kind_of_id(&id), Some(*kind));
            assert!(is_valid_card_id(&id));
        }
    }

    #[test]
    fn record_document_round_trips() {
        let mut record = CardRecord::new(CardKind::Sound);
        if let CardData::Sound(sound) = &mut record.data {
            sound.files.push(SoundFile {
                name: "rain.ogg".to_string(),
                mime: "audio/ogg".to_string(),
                bytes: vec![1, 2, 3, 4],
                duration_ms: Some(1500),
            });
        }

        let map = record_to_map(&record).expect("record should serialize");
        assert_eq!(map["type"], json!("sound"));
        let file_payload = &map["files"][0]["bytes"];
        assert_eq!(file_payload, &json!("AQIDBA=="));

        let restored = record_from_map(map).expect("document should deserialize");
        assert_eq!(restored, record);
    }

    #[test]
    fn merge_patch_skips_protected_keys_and_replaces_values() {
        let record = CardRecord::new(CardKind::Notepad);
        let original_id = record.id.clone();
        let mut map = record_to_map(&record).expect("record should serialize");

        let patch = json!({"id": "sound-hijack", "type": "sound", "text": "hello"});
        merge_patch(&mut map, patch.as_object().expect("patch is an object"));

        let merged = record_from_map(map).expect("merged document should deserialize");
        assert_eq!(merged.id, original_id);
        assert_eq!(merged.kind(), CardKind::Notepad);
        match merged.data {
            CardData::Notepad(notepad) => assert_eq!(notepad.text, "hello"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_mismatched_prefix() {
        let mut record = CardRecord::new(CardKind::Timer);
        record.id = mint_card_id(CardKind::Sound);
        let err = record.validate().expect_err("prefix mismatch must fail");
        assert!(matches!(err, CardValidationError::KindMismatch { .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_sound_settings() {
        let mut record = CardRecord::new(CardKind::Sound);
        if let CardData::Sound(sound) = &mut record.data {
            sound.volume = 1.5;
        }
        let err = record.validate().expect_err("volume out of range must fail");
        assert!(matches!(err, CardValidationError::VolumeOutOfRange(_)));
    }
}
