//! Token Codec: decodes scanned or typed strings into structured tokens.
//!
//! Scanners hand us whatever the printed QR code or badge contained. Several
//! generations of content strings are in circulation, and their shapes
//! overlap, so decoding tries each format in a fixed priority order and the
//! first structural match wins:
//!
//! 1. [`StructuredToken`]: a JSON object with at least a workshop reference.
//! 2. [`FieldComposedToken`]:
//!    `WORKSHOP_<id>_USER_<base64 identity>_TIME_<unix>[_REG_<id>]`.
//! 3. [`LegacyToken`]: `WORKSHOP_<id>_REG_<id>_CODE_<code>`.
//! 4. [`DelimitedPairToken`]: `identity|workshop_id`.
//!
//! Anything else decodes to `None` and the caller treats the trimmed input as
//! a literal registration code.
//!
//! Decoding is pure and total: malformed input is "no match", never a panic
//! or an error. Nothing here checks that a referenced workshop or person
//! exists.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::types::{RegistrationCode, RegistrationId, WorkshopId};

#[allow(clippy::expect_used)] // Literal pattern, covered by tests
static FIELD_COMPOSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^WORKSHOP_(\d{1,18})_USER_([A-Za-z0-9+/]+={0,2})_TIME_(\d{1,12})(?:_REG_(\d{1,18}))?$")
        .expect("field-composed pattern is valid")
});

#[allow(clippy::expect_used)] // Literal pattern, covered by tests
static LEGACY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^WORKSHOP_(\d{1,18})_REG_(\d{1,18})_CODE_([A-Za-z0-9-]{1,64})$")
        .expect("legacy pattern is valid")
});

// ============================================================================
// Token Types
// ============================================================================

/// Self-describing JSON token issued by the registration-confirmation channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuredToken {
    /// Workshop reference (required)
    pub workshop_id: WorkshopId,
    /// Person identity, usually an email
    pub identity: Option<String>,
    /// Display name at issuance time
    pub display_name: Option<String>,
    /// Registration reference
    pub registration_id: Option<RegistrationId>,
    /// Issuance time
    pub issued_at: Option<DateTime<Utc>>,
}

/// Positional token with a reversibly encoded identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldComposedToken {
    /// Workshop reference
    pub workshop_id: WorkshopId,
    /// Decoded identity
    pub identity: String,
    /// Issuance time
    pub issued_at: DateTime<Utc>,
    /// Registration reference
    pub registration_id: Option<RegistrationId>,
}

/// Older positional token carrying a registration reference and raw code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyToken {
    /// Workshop reference
    pub workshop_id: WorkshopId,
    /// Registration reference
    pub registration_id: RegistrationId,
    /// Raw registration code
    pub code: RegistrationCode,
}

/// Oldest format: `identity|workshop_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelimitedPairToken {
    /// Person identity
    pub identity: String,
    /// Workshop reference
    pub workshop_id: WorkshopId,
}

/// Format tag of a decoded token, used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenFormat {
    /// JSON object
    Structured,
    /// `WORKSHOP_.._USER_.._TIME_..`
    FieldComposed,
    /// `WORKSHOP_.._REG_.._CODE_..`
    Legacy,
    /// `identity|workshop`
    DelimitedPair,
}

impl TokenFormat {
    /// Stable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::FieldComposed => "field_composed",
            Self::Legacy => "legacy",
            Self::DelimitedPair => "delimited_pair",
        }
    }
}

/// A successfully decoded token. Exactly one format matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedToken {
    /// See [`StructuredToken`]
    Structured(StructuredToken),
    /// See [`FieldComposedToken`]
    FieldComposed(FieldComposedToken),
    /// See [`LegacyToken`]
    Legacy(LegacyToken),
    /// See [`DelimitedPairToken`]
    DelimitedPair(DelimitedPairToken),
}

impl DecodedToken {
    /// Which format matched.
    #[must_use]
    pub const fn format(&self) -> TokenFormat {
        match self {
            Self::Structured(_) => TokenFormat::Structured,
            Self::FieldComposed(_) => TokenFormat::FieldComposed,
            Self::Legacy(_) => TokenFormat::Legacy,
            Self::DelimitedPair(_) => TokenFormat::DelimitedPair,
        }
    }

    /// The workshop the token refers to. Every format carries one.
    #[must_use]
    pub const fn workshop_id(&self) -> WorkshopId {
        match self {
            Self::Structured(t) => t.workshop_id,
            Self::FieldComposed(t) => t.workshop_id,
            Self::Legacy(t) => t.workshop_id,
            Self::DelimitedPair(t) => t.workshop_id,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a scanned or typed string.
///
/// Returns `None` when no known format matches; the caller then treats the
/// input as a literal code.
///
/// # Examples
///
/// ```
/// use checkin_core::token::{decode, encode_field_composed, DecodedToken};
/// use checkin_core::WorkshopId;
/// use chrono::DateTime;
///
/// let issued = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
/// let raw = encode_field_composed(WorkshopId::new(7), "a@b.com", issued, None);
/// match decode(&raw) {
///     Some(DecodedToken::FieldComposed(t)) => assert_eq!(t.identity, "a@b.com"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// assert_eq!(decode("AB12CD34"), None);
/// ```
#[must_use]
pub fn decode(raw: &str) -> Option<DecodedToken> {
    let input = raw.trim();
    if input.is_empty() {
        return None;
    }

    decode_structured(input)
        .map(DecodedToken::Structured)
        .or_else(|| decode_field_composed(input).map(DecodedToken::FieldComposed))
        .or_else(|| decode_legacy(input).map(DecodedToken::Legacy))
        .or_else(|| decode_delimited_pair(input).map(DecodedToken::DelimitedPair))
}

type JsonObject = serde_json::Map<String, serde_json::Value>;

/// First present value among `keys`.
fn field<'a>(object: &'a JsonObject, keys: &[&str]) -> Option<&'a serde_json::Value> {
    keys.iter().find_map(|key| object.get(*key))
}

/// Positive integer given as a JSON integer, an integral float or a numeric string.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)] // Bounded and integral
fn positive_int(value: &serde_json::Value) -> Option<i64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        })?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (parsed > 0).then_some(parsed)
}

/// Unix seconds, truncating any fractional part.
#[allow(clippy::cast_possible_truncation)] // Bounded above
fn unix_seconds(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < 9.0e15)
                .map(|f| f.trunc() as i64)
        })?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

fn non_empty_text(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// Only the workshop reference is required; an optional field of the wrong
// type is dropped rather than failing the whole token.
fn decode_structured(input: &str) -> Option<StructuredToken> {
    if !input.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(input).ok()?;
    let object = value.as_object()?;

    let workshop_id = positive_int(field(object, &["workshop_id", "workshopId", "workshop"])?)?;

    Some(StructuredToken {
        workshop_id: WorkshopId::new(workshop_id),
        identity: field(object, &["user_email", "email", "user"]).and_then(non_empty_text),
        display_name: field(object, &["user_name", "name"]).and_then(non_empty_text),
        registration_id: field(object, &["registration_id", "registrationId"])
            .and_then(positive_int)
            .map(RegistrationId::new),
        issued_at: field(object, &["issued_at", "timestamp"]).and_then(unix_seconds),
    })
}

fn positive_id(digits: &str) -> Option<i64> {
    digits.parse().ok().filter(|id: &i64| *id > 0)
}

fn decode_field_composed(input: &str) -> Option<FieldComposedToken> {
    let caps = FIELD_COMPOSED.captures(input)?;
    let workshop_id = positive_id(caps.get(1)?.as_str())?;
    let identity_bytes = STANDARD.decode(caps.get(2)?.as_str()).ok()?;
    let identity = String::from_utf8(identity_bytes).ok()?;
    if identity.is_empty() {
        return None;
    }
    let issued_at = DateTime::from_timestamp(caps.get(3)?.as_str().parse().ok()?, 0)?;
    let registration_id = match caps.get(4) {
        Some(m) => Some(RegistrationId::new(positive_id(m.as_str())?)),
        None => None,
    };

    Some(FieldComposedToken {
        workshop_id: WorkshopId::new(workshop_id),
        identity,
        issued_at,
        registration_id,
    })
}

fn decode_legacy(input: &str) -> Option<LegacyToken> {
    let caps = LEGACY.captures(input)?;
    Some(LegacyToken {
        workshop_id: WorkshopId::new(positive_id(caps.get(1)?.as_str())?),
        registration_id: RegistrationId::new(positive_id(caps.get(2)?.as_str())?),
        code: RegistrationCode::new(caps.get(3)?.as_str()),
    })
}

fn decode_delimited_pair(input: &str) -> Option<DelimitedPairToken> {
    let (identity, workshop) = input.split_once('|')?;
    if workshop.contains('|') {
        return None;
    }
    let identity = identity.trim();
    if identity.is_empty() {
        return None;
    }
    let workshop_id: i64 = workshop.trim().parse().ok()?;
    if workshop_id <= 0 {
        return None;
    }

    Some(DelimitedPairToken {
        identity: identity.to_string(),
        workshop_id: WorkshopId::new(workshop_id),
    })
}

// ============================================================================
// Encoding
// ============================================================================

/// Build field-composed QR content for a known person.
#[must_use]
pub fn encode_field_composed(
    workshop_id: WorkshopId,
    identity: &str,
    issued_at: DateTime<Utc>,
    registration_id: Option<RegistrationId>,
) -> String {
    let mut content = format!(
        "WORKSHOP_{workshop_id}_USER_{}_TIME_{}",
        STANDARD.encode(identity.as_bytes()),
        issued_at.timestamp()
    );
    if let Some(id) = registration_id {
        content.push_str(&format!("_REG_{id}"));
    }
    content
}

/// Build legacy-format content for a registration code.
#[must_use]
pub fn encode_legacy(
    workshop_id: WorkshopId,
    registration_id: RegistrationId,
    code: &RegistrationCode,
) -> String {
    format!("WORKSHOP_{workshop_id}_REG_{registration_id}_CODE_{code}")
}

/// Serialize a structured token with canonical keys.
#[must_use]
pub fn encode_structured(token: &StructuredToken) -> String {
    let mut object = serde_json::Map::new();
    object.insert("workshop_id".into(), token.workshop_id.get().into());
    if let Some(identity) = &token.identity {
        object.insert("user_email".into(), identity.clone().into());
    }
    if let Some(name) = &token.display_name {
        object.insert("user_name".into(), name.clone().into());
    }
    if let Some(id) = token.registration_id {
        object.insert("registration_id".into(), id.get().into());
    }
    if let Some(at) = token.issued_at {
        object.insert("issued_at".into(), at.timestamp().into());
    }
    serde_json::Value::Object(object).to_string()
}
