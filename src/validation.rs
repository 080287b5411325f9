//! Request normalization for `POST /identify`.
//!
//! Accepts the loosely typed JSON body (strings, numbers, `null`, or a
//! missing key), rejects malformed values and hands the core a normalized
//! `IdentifyRequest`: emails trimmed and lowercased, phone numbers reduced
//! to digits.

use std::sync::LazyLock;

use identity_core::{IdentifyRequest, IdentityError};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

pub const MISSING_IDENTITY: &str = "Either email or phoneNumber must be provided.";
pub const INVALID_EMAIL: &str = "Invalid email format.";
pub const INVALID_PHONE: &str = "Invalid phone number format.";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6,15}$").expect("phone pattern compiles"));

/// Separators stripped from phone numbers before the digit check.
static PHONE_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-()+]").expect("phone separator pattern compiles"));

/// Raw `POST /identify` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub phone_number: Option<Value>,
}

pub fn normalize(body: &IdentifyBody) -> Result<IdentifyRequest, IdentityError> {
    let email = supplied(body.email.as_ref());
    let phone = supplied(body.phone_number.as_ref());

    if email.is_none() && phone.is_none() {
        return Err(IdentityError::InvalidInput(MISSING_IDENTITY.to_string()));
    }

    let email = email.map(normalize_email).transpose()?;
    let phone_number = phone.map(normalize_phone).transpose()?;

    Ok(IdentifyRequest::new(email, phone_number))
}

/// `None` for a missing key, `null` or `""`.
fn supplied(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v),
    }
}

/// Scalar JSON values as text; arrays and objects have no text form here.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn normalize_email(value: &Value) -> Result<String, IdentityError> {
    let email = as_text(value)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| EMAIL_RE.is_match(s))
        .ok_or_else(|| IdentityError::InvalidInput(INVALID_EMAIL.to_string()))?;
    Ok(email)
}

fn normalize_phone(value: &Value) -> Result<String, IdentityError> {
    let phone = as_text(value)
        .map(|s| PHONE_NOISE_RE.replace_all(s.trim(), "").into_owned())
        .filter(|s| PHONE_RE.is_match(s))
        .ok_or_else(|| IdentityError::InvalidInput(INVALID_PHONE.to_string()))?;
    Ok(phone)
}
