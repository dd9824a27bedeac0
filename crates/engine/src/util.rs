//! Internal helpers for validation and conversion.
//!
//! These utilities are **not** part of the public API, except for
//! [`normalize`] which the alias index and its callers share.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Largest balance an account may hold, in hundredths.
pub const BALANCE_MAX: i64 = i32::MAX as i64;
/// Smallest balance an account may hold, in hundredths.
pub const BALANCE_MIN: i64 = -(i32::MAX as i64);

/// Longest accepted normalized alias, in bytes.
pub const ALIAS_MAX_LEN: usize = 255;

/// Normalize an alias name for lookups and uniqueness.
///
/// The input is case-folded, decomposed (NFKD), the `æ`/`œ` ligatures are
/// expanded, marks, punctuation (except dashes), separators and control
/// characters are dropped, and whatever is left outside ASCII is ignored.
/// Compatibility decompositions may yield capitals (`ℌ` → `H`), so the result
/// is folded once more to keep the function idempotent.
pub fn normalize(value: &str) -> String {
    let folded: String = value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'ß' | 'ẞ' => "ss".to_string(),
            'æ' => "ae".to_string(),
            'œ' => "oe".to_string(),
            other => other.to_string(),
        })
        .collect();

    folded
        .nfkd()
        .flat_map(|c| match c {
            'æ' | 'Æ' => vec!['a', 'e'],
            'œ' | 'Œ' => vec!['o', 'e'],
            other => vec![other],
        })
        .filter(|c| c.is_ascii() && !is_stripped_ascii(*c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// ASCII characters in the control, separator, connector, open, close and
/// other punctuation categories.
fn is_stripped_ascii(c: char) -> bool {
    c.is_ascii_control()
        || c == ' '
        || matches!(
            c,
            '_' | '(' | '[' | '{' | ')' | ']' | '}' | '!' | '"' | '#' | '%' | '&' | '\''
                | '*' | ',' | '.' | '/' | ':' | ';' | '?' | '@' | '\\'
        )
}

/// Normalize `name` and reject empty or oversized results with
/// `validation{name, invalid_alias}`.
pub(crate) fn checked_normalize(name: &str) -> ResultEngine<String> {
    let normalized = normalize(name);
    if normalized.is_empty() {
        return Err(EngineError::validation(
            "name",
            "invalid_alias",
            "alias must contain at least one letter or digit",
        ));
    }
    if normalized.len() > ALIAS_MAX_LEN {
        return Err(EngineError::validation(
            "name",
            "invalid_alias",
            "alias is too long",
        ));
    }
    Ok(normalized)
}

/// Trim a required name and reject empty values.
pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation(
            label,
            "required",
            format!("{label} must not be empty"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Hash a password with a fresh random salt as `salt$hex(sha256(salt || password))`.
pub(crate) fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

/// Check `password` against a stored `salt$digest` pair.
pub(crate) fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `balance` lies in the bounded balance domain.
pub(crate) fn balance_in_range(balance: i64) -> bool {
    (BALANCE_MIN..=BALANCE_MAX).contains(&balance)
}

/// Current UTC time, truncated to microseconds so stored values compare equal
/// after a database round-trip.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_accents() {
        assert_eq!(normalize("Élève"), "eleve");
        assert_eq!(normalize("Straße"), "strasse");
        assert_eq!(normalize("Cœur Æther"), "coeuraether");
    }

    #[test]
    fn normalize_strips_punctuation_but_keeps_dashes_and_symbols() {
        assert_eq!(normalize("jean_paul.dupont"), "jeanpauldupont");
        assert_eq!(normalize("(BDE) !"), "bde");
        assert_eq!(normalize("kfet-bar"), "kfet-bar");
        assert_eq!(normalize("a+b=c"), "a+b=c");
    }

    #[test]
    fn normalize_drops_non_ascii_leftovers() {
        assert_eq!(normalize("日本a"), "a");
        assert_eq!(normalize("ﬁne"), "fine");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["Élève", "Cœur Æther", "  Ta--Da!! ", "ǅemal", "ℌello", "x\u{301}y"] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn checked_normalize_rejects_empty_and_long() {
        let err = checked_normalize("?!").unwrap_err();
        match err {
            EngineError::Validation(errors) => assert_eq!(errors.codes(), vec!["invalid_alias"]),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(checked_normalize(&"a".repeat(256)).is_err());
        assert!(checked_normalize(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn password_round_trip() {
        let stored = hash_password("hunter2");
        assert!(verify_password(&stored, "hunter2"));
        assert!(!verify_password(&stored, "hunter3"));
        assert!(!verify_password("garbage", "hunter2"));
    }

    #[test]
    fn balance_bounds() {
        assert!(balance_in_range(2_147_483_647));
        assert!(!balance_in_range(2_147_483_648));
        assert!(balance_in_range(-2_147_483_647));
        assert!(!balance_in_range(-2_147_483_648));
    }
}
