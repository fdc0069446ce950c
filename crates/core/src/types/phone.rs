//! Phone number type for SMS one-time-code sign-in.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// Numbers must carry their country code.
    #[error("phone number must start with + and a country code")]
    MissingCountryCode,
    /// Something other than digits and separators.
    #[error("phone number contains invalid character {0:?}")]
    InvalidCharacter(char),
    /// Too few or too many digits for E.164.
    #[error("phone number must have between {min} and {max} digits")]
    InvalidLength {
        /// Minimum digit count.
        min: usize,
        /// Maximum digit count.
        max: usize,
    },
}

/// A phone number in E.164 form (`+919876543210`).
///
/// Spaces, dashes, dots, and parentheses are accepted on input and
/// stripped, so `+91 98765-43210` and `+919876543210` are the same number.
///
/// ```
/// use atelier_core::Phone;
///
/// let phone = Phone::parse("+91 98765 43210").unwrap();
/// assert_eq!(phone.as_str(), "+919876543210");
/// assert!(Phone::parse("98765 43210").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Minimum digits after the `+`.
    pub const MIN_DIGITS: usize = 8;
    /// Maximum digits after the `+` (E.164).
    pub const MAX_DIGITS: usize = 15;

    /// Parse and normalize a phone number.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] if the number is empty, lacks a leading `+`,
    /// contains letters, or has the wrong number of digits.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        let Some(rest) = s.strip_prefix('+') else {
            return Err(if s.is_empty() {
                PhoneError::Empty
            } else {
                PhoneError::MissingCountryCode
            });
        };

        let mut digits = String::with_capacity(rest.len());
        for ch in rest.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                ' ' | '-' | '.' | '(' | ')' => {}
                other => return Err(PhoneError::InvalidCharacter(other)),
            }
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(PhoneError::InvalidLength {
                min: Self::MIN_DIGITS,
                max: Self::MAX_DIGITS,
            });
        }

        Ok(Self(format!("+{digits}")))
    }

    /// Returns the normalized number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The number with all but the last four digits masked, for notices.
    #[must_use]
    pub fn masked(&self) -> String {
        let visible = self.0.len().saturating_sub(4);
        self.0
            .char_indices()
            .map(|(i, c)| if i == 0 || i >= visible { c } else { '•' })
            .collect()
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_separators() {
        let phone = Phone::parse(" +1 (555) 123-4567 ").unwrap();
        assert_eq!(phone.as_str(), "+15551234567");
    }

    #[test]
    fn test_parse_requires_country_code() {
        assert_eq!(Phone::parse(""), Err(PhoneError::Empty));
        assert_eq!(
            Phone::parse("5551234567"),
            Err(PhoneError::MissingCountryCode)
        );
    }

    #[test]
    fn test_parse_rejects_letters_and_bad_lengths() {
        assert_eq!(
            Phone::parse("+91 98x65"),
            Err(PhoneError::InvalidCharacter('x'))
        );
        assert!(matches!(
            Phone::parse("+1234"),
            Err(PhoneError::InvalidLength { .. })
        ));
        assert!(matches!(
            Phone::parse("+1234567890123456"),
            Err(PhoneError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_masked_keeps_prefix_and_last_four() {
        let phone = Phone::parse("+919876543210").unwrap();
        assert_eq!(phone.masked(), "+••••••••3210");
    }
}
