use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange rates are kept at 32-bit float precision end to end (provider payload, storage,
/// trigger comparisons and averages).
pub type Rate = f32;

/// ISO-4217-style currency code: three ASCII letters, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 3 || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCurrency(s.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_case_and_whitespace() {
        let code: CurrencyCode = " nok ".parse().unwrap();
        assert_eq!(code.as_str(), "NOK");
    }

    #[test]
    fn rejects_wrong_length_and_non_letters() {
        assert!("EU".parse::<CurrencyCode>().is_err());
        assert!("EURO".parse::<CurrencyCode>().is_err());
        assert!("E1R".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn deserializes_through_validation() {
        let code: CurrencyCode = serde_json::from_str("\"usd\"").unwrap();
        assert_eq!(code.to_string(), "USD");
        assert!(serde_json::from_str::<CurrencyCode>("\"dollars\"").is_err());
    }
}
