use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Which day's rates to ask the provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateToken {
    Latest,
    On(NaiveDate),
}

impl FromStr for DateToken {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("expected \"latest\" or YYYY-MM-DD, got {s:?}: {e}"))?;
        Ok(Self::On(date))
    }
}

impl fmt::Display for DateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateToken::Latest => f.write_str("latest"),
            DateToken::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_latest_and_iso_dates() {
        assert_eq!("latest".parse::<DateToken>().unwrap(), DateToken::Latest);
        assert_eq!(
            "2024-01-01".parse::<DateToken>().unwrap(),
            DateToken::On(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert!("01/01/2024".parse::<DateToken>().is_err());
    }

    #[test]
    fn displays_as_path_segment() {
        let d = DateToken::On(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(d.to_string(), "2024-03-09");
        assert_eq!(DateToken::Latest.to_string(), "latest");
    }
}
