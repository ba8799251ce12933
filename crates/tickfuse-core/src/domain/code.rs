use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const CODE_DIGITS: usize = 6;

/// Mainland exchange an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Shanghai,
    Shenzhen,
}

impl Exchange {
    /// Lowercase prefix used by the canonical code form and the sina feed.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Shanghai => "sh",
            Self::Shenzhen => "sz",
        }
    }

    /// Market flag of the push API `secid` parameter.
    pub const fn market_flag(self) -> &'static str {
        match self {
            Self::Shanghai => "1",
            Self::Shenzhen => "0",
        }
    }

    /// Ticker suffix used by global-markets providers.
    pub const fn global_suffix(self) -> &'static str {
        match self {
            Self::Shanghai => "SS",
            Self::Shenzhen => "SZ",
        }
    }

    /// Infers the exchange of a bare six-digit code from its leading digit.
    ///
    /// Shanghai lists main-board shares under `6`, funds under `5` and
    /// B-shares under `9`; everything else is treated as Shenzhen.
    pub fn infer(digits: &str) -> Self {
        match digits.as_bytes().first() {
            Some(b'5' | b'6' | b'9') => Self::Shanghai,
            _ => Self::Shenzhen,
        }
    }

    fn from_marker(marker: &str) -> Option<Self> {
        match marker.to_ascii_lowercase().as_str() {
            "sh" | "ss" => Some(Self::Shanghai),
            "sz" => Some(Self::Shenzhen),
            _ => None,
        }
    }
}

/// Exchange-qualified instrument or index code.
///
/// The canonical text form is the lowercase exchange prefix followed by the
/// six digits, e.g. `sh600519`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentCode {
    exchange: Exchange,
    digits: String,
}

impl InstrumentCode {
    /// Parses `sh600519`, `600519.SH`, `399001.SZ`, `000001.SS` or a bare
    /// six-digit code.
    ///
    /// Bare codes are ambiguous for indices (`000001` is both the Shanghai
    /// Composite and a Shenzhen stock), so index keys should always carry an
    /// explicit exchange.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        let (exchange, digits) = if let Some((digits, suffix)) = trimmed.split_once('.') {
            let exchange =
                Exchange::from_marker(suffix).ok_or_else(|| ValidationError::UnknownExchange {
                    value: suffix.to_owned(),
                })?;
            (Some(exchange), digits)
        } else if trimmed.len() > CODE_DIGITS && trimmed.is_char_boundary(2) {
            let (marker, digits) = trimmed.split_at(2);
            let exchange =
                Exchange::from_marker(marker).ok_or_else(|| ValidationError::UnknownExchange {
                    value: marker.to_owned(),
                })?;
            (Some(exchange), digits)
        } else {
            (None, trimmed)
        };

        if digits.len() != CODE_DIGITS || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(ValidationError::InvalidCodeDigits {
                value: input.to_owned(),
            });
        }

        Ok(Self {
            exchange: exchange.unwrap_or_else(|| Exchange::infer(digits)),
            digits: digits.to_owned(),
        })
    }

    pub fn new(exchange: Exchange, digits: &str) -> Result<Self, ValidationError> {
        Self::parse(&format!("{}{}", exchange.prefix(), digits))
    }

    /// Builds a code from literal digits known to be valid.
    pub(crate) fn shanghai(digits: &'static str) -> Self {
        Self {
            exchange: Exchange::Shanghai,
            digits: digits.to_owned(),
        }
    }

    pub(crate) fn shenzhen(digits: &'static str) -> Self {
        Self {
            exchange: Exchange::Shenzhen,
            digits: digits.to_owned(),
        }
    }

    pub const fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// `sh600519`
    pub fn prefixed(&self) -> String {
        format!("{}{}", self.exchange.prefix(), self.digits)
    }

    /// `1.600519`
    pub fn secid(&self) -> String {
        format!("{}.{}", self.exchange.market_flag(), self.digits)
    }

    /// `600519.SS`
    pub fn global_ticker(&self) -> String {
        format!("{}.{}", self.digits, self.exchange.global_suffix())
    }
}

impl Display for InstrumentCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.exchange.prefix(), self.digits)
    }
}

impl TryFrom<String> for InstrumentCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for InstrumentCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstrumentCode> for String {
    fn from(value: InstrumentCode) -> Self {
        value.prefixed()
    }
}
