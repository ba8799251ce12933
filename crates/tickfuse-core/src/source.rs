use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used for priority lists and provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Low-latency push API (`push2.eastmoney.com`).
    Eastmoney,
    /// General quote feed (`hq.sinajs.cn`).
    Sina,
    /// Global-markets fallback (`query1.finance.yahoo.com`).
    Yahoo,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Eastmoney, Self::Sina, Self::Yahoo];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eastmoney => "eastmoney",
            Self::Sina => "sina",
            Self::Yahoo => "yahoo",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eastmoney" => Ok(Self::Eastmoney),
            "sina" => Ok(Self::Sina),
            "yahoo" => Ok(Self::Yahoo),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
