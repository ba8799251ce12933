use std::time::Duration;

use crate::ProviderId;

/// Politeness limits applied to every call of one adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    /// Fixed wait before each network call.
    pub pre_call_delay: Duration,
    pub quota_window: Duration,
    pub quota_limit: u32,
}

impl ProviderPolicy {
    pub fn eastmoney_default() -> Self {
        Self {
            provider_id: ProviderId::Eastmoney,
            pre_call_delay: Duration::from_secs(1),
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
        }
    }

    pub fn sina_default() -> Self {
        Self {
            provider_id: ProviderId::Sina,
            pre_call_delay: Duration::from_millis(500),
            quota_window: Duration::from_secs(60),
            quota_limit: 60,
        }
    }

    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            pre_call_delay: Duration::from_secs(1),
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Eastmoney => Self::eastmoney_default(),
            ProviderId::Sina => Self::sina_default(),
            ProviderId::Yahoo => Self::yahoo_default(),
        }
    }

    pub fn with_pre_call_delay(mut self, delay: Duration) -> Self {
        self.pre_call_delay = delay;
        self
    }
}
