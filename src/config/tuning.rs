use time::Duration;

use crate::domain::reward::BonusTier;

/// Paging and caching bounds for feed requests.
#[derive(Debug, Clone, Copy)]
pub struct FeedLimits {
    pub default_limit: i64,
    pub max_limit: i64,
    pub cache_ttl_seconds: u64,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            cache_ttl_seconds: 30,
        }
    }
}

/// Daily reward arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct RewardRules {
    /// Minimum time between two claims.
    pub claim_interval_hours: i64,
    pub base_points: i64,
    pub weekly_bonus: i64,
    pub monthly_bonus: i64,
    pub century_bonus: i64,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            claim_interval_hours: 20,
            base_points: 10,
            weekly_bonus: 50,
            monthly_bonus: 200,
            century_bonus: 1000,
        }
    }
}

impl RewardRules {
    pub fn claim_interval(&self) -> Duration {
        Duration::hours(self.claim_interval_hours)
    }

    pub fn bonus_points(&self, tier: BonusTier) -> i64 {
        match tier {
            BonusTier::None => 0,
            BonusTier::Weekly => self.weekly_bonus,
            BonusTier::Monthly => self.monthly_bonus,
            BonusTier::Century => self.century_bonus,
        }
    }
}
