use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardState {
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_claimed_at: Option<OffsetDateTime>,
    pub streak: i64,
    pub total_claimed: i64,
    pub points: i64,
}

impl RewardState {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            last_claimed_at: None,
            streak: 0,
            total_claimed: 0,
            points: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusTier {
    None,
    Weekly,
    Monthly,
    Century,
}

impl BonusTier {
    /// Tier reached on the given streak day. Day 100 wins over the 30- and 7-day cycles.
    pub fn for_streak(streak: i64) -> Self {
        if streak == 100 {
            Self::Century
        } else if streak > 0 && streak % 30 == 0 {
            Self::Monthly
        } else if streak > 0 && streak % 7 == 0 {
            Self::Weekly
        } else {
            Self::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardStatus {
    pub state: RewardState,
    pub eligible: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_claim_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed {
        state: RewardState,
        bonus: BonusTier,
        points_awarded: i64,
    },
    NotEligible {
        #[serde(with = "time::serde::rfc3339")]
        next_claim_at: OffsetDateTime,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonus_tiers() {
        assert_eq!(BonusTier::for_streak(0), BonusTier::None);
        assert_eq!(BonusTier::for_streak(1), BonusTier::None);
        assert_eq!(BonusTier::for_streak(7), BonusTier::Weekly);
        assert_eq!(BonusTier::for_streak(14), BonusTier::Weekly);
        assert_eq!(BonusTier::for_streak(30), BonusTier::Monthly);
        assert_eq!(BonusTier::for_streak(210), BonusTier::Monthly);
        assert_eq!(BonusTier::for_streak(100), BonusTier::Century);
        assert_eq!(BonusTier::for_streak(200), BonusTier::None);
    }
}
