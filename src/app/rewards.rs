use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::tuning::RewardRules;
use crate::domain::reward::{BonusTier, ClaimOutcome, RewardState, RewardStatus};
use crate::store::RewardStore;

/// Daily reward claims with streak accounting.
#[derive(Clone)]
pub struct RewardLedger {
    store: Arc<dyn RewardStore>,
    rules: RewardRules,
}

impl RewardLedger {
    pub fn new(store: Arc<dyn RewardStore>, rules: RewardRules) -> Self {
        Self { store, rules }
    }

    pub async fn status(&self, user_id: Uuid, now: OffsetDateTime) -> Result<RewardStatus> {
        let state = self.load(user_id).await?;
        let next_claim_at = self.next_claim_at(&state);
        Ok(RewardStatus {
            eligible: next_claim_at.map(|at| now >= at).unwrap_or(true),
            next_claim_at,
            state,
        })
    }

    pub async fn claim(&self, user_id: Uuid, now: OffsetDateTime) -> Result<ClaimOutcome> {
        let state = self.load(user_id).await?;
        if let Some(next_claim_at) = self.next_claim_at(&state).filter(|at| now < *at) {
            return Ok(ClaimOutcome::NotEligible { next_claim_at });
        }

        let streak = state.streak + 1;
        let bonus = BonusTier::for_streak(streak);
        let points_awarded = self.rules.base_points + self.rules.bonus_points(bonus);
        let next = RewardState {
            user_id,
            last_claimed_at: Some(now),
            streak,
            total_claimed: state.total_claimed + 1,
            points: state.points + points_awarded,
        };

        if !self.store.compare_and_set(state.last_claimed_at, &next).await? {
            // Another claim landed first; report against whatever it stored.
            let current = self.load(user_id).await?;
            let next_claim_at = self.next_claim_at(&current).unwrap_or(now);
            tracing::debug!(user_id = %user_id, "concurrent reward claim lost the race");
            return Ok(ClaimOutcome::NotEligible { next_claim_at });
        }

        tracing::info!(user_id = %user_id, streak, bonus = ?bonus, points_awarded, "reward claimed");
        Ok(ClaimOutcome::Claimed {
            state: next,
            bonus,
            points_awarded,
        })
    }

    async fn load(&self, user_id: Uuid) -> Result<RewardState> {
        Ok(self
            .store
            .get_state(user_id)
            .await?
            .unwrap_or_else(|| RewardState::empty(user_id)))
    }

    fn next_claim_at(&self, state: &RewardState) -> Option<OffsetDateTime> {
        state
            .last_claimed_at
            .map(|last| last + self.rules.claim_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::Duration;

    fn ledger(store: &MemoryStore) -> RewardLedger {
        RewardLedger::new(Arc::new(store.clone()), RewardRules::default())
    }

    #[tokio::test]
    async fn first_claim_starts_a_streak() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let rewards = ledger(&store);

        assert!(rewards.status(user, now).await.unwrap().eligible);
        match rewards.claim(user, now).await.unwrap() {
            ClaimOutcome::Claimed {
                state,
                bonus,
                points_awarded,
            } => {
                assert_eq!(state.streak, 1);
                assert_eq!(state.total_claimed, 1);
                assert_eq!(state.last_claimed_at, Some(now));
                assert_eq!(bonus, BonusTier::None);
                assert_eq!(points_awarded, 10);
            }
            other => panic!("expected a claim, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_claim_inside_window_changes_nothing() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let rewards = ledger(&store);

        rewards.claim(user, now).await.unwrap();
        let before = store.get_state(user).await.unwrap();

        let later = now + Duration::hours(3);
        assert_eq!(
            rewards.claim(user, later).await.unwrap(),
            ClaimOutcome::NotEligible {
                next_claim_at: now + Duration::hours(20)
            }
        );
        assert_eq!(store.get_state(user).await.unwrap(), before);
        assert!(!rewards.status(user, later).await.unwrap().eligible);
    }

    #[tokio::test]
    async fn claim_after_a_day_extends_the_streak() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let seeded = RewardState {
            last_claimed_at: Some(now - Duration::hours(25)),
            streak: 6,
            total_claimed: 9,
            points: 120,
            ..RewardState::empty(user)
        };
        assert!(store.compare_and_set(None, &seeded).await.unwrap());

        match ledger(&store).claim(user, now).await.unwrap() {
            ClaimOutcome::Claimed {
                state,
                bonus,
                points_awarded,
            } => {
                assert_eq!(state.streak, 7);
                assert_eq!(state.total_claimed, 10);
                assert_eq!(state.last_claimed_at, Some(now));
                assert_eq!(bonus, BonusTier::Weekly);
                assert_eq!(points_awarded, 60);
                assert_eq!(state.points, 180);
            }
            other => panic!("expected a claim, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn racing_claims_award_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let rewards = ledger(&store);

        let (first, second) = tokio::join!(rewards.claim(user, now), rewards.claim(user, now));
        let claimed = [first.unwrap(), second.unwrap()]
            .into_iter()
            .filter(|outcome| matches!(outcome, ClaimOutcome::Claimed { .. }))
            .count();
        assert_eq!(claimed, 1);
        assert_eq!(store.get_state(user).await.unwrap().unwrap().streak, 1);
    }
}
