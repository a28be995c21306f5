use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::post::{normalize_tags, ValidationError};
use crate::domain::user::{Profile, ProfilePatch};
use crate::infra::storage::MediaUrls;
use crate::store::{IdentityStore, StoreError};

const MAX_INTERESTS: usize = 20;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct UserService {
    identity: Arc<dyn IdentityStore>,
    media: MediaUrls,
}

impl UserService {
    pub fn new(identity: Arc<dyn IdentityStore>, media: MediaUrls) -> Self {
        Self { identity, media }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, UserError> {
        let user = self.identity.get_user(user_id).await?;
        Ok(user.map(|user| {
            let avatar_url = self.media.resolve(user.avatar_key.as_deref());
            Profile::from_user_with_url(user, avatar_url)
        }))
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        mut patch: ProfilePatch,
    ) -> Result<Option<Profile>, UserError> {
        if let Some(display_name) = patch.display_name.as_mut() {
            *display_name = display_name.trim().to_string();
            if display_name.is_empty() {
                patch.display_name = None;
            }
        }
        if let Some(interests) = patch.interests.take() {
            let interests = normalize_tags(interests);
            if interests.len() > MAX_INTERESTS {
                return Err(ValidationError::TooMany("interests", MAX_INTERESTS).into());
            }
            patch.interests = Some(interests);
        }

        let user = self.identity.update_profile(user_id, patch).await?;
        Ok(user.map(|user| {
            let avatar_url = self.media.resolve(user.avatar_key.as_deref());
            Profile::from_user_with_url(user, avatar_url)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::NewUser;
    use crate::store::MemoryStore;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn interests_are_normalized_and_avatar_resolved() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "ivy".to_string(),
                email: "ivy@example.com".to_string(),
                display_name: "Ivy".to_string(),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        let users = UserService::new(
            Arc::new(store),
            MediaUrls::new("https://cdn.example.com/media/").unwrap(),
        );

        let profile = users
            .update_profile(
                user.id,
                ProfilePatch {
                    avatar_key: Some("avatars/ivy.png".to_string()),
                    interests: Some(BTreeSet::from(["#Music".to_string(), " art ".to_string()])),
                    ..ProfilePatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://cdn.example.com/media/avatars/ivy.png")
        );
        assert_eq!(
            profile.interests,
            BTreeSet::from(["art".to_string(), "music".to_string()])
        );
    }

    #[tokio::test]
    async fn too_many_interests_rejected() {
        let store = MemoryStore::new();
        let users = UserService::new(
            Arc::new(store),
            MediaUrls::new("https://cdn.example.com/media/").unwrap(),
        );

        let interests = (0..21).map(|i| format!("tag{}", i)).collect::<BTreeSet<_>>();
        let err = users
            .update_profile(
                Uuid::new_v4(),
                ProfilePatch {
                    interests: Some(interests),
                    ..ProfilePatch::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UserError::Validation(ValidationError::TooMany("interests", 20))
        ));
    }
}
