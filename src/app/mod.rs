pub mod auth;
pub mod feed;
pub mod posts;
pub mod rewards;
pub mod social;
pub mod users;

use crate::domain::post::FeedPost;
use crate::infra::storage::MediaUrls;

/// Stores keep raw avatar keys on author snapshots; responses carry URLs.
pub(crate) fn with_public_avatar(media: &MediaUrls, mut post: FeedPost) -> FeedPost {
    post.author.avatar_url = media.resolve(post.author.avatar_url.as_deref());
    post
}
