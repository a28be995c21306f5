use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_BODY_LEN: usize = 5000;
const MAX_TITLE_LEN: usize = 200;
const MAX_CAPTION_LEN: usize = 2200;
const MAX_IMAGES: usize = 10;
const MAX_TAGS: usize = 30;
const MAX_TAG_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Text,
    Image,
    Reel,
    Meme,
}

impl PostKind {
    pub const ALL: [PostKind; 4] = [Self::Text, Self::Image, Self::Reel, Self::Meme];

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "reel" => Some(Self::Reel),
            "meme" => Some(Self::Meme),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Reel => "reel",
            Self::Meme => "meme",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostVisibility {
    #[default]
    Public,
    Followers,
    Private,
}

impl PostVisibility {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "followers" => Some(Self::Followers),
            "private" => Some(Self::Private),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Followers => "followers",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
}

impl Engagement {
    /// Ranking score used by the trending view.
    pub fn score(&self) -> i64 {
        self.likes + self.comments
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReelContent {
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_volume: Option<f64>,
    #[serde(default = "default_true")]
    pub allow_comments: bool,
    #[serde(default = "default_true")]
    pub allow_duets: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemeContent {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Kind-specific payload of a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostContent {
    Text(TextContent),
    Image(ImageContent),
    Reel(ReelContent),
    Meme(MemeContent),
}

impl PostContent {
    pub fn kind(&self) -> PostKind {
        match self {
            Self::Text(_) => PostKind::Text,
            Self::Image(_) => PostKind::Image,
            Self::Reel(_) => PostKind::Reel,
            Self::Meme(_) => PostKind::Meme,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Text(text) => {
                require_text("body", &text.body, MAX_BODY_LEN)?;
                optional_text("title", text.title.as_deref(), MAX_TITLE_LEN)?;
                optional_text("mood", text.mood.as_deref(), MAX_TITLE_LEN)?;
            }
            Self::Image(image) => {
                if image.image_urls.is_empty() {
                    return Err(ValidationError::Missing("image_urls"));
                }
                if image.image_urls.len() > MAX_IMAGES {
                    return Err(ValidationError::TooMany("image_urls", MAX_IMAGES));
                }
                if image.image_urls.iter().any(|url| url.trim().is_empty()) {
                    return Err(ValidationError::Missing("image_urls"));
                }
                optional_text("caption", image.caption.as_deref(), MAX_CAPTION_LEN)?;
            }
            Self::Reel(reel) => {
                require_text("video_url", &reel.video_url, MAX_CAPTION_LEN)?;
                if let Some(duration) = reel.duration_seconds {
                    if !(duration > 0.0) {
                        return Err(ValidationError::OutOfRange("duration_seconds"));
                    }
                }
                for (field, level) in [
                    ("original_volume", reel.original_volume),
                    ("audio_volume", reel.audio_volume),
                ] {
                    if let Some(level) = level {
                        if !(0.0..=1.0).contains(&level) {
                            return Err(ValidationError::OutOfRange(field));
                        }
                    }
                }
                optional_text("vibe", reel.vibe.as_deref(), MAX_TITLE_LEN)?;
            }
            Self::Meme(meme) => {
                require_text("image_url", &meme.image_url, MAX_CAPTION_LEN)?;
                optional_text("caption", meme.caption.as_deref(), MAX_CAPTION_LEN)?;
            }
        }
        Ok(())
    }

    /// Searchable text of the post, used by keyword lookups.
    pub fn searchable_text(&self) -> Vec<&str> {
        match self {
            Self::Text(text) => [Some(text.body.as_str()), text.title.as_deref()]
                .into_iter()
                .flatten()
                .collect(),
            Self::Image(image) => image.caption.as_deref().into_iter().collect(),
            Self::Reel(reel) => reel.vibe.as_deref().into_iter().collect(),
            Self::Meme(meme) => meme.caption.as_deref().into_iter().collect(),
        }
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, Self::Reel(reel) if reel.audio_url.is_some())
    }

    /// Applies a sparse patch. Fields absent from the patch are left untouched.
    pub fn apply(&mut self, patch: ContentPatch) -> Result<(), ValidationError> {
        match (self, patch) {
            (Self::Text(text), ContentPatch::Text(patch)) => {
                if let Some(body) = patch.body {
                    text.body = body;
                }
                if let Some(title) = patch.title {
                    text.title = Some(title);
                }
                if let Some(mood) = patch.mood {
                    text.mood = Some(mood);
                }
            }
            (Self::Image(image), ContentPatch::Image(patch)) => {
                if let Some(urls) = patch.image_urls {
                    image.image_urls = urls;
                }
                if let Some(caption) = patch.caption {
                    image.caption = Some(caption);
                }
            }
            (Self::Reel(reel), ContentPatch::Reel(patch)) => {
                if let Some(url) = patch.thumbnail_url {
                    reel.thumbnail_url = Some(url);
                }
                if let Some(url) = patch.audio_url {
                    reel.audio_url = Some(url);
                }
                if let Some(audio_type) = patch.audio_type {
                    reel.audio_type = Some(audio_type);
                }
                if let Some(level) = patch.original_volume {
                    reel.original_volume = Some(level);
                }
                if let Some(level) = patch.audio_volume {
                    reel.audio_volume = Some(level);
                }
                if let Some(allow) = patch.allow_comments {
                    reel.allow_comments = allow;
                }
                if let Some(allow) = patch.allow_duets {
                    reel.allow_duets = allow;
                }
                if let Some(vibe) = patch.vibe {
                    reel.vibe = Some(vibe);
                }
            }
            (Self::Meme(meme), ContentPatch::Meme(patch)) => {
                if let Some(caption) = patch.caption {
                    meme.caption = Some(caption);
                }
            }
            (current, patch) => {
                return Err(ValidationError::KindMismatch {
                    expected: current.kind(),
                    found: patch.kind(),
                })
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextPatch {
    pub body: Option<String>,
    pub title: Option<String>,
    pub mood: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagePatch {
    pub image_urls: Option<Vec<String>>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReelPatch {
    pub thumbnail_url: Option<String>,
    pub audio_url: Option<String>,
    pub audio_type: Option<String>,
    pub original_volume: Option<f64>,
    pub audio_volume: Option<f64>,
    pub allow_comments: Option<bool>,
    pub allow_duets: Option<bool>,
    pub vibe: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemePatch {
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPatch {
    Text(TextPatch),
    Image(ImagePatch),
    Reel(ReelPatch),
    Meme(MemePatch),
}

impl ContentPatch {
    pub fn kind(&self) -> PostKind {
        match self {
            Self::Text(_) => PostKind::Text,
            Self::Image(_) => PostKind::Image,
            Self::Reel(_) => PostKind::Reel,
            Self::Meme(_) => PostKind::Meme,
        }
    }
}

/// Persisted post record.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub visibility: PostVisibility,
    pub tags: BTreeSet<String>,
    pub engagement: Engagement,
    pub is_deleted: bool,
    pub content: PostContent,
}

impl Post {
    pub fn kind(&self) -> PostKind {
        self.content.kind()
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub visibility: PostVisibility,
    pub tags: BTreeSet<String>,
    pub content: PostContent,
}

impl NewPost {
    pub fn new(content: PostContent) -> Self {
        Self {
            visibility: PostVisibility::Public,
            tags: BTreeSet::new(),
            content,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_tags(&self.tags)?;
        self.content.validate()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub visibility: Option<PostVisibility>,
    pub tags: Option<BTreeSet<String>>,
    pub content: Option<ContentPatch>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.visibility.is_none() && self.tags.is_none() && self.content.is_none()
    }

    /// Applies the patch to a copy of `post` and re-validates the result.
    pub fn apply_to(self, post: &Post) -> Result<Post, ValidationError> {
        let mut updated = post.clone();
        if let Some(visibility) = self.visibility {
            updated.visibility = visibility;
        }
        if let Some(tags) = self.tags {
            validate_tags(&tags)?;
            updated.tags = tags;
        }
        if let Some(content) = self.content {
            updated.content.apply(content)?;
        }
        updated.content.validate()?;
        Ok(updated)
    }
}

/// Public author fields embedded in every feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Normalized, read-only view of a post of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: Uuid,
    pub author: AuthorSnapshot,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub visibility: PostVisibility,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(flatten)]
    pub content: PostContent,
}

impl FeedPost {
    pub fn from_post(post: Post, author: AuthorSnapshot) -> Self {
        Self {
            id: post.id,
            author,
            created_at: post.created_at,
            visibility: post.visibility,
            tags: post.tags,
            engagement: post.engagement,
            content: post.content,
        }
    }

    pub fn kind(&self) -> PostKind {
        self.content.kind()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} must be at most {1} characters")]
    TooLong(&'static str, usize),
    #[error("{0} must have at most {1} entries")]
    TooMany(&'static str, usize),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
    #[error("cannot apply a {found:?} patch to a {expected:?} post")]
    KindMismatch { expected: PostKind, found: PostKind },
}

/// Normalizes free-form tags: trims, strips a leading `#`, lowercases and drops empties.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| {
            tag.as_ref()
                .trim()
                .trim_start_matches('#')
                .to_lowercase()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn validate_tags(tags: &BTreeSet<String>) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::TooMany("tags", MAX_TAGS));
    }
    if tags.iter().any(|tag| tag.chars().count() > MAX_TAG_LEN) {
        return Err(ValidationError::TooLong("tags", MAX_TAG_LEN));
    }
    Ok(())
}

fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong(field, max));
    }
    Ok(())
}

fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(value) if value.chars().count() > max => Err(ValidationError::TooLong(field, max)),
        _ => Ok(()),
    }
}
