use anyhow::{anyhow, Result};
use url::Url;

/// Issues public URLs for objects in the media bucket.
#[derive(Clone, Debug)]
pub struct MediaUrls {
    base: Url,
}

impl MediaUrls {
    pub fn new(public_base_url: &str) -> Result<Self> {
        let mut base = Url::parse(public_base_url)
            .map_err(|err| anyhow!("invalid MEDIA_PUBLIC_BASE_URL: {}", err))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    /// Resolves an object key against the bucket. Absolute URLs pass through unchanged.
    pub fn public_url(&self, key_or_url: &str) -> Option<String> {
        let trimmed = key_or_url.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(url) = Url::parse(trimmed) {
            if matches!(url.scheme(), "http" | "https") {
                return Some(url.into());
            }
        }
        self.base
            .join(trimmed.trim_start_matches('/'))
            .ok()
            .map(String::from)
    }

    pub fn resolve(&self, key: Option<&str>) -> Option<String> {
        key.and_then(|key| self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_keys_onto_bucket() {
        let urls = MediaUrls::new("https://cdn.example.com/media").unwrap();
        assert_eq!(
            urls.public_url("avatars/a.png").as_deref(),
            Some("https://cdn.example.com/media/avatars/a.png")
        );
        assert_eq!(
            urls.public_url("/avatars/a.png").as_deref(),
            Some("https://cdn.example.com/media/avatars/a.png")
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        let urls = MediaUrls::new("https://cdn.example.com/media/").unwrap();
        assert_eq!(
            urls.public_url("https://other.example.com/x.png").as_deref(),
            Some("https://other.example.com/x.png")
        );
        assert_eq!(urls.public_url("  "), None);
    }
}
