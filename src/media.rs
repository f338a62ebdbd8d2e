//! Media Types
//!
//! Normalized media references produced by the lookup client and stored in the cache.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

// == Media Kind ==
/// What a resolved media URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Guesses the kind from a free-form type hint (`"video"`, `"photo"`, `"image/jpeg"`, ...).
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_ascii_lowercase();
        if hint.is_empty() {
            return None;
        }
        if hint.contains("video") || VIDEO_EXTENSIONS.contains(&hint.as_str()) {
            return Some(MediaKind::Video);
        }
        if hint.contains("image")
            || hint.contains("photo")
            || IMAGE_EXTENSIONS.contains(&hint.as_str())
        {
            return Some(MediaKind::Image);
        }
        None
    }

    /// Guesses the kind from the file extension of a URL path.
    pub fn from_extension(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

/// File extensions treated as video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "m4v"];

/// File extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

// == Media Item ==
/// A single downloadable media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
    /// Size reported by the lookup API, if any
    pub size_bytes: Option<u64>,
}

impl MediaItem {
    pub fn new(url: impl Into<String>, kind: MediaKind, size_bytes: Option<u64>) -> Self {
        Self {
            url: url.into(),
            kind,
            size_bytes,
        }
    }
}

// == Media Metadata ==
/// Descriptive fields the lookup API sometimes returns next to the media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl MediaMetadata {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.author.is_none()
            && self.title.is_none()
            && self.thumbnail.is_none()
            && self.duration.is_none()
    }
}

// == Resolved Media ==
/// Outcome of a successful lookup after the size policy was applied.
///
/// Immutable once built; the cache hands out shared references to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    /// Items that passed the size policy, in response order
    pub items: Vec<MediaItem>,
    /// Number of items dropped for exceeding the size ceiling
    pub oversize_count: usize,
    pub metadata: MediaMetadata,
}

// == Resolution ==
/// What the orchestrator returns to its caller.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Normalized link the media was resolved for
    pub link: String,
    pub media: Arc<ResolvedMedia>,
    /// True when served without calling the lookup API
    pub from_cache: bool,
}

impl Resolution {
    pub fn items(&self) -> &[MediaItem] {
        &self.media.items
    }

    /// Partial-result notice, present when some items were dropped for size.
    pub fn notice(&self) -> Option<ErrorKind> {
        (self.media.oversize_count > 0).then_some(ErrorKind::OversizeMedia)
    }
}
