//! Response Parsing
//!
//! The lookup API answers in several shapes carrying the same information.
//! Shapes are tried in a fixed priority order; the first one producing at
//! least one item wins, whether it sits at the top level or inside a
//! `data`/`result` wrapper.

use serde_json::{Map, Value};
use tracing::debug;

use crate::link::{normalize_link, LinkPolicy};
use crate::media::{MediaItem, MediaKind, MediaMetadata};

/// Keys holding an array of media objects, in priority order
const ARRAY_KEYS: &[&str] = &["links", "medias", "media"];

/// Keys of an array item that may carry its URL
const ITEM_URL_KEYS: &[&str] = &["url", "link", "download_url"];

/// Keys of an array item that may carry a type hint
const TYPE_HINT_KEYS: &[&str] = &["type", "media_type", "mimeType", "extension"];

/// Named single-URL fields, in priority order
const NAMED_URL_FIELDS: &[(&str, Option<MediaKind>)] = &[
    ("download_url", None),
    ("video_url", Some(MediaKind::Video)),
    ("image_url", Some(MediaKind::Image)),
    ("media_url", None),
];

const SIZE_KEYS: &[&str] = &["size", "size_bytes", "filesize", "content_length"];

/// Containers the payload is sometimes wrapped in
const CONTAINER_KEYS: &[&str] = &["data", "result"];

/// Format id of the progressive mp4 that carries both video and audio
const MUXED_MP4_ITAG: &str = "18";

const METADATA_KEYS: &[&str] = &["source", "author", "title", "thumbnail", "duration"];

// == Response Shape ==
/// A recognized payload shape with its extracted items.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// An array of media objects
    Array(Vec<MediaItem>),
    /// A single top-level `url` field
    SingleUrl(MediaItem),
    /// One of the named URL fields (`download_url`, `video_url`, ...)
    NamedField(MediaItem),
}

impl ResponseShape {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseShape::Array(_) => "array",
            ResponseShape::SingleUrl(_) => "single_url",
            ResponseShape::NamedField(_) => "named_field",
        }
    }

    pub fn into_items(self) -> Vec<MediaItem> {
        match self {
            ResponseShape::Array(items) => items,
            ResponseShape::SingleUrl(item) | ResponseShape::NamedField(item) => vec![item],
        }
    }
}

type ShapeMatcher = fn(&Value, &str) -> Option<ResponseShape>;

/// Matchers in priority order. Each is tried on every level before the next
/// one runs, so a nested array beats a top-level `url`.
const MATCHERS: &[ShapeMatcher] = &[match_array, match_single_url, match_named_field];

// == Match Shape ==
/// Recognizes `body`, the lookup answer for the `requested` link.
///
/// Each shape is looked for in the payload itself and then one level into
/// its `data`/`result` wrappers.
pub fn match_shape(body: &Value, requested: &str) -> Option<ResponseShape> {
    let levels = levels(body);
    MATCHERS
        .iter()
        .find_map(|matcher| levels.iter().find_map(|level| matcher(level, requested)))
}

fn levels(body: &Value) -> Vec<&Value> {
    let mut levels = vec![body];
    if let Value::Object(map) = body {
        levels.extend(CONTAINER_KEYS.iter().filter_map(|key| map.get(*key)));
    }
    levels
}

fn non_empty_array(items: &[Value]) -> Option<ResponseShape> {
    let items = parse_items(items);
    (!items.is_empty()).then_some(ResponseShape::Array(items))
}

fn match_array(level: &Value, _requested: &str) -> Option<ResponseShape> {
    match level {
        Value::Array(items) => non_empty_array(items),
        Value::Object(map) => ARRAY_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_array))
            .find_map(|items| non_empty_array(items)),
        _ => None,
    }
}

/// A bare `url` is often the post link echoed back. Without a media
/// extension it only counts when it differs from the requested link.
fn match_single_url(level: &Value, requested: &str) -> Option<ResponseShape> {
    let map = level.as_object()?;
    let url = map.get("url").and_then(http_url)?;
    let by_extension = MediaKind::from_extension(url_path(url));
    if by_extension.is_none() && is_same_link(url, requested) {
        debug!(url, "Ignoring url field echoing the requested link");
        return None;
    }
    let kind = by_extension.unwrap_or(MediaKind::Video);
    Some(ResponseShape::SingleUrl(MediaItem::new(url, kind, read_size(map))))
}

fn match_named_field(level: &Value, _requested: &str) -> Option<ResponseShape> {
    let map = level.as_object()?;
    NAMED_URL_FIELDS.iter().find_map(|(field, field_kind)| {
        let url = map.get(*field).and_then(http_url)?;
        let kind = MediaKind::from_extension(url_path(url))
            .or(*field_kind)
            .unwrap_or(MediaKind::Video);
        Some(ResponseShape::NamedField(MediaItem::new(url, kind, read_size(map))))
    })
}

fn is_same_link(url: &str, requested: &str) -> bool {
    let policy = LinkPolicy::permissive();
    match (normalize_link(url, &policy), normalize_link(requested, &policy)) {
        (Ok(url), Ok(requested)) => url == requested,
        _ => false,
    }
}

// == Item Parsing ==
/// Parses array items, muxed mp4 formats first. Audio-only items are used
/// only when nothing else is present.
fn parse_items(items: &[Value]) -> Vec<MediaItem> {
    let objects: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();

    let mut playable: Vec<&Map<String, Value>> =
        objects.iter().copied().filter(|item| !is_audio(item)).collect();
    playable.sort_by_key(|item| format_rank(item));

    let parsed: Vec<MediaItem> = playable.into_iter().filter_map(parse_item).collect();
    if !parsed.is_empty() {
        return parsed;
    }
    objects.into_iter().filter_map(parse_item).collect()
}

fn parse_item(item: &Map<String, Value>) -> Option<MediaItem> {
    let url = ITEM_URL_KEYS
        .iter()
        .find_map(|key| item.get(*key).and_then(http_url))?;
    let kind = type_hint(item)
        .or_else(|| MediaKind::from_extension(url_path(url)))
        .unwrap_or(MediaKind::Video);
    Some(MediaItem::new(url, kind, read_size(item)))
}

/// 0 for itag 18 (mp4 with audio), 1 for other mp4 formats, 2 otherwise.
fn format_rank(item: &Map<String, Value>) -> u8 {
    let itag = match item.get("itag") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    if itag == MUXED_MP4_ITAG {
        return 0;
    }
    let mime_mp4 = item
        .get("mimeType")
        .and_then(Value::as_str)
        .is_some_and(|mime| mime.to_ascii_lowercase().contains("mp4"));
    let ext_mp4 = item
        .get("extension")
        .and_then(Value::as_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"));
    if mime_mp4 || ext_mp4 {
        1
    } else {
        2
    }
}

fn type_hint(item: &Map<String, Value>) -> Option<MediaKind> {
    TYPE_HINT_KEYS
        .iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .find_map(MediaKind::from_hint)
}

fn is_audio(item: &Map<String, Value>) -> bool {
    let hints: Vec<String> = TYPE_HINT_KEYS
        .iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::to_ascii_lowercase)
        .collect();
    let audio = hints
        .iter()
        .any(|h| h.contains("audio") || matches!(h.as_str(), "mp3" | "m4a" | "aac" | "wav" | "ogg"));
    audio && type_hint(item).is_none() && !item.contains_key("resolution")
}

fn http_url(value: &Value) -> Option<&str> {
    let url = value.as_str()?.trim();
    (url.starts_with("http://") || url.starts_with("https://")).then_some(url)
}

fn url_path(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map_or("", |(_, path)| path))
        .unwrap_or(without_query)
}

fn read_size(map: &Map<String, Value>) -> Option<u64> {
    SIZE_KEYS.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

// == Metadata ==
/// Pulls descriptive fields from the top level, else from a `data`/`result` wrapper.
pub fn extract_metadata(body: &Value) -> MediaMetadata {
    let Value::Object(map) = body else {
        return MediaMetadata::default();
    };

    let top = metadata_from(map);
    if !top.is_empty() {
        return top;
    }
    CONTAINER_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_object))
        .map(metadata_from)
        .find(|meta| !meta.is_empty())
        .unwrap_or_default()
}

fn metadata_from(map: &Map<String, Value>) -> MediaMetadata {
    let mut fields = METADATA_KEYS.iter().map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });
    MediaMetadata {
        source: fields.next().flatten(),
        author: fields.next().flatten(),
        title: fields.next().flatten(),
        thumbnail: fields.next().flatten(),
        duration: fields.next().flatten(),
    }
}

// == Fingerprint ==
/// Describes a payload's structure without its values, for diagnostics.
///
/// `{"error":"x","status":1}` becomes `{error:string,status:number}`.
pub fn fingerprint(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let mut fields: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}:{}", key, type_name(value)))
                .collect();
            fields.sort();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => format!("array(len={})", items.len()),
        other => type_name(other).to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
