use crate::core::model::{Quality, StreamCandidate, StreamPayload};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

static QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(2160p|4k|uhd|1080p|720p|480p)\b").expect("quality regex"));
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s?(TB|GB|MB|KB|TiB|GiB|MiB|KiB)\b").expect("size regex")
});
static SEEDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:👤|seeders?|seeds?)\s*:?\s*(\d+)").expect("seeds regex"));

/// The response shapes addons use for stream lists.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamResponse {
    List(Vec<Value>),
    Wrapped(Vec<Value>),
    Single(Value),
}

impl StreamResponse {
    /// `None` when the document is not any known shape (null, a scalar).
    pub fn classify(doc: Value) -> Option<Self> {
        match doc {
            Value::Array(items) => Some(Self::List(items)),
            Value::Object(mut obj) => match obj.remove("streams") {
                Some(Value::Array(items)) => Some(Self::Wrapped(items)),
                Some(other) => {
                    obj.insert("streams".to_string(), other);
                    Some(Self::Single(Value::Object(obj)))
                }
                None => Some(Self::Single(Value::Object(obj))),
            },
            _ => None,
        }
    }

    pub fn into_entries(self) -> Vec<Value> {
        match self {
            Self::List(items) | Self::Wrapped(items) => items,
            Self::Single(item) => vec![item],
        }
    }
}

/// Fields stay raw JSON; the helpers below read them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStream {
    url: Option<Value>,
    magnet: Option<Value>,
    info_hash: Option<Value>,
    file_idx: Option<Value>,
    title: Option<Value>,
    name: Option<Value>,
    description: Option<Value>,
    quality: Option<Value>,
    size: Option<Value>,
    seeds: Option<Value>,
    seeders: Option<Value>,
    broken: Option<Value>,
    dead: Option<Value>,
}

/// Converts one raw entry into a candidate, or drops it.
///
/// Dropped: non-objects, entries flagged `broken`/`dead`, and entries with no
/// usable url, magnet or info-hash.
pub fn to_candidate(entry: Value, addon_id: &str, addon_name: &str) -> Option<StreamCandidate> {
    if !entry.is_object() {
        return None;
    }
    let raw: RawStream = serde_json::from_value(entry).ok()?;
    if raw.broken.as_ref().is_some_and(truthy) || raw.dead.as_ref().is_some_and(truthy) {
        return None;
    }

    let payload = payload_of(&raw)?;

    let name = text_of(&raw.name);
    let title = text_of(&raw.title);
    let text = [&name, &title, &text_of(&raw.description)]
        .iter()
        .filter_map(|s| s.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    let quality = raw
        .quality
        .as_ref()
        .and_then(quality_of)
        .or_else(|| detect_quality(&text))
        .unwrap_or_default();

    let size_label = match &raw.size {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.as_u64().map(fmt_bytes).unwrap_or_default(),
        _ => detect_size(&text).unwrap_or_default(),
    };

    let seeds = raw.seeds.as_ref().or(raw.seeders.as_ref()).and_then(as_u32).or_else(|| detect_seeds(&text));

    let title = title
        .as_deref()
        .or(name.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Stream")
        .to_string();

    Some(StreamCandidate {
        title,
        quality,
        size_label,
        seeds,
        source_addon_id: addon_id.to_string(),
        source_addon_name: addon_name.to_string(),
        payload,
    })
}

fn payload_of(raw: &RawStream) -> Option<StreamPayload> {
    let non_empty = |v: &Option<Value>| text_of(v).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    if let Some(url) = non_empty(&raw.url) {
        if url.starts_with("magnet:") {
            return Some(StreamPayload::TorrentMagnet { magnet: url });
        }
        if Url::parse(&url).is_ok_and(|u| u.scheme() == "http" || u.scheme() == "https") {
            return Some(StreamPayload::DirectHttp { url });
        }
    }
    if let Some(magnet) = non_empty(&raw.magnet) {
        return Some(StreamPayload::TorrentMagnet { magnet });
    }
    if let Some(info_hash) = non_empty(&raw.info_hash) {
        let file_idx = raw.file_idx.as_ref().and_then(as_u32);
        return Some(StreamPayload::TorrentInfoHash { info_hash, file_idx });
    }
    None
}

/// Stable: equal quality and seeds keep their incoming order.
pub fn rank(candidates: &mut [StreamCandidate]) {
    candidates.sort_by(|a, b| {
        b.quality
            .cmp(&a.quality)
            .then_with(|| b.seeds.unwrap_or(0).cmp(&a.seeds.unwrap_or(0)))
    });
}

pub fn detect_quality(text: &str) -> Option<Quality> {
    QUALITY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| Quality::from_token(m.as_str()))
}

pub fn detect_size(text: &str) -> Option<String> {
    let c = SIZE_RE.captures(text)?;
    Some(format!("{} {}", &c[1], &c[2]))
}

pub fn detect_seeds(text: &str) -> Option<u32> {
    SEEDS_RE.captures(text).and_then(|c| c[1].parse().ok())
}

pub fn fmt_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let f = n as f64;
    if f >= GB {
        format!("{:.2}GiB", f / GB)
    } else if f >= MB {
        format!("{:.2}MiB", f / MB)
    } else if f >= KB {
        format!("{:.2}KiB", f / KB)
    } else {
        format!("{}B", n)
    }
}

/// Strings as-is, numbers and booleans in their JSON spelling, anything else absent.
fn text_of(v: &Option<Value>) -> Option<String> {
    match v.as_ref()? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A bare vertical resolution such as `1080` counts as `1080p`.
fn quality_of(v: &Value) -> Option<Quality> {
    match v {
        Value::String(s) => detect_quality(s),
        Value::Number(n) => n.as_u64().and_then(|h| Quality::from_token(&format!("{}p", h))),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
