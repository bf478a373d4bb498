use crate::core::error::ManifestError;
use crate::core::model::{AddonDescriptor, AddonKind, ContentType, Resource};
use crate::http::{self, FetchError, HttpContext};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

pub const MANIFEST_SUFFIX: &str = "/manifest.json";

/// Top-level manifest keys that may carry an `endpoint` override, by priority.
const ENDPOINT_KEYS: &[(Resource, &[&str])] = &[
    (Resource::Stream, &["stream", "streaming", "torrent"]),
    (Resource::Catalog, &["catalog"]),
    (Resource::Meta, &["meta"]),
    (Resource::Subtitles, &["subtitles", "subtitle"]),
];

/// Makes `raw` point at the manifest document itself.
pub fn normalize_manifest_url(raw: &str) -> Result<String, ManifestError> {
    let raw = raw.trim();
    let normalized = if raw.ends_with(MANIFEST_SUFFIX) {
        raw.to_string()
    } else if raw.ends_with('/') {
        format!("{}manifest.json", raw)
    } else if let Some(stem) = raw.strip_suffix(".json") {
        format!("{}{}", stem, MANIFEST_SUFFIX)
    } else {
        format!("{}{}", raw, MANIFEST_SUFFIX)
    };

    let parsed = Url::parse(&normalized).map_err(|e| ManifestError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ManifestError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(normalized)
}

pub fn base_url_of(manifest_url: &str) -> String {
    manifest_url
        .strip_suffix(MANIFEST_SUFFIX)
        .unwrap_or(manifest_url)
        .trim_end_matches('/')
        .to_string()
}

pub struct ManifestIngester {
    client: reqwest::Client,
    ctx: HttpContext,
}

impl ManifestIngester {
    pub fn new(client: reqwest::Client, ctx: HttpContext) -> Self {
        Self { client, ctx }
    }

    pub async fn ingest(&self, manifest_url: &str) -> Result<AddonDescriptor, ManifestError> {
        let url = normalize_manifest_url(manifest_url)?;
        debug!(url = %url, "fetching addon manifest");

        let headers = self
            .ctx
            .json_headers(&BTreeMap::new())
            .map_err(|e| ManifestError::Network(e.to_string()))?;
        let timeout = Duration::from_secs(self.ctx.manifest_timeout_secs);

        let doc = http::get_json(&self.client, &self.ctx, &url, headers, timeout, self.ctx.retries)
            .await
            .map_err(|e| match e {
                FetchError::Status(status) => ManifestError::Http { status, url: url.clone() },
                FetchError::Decode(e) => ManifestError::Validation(format!("manifest is not JSON: {}", e)),
                other => ManifestError::Network(other.to_string()),
            })?;

        parse_manifest(&doc, &url)
    }
}

/// Turns a fetched manifest document into a descriptor. Pure.
pub fn parse_manifest(doc: &Value, manifest_url: &str) -> Result<AddonDescriptor, ManifestError> {
    let obj = doc
        .as_object()
        .ok_or_else(|| ManifestError::Validation("manifest is not a JSON object".to_string()))?;

    let id = scalar_string(obj.get("id"))
        .ok_or_else(|| ManifestError::Validation("missing required field `id`".to_string()))?;
    let name = scalar_string(obj.get("name"))
        .ok_or_else(|| ManifestError::Validation("missing required field `name`".to_string()))?;

    let mut resources = collect_resources(obj.get("resources"));
    let supported_types = collect_types(obj);
    let id_prefixes = collect_id_prefixes(obj);

    let explicit_marker = ["stream", "streaming", "torrent"]
        .iter()
        .any(|k| obj.get(*k).is_some_and(is_truthy));
    if explicit_marker || supported_types.iter().any(ContentType::implies_streaming) {
        // providers routinely leave `stream` out of `resources` when they serve movies/series
        resources.insert(Resource::Stream);
    }

    let mut per_resource_endpoint = BTreeMap::new();
    for (resource, keys) in ENDPOINT_KEYS {
        let endpoint = keys.iter().find_map(|k| {
            obj.get(*k)
                .and_then(|v| v.get("endpoint"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        });
        if let Some(endpoint) = endpoint {
            per_resource_endpoint.insert(*resource, base_url_of(endpoint));
        }
    }

    let kind = AddonKind::classify(&resources, &supported_types);

    Ok(AddonDescriptor {
        id,
        name,
        description: scalar_string(obj.get("description")).unwrap_or_default(),
        version: scalar_string(obj.get("version")).unwrap_or_else(|| "1.0.0".to_string()),
        base_url: base_url_of(manifest_url),
        manifest_url: manifest_url.to_string(),
        resources,
        supported_types,
        id_prefixes,
        per_resource_endpoint,
        url_pattern: scalar_string(obj.get("urlPattern")),
        auth: None,
        kind,
        catalogs: obj.get("catalogs").and_then(Value::as_array).cloned().unwrap_or_default(),
        behavior_hints: obj.get("behaviorHints").cloned().unwrap_or(Value::Null),
        date_added: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    })
}

fn scalar_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn collect_resources(v: Option<&Value>) -> BTreeSet<Resource> {
    match v {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => ["name", "type", "id"]
                    .iter()
                    .find_map(|k| o.get(*k).and_then(Value::as_str)),
                _ => None,
            })
            .map(Resource::parse)
            .collect(),
        Some(Value::Object(map)) => map.keys().map(|k| Resource::parse(k)).collect(),
        _ => BTreeSet::new(),
    }
}

fn collect_types(obj: &serde_json::Map<String, Value>) -> BTreeSet<ContentType> {
    let mut types = BTreeSet::new();
    match obj.get("types") {
        Some(Value::Array(entries)) => {
            types.extend(entries.iter().filter_map(Value::as_str).map(ContentType::parse));
        }
        Some(Value::Object(map)) => types.extend(map.keys().map(|k| ContentType::parse(k))),
        _ => {}
    }
    if let Some(resources) = obj.get("resources").and_then(Value::as_array) {
        for r in resources {
            if let Some(nested) = r.get("types").and_then(Value::as_array) {
                types.extend(nested.iter().filter_map(Value::as_str).map(ContentType::parse));
            }
        }
    }
    if let Some(catalogs) = obj.get("catalogs").and_then(Value::as_array) {
        types.extend(
            catalogs
                .iter()
                .filter_map(|c| c.get("type").and_then(Value::as_str))
                .map(ContentType::parse),
        );
    }
    types
}

fn collect_id_prefixes(obj: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut lists: Vec<&Value> = Vec::new();
    if let Some(resources) = obj.get("resources").and_then(Value::as_array) {
        lists.extend(resources.iter().filter_map(|r| r.get("idPrefixes")));
    }
    if let Some(top) = obj.get("idPrefixes") {
        lists.push(top);
    }

    let mut prefixes: Vec<String> = Vec::new();
    for p in lists.into_iter().filter_map(Value::as_array).flatten().filter_map(Value::as_str) {
        let p = p.trim();
        if !p.is_empty() && !prefixes.iter().any(|existing| existing == p) {
            prefixes.push(p.to_string());
        }
    }
    prefixes
}
