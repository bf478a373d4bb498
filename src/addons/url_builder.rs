use crate::core::model::{AddonDescriptor, AuthKind, ContentType, Resource};
use reqwest::header::AUTHORIZATION;
use std::collections::BTreeMap;
use url::form_urlencoded::byte_serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Builds the request for one addon resource. Pure: equal inputs give equal output.
pub fn build_request(
    descriptor: &AddonDescriptor,
    resource: Resource,
    content_type: ContentType,
    formatted_id: &str,
) -> AddonRequest {
    let base = descriptor
        .per_resource_endpoint
        .get(&resource)
        .unwrap_or(&descriptor.base_url)
        .trim_end_matches('/');

    let mut url = match descriptor.url_pattern.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(pattern) => pattern
            .replace("{baseUrl}", base)
            .replace("{resource}", resource.as_str())
            .replace("{type}", content_type.as_str())
            .replace("{id}", formatted_id),
        None => format!("{}/{}/{}/{}.json", base, resource, content_type, formatted_id),
    };

    let mut headers = BTreeMap::new();
    if let Some(auth) = descriptor.auth.as_ref().filter(|a| !a.key.is_empty()) {
        match auth.kind {
            AuthKind::HeaderBearer => {
                headers.insert(AUTHORIZATION.as_str().to_string(), format!("Bearer {}", auth.key));
            }
            AuthKind::QueryParam => {
                let key: String = byte_serialize(auth.key.as_bytes()).collect();
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str("api_key=");
                url.push_str(&key);
            }
        }
    }

    AddonRequest { url, headers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::manifest::parse_manifest;
    use crate::core::model::AddonAuth;
    use serde_json::json;

    fn descriptor() -> AddonDescriptor {
        let doc = json!({"id": "x", "name": "X", "resources": ["stream"], "types": ["movie"]});
        parse_manifest(&doc, "https://x.example/sub/manifest.json").unwrap()
    }

    #[test]
    fn default_path_layout() {
        let req = build_request(&descriptor(), Resource::Stream, ContentType::Movie, "tt0111161");
        assert_eq!(req.url, "https://x.example/sub/stream/movie/tt0111161.json");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn per_resource_endpoint_overrides_base() {
        let mut d = descriptor();
        d.per_resource_endpoint.insert(Resource::Stream, "https://cdn.example/v2/".to_string());
        let req = build_request(&d, Resource::Stream, ContentType::Series, "tt0944947:1:2");
        assert_eq!(req.url, "https://cdn.example/v2/stream/series/tt0944947:1:2.json");

        let req = build_request(&d, Resource::Meta, ContentType::Series, "tt0944947");
        assert_eq!(req.url, "https://x.example/sub/meta/series/tt0944947.json");
    }

    #[test]
    fn url_pattern_placeholders_are_substituted() {
        let mut d = descriptor();
        d.url_pattern = Some("{baseUrl}/api/{resource}?type={type}&id={id}".to_string());
        d.auth = Some(AddonAuth { kind: AuthKind::QueryParam, key: "a b&c".to_string() });
        let req = build_request(&d, Resource::Stream, ContentType::Movie, "tt1");
        assert_eq!(
            req.url,
            "https://x.example/sub/api/stream?type=movie&id=tt1&api_key=a+b%26c"
        );
    }

    #[test]
    fn bearer_auth_goes_into_headers() {
        let mut d = descriptor();
        d.auth = Some(AddonAuth { kind: AuthKind::HeaderBearer, key: "secret".to_string() });
        let req = build_request(&d, Resource::Stream, ContentType::Movie, "tt1");
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer secret"));
        assert!(!req.url.contains("secret"));
    }

    #[test]
    fn query_auth_without_existing_query() {
        let mut d = descriptor();
        d.auth = Some(AddonAuth { kind: AuthKind::QueryParam, key: "k1".to_string() });
        let req = build_request(&d, Resource::Stream, ContentType::Movie, "tt1");
        assert_eq!(req.url, "https://x.example/sub/stream/movie/tt1.json?api_key=k1");
    }

    #[test]
    fn building_is_deterministic() {
        let mut d = descriptor();
        d.auth = Some(AddonAuth { kind: AuthKind::HeaderBearer, key: "secret".to_string() });
        let a = build_request(&d, Resource::Stream, ContentType::Movie, "tt1");
        let b = build_request(&d, Resource::Stream, ContentType::Movie, "tt1");
        assert_eq!(a, b);
    }
}
