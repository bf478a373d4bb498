use crate::core::error::IdFormatError;
use crate::core::model::AddonDescriptor;

const IMDB_PREFIX: &str = "tt";
const IMDB_MIN_DIGITS: usize = 7;

/// Rewrites a canonical id into the namespace an addon accepts.
pub fn format_id(descriptor: &AddonDescriptor, canonical_id: &str) -> Result<String, IdFormatError> {
    format_for_prefixes(&descriptor.id_prefixes, canonical_id)
}

pub fn format_for_prefixes(prefixes: &[String], canonical_id: &str) -> Result<String, IdFormatError> {
    let id = canonical_id.trim();
    if prefixes.is_empty() {
        return Ok(id.to_string());
    }

    if prefixes.iter().any(|p| has_prefix(id, p)) {
        return Ok(id.to_string());
    }

    let numeric = !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
    if numeric {
        for scheme in prefixes {
            let namespace = scheme.trim_end_matches(':');
            if namespace.is_empty() {
                continue;
            }
            if namespace == IMDB_PREFIX {
                return Ok(format!("{}{:0>width$}", IMDB_PREFIX, id, width = IMDB_MIN_DIGITS));
            }
            if namespace.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Ok(format!("{}:{}", namespace, id));
            }
        }
    }

    Err(IdFormatError::Unsupported { id: id.to_string(), expected: prefixes.to_vec() })
}

/// `tt` matches `tt0111161`; `kitsu` and `kitsu:` both match `kitsu:1`.
fn has_prefix(id: &str, prefix: &str) -> bool {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return false;
    }
    if let Some((namespace, _)) = id.split_once(':') {
        if namespace == prefix.trim_end_matches(':') {
            return true;
        }
    }
    if prefix == IMDB_PREFIX {
        return id.len() > IMDB_PREFIX.len()
            && id.starts_with(IMDB_PREFIX)
            && id[IMDB_PREFIX.len()..].bytes().next().is_some_and(|b| b.is_ascii_digit());
    }
    id.starts_with(prefix) && prefix.ends_with(':')
}
