//! Base-URL normalization for provider protocol conventions

use scribe_core::ApiType;
use serde_json::Value;

/// Normalize an API base URL according to provider protocol conventions
///
/// The `api_path_mode` key in `extra_config` can force a mode:
/// - `append_v1`: ensure the path ends in `/v1`
/// - `strip_v1`: drop a trailing `/v1`
///
/// Without a forced mode, OpenAI-compatible providers get `append_v1`,
/// Anthropic providers get `strip_v1`, and anything else only loses a
/// trailing slash. A missing or empty URL stays absent regardless.
#[must_use]
pub fn normalize_api_base(
    base_url: Option<&str>,
    api_type: Option<ApiType>,
    extra_config: Option<&Value>,
) -> Option<String> {
    let base_url = base_url?;
    if base_url.is_empty() {
        return None;
    }

    let mode = extra_config
        .and_then(|config| config.get("api_path_mode"))
        .and_then(Value::as_str)
        .unwrap_or("auto");

    let normalized = match mode {
        "append_v1" => ensure_v1_suffix(base_url),
        "strip_v1" => strip_v1_suffix(base_url),
        _ => match api_type {
            Some(ApiType::OpenaiCompat) => ensure_v1_suffix(base_url),
            Some(ApiType::Anthropic) => strip_v1_suffix(base_url),
            _ => strip_trailing_slash(base_url).to_owned(),
        },
    };

    Some(normalized)
}

fn strip_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn ensure_v1_suffix(url: &str) -> String {
    let url = strip_trailing_slash(url);
    if url.ends_with("/v1") {
        return url.to_owned();
    }
    if url.ends_with("/v") {
        return format!("{url}1");
    }
    format!("{url}/v1")
}

fn strip_v1_suffix(url: &str) -> String {
    let url = strip_trailing_slash(url);
    url.strip_suffix("/v1").unwrap_or(url).to_owned()
}
