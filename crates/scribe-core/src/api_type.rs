use serde::{Deserialize, Serialize};

/// Provider protocol families
///
/// Determines how base URLs are normalized and which protocol prefix the
/// dispatcher applies to model identifiers before an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    /// OpenAI-compatible API (including third-party compatibles)
    OpenaiCompat,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
    /// Azure OpenAI Service
    Azure,
    /// Custom endpoint speaking an OpenAI-compatible wire
    Custom,
}

impl ApiType {
    /// Wire representation stored in `ai_providers.api_type`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenaiCompat => "openai_compat",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Azure => "azure",
            Self::Custom => "custom",
        }
    }

    /// Parse the stored wire representation
    ///
    /// Returns `None` for unknown strings; callers decide whether that
    /// is an error or a pass-through.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai_compat" => Some(Self::OpenaiCompat),
            "anthropic" => Some(Self::Anthropic),
            "google" => Some(Self::Google),
            "azure" => Some(Self::Azure),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_strings() {
        for api_type in [
            ApiType::OpenaiCompat,
            ApiType::Anthropic,
            ApiType::Google,
            ApiType::Azure,
            ApiType::Custom,
        ] {
            assert_eq!(ApiType::parse(api_type.as_str()), Some(api_type));
        }
    }

    #[test]
    fn unknown_string_is_none() {
        assert_eq!(ApiType::parse("cohere"), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ApiType::OpenaiCompat).unwrap();
        assert_eq!(json, "\"openai_compat\"");
    }
}
