use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from raw TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw)
            .map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self =
            toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL is empty or the default
    /// provider has no matching environment credential
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }

        if let Some(default_provider) = &self.llm.default_provider
            && !self.llm.env_credentials.contains_key(default_provider)
        {
            anyhow::bail!(
                "llm.default_provider '{default_provider}' has no entry in llm.env_credentials"
            );
        }

        for (alias, model) in &self.llm.task_models {
            if model.trim().is_empty() {
                anyhow::bail!("llm.task_models.{alias} must not be empty");
            }
        }

        if self.usage.alert_threshold == 0 {
            anyhow::bail!("usage.alert_threshold must be at least 1");
        }
        if self.usage.sample_limit == 0 {
            anyhow::bail!("usage.sample_limit must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [database]
        url = "postgres://localhost/scribe"

        [auth]
        shared_secret = "test-secret"
    "#;

    #[test]
    fn minimal_config_parses() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.usage.alert_threshold, 10);
        assert_eq!(config.usage.sample_limit, 50);
        assert!(config.llm.default_provider.is_none());
    }

    #[test]
    fn full_llm_section_parses() {
        let raw = r#"
            [database]
            url = "postgres://localhost/scribe"

            [auth]
            shared_secret = "test-secret"

            [llm]
            default_provider = "openai"

            [llm.task_models]
            summary = "gpt-4o-mini"
            embedding = "text-embedding-3-small"

            [llm.env_credentials.openai]
            api_type = "openai_compat"
            api_key = "sk-test"
            base_url = "https://api.openai.com"
        "#;

        let config = Config::from_toml(raw).unwrap();
        assert_eq!(config.llm.fallback_model("summary"), "gpt-4o-mini");
        let cred = &config.llm.env_credentials["openai"];
        assert_eq!(cred.api_type, scribe_core::ApiType::OpenaiCompat);
    }

    #[test]
    fn default_provider_requires_env_credential() {
        let raw = r#"
            [database]
            url = "postgres://localhost/scribe"

            [auth]
            shared_secret = "test-secret"

            [llm]
            default_provider = "openai"
        "#;

        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("env_credentials"));
    }

    #[test]
    fn empty_database_url_rejected() {
        let raw = r#"
            [database]
            url = ""

            [auth]
            shared_secret = "test-secret"
        "#;

        assert!(Config::from_toml(raw).is_err());
    }
}
