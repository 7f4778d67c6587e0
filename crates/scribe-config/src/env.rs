use std::sync::OnceLock;

use regex::Regex;

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// `{{ env.VAR | default("fallback") }}` substitutes the fallback when
/// the variable is unset. Expansion happens on the raw text before
/// deserialization so the config structs stay plain. Comment lines are
/// passed through untouched.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
        } else {
            output.push_str(&expand_line(line)?);
        }
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

/// Expand placeholders within a single non-comment line
fn expand_line(line: &str) -> Result<String, String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Group 1: scoped key (`env.VAR`), group 2: optional default value
    let re = RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("must be valid regex")
    });

    let mut result = String::with_capacity(line.len());
    let mut last_end = 0;

    for captures in re.captures_iter(line) {
        let overall = captures.get(0).expect("capture 0 always present");
        let key = captures.get(1).expect("key group always present").as_str();
        let default_value = captures.get(2).map(|m| m.as_str());

        result.push_str(&line[last_end..overall.start()]);
        result.push_str(&resolve(key, default_value)?);
        last_end = overall.end();
    }

    result.push_str(&line[last_end..]);
    Ok(result)
}

/// Resolve one scoped key against the process environment
fn resolve(key: &str, default_value: Option<&str>) -> Result<String, String> {
    let Some(var_name) = key.strip_prefix("env.") else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };
    if var_name.contains('.') {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    }

    match std::env::var(var_name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.map_or_else(
            || Err(format!("environment variable not found: `{var_name}`")),
            |default| Ok(default.to_owned()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders() {
        let input = "key = \"value\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_env_var() {
        temp_env::with_var("SCRIBE_TEST_SUB", Some("hello"), || {
            let result = expand_env("key = \"{{ env.SCRIBE_TEST_SUB }}\"").unwrap();
            assert_eq!(result, "key = \"hello\"");
        });
    }

    #[test]
    fn missing_var_errors_without_default() {
        temp_env::with_var_unset("SCRIBE_TEST_MISSING", || {
            let err = expand_env("key = \"{{ env.SCRIBE_TEST_MISSING }}\"").unwrap_err();
            assert!(err.contains("SCRIBE_TEST_MISSING"));
        });
    }

    #[test]
    fn missing_var_uses_default() {
        temp_env::with_var_unset("SCRIBE_TEST_DEFAULTED", || {
            let result =
                expand_env("key = \"{{ env.SCRIBE_TEST_DEFAULTED | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"fallback\"");
        });
    }

    #[test]
    fn present_var_beats_default() {
        temp_env::with_var("SCRIBE_TEST_PRESENT", Some("actual"), || {
            let result =
                expand_env("key = \"{{ env.SCRIBE_TEST_PRESENT | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"actual\"");
        });
    }

    #[test]
    fn comment_lines_skip_expansion() {
        temp_env::with_var_unset("SCRIBE_TEST_COMMENTED", || {
            let input = "  # key = \"{{ env.SCRIBE_TEST_COMMENTED }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn unscoped_key_errors() {
        let err = expand_env("key = \"{{ vault.SECRET }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }
}
