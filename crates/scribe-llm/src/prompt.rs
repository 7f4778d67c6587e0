//! Prompt template rendering
//!
//! Templates use `{name}` placeholders with `{{`/`}}` escapes. A
//! template that fails to render (missing variable, malformed braces)
//! degrades to a concatenation of the raw template and the variable
//! map. The request proceeds either way, and the degradation is
//! logged.

use std::collections::BTreeMap;

/// Render a prompt template with named variables
///
/// When no template is given, the `content` variable doubles as the
/// template, so plain passthrough invocations work without one.
pub fn render_prompt(template: Option<&str>, variables: &BTreeMap<String, String>) -> String {
    let default_template = variables.get("content").map_or("", String::as_str);
    let template = template.unwrap_or(default_template);

    match substitute(template, variables) {
        Ok(rendered) => rendered,
        Err(reason) => {
            tracing::warn!(%reason, "failed to render prompt, falling back to concatenation");
            format!("{template}\n\nContext: {variables:?}")
        }
    }
}

/// Build the variable map for a single-content invocation
pub fn content_variables(content: &str) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();
    variables.insert("content".to_owned(), content.to_owned());
    variables
}

/// Substitute `{name}` placeholders, honoring `{{`/`}}` escapes
fn substitute(template: &str, variables: &BTreeMap<String, String>) -> Result<String, String> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    output.push('{');
                    continue;
                }

                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err("unterminated placeholder".to_owned()),
                    }
                }

                match variables.get(&name) {
                    Some(value) => output.push_str(value),
                    None => return Err(format!("missing variable: {name}")),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    output.push('}');
                } else {
                    return Err("unmatched '}'".to_owned());
                }
            }
            _ => output.push(c),
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn substitutes_named_variables() {
        let variables = vars(&[("content", "the post body"), ("language", "French")]);
        let rendered = render_prompt(Some("Translate to {language}:\n{content}"), &variables);
        assert_eq!(rendered, "Translate to French:\nthe post body");
    }

    #[test]
    fn content_doubles_as_template() {
        let variables = vars(&[("content", "Summarize me")]);
        assert_eq!(render_prompt(None, &variables), "Summarize me");
    }

    #[test]
    fn missing_variable_degrades_to_concatenation() {
        let variables = vars(&[("content", "text")]);
        let rendered = render_prompt(Some("Write about {topic}"), &variables);
        assert!(rendered.starts_with("Write about {topic}\n\nContext: "));
        assert!(rendered.contains("text"));
    }

    #[test]
    fn double_braces_are_literals() {
        let variables = vars(&[("content", "x")]);
        let rendered = render_prompt(Some("Return JSON: {{\"summary\": \"{content}\"}}"), &variables);
        assert_eq!(rendered, "Return JSON: {\"summary\": \"x\"}");
    }

    #[test]
    fn unterminated_placeholder_degrades() {
        let variables = vars(&[("content", "x")]);
        let rendered = render_prompt(Some("broken {content"), &variables);
        assert!(rendered.starts_with("broken {content\n\nContext: "));
    }
}
