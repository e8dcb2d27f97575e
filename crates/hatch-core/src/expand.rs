//! Template expansion shared by config loading and the invokers.
//!
//! Two independent passes: `{{param}}` placeholders are filled from the
//! caller-supplied argument map, and `$VAR` / `${VAR}` references are
//! filled from the process environment (undefined variables expand to the
//! empty string).

use serde_json::{Map, Value};

/// Replace every `{{name}}` placeholder with the matching argument value.
/// Unmatched placeholders are left as-is.
pub fn expand_placeholders(template: &str, args: &Map<String, Value>) -> String {
    let mut result = template.to_string();
    for (name, value) in args {
        let placeholder = format!("{{{{{name}}}}}");
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, &value_text(value));
        }
    }
    result
}

/// Render an argument value the way it reads in a shell: strings bare,
/// everything else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expand `$VAR` and `${VAR}` references from the process environment.
pub fn expand_env(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        match chars.peek() {
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if closed {
                    result.push_str(&std::env::var(&name).unwrap_or_default());
                } else {
                    // Unterminated `${` is kept literally.
                    result.push_str("${");
                    result.push_str(&name);
                }
            }
            Some((_, c)) if c.is_ascii_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                result.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => result.push('$'),
        }
    }

    result
}
