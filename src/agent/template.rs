//! `{variable}` substitution for agent command templates.
//!
//! An undefined variable is an error, not a silent empty substitution.
//!
//! Syntax: `{name}` substitutes variable `name`; `{{` and `}}` render as
//! literal braces.

use std::collections::HashMap;
use std::fmt;

/// Error type for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A variable was referenced but not provided.
    UndefinedVariable { name: String, position: usize },
    /// A `{` was found without a matching `}`.
    UnmatchedBrace { position: usize },
    /// An empty variable name was found (`{}`).
    EmptyVariableName { position: usize },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UndefinedVariable { name, position } => {
                write!(
                    f,
                    "undefined variable '{}' at position {} in template",
                    name, position
                )
            }
            TemplateError::UnmatchedBrace { position } => {
                write!(f, "unmatched '{{' at position {} in template", position)
            }
            TemplateError::EmptyVariableName { position } => {
                write!(
                    f,
                    "empty variable name '{{}}' at position {} in template",
                    position
                )
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Render a template string by substituting `{variable}` placeholders.
pub fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if let Some((_, '{')) = chars.peek() {
                    chars.next();
                    result.push('{');
                    continue;
                }

                let start_pos = pos;
                let mut var_name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => var_name.push(c),
                        None => {
                            return Err(TemplateError::UnmatchedBrace {
                                position: start_pos,
                            });
                        }
                    }
                }

                if var_name.is_empty() {
                    return Err(TemplateError::EmptyVariableName {
                        position: start_pos,
                    });
                }

                let var_name = var_name.trim();
                match variables.get(var_name) {
                    Some(value) => result.push_str(value),
                    None => {
                        return Err(TemplateError::UndefinedVariable {
                            name: var_name.to_string(),
                            position: start_pos,
                        });
                    }
                }
            }
            '}' => {
                if let Some((_, '}')) = chars.peek() {
                    chars.next();
                }
                result.push('}');
            }
            _ => result.push(ch),
        }
    }

    Ok(result)
}
