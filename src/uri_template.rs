//! Minimal RFC 6570 URI templates, enough to route `resources/read`.
//!
//! Supported expressions are simple `{var}` (one or more characters, never
//! `/`) and reserved `{+var}` (may span `/`). Matching is the inverse of
//! expansion: given a concrete URI, recover the variable values.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var { name: String, reserved: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid URI template: {0}")]
pub struct UriTemplateError(String);

/// A parsed URI template such as `file:///logs/{name}.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(template: &str) -> Result<Self, UriTemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut expr = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(UriTemplateError(format!(
                                    "nested '{{' in `{}`",
                                    template
                                )))
                            }
                            Some(other) => expr.push(other),
                            None => {
                                return Err(UriTemplateError(format!(
                                    "unclosed expression in `{}`",
                                    template
                                )))
                            }
                        }
                    }
                    let (reserved, name) = match expr.strip_prefix('+') {
                        Some(rest) => (true, rest),
                        None => (false, expr.as_str()),
                    };
                    let valid = !name.is_empty()
                        && name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
                    if !valid {
                        return Err(UriTemplateError(format!(
                            "unsupported expression `{{{}}}`",
                            expr
                        )));
                    }
                    if matches!(segments.last(), Some(Segment::Var { .. })) {
                        return Err(UriTemplateError(format!(
                            "adjacent expressions are ambiguous in `{}`",
                            template
                        )));
                    }
                    segments.push(Segment::Var {
                        name: name.to_string(),
                        reserved,
                    });
                }
                '}' => {
                    return Err(UriTemplateError(format!(
                        "unmatched '}}' in `{}`",
                        template
                    )))
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the template's variables, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Extracts variable values from `uri`, or `None` if it does not fit.
    pub fn match_uri(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut fields = HashMap::new();
        if match_from(&self.segments, uri, &mut fields) {
            Some(fields)
        } else {
            None
        }
    }

    pub fn expand(&self, vars: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var { name, .. } => {
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn match_from(segments: &[Segment], input: &str, fields: &mut HashMap<String, String>) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return input.is_empty();
    };
    match first {
        Segment::Literal(text) => match input.strip_prefix(text.as_str()) {
            Some(remaining) => match_from(rest, remaining, fields),
            None => false,
        },
        Segment::Var { name, reserved } => {
            // Shortest candidate first, so the following literal anchors as early as possible.
            for (end, c) in input.char_indices().map(|(i, c)| (i + c.len_utf8(), c)) {
                if !reserved && c == '/' {
                    break;
                }
                let (value, remaining) = input.split_at(end);
                if match_from(rest, remaining, fields) {
                    fields.insert(name.clone(), value.to_string());
                    return true;
                }
            }
            false
        }
    }
}
