//! Argument completion for `completion/complete`.

use super::registry::ArgumentDefinition;
use crate::error::BoxError;
use crate::types::Completion;

/// Suggestions for one argument given the partial `value` typed so far.
///
/// A custom completer wins over an enum list and its answer is passed through
/// untouched. Arguments with neither get an empty result rather than an error.
pub(crate) async fn complete_argument(
    argument: Option<&ArgumentDefinition>,
    value: &str,
    page_size: usize,
) -> Result<Completion, BoxError> {
    let Some(argument) = argument else {
        return Ok(empty());
    };
    if let Some(complete) = &argument.complete {
        return complete(value.to_string()).await;
    }
    match &argument.enum_values {
        Some(values) => Ok(match_enum(values, value, page_size)),
        None => Ok(empty()),
    }
}

/// Case-insensitive matching: prefix matches first, then other substring
/// matches, each group in declaration order.
pub(crate) fn match_enum(values: &[String], partial: &str, page_size: usize) -> Completion {
    let needle = partial.to_lowercase();
    let (prefixed, contained): (Vec<&String>, Vec<&String>) = values
        .iter()
        .filter(|v| v.to_lowercase().contains(&needle))
        .partition(|v| v.to_lowercase().starts_with(&needle));

    let matches: Vec<String> = prefixed.into_iter().chain(contained).cloned().collect();
    let total = matches.len();
    let values: Vec<String> = matches.into_iter().take(page_size).collect();
    Completion {
        has_more: (total > values.len()).then_some(true),
        total: Some(total as u64),
        values,
    }
}

fn empty() -> Completion {
    Completion {
        values: Vec::new(),
        total: None,
        has_more: None,
    }
}
