//! Post-processing of raw suggestion candidates.

use serde::{Deserialize, Serialize};

/// Turns raw candidates for one input position into the final suggestions.
///
/// `input` is the text the candidates compete for: the token being typed, or
/// for greedy arguments everything the argument has consumed so far.
pub trait SuggestionProcessor: Send + Sync {
    fn process(&self, input: &str, candidates: Vec<String>) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Filter {
    StartsWith {
        #[serde(default, rename = "ignoreCase")]
        ignore_case: bool,
    },
    Contains {
        #[serde(default, rename = "ignoreCase")]
        ignore_case: bool,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Self::StartsWith { ignore_case: true }
    }
}

impl Filter {
    pub fn matches(&self, input: &str, candidate: &str) -> bool {
        match *self {
            Self::StartsWith { ignore_case: true } => candidate
                .to_lowercase()
                .starts_with(&input.to_lowercase()),
            Self::StartsWith { ignore_case: false } => candidate.starts_with(input),
            Self::Contains { ignore_case: true } => {
                candidate.to_lowercase().contains(&input.to_lowercase())
            }
            Self::Contains { ignore_case: false } => candidate.contains(input),
        }
    }
}

/// Keeps candidates accepted by a [`Filter`].
///
/// With `trim_before_last_space`, a candidate that repeats the part of the
/// input up to its last space has that part removed, so multi-word candidates
/// only complete the current word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilteringProcessor {
    filter: Filter,
    trim_before_last_space: bool,
}

impl FilteringProcessor {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            trim_before_last_space: false,
        }
    }

    pub fn and_trim_before_last_space(mut self) -> Self {
        self.trim_before_last_space = true;
        self
    }

    fn trim<'c>(&self, input: &str, candidate: &'c str) -> &'c str {
        let Some(last_space) = input.rfind(' ') else {
            return candidate;
        };
        let prefix = &input[..=last_space];
        match candidate.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(prefix) => &candidate[prefix.len()..],
            _ => candidate,
        }
    }
}

impl SuggestionProcessor for FilteringProcessor {
    fn process(&self, input: &str, candidates: Vec<String>) -> Vec<String> {
        candidates
            .into_iter()
            .filter(|candidate| self.filter.matches(input, candidate))
            .map(|candidate| {
                if self.trim_before_last_space {
                    self.trim(input, &candidate).to_string()
                } else {
                    candidate
                }
            })
            .collect()
    }
}

/// Returns candidates untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProcessor;

impl SuggestionProcessor for PassthroughProcessor {
    fn process(&self, _input: &str, candidates: Vec<String>) -> Vec<String> {
        candidates
    }
}

/// Candidates collected at one input position, before processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frontier {
    pub(crate) input: String,
    pub(crate) candidates: Vec<String>,
}

impl Frontier {
    pub(crate) fn new(input: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            input: input.into(),
            candidates,
        }
    }
}

/// Run every frontier through `processor` and drop repeats, keeping the first.
pub(crate) fn finish(processor: &dyn SuggestionProcessor, frontiers: Vec<Frontier>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for frontier in frontiers {
        for candidate in processor.process(&frontier.input, frontier.candidates) {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_filter_is_case_insensitive_prefix() {
        let processor = FilteringProcessor::default();
        assert_eq!(
            processor.process("HE", strings(&["hey", "hi", "Hello"])),
            strings(&["hey", "Hello"])
        );
    }

    #[test]
    fn case_sensitive_and_contains_filters() {
        let exact = FilteringProcessor::new(Filter::StartsWith { ignore_case: false });
        assert_eq!(exact.process("He", strings(&["hey", "Hey"])), strings(&["Hey"]));

        let contains = FilteringProcessor::new(Filter::Contains { ignore_case: true });
        assert_eq!(
            contains.process("LL", strings(&["hello", "world", "all"])),
            strings(&["hello", "all"])
        );
    }

    #[test]
    fn trimming_removes_completed_words() {
        let processor = FilteringProcessor::default().and_trim_before_last_space();
        assert_eq!(
            processor.process("hello wo", strings(&["hello world"])),
            strings(&["world"])
        );
        assert_eq!(
            processor.process("hello", strings(&["hello world"])),
            strings(&["hello world"])
        );
        assert!(processor.process("hello world ", strings(&["hello world"])).is_empty());
    }

    #[test]
    fn finish_keeps_first_occurrence() {
        let frontiers = vec![
            Frontier::new("", strings(&["a", "b"])),
            Frontier::new("", strings(&["b", "c"])),
        ];
        assert_eq!(
            finish(&PassthroughProcessor, frontiers),
            strings(&["a", "b", "c"])
        );
    }

    #[test]
    fn filter_deserializes_from_manifest_shape() {
        let filter: Filter =
            serde_json::from_str(r#"{"kind":"contains","ignoreCase":true}"#).unwrap();
        assert_eq!(filter, Filter::Contains { ignore_case: true });
    }
}
