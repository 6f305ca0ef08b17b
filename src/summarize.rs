// Copyright 2026 Folio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One or two sentences describing a result page.

use crate::model::Book;
use crate::model::BookSummaryInput;
use crate::oracle::GenerationParams;
use crate::oracle::TextOracle;

pub const NO_RESULTS: &str = "No books matched your criteria.";
const MIN_SUMMARY_CHARS: usize = 20;

pub const SUMMARY_PARAMS: GenerationParams = GenerationParams {
    max_new_tokens: 80,
    temperature: 0.8,
    top_p: 0.9,
    top_k: 50,
    repetition_penalty: 1.2,
    num_candidates: 3,
};

pub struct ResultSummarizer<'a> {
    oracle: &'a dyn TextOracle,
}

impl<'a> ResultSummarizer<'a> {
    pub fn new(oracle: &'a dyn TextOracle) -> Self {
        Self { oracle }
    }

    /// Never fails: oracle errors and degenerate completions fall back to a
    /// templated sentence.
    pub fn summarize(&self, query: &str, results: &[Book]) -> String {
        if results.is_empty() {
            return NO_RESULTS.to_string();
        }
        let input = BookSummaryInput::new(query, results);
        let prompt = build_prompt(&input);
        match self.oracle.generate(&prompt, &SUMMARY_PARAMS) {
            Ok(candidates) => {
                tracing::debug!(query = input.query, ?candidates, "summary candidates");
                if let Some(summary) = pick_summary(&prompt, &candidates) {
                    return summary;
                }
                tracing::info!("no usable summary candidate; using template");
            }
            Err(err) => tracing::warn!(error = %err, "summary generation failed"),
        }
        fallback_summary(input.count)
    }
}

pub fn fallback_summary(count: usize) -> String {
    format!("Found {count} books matching your query.")
}

pub fn build_prompt(input: &BookSummaryInput<'_>) -> String {
    let count = input.count;
    let mut prompt = if count == 1 {
        "There is 1 book".to_string()
    } else {
        format!("There are {count} books")
    };
    let authors = input.distinct_authors();
    if !authors.is_empty() {
        prompt.push_str(" by ");
        prompt.push_str(&authors.join(", "));
    }
    let titles = input.titles();
    if !titles.is_empty() {
        prompt.push_str(&format!(": \"{}\"", titles.join(", ")));
    }
    prompt.push_str(". Write a 1-2 sentence summary of this result.");
    prompt
}

/// Longest candidate that is not degenerate, with any prompt echo removed.
fn pick_summary(prompt: &str, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|c| match c.strip_prefix(prompt) {
            Some(rest) => rest.trim_start_matches(['\n', ':', ' ']),
            None => c.as_str(),
        })
        .map(str::trim)
        .filter(|c| c.chars().count() > MIN_SUMMARY_CHARS)
        .max_by_key(|c| c.chars().count())
        .map(str::to_string)
}
