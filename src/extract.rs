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

//! Generative filter extraction; output is untrusted until sanitized.

use serde_json::Map;
use serde_json::Value;

use crate::oracle::GenerationParams;
use crate::oracle::OracleError;
use crate::oracle::TextOracle;

pub const FILTER_OPEN: &str = "<<<FILTER>>>";
pub const FILTER_CLOSE: &str = "<<<END>>>";

pub const EXTRACT_PARAMS: GenerationParams = GenerationParams {
    max_new_tokens: 120,
    temperature: 0.2,
    top_p: 0.9,
    top_k: 50,
    repetition_penalty: 1.2,
    num_candidates: 2,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Map<String, Value>),
    Unparsed,
}

pub struct FilterExtractor<'a> {
    oracle: &'a dyn TextOracle,
}

impl<'a> FilterExtractor<'a> {
    pub fn new(oracle: &'a dyn TextOracle) -> Self {
        Self { oracle }
    }

    pub fn extract(&self, query: &str) -> Result<ParseOutcome, OracleError> {
        let prompt = build_prompt(query);
        let candidates = self.oracle.generate(&prompt, &EXTRACT_PARAMS)?;
        let outcome = parse_candidates(&prompt, &candidates);
        if outcome == ParseOutcome::Unparsed {
            tracing::debug!(candidates = candidates.len(), "no JSON filter in completions");
        }
        Ok(outcome)
    }
}

pub fn build_prompt(query: &str) -> String {
    format!(
        "You turn requests for books from a public-domain catalog into a JSON filter.

Allowed keys, use no others:
- author: list of author names, e.g. [\"Twain, Mark\"]
- title: list of title fragments, e.g. [\"Pride and Prejudice\"]
- topic: list of subject or bookshelf words, e.g. [\"children\"]
- language: list of two-letter ISO 639-1 codes, e.g. [\"en\", \"fr\"]
- mime_type: one format mime type, e.g. \"text/plain\"
- ids: list of numeric book ids, e.g. [1342]
- sort: \"download_count:desc\" or \"latest\"
- limit: a positive integer

Rules:
- Include a key only when the request states its value in words.
- Do not guess authors, titles, languages, or topics the request does not name.
- Do not add sort or limit unless the request asks for most downloaded, latest, or top results.
- If nothing is stated, answer with an empty object {{}}.

Examples:
Request: books by author Jane Austen
Filter: {{\"author\": [\"Jane Austen\"]}}
Request: the book with id 84
Filter: {{\"ids\": [84]}}
Request: something nice to read
Filter: {{}}
Wrong for \"books by author Jane Austen\": {{\"author\": [\"Jane Austen\"], \"language\": [\"en\"]}}

Request: {query}
Answer with one JSON object, opened by {FILTER_OPEN} and closed by {FILTER_CLOSE}, and nothing else.
{FILTER_OPEN}"
    )
}

/// First parseable object across all candidates: sentinel-bounded text is
/// preferred over a bare brace match anywhere.
pub fn parse_candidates(prompt: &str, candidates: &[String]) -> ParseOutcome {
    let bodies: Vec<&str> = candidates.iter().map(|c| strip_echo(c, prompt)).collect();
    if let Some(map) = bodies.iter().find_map(|body| between_sentinels(body)) {
        return ParseOutcome::Parsed(map);
    }
    if let Some(map) = bodies.iter().find_map(|body| outer_braces(body)) {
        return ParseOutcome::Parsed(map);
    }
    ParseOutcome::Unparsed
}

fn strip_echo<'c>(candidate: &'c str, prompt: &str) -> &'c str {
    candidate.strip_prefix(prompt).unwrap_or(candidate)
}

fn between_sentinels(body: &str) -> Option<Map<String, Value>> {
    // The prompt already emitted the opening sentinel, so a body may start
    // directly with the payload.
    let starts = std::iter::once(0).chain(
        body.match_indices(FILTER_OPEN)
            .map(|(idx, _)| idx + FILTER_OPEN.len()),
    );
    for start in starts {
        let rest = &body[start..];
        let Some(end) = rest.find(FILTER_CLOSE) else {
            continue;
        };
        let inner = &rest[..end];
        if start == 0 && inner.contains(FILTER_OPEN) {
            continue;
        }
        if let Some(map) = parse_object(inner) {
            return Some(map);
        }
    }
    None
}

fn outer_braces(body: &str) -> Option<Map<String, Value>> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    parse_object(&body[start..=end])
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
