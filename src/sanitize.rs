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

//! Drops generated filter keys the query never mentions.

use std::collections::BTreeSet;

use serde_json::Map;
use serde_json::Value;

use crate::filter::Filter;
use crate::filter::SortOrder;

const INTENT_WORDS: [&str; 3] = ["most downloaded", "latest", "top"];
const NAMED_KEYS: [&str; 5] = ["author", "title", "language", "topic", "mime_type"];

#[derive(Debug, Clone, Copy)]
pub struct FilterSanitizer {
    max_limit: usize,
}

impl FilterSanitizer {
    pub fn new(max_limit: usize) -> Self {
        Self {
            max_limit: max_limit.max(1),
        }
    }

    /// Keys the query text corroborates.
    ///
    /// `download_count` may be reported here; it supports intent detection
    /// but never becomes a filter key.
    pub fn explicit_keys(query: &str) -> BTreeSet<&'static str> {
        let q = query.to_lowercase();
        let mut keys = BTreeSet::new();
        for key in NAMED_KEYS {
            if q.contains(key) {
                keys.insert(key);
            }
        }
        if INTENT_WORDS.iter().any(|w| q.contains(w)) {
            keys.insert("sort");
            keys.insert("limit");
        }
        // "ids" contains "id"; both spellings are listed for clarity.
        if q.contains("id") || q.contains("ids") {
            keys.insert("ids");
        }
        if q.contains("download") {
            keys.insert("download_count");
        }
        keys
    }

    pub fn sanitize(&self, candidate: &Map<String, Value>, query: &str) -> Filter {
        let explicit = Self::explicit_keys(query);
        let mut filter = Filter::default();
        for (key, value) in candidate {
            if !explicit.contains(key.as_str()) {
                tracing::debug!(key = %key, "dropping filter key not mentioned in query");
                continue;
            }
            match key.as_str() {
                "author" => filter.author = coerce_strings(value),
                "title" => filter.title = coerce_strings(value),
                "topic" => filter.topic = coerce_strings(value),
                "language" => filter.language = coerce_languages(value),
                "mime_type" => filter.mime_type = coerce_strings(value).into_iter().next(),
                "ids" => filter.ids = coerce_ids(value),
                "sort" => filter.sort = value.as_str().and_then(SortOrder::parse),
                "limit" => {
                    filter.limit = coerce_limit(value).map(|n| n.min(self.max_limit));
                }
                _ => {}
            }
        }
        filter
    }
}

fn coerce_strings(value: &Value) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn coerce_languages(value: &Value) -> Vec<String> {
    coerce_strings(value)
        .into_iter()
        .map(|code| code.to_lowercase())
        .filter(|code| code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()))
        .collect()
}

fn coerce_ids(value: &Value) -> Vec<i64> {
    match value {
        Value::Array(items) => items.iter().filter_map(coerce_id).collect(),
        other => coerce_id(other).into_iter().collect(),
    }
}

fn coerce_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<i64>().ok()?
        }
        _ => return None,
    };
    (id > 0).then_some(id)
}

fn coerce_limit(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if !f.is_finite() || f < 1.0 || f >= i64::MAX as f64 {
                    return None;
                }
                f.trunc() as i64
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    usize::try_from(n).ok().filter(|n| *n > 0)
}
