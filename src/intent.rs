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

//! Deterministic shortcut intents recognized before any model is consulted.

use std::sync::LazyLock;

use regex::Regex;

use crate::filter::Filter;
use crate::filter::SortOrder;

static DOWNLOADS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmost downloaded\b|\btop \d+\b").expect("downloads regex"));
static TOP_N: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)top (\d+)").expect("top-n regex"));
static LATEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blatest\b").expect("latest regex"));
static LATEST_N: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)latest (\d+)").expect("latest-n regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentMatch {
    None,
    TopN(u32),
    MostDownloaded,
    LatestN(u32),
}

/// Classify a query. The downloads pattern wins over "latest" when both match.
pub fn route(query: &str) -> IntentMatch {
    if DOWNLOADS.is_match(query) {
        return match capture_count(&TOP_N, query) {
            Some(n) => IntentMatch::TopN(n),
            None => IntentMatch::MostDownloaded,
        };
    }
    if LATEST.is_match(query) {
        return IntentMatch::LatestN(capture_count(&LATEST_N, query).unwrap_or(1));
    }
    IntentMatch::None
}

fn capture_count(re: &Regex, query: &str) -> Option<u32> {
    let digits = re.captures(query)?.get(1)?.as_str();
    // The pattern only admits digits, so a parse failure means overflow.
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

impl IntentMatch {
    /// The shortcut filter for this intent; `limit` is kept within `1..=max_limit`.
    pub fn to_filter(self, max_limit: usize) -> Option<Filter> {
        let (sort, n) = match self {
            IntentMatch::None => return None,
            IntentMatch::TopN(n) => (SortOrder::DownloadsDesc, n),
            IntentMatch::MostDownloaded => (SortOrder::DownloadsDesc, 1),
            IntentMatch::LatestN(n) => (SortOrder::Latest, n),
        };
        let limit = (n as usize).clamp(1, max_limit.max(1));
        Some(Filter::shortcut(sort, limit))
    }
}
