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

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

pub const FILTER_KEYS: [&str; 8] = [
    "author",
    "title",
    "language",
    "topic",
    "mime_type",
    "ids",
    "sort",
    "limit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    #[serde(rename = "download_count:desc")]
    DownloadsDesc,
    #[serde(rename = "latest")]
    Latest,
}

impl SortOrder {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "download_count:desc" => Some(SortOrder::DownloadsDesc),
            "latest" => Some(SortOrder::Latest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub language: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topic: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn shortcut(sort: SortOrder, limit: usize) -> Self {
        Self {
            sort: Some(sort),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Keys present in this filter, in [`FILTER_KEYS`] order.
    pub fn keys(&self) -> Vec<&'static str> {
        let present = [
            !self.author.is_empty(),
            !self.title.is_empty(),
            !self.language.is_empty(),
            !self.topic.is_empty(),
            self.mime_type.is_some(),
            !self.ids.is_empty(),
            self.sort.is_some(),
            self.limit.is_some(),
        ];
        FILTER_KEYS
            .iter()
            .zip(present)
            .filter_map(|(key, on)| on.then_some(*key))
            .collect()
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_json_map())
    }
}
