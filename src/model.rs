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

//! Catalog records shared by the store, the chat pipeline, and the CLI.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub death_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub download_count: Option<i64>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub bookshelves: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub formats: Vec<Format>,
}

/// Read-only projection of a result page, built right before summarizing it.
#[derive(Debug, Clone)]
pub struct BookSummaryInput<'a> {
    pub query: &'a str,
    pub count: usize,
    pub entries: Vec<(Option<&'a str>, Vec<&'a str>)>,
}

impl<'a> BookSummaryInput<'a> {
    pub fn new(query: &'a str, books: &'a [Book]) -> Self {
        let entries = books
            .iter()
            .map(|book| {
                let title = book.title.as_deref().filter(|t| !t.trim().is_empty());
                let authors = book
                    .authors
                    .iter()
                    .map(|a| a.name.as_str())
                    .filter(|name| !name.trim().is_empty())
                    .collect();
                (title, authors)
            })
            .collect();
        Self {
            query,
            count: books.len(),
            entries,
        }
    }

    pub fn titles(&self) -> Vec<&'a str> {
        self.entries.iter().filter_map(|(title, _)| *title).collect()
    }

    /// Author names across the page, first occurrence wins.
    pub fn distinct_authors(&self) -> Vec<&'a str> {
        let mut out: Vec<&'a str> = Vec::new();
        for (_, authors) in &self.entries {
            for name in authors {
                if !out.contains(name) {
                    out.push(name);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: i64, title: Option<&str>, authors: &[&str]) -> Book {
        Book {
            id,
            title: title.map(str::to_string),
            download_count: None,
            authors: authors
                .iter()
                .map(|name| Author {
                    name: name.to_string(),
                    birth_year: None,
                    death_year: None,
                })
                .collect(),
            subjects: Vec::new(),
            bookshelves: Vec::new(),
            languages: Vec::new(),
            formats: Vec::new(),
        }
    }

    #[test]
    fn summary_input_collapses_repeated_authors_in_order() {
        let books = vec![
            book(1, Some("Emma"), &["Austen, Jane"]),
            book(2, None, &["Twain, Mark", "Austen, Jane"]),
            book(3, Some("Persuasion"), &["Austen, Jane"]),
        ];
        let input = BookSummaryInput::new("austen", &books);
        assert_eq!(input.count, 3);
        assert_eq!(input.titles(), vec!["Emma", "Persuasion"]);
        assert_eq!(input.distinct_authors(), vec!["Austen, Jane", "Twain, Mark"]);
    }

    #[test]
    fn book_deserializes_with_missing_optional_fields() {
        let book: Book = serde_json::from_str(r#"{"id": 84}"#).expect("parse book");
        assert_eq!(book.id, 84);
        assert!(book.title.is_none());
        assert!(book.authors.is_empty());
    }
}
