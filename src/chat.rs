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

use anyhow::Result;

use crate::config::Config;
use crate::config::EmptyFilterPolicy;
use crate::extract::FilterExtractor;
use crate::extract::ParseOutcome;
use crate::filter::Filter;
use crate::intent;
use crate::model::Book;
use crate::oracle::TextOracle;
use crate::sanitize::FilterSanitizer;
use crate::store::BookSearchStore;
use crate::summarize::ResultSummarizer;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub filter: Filter,
    pub warnings: Vec<String>,
}

impl Resolution {
    fn of(filter: Filter) -> Self {
        Self {
            filter,
            warnings: Vec::new(),
        }
    }
}

pub trait FilterStrategy {
    fn name(&self) -> &'static str;

    /// `None` hands the query to the next strategy.
    fn resolve(&self, query: &str) -> Option<Resolution>;
}

/// Deterministic shortcuts: "most downloaded", "top N", "latest N".
pub struct IntentStrategy {
    max_limit: usize,
}

impl IntentStrategy {
    pub fn new(max_limit: usize) -> Self {
        Self { max_limit }
    }
}

impl FilterStrategy for IntentStrategy {
    fn name(&self) -> &'static str {
        "intent"
    }

    fn resolve(&self, query: &str) -> Option<Resolution> {
        intent::route(query)
            .to_filter(self.max_limit)
            .map(Resolution::of)
    }
}

/// Oracle extraction followed by sanitization. Always resolves.
pub struct GenerativeStrategy<'a> {
    oracle: &'a dyn TextOracle,
    sanitizer: FilterSanitizer,
}

impl<'a> GenerativeStrategy<'a> {
    pub fn new(oracle: &'a dyn TextOracle, max_limit: usize) -> Self {
        Self {
            oracle,
            sanitizer: FilterSanitizer::new(max_limit),
        }
    }
}

impl FilterStrategy for GenerativeStrategy<'_> {
    fn name(&self) -> &'static str {
        "generative"
    }

    fn resolve(&self, query: &str) -> Option<Resolution> {
        if query.trim().is_empty() {
            return Some(Resolution::default());
        }
        match FilterExtractor::new(self.oracle).extract(query) {
            Ok(ParseOutcome::Parsed(candidate)) => {
                Some(Resolution::of(self.sanitizer.sanitize(&candidate, query)))
            }
            Ok(ParseOutcome::Unparsed) => {
                tracing::info!("could not parse a filter from the model output");
                Some(Resolution::default())
            }
            Err(err) => {
                tracing::warn!(error = %err, "filter extraction failed");
                Some(Resolution {
                    filter: Filter::default(),
                    warnings: vec![format!("filter extraction skipped: {err}")],
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub default_limit: usize,
    pub max_limit: usize,
    pub empty_filter: EmptyFilterPolicy,
}

impl ChatOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            empty_filter: config.chat.empty_filter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub filters: Filter,
    /// Matches in the whole catalog, not just `results`.
    pub count: usize,
    pub results: Vec<Book>,
    /// Page size the catalog was queried with.
    pub limit: usize,
    pub summary: String,
    pub strategy: &'static str,
    pub warnings: Vec<String>,
}

pub struct ChatPipeline<'a> {
    oracle: &'a dyn TextOracle,
    options: ChatOptions,
    strategies: Vec<Box<dyn FilterStrategy + 'a>>,
}

impl<'a> ChatPipeline<'a> {
    pub fn new(oracle: &'a dyn TextOracle, options: ChatOptions) -> Self {
        let max_limit = options.max_limit.max(1);
        Self {
            oracle,
            options,
            strategies: vec![
                Box::new(IntentStrategy::new(max_limit)),
                Box::new(GenerativeStrategy::new(oracle, max_limit)),
            ],
        }
    }

    pub fn run(&self, store: &dyn BookSearchStore, query: &str) -> Result<ChatResponse> {
        let (strategy, resolution) = self
            .strategies
            .iter()
            .find_map(|s| s.resolve(query).map(|r| (s.name(), r)))
            .unwrap_or(("none", Resolution::default()));
        let Resolution { filter, warnings } = resolution;
        tracing::debug!(strategy, filter = %filter.to_json(), "resolved query");

        if filter.is_empty() && self.options.empty_filter == EmptyFilterPolicy::Reject {
            anyhow::bail!("couldn't parse any filters from the query");
        }

        let max_limit = self.options.max_limit.max(1);
        let limit = filter
            .limit
            .unwrap_or(self.options.default_limit)
            .clamp(1, max_limit);
        let page = store.query(&filter, 0, limit)?;
        let summary = ResultSummarizer::new(self.oracle).summarize(query, &page.books);

        Ok(ChatResponse {
            filters: filter,
            count: page.total,
            results: page.books,
            limit,
            summary,
            strategy,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::filter::SortOrder;
    use crate::model::Author;
    use crate::oracle::OracleError;
    use crate::oracle::testing::ScriptedOracle;
    use crate::store::BookPage;
    use crate::summarize::NO_RESULTS;

    /// Returns a fixed page and records what it was asked for.
    struct FakeStore {
        books: Vec<Book>,
        seen: RefCell<Vec<(Filter, usize, usize)>>,
    }

    impl FakeStore {
        fn with(books: Vec<Book>) -> Self {
            Self {
                books,
                seen: RefCell::new(Vec::new()),
            }
        }

        fn last(&self) -> (Filter, usize, usize) {
            self.seen.borrow().last().cloned().expect("store was queried")
        }
    }

    impl BookSearchStore for FakeStore {
        fn query(&self, filter: &Filter, skip: usize, limit: usize) -> Result<BookPage> {
            self.seen.borrow_mut().push((filter.clone(), skip, limit));
            Ok(BookPage {
                total: self.books.len(),
                books: self.books.iter().take(limit).cloned().collect(),
            })
        }
    }

    fn book(id: i64, title: &str) -> Book {
        Book {
            id,
            title: Some(title.to_string()),
            download_count: Some(1000 - id),
            authors: vec![Author {
                name: "Twain, Mark".to_string(),
                birth_year: Some(1835),
                death_year: Some(1910),
            }],
            subjects: Vec::new(),
            bookshelves: Vec::new(),
            languages: vec!["en".to_string()],
            formats: Vec::new(),
        }
    }

    fn options() -> ChatOptions {
        ChatOptions {
            default_limit: 25,
            max_limit: 100,
            empty_filter: EmptyFilterPolicy::Browse,
        }
    }

    const SUMMARY: &str = "A handful of Mark Twain's best loved novels.";

    #[test]
    fn most_downloaded_shortcut_skips_extraction() -> Result<()> {
        // Only the summary is scripted; an extraction call would consume it.
        let oracle = ScriptedOracle::replying(&[SUMMARY]);
        let store = FakeStore::with(vec![book(1, "Roughing It"), book(2, "Tom Sawyer")]);
        let resp = ChatPipeline::new(&oracle, options()).run(&store, "Most Downloaded book")?;

        assert_eq!(resp.strategy, "intent");
        assert_eq!(
            resp.filters.to_json(),
            json!({"sort": "download_count:desc", "limit": 1})
        );
        assert_eq!(store.last().2, 1);
        assert_eq!(resp.count, 2);
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.summary, SUMMARY);
        assert_eq!(oracle.calls(), 1);
        Ok(())
    }

    #[test]
    fn top_n_shortcut_does_not_attach_language() -> Result<()> {
        let oracle = ScriptedOracle::replying(&[SUMMARY]);
        let store = FakeStore::with(vec![book(1, "A"), book(2, "B"), book(3, "C"), book(4, "D")]);
        let resp = ChatPipeline::new(&oracle, options())
            .run(&store, "List top 3 most downloaded French books")?;

        assert_eq!(resp.filters, Filter::shortcut(SortOrder::DownloadsDesc, 3));
        assert!(resp.filters.language.is_empty());
        assert_eq!(resp.results.len(), 3);
        assert_eq!(resp.count, 4);
        Ok(())
    }

    #[test]
    fn generative_path_sanitizes_before_searching() -> Result<()> {
        let oracle = ScriptedOracle::new(vec![
            Ok(vec![
                r#"{"author": ["Twain, Mark"], "language": ["en"]}<<<END>>>"#.to_string(),
            ]),
            Ok(vec![SUMMARY.to_string()]),
        ]);
        let store = FakeStore::with(vec![book(1, "Roughing It")]);
        let resp = ChatPipeline::new(&oracle, options()).run(&store, "books by author Twain")?;

        assert_eq!(resp.strategy, "generative");
        assert_eq!(resp.filters.to_json(), json!({"author": ["Twain, Mark"]}));
        assert_eq!(store.last().0, resp.filters);
        assert_eq!(store.last().2, 25);
        assert_eq!(resp.summary, SUMMARY);
        assert!(resp.warnings.is_empty());
        assert_eq!(oracle.calls(), 2);
        Ok(())
    }

    #[test]
    fn oracle_outage_degrades_to_browse_with_warning() -> Result<()> {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Unavailable {
                url: "http://localhost:11434".to_string(),
            }),
            Err(OracleError::Disabled),
        ]);
        let store = FakeStore::with(vec![book(1, "Roughing It"), book(2, "Tom Sawyer")]);
        let resp = ChatPipeline::new(&oracle, options()).run(&store, "something about rivers")?;

        assert!(resp.filters.is_empty());
        assert_eq!(resp.count, 2);
        assert_eq!(resp.summary, "Found 2 books matching your query.");
        assert_eq!(resp.warnings.len(), 1);
        assert!(resp.warnings[0].contains("not available"));
        Ok(())
    }

    #[test]
    fn unparsed_output_with_reject_policy_fails() {
        let oracle = ScriptedOracle::replying(&["I cannot help with that."]);
        let store = FakeStore::with(vec![book(1, "Roughing It")]);
        let opts = ChatOptions {
            empty_filter: EmptyFilterPolicy::Reject,
            ..options()
        };
        let err = ChatPipeline::new(&oracle, opts)
            .run(&store, "tell me a joke")
            .unwrap_err();
        assert_eq!(err.to_string(), "couldn't parse any filters from the query");
        assert!(store.seen.borrow().is_empty());
    }

    #[test]
    fn blank_query_never_reaches_the_oracle() -> Result<()> {
        let oracle = ScriptedOracle::failing();
        let store = FakeStore::with(Vec::new());
        let resp = ChatPipeline::new(&oracle, options()).run(&store, "   ")?;
        assert!(resp.filters.is_empty());
        assert_eq!(resp.summary, NO_RESULTS);
        assert_eq!(oracle.calls(), 0);
        Ok(())
    }

    #[test]
    fn filter_limit_is_bounded_by_max_limit() -> Result<()> {
        let oracle = ScriptedOracle::replying(&[SUMMARY]);
        let store = FakeStore::with(vec![book(1, "A")]);
        let opts = ChatOptions {
            max_limit: 10,
            ..options()
        };
        let resp = ChatPipeline::new(&oracle, opts).run(&store, "top 500")?;
        assert_eq!(resp.filters.limit, Some(10));
        assert_eq!(store.last().2, 10);
        Ok(())
    }
}
