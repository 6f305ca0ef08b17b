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

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use rusqlite::Connection;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::model::Author;
use crate::model::Book;
use crate::model::Format;
use crate::store::Store;

#[derive(Debug, Deserialize)]
struct ImportBook {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    download_count: Option<i64>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    bookshelves: Vec<String>,
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default)]
    formats: ImportFormats,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportFormats {
    List(Vec<Format>),
    /// Gutendex shape: mime type to URL.
    Map(BTreeMap<String, String>),
}

impl Default for ImportFormats {
    fn default() -> Self {
        ImportFormats::List(Vec::new())
    }
}

impl From<ImportBook> for Book {
    fn from(raw: ImportBook) -> Self {
        let formats = match raw.formats {
            ImportFormats::List(list) => list,
            ImportFormats::Map(map) => map
                .into_iter()
                .map(|(mime_type, url)| Format { mime_type, url })
                .collect(),
        };
        Book {
            id: raw.id,
            title: raw.title,
            download_count: raw.download_count,
            authors: raw.authors,
            subjects: raw.subjects,
            bookshelves: raw.bookshelves,
            languages: raw.languages,
            formats,
        }
    }
}

#[derive(Debug)]
pub struct TransferStats {
    pub books: usize,
}

pub fn export_store(store: &Store, mut writer: impl Write) -> Result<TransferStats> {
    let mut books = 0usize;
    for id in store.book_ids()? {
        let Some(book) = store.load_book(id)? else {
            continue;
        };
        let line = serde_json::to_string(&book)?;
        writeln!(writer, "{}", line)?;
        books += 1;
    }
    Ok(TransferStats { books })
}

/// Loads every line or none of them.
pub fn import_store(store: &Store, reader: impl std::io::Read) -> Result<TransferStats> {
    let mut books = 0usize;
    let mut buf = BufReader::new(reader);

    store.conn.execute_batch("BEGIN IMMEDIATE")?;
    let res = (|| -> Result<()> {
        let mut line = String::new();
        let mut line_no = 0usize;
        loop {
            line.clear();
            let bytes = buf.read_line(&mut line)?;
            if bytes == 0 {
                break;
            }
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed: ImportBook = serde_json::from_str(trimmed)
                .with_context(|| format!("parse import line {line_no}"))?;
            store.insert_book(&Book::from(parsed))?;
            books += 1;
        }
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format import time")?;
        store.put_meta("imported_at", &now)?;
        Ok(())
    })();

    if let Err(err) = res {
        return Err(rollback(&store.conn, err));
    }

    store.conn.execute_batch("COMMIT")?;
    tracing::info!(books, "catalog imported");
    Ok(TransferStats { books })
}

/// Roll back the open transaction; the import error is kept either way.
fn rollback(conn: &Connection, err: anyhow::Error) -> anyhow::Error {
    tracing::warn!(error = %format!("{err:#}"), "import failed, rolling back");
    match conn.execute_batch("ROLLBACK") {
        Ok(()) => err,
        Err(rollback_err) => err.context(format!("rollback also failed: {rollback_err}")),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::filter::Filter;
    use crate::store::BookSearchStore;
    use crate::store::StoreMode;

    const GUTENDEX_LINES: &str = r#"{"id": 84, "title": "Frankenstein", "authors": [{"name": "Shelley, Mary Wollstonecraft", "birth_year": 1797, "death_year": 1851}], "subjects": ["Monsters -- Fiction"], "bookshelves": ["Gothic Fiction"], "languages": ["en"], "formats": {"text/html": "https://example.org/84.html", "application/epub+zip": "https://example.org/84.epub"}, "download_count": 70000, "copyright": false}

{"id": 11, "title": "Alice's Adventures in Wonderland", "authors": [{"name": "Carroll, Lewis"}], "languages": ["en"], "download_count": 40000}
"#;

    #[test]
    fn import_accepts_gutendex_lines_and_export_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("folio.db");
        Store::init(&db_path)?;
        let store = Store::open(&db_path, StoreMode::ReadWrite)?;

        let stats = import_store(&store, GUTENDEX_LINES.as_bytes())?;
        assert_eq!(stats.books, 2);
        assert!(store.meta("imported_at")?.is_some());

        let frankenstein = store.load_book(84)?.context("book 84")?;
        assert_eq!(frankenstein.formats.len(), 2);
        assert_eq!(frankenstein.formats[0].mime_type, "application/epub+zip");

        let mut out = Vec::new();
        let exported = export_store(&store, &mut out)?;
        assert_eq!(exported.books, 2);
        let text = String::from_utf8(out)?;
        let ids: Vec<i64> = text
            .lines()
            .map(|line| serde_json::from_str::<Book>(line).map(|b| b.id))
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(ids, vec![11, 84]);

        let dir2 = tempdir()?;
        let db2 = dir2.path().join("folio.db");
        Store::init(&db2)?;
        let copy = Store::open(&db2, StoreMode::ReadWrite)?;
        import_store(&copy, text.as_bytes())?;
        assert_eq!(
            copy.query(&Filter::default(), 0, 10)?,
            store.query(&Filter::default(), 0, 10)?
        );
        Ok(())
    }

    #[test]
    fn bad_line_rolls_back_everything() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("folio.db");
        Store::init(&db_path)?;
        let store = Store::open(&db_path, StoreMode::ReadWrite)?;

        let input = "{\"id\": 1, \"title\": \"Ok\"}\n{\"title\": \"missing id\"}\n";
        let err = import_store(&store, input.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert_eq!(store.stats()?.book_count, 0);
        assert!(store.meta("imported_at")?.is_none());
        Ok(())
    }

    #[test]
    fn failed_rollback_keeps_the_import_error() {
        let conn = Connection::open_in_memory().expect("memory db");
        let err = rollback(&conn, anyhow::anyhow!("parse import line 3"));
        let text = format!("{err:#}");
        assert!(text.contains("rollback also failed"));
        assert!(text.contains("parse import line 3"));
    }
}
