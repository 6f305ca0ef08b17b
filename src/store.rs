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

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use fs2::FileExt;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::functions::FunctionFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use sha2::Digest;
use sha2::Sha256;

use crate::filter::Filter;
use crate::filter::SortOrder;
use crate::model::Author;
use crate::model::Book;
use crate::model::Format;
use crate::sql::FOLD_FN;
use crate::sql::SqlColumn;
use crate::sql::SqlExpr;
use crate::sql::SqlFragment;
use crate::sql::SqlJoin;
use crate::sql::SqlOrderBy;
use crate::sql::SqlSelectBuilder;
use crate::sql::SqlSelectItem;
use crate::sql::SqlTable;
use crate::sql::fold;

pub struct Store {
    pub conn: Connection,
    pub path: PathBuf,
    lock: Option<StoreLock>,
}

struct StoreLock {
    _file: File,
    path: PathBuf,
    mode: StoreMode,
}

impl StoreLock {
    fn new(file: File, path: PathBuf, mode: StoreMode) -> Self {
        Self {
            _file: file,
            path,
            mode,
        }
    }
}

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy)]
pub enum StoreMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub book_count: i64,
    pub author_count: i64,
    pub subject_count: i64,
    pub language_count: i64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<String>,
}

#[derive(Debug)]
pub struct IntegrityReport {
    pub status: String,
    pub stats: StoreStats,
}

/// One page of a catalog search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookPage {
    /// Matches before `skip`/`limit` were applied.
    pub total: usize,
    pub books: Vec<Book>,
}

/// Catalog search over a trusted [`Filter`].
///
/// String keys match case-insensitive substrings, `language` and `ids` match
/// set membership, every `topic` entry matches subjects or bookshelves, and
/// the keys are AND-combined. Books never repeat within a page. Results are
/// ordered by descending download count (unknown counts last, then id) unless
/// the filter asks for `latest`, which orders by descending id.
pub trait BookSearchStore {
    fn query(&self, filter: &Filter, skip: usize, limit: usize) -> Result<BookPage>;
}

impl Store {
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("store already exists at {}", path.display());
        }
        let _lock = Self::acquire_lock(path, StoreMode::ReadWrite)?;
        let conn = Self::open_connection(path, StoreMode::ReadWrite)?;
        Self::apply_pragmas(&conn, StoreMode::ReadWrite)?;
        Self::create_schema(&conn)?;
        Self::set_meta(&conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    pub fn open(path: &Path, mode: StoreMode) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("store not found at {}", path.display());
        }
        let mut lock = Self::acquire_lock(path, mode)?;
        let mut conn = Self::open_connection(path, mode)?;
        Self::apply_pragmas(&conn, mode)?;
        if matches!(mode, StoreMode::ReadWrite) {
            Self::create_schema(&conn)?;
            Self::migrate(&conn)?;
            return Ok(Self {
                conn,
                path: path.to_path_buf(),
                lock: Some(lock),
            });
        }

        let version = Self::schema_version(&conn)?;
        if version != SCHEMA_VERSION {
            drop(conn);
            drop(lock);
            let lock_rw = Self::acquire_lock(path, StoreMode::ReadWrite)?;
            let conn_rw = Self::open_connection(path, StoreMode::ReadWrite)?;
            Self::apply_pragmas(&conn_rw, StoreMode::ReadWrite)?;
            Self::create_schema(&conn_rw)?;
            Self::migrate(&conn_rw)?;
            drop(conn_rw);
            drop(lock_rw);

            lock = Self::acquire_lock(path, StoreMode::ReadOnly)?;
            conn = Self::open_connection(path, StoreMode::ReadOnly)?;
            Self::apply_pragmas(&conn, StoreMode::ReadOnly)?;
        }

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            lock: Some(lock),
        })
    }

    fn open_connection(path: &Path, mode: StoreMode) -> Result<Connection> {
        let flags = match mode {
            StoreMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            StoreMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("open {}", path.display()))?;
        conn.busy_timeout(Duration::from_millis(5000))
            .context("set busy timeout")?;
        Self::register_functions(&conn)?;
        Ok(conn)
    }

    fn register_functions(conn: &Connection) -> Result<()> {
        conn.create_scalar_function(
            FOLD_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| fold(&t)))
            },
        )
        .with_context(|| format!("register {FOLD_FN}"))?;
        Ok(())
    }

    fn apply_pragmas(conn: &Connection, mode: StoreMode) -> Result<()> {
        let mut batch = String::from("PRAGMA foreign_keys=ON;");
        if matches!(mode, StoreMode::ReadWrite) {
            batch = format!("PRAGMA journal_mode=DELETE;\nPRAGMA synchronous=NORMAL;\n{batch}");
        }
        conn.execute_batch(&batch).context("apply pragmas")?;
        Ok(())
    }

    fn lock_path_for(path: &Path) -> Result<PathBuf> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string_lossy().as_bytes());
        let hash = hex::encode(hasher.finalize());
        let mut dir = std::env::temp_dir();
        dir.push("folio");
        fs::create_dir_all(&dir).with_context(|| format!("create lock dir {}", dir.display()))?;
        Ok(dir.join(format!("folio-{hash}.lock")))
    }

    fn acquire_lock(path: &Path, mode: StoreMode) -> Result<StoreLock> {
        let lock_path = Self::lock_path_for(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("open lock file {}", lock_path.display()))?;
        let deadline = Instant::now() + Duration::from_millis(5000);
        loop {
            let locked = match mode {
                StoreMode::ReadOnly => file.try_lock_shared().map_err(|err| err.to_string()),
                StoreMode::ReadWrite => file.try_lock_exclusive().map_err(|err| err.to_string()),
            };
            match locked {
                Ok(()) => return Ok(StoreLock::new(file, lock_path, mode)),
                Err(_) if Instant::now() >= deadline => {
                    let mode_label = match mode {
                        StoreMode::ReadOnly => "read",
                        StoreMode::ReadWrite => "write",
                    };
                    anyhow::bail!(
                        "store is locked for {mode_label} access; another process may be using {}",
                        path.display()
                    );
                }
                Err(_) => {
                    sleep(Duration::from_millis(50));
                }
            }
        }
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT
);

CREATE TABLE IF NOT EXISTS book (
  id INTEGER PRIMARY KEY,
  title TEXT,
  download_count INTEGER
);

CREATE TABLE IF NOT EXISTS author (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  birth_year INTEGER,
  death_year INTEGER
);

CREATE TABLE IF NOT EXISTS book_author (
  book_id INTEGER NOT NULL REFERENCES book(id) ON DELETE CASCADE,
  author_id INTEGER NOT NULL REFERENCES author(id),
  position INTEGER NOT NULL DEFAULT 0,
  PRIMARY KEY (book_id, author_id)
);

CREATE TABLE IF NOT EXISTS subject (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS book_subject (
  book_id INTEGER NOT NULL REFERENCES book(id) ON DELETE CASCADE,
  subject_id INTEGER NOT NULL REFERENCES subject(id),
  PRIMARY KEY (book_id, subject_id)
);

CREATE TABLE IF NOT EXISTS bookshelf (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS book_bookshelf (
  book_id INTEGER NOT NULL REFERENCES book(id) ON DELETE CASCADE,
  bookshelf_id INTEGER NOT NULL REFERENCES bookshelf(id),
  PRIMARY KEY (book_id, bookshelf_id)
);

CREATE TABLE IF NOT EXISTS language (
  id INTEGER PRIMARY KEY,
  code TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS book_language (
  book_id INTEGER NOT NULL REFERENCES book(id) ON DELETE CASCADE,
  language_id INTEGER NOT NULL REFERENCES language(id),
  PRIMARY KEY (book_id, language_id)
);

CREATE TABLE IF NOT EXISTS format (
  book_id INTEGER NOT NULL REFERENCES book(id) ON DELETE CASCADE,
  mime_type TEXT NOT NULL,
  url TEXT NOT NULL,
  PRIMARY KEY (book_id, mime_type)
);

CREATE INDEX IF NOT EXISTS idx_book_downloads ON book(download_count);
CREATE INDEX IF NOT EXISTS idx_author_name ON author(name);",
        )
        .context("create schema")?;
        Ok(())
    }

    fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .context("set meta")?;
        Ok(())
    }

    pub fn put_meta(&self, key: &str, value: &str) -> Result<()> {
        Self::set_meta(&self.conn, key, value)
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key=?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("read meta {key}"))
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                params![name],
                |row| row.get(0),
            )
            .context("check table")?;
        Ok(count > 0)
    }

    fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .context("table info")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for row in rows {
            if row? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn schema_version(conn: &Connection) -> Result<i64> {
        if !Self::table_exists(conn, "meta")? {
            return Ok(0);
        }
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key='schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("read schema_version")?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    /// Catalogs loaded before author order was tracked lack `position`.
    fn ensure_author_position_column(conn: &Connection) -> Result<()> {
        if !Self::column_exists(conn, "book_author", "position")? {
            conn.execute(
                "ALTER TABLE book_author ADD COLUMN position INTEGER NOT NULL DEFAULT 0",
                [],
            )
            .context("add book_author.position column")?;
        }
        Ok(())
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version = Self::schema_version(conn)?;
        if version > SCHEMA_VERSION {
            anyhow::bail!(
                "store schema version {} is newer than supported {}",
                version,
                SCHEMA_VERSION
            );
        }
        if version == SCHEMA_VERSION {
            return Ok(());
        }

        Self::create_schema(conn)?;
        Self::ensure_author_position_column(conn)?;
        Self::set_meta(conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    fn count(&self, table: &str) -> Result<i64> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("count {table}"))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoreStats {
            book_count: self.count("book")?,
            author_count: self.count("author")?,
            subject_count: self.count("subject")?,
            language_count: self.count("language")?,
            db_size_bytes,
            imported_at: self.meta("imported_at")?,
        })
    }

    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let status: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .context("integrity_check")?;
        let stats = self.stats()?;
        Ok(IntegrityReport { status, stats })
    }

    /// Insert or replace one book together with all of its links.
    pub fn insert_book(&self, book: &Book) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO book (id, title, download_count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET title = excluded.title, download_count = excluded.download_count",
                params![book.id, book.title, book.download_count],
            )
            .with_context(|| format!("insert book {}", book.id))?;
        for table in [
            "book_author",
            "book_subject",
            "book_bookshelf",
            "book_language",
            "format",
        ] {
            self.conn
                .execute(
                    &format!("DELETE FROM {table} WHERE book_id=?1"),
                    params![book.id],
                )
                .with_context(|| format!("clear {table} for book {}", book.id))?;
        }

        for (position, author) in book.authors.iter().enumerate() {
            let author_id = self.author_id(author)?;
            self.conn.execute(
                "INSERT OR IGNORE INTO book_author (book_id, author_id, position) VALUES (?1, ?2, ?3)",
                params![book.id, author_id, position as i64],
            )?;
        }
        for subject in &book.subjects {
            let id = self.intern("subject", "name", subject)?;
            self.conn.execute(
                "INSERT OR IGNORE INTO book_subject (book_id, subject_id) VALUES (?1, ?2)",
                params![book.id, id],
            )?;
        }
        for shelf in &book.bookshelves {
            let id = self.intern("bookshelf", "name", shelf)?;
            self.conn.execute(
                "INSERT OR IGNORE INTO book_bookshelf (book_id, bookshelf_id) VALUES (?1, ?2)",
                params![book.id, id],
            )?;
        }
        for code in &book.languages {
            let id = self.intern("language", "code", &code.to_lowercase())?;
            self.conn.execute(
                "INSERT OR IGNORE INTO book_language (book_id, language_id) VALUES (?1, ?2)",
                params![book.id, id],
            )?;
        }
        for format in &book.formats {
            self.conn.execute(
                "INSERT OR REPLACE INTO format (book_id, mime_type, url) VALUES (?1, ?2, ?3)",
                params![book.id, format.mime_type, format.url],
            )?;
        }
        Ok(())
    }

    fn author_id(&self, author: &Author) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM author WHERE name=?1 AND birth_year IS ?2 AND death_year IS ?3",
                params![author.name, author.birth_year, author.death_year],
                |row| row.get(0),
            )
            .optional()
            .context("lookup author")?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn
            .execute(
                "INSERT INTO author (name, birth_year, death_year) VALUES (?1, ?2, ?3)",
                params![author.name, author.birth_year, author.death_year],
            )
            .with_context(|| format!("insert author {}", author.name))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn intern(&self, table: &str, column: &str, value: &str) -> Result<i64> {
        self.conn
            .execute(
                &format!("INSERT OR IGNORE INTO {table} ({column}) VALUES (?1)"),
                params![value],
            )
            .with_context(|| format!("insert {table}"))?;
        self.conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE {column}=?1"),
                params![value],
                |row| row.get(0),
            )
            .with_context(|| format!("lookup {table}"))
    }

    pub fn book_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM book ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn load_book(&self, id: i64) -> Result<Option<Book>> {
        let row: Option<(Option<String>, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT title, download_count FROM book WHERE id=?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("load book {id}"))?;
        let Some((title, download_count)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT author.name, author.birth_year, author.death_year
             FROM book_author
             INNER JOIN author ON author.id = book_author.author_id
             WHERE book_author.book_id=?1
             ORDER BY book_author.position, author.id",
        )?;
        let authors = stmt
            .query_map(params![id], |row| {
                Ok(Author {
                    name: row.get(0)?,
                    birth_year: row.get(1)?,
                    death_year: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let subjects = self.names(
            "SELECT subject.name FROM book_subject
             INNER JOIN subject ON subject.id = book_subject.subject_id
             WHERE book_subject.book_id=?1 ORDER BY subject.name",
            id,
        )?;
        let bookshelves = self.names(
            "SELECT bookshelf.name FROM book_bookshelf
             INNER JOIN bookshelf ON bookshelf.id = book_bookshelf.bookshelf_id
             WHERE book_bookshelf.book_id=?1 ORDER BY bookshelf.name",
            id,
        )?;
        let languages = self.names(
            "SELECT language.code FROM book_language
             INNER JOIN language ON language.id = book_language.language_id
             WHERE book_language.book_id=?1 ORDER BY language.code",
            id,
        )?;

        let mut stmt = self
            .conn
            .prepare_cached("SELECT mime_type, url FROM format WHERE book_id=?1 ORDER BY mime_type")?;
        let formats = stmt
            .query_map(params![id], |row| {
                Ok(Format {
                    mime_type: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Book {
            id,
            title,
            download_count,
            authors,
            subjects,
            bookshelves,
            languages,
            formats,
        }))
    }

    fn names(&self, sql: &str, id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Books for `ids`, in the order given; unknown ids are skipped.
    pub fn load_books(&self, ids: &[i64]) -> Result<Vec<Book>> {
        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(book) = self.load_book(*id)? {
                books.push(book);
            }
        }
        Ok(books)
    }
}

impl BookSearchStore for Store {
    fn query(&self, filter: &Filter, skip: usize, limit: usize) -> Result<BookPage> {
        let predicate = filter_predicate(filter)?;

        let (count_sql, count_params) = SqlSelectBuilder::new(SqlTable::Book)
            .select([SqlSelectItem::new(SqlExpr::raw("COUNT(*)"))])
            .maybe_where(predicate.clone())
            .build();
        let total: i64 = self
            .conn
            .query_row(&count_sql, params_from_iter(count_params), |row| row.get(0))
            .context("count matching books")?;

        let mut select = SqlSelectBuilder::new(SqlTable::Book)
            .select([SqlSelectItem::new(SqlExpr::column(SqlColumn::BookId))])
            .maybe_where(predicate);
        select = match filter.sort {
            Some(SortOrder::Latest) => {
                select.order_by(SqlOrderBy::desc(SqlExpr::column(SqlColumn::BookId)))
            }
            Some(SortOrder::DownloadsDesc) | None => select
                .order_by(SqlOrderBy::asc(SqlExpr::raw("book.download_count IS NULL")))
                .order_by(SqlOrderBy::desc(SqlExpr::column(
                    SqlColumn::BookDownloadCount,
                )))
                .order_by(SqlOrderBy::asc(SqlExpr::column(SqlColumn::BookId))),
        };
        let (sql, values) = select.limit(limit).offset(skip).build();
        tracing::debug!(%sql, "catalog query");

        let mut stmt = self.conn.prepare(&sql).context("prepare catalog query")?;
        let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(BookPage {
            total: usize::try_from(total).unwrap_or(0),
            books: self.load_books(&ids)?,
        })
    }
}

fn filter_predicate(filter: &Filter) -> Result<Option<SqlFragment>> {
    let mut clauses = Vec::new();
    if !filter.ids.is_empty() {
        let ids = filter.ids.iter().map(|id| SqlValue::Integer(*id)).collect();
        clauses.push(SqlFragment::in_list(
            SqlExpr::column(SqlColumn::BookId),
            ids,
        )?);
    }
    if !filter.language.is_empty() {
        let codes = filter
            .language
            .iter()
            .map(|code| SqlValue::Text(code.to_lowercase()))
            .collect();
        clauses.push(linked_exists(
            SqlTable::BookLanguage,
            SqlJoin::inner(
                SqlTable::Language,
                SqlColumn::LanguageId,
                SqlColumn::BookLanguageLanguageId,
            ),
            SqlColumn::BookLanguageBookId,
            SqlFragment::in_list(SqlExpr::column(SqlColumn::LanguageCode), codes)?,
        ));
    }
    for name in &filter.author {
        clauses.push(linked_exists(
            SqlTable::BookAuthor,
            SqlJoin::inner(
                SqlTable::Author,
                SqlColumn::AuthorId,
                SqlColumn::BookAuthorAuthorId,
            ),
            SqlColumn::BookAuthorBookId,
            SqlFragment::contains(SqlExpr::column(SqlColumn::AuthorName), name),
        ));
    }
    for title in &filter.title {
        clauses.push(SqlFragment::contains(
            SqlExpr::column(SqlColumn::BookTitle),
            title,
        ));
    }
    for topic in &filter.topic {
        let subject = linked_exists(
            SqlTable::BookSubject,
            SqlJoin::inner(
                SqlTable::Subject,
                SqlColumn::SubjectId,
                SqlColumn::BookSubjectSubjectId,
            ),
            SqlColumn::BookSubjectBookId,
            SqlFragment::contains(SqlExpr::column(SqlColumn::SubjectName), topic),
        );
        let shelf = linked_exists(
            SqlTable::BookBookshelf,
            SqlJoin::inner(
                SqlTable::Bookshelf,
                SqlColumn::BookshelfId,
                SqlColumn::BookBookshelfBookshelfId,
            ),
            SqlColumn::BookBookshelfBookId,
            SqlFragment::contains(SqlExpr::column(SqlColumn::BookshelfName), topic),
        );
        clauses.push(subject.or(shelf));
    }
    if let Some(mime) = &filter.mime_type {
        let sub = SqlSelectBuilder::new(SqlTable::Format)
            .select([SqlSelectItem::new(SqlExpr::raw("1"))])
            .where_clause(
                SqlFragment::columns_eq(SqlColumn::FormatBookId, SqlColumn::BookId).and(
                    SqlFragment::contains(SqlExpr::column(SqlColumn::FormatMimeType), mime),
                ),
            );
        clauses.push(SqlFragment::exists(sub));
    }
    Ok(SqlFragment::all(clauses))
}

/// `EXISTS` over a link table joined to its lookup table, correlated to `book`.
fn linked_exists(
    link: SqlTable,
    join: SqlJoin,
    link_book_id: SqlColumn,
    condition: SqlFragment,
) -> SqlFragment {
    let sub = SqlSelectBuilder::new(link)
        .select([SqlSelectItem::new(SqlExpr::raw("1"))])
        .join(join)
        .where_clause(SqlFragment::columns_eq(link_book_id, SqlColumn::BookId).and(condition));
    SqlFragment::exists(sub)
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let path = lock.path.clone();
            let mode = lock.mode;
            drop(lock);
            if matches!(mode, StoreMode::ReadWrite) {
                let _ = fs::remove_file(path);
            }
        }
    }
}
