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
use anyhow::bail;
use rusqlite::types::Value as SqlValue;

/// SQL name of the Unicode lower-casing function used by [`SqlFragment::contains`].
pub const FOLD_FN: &str = "folio_fold";

/// Unicode lower-casing shared by the SQL function and bound patterns.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlTable {
    Book,
    Author,
    BookAuthor,
    Subject,
    BookSubject,
    Bookshelf,
    BookBookshelf,
    Language,
    BookLanguage,
    Format,
}

impl SqlTable {
    pub fn as_str(self) -> &'static str {
        match self {
            SqlTable::Book => "book",
            SqlTable::Author => "author",
            SqlTable::BookAuthor => "book_author",
            SqlTable::Subject => "subject",
            SqlTable::BookSubject => "book_subject",
            SqlTable::Bookshelf => "bookshelf",
            SqlTable::BookBookshelf => "book_bookshelf",
            SqlTable::Language => "language",
            SqlTable::BookLanguage => "book_language",
            SqlTable::Format => "format",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlColumn {
    BookId,
    BookTitle,
    BookDownloadCount,
    AuthorId,
    AuthorName,
    BookAuthorBookId,
    BookAuthorAuthorId,
    SubjectId,
    SubjectName,
    BookSubjectBookId,
    BookSubjectSubjectId,
    BookshelfId,
    BookshelfName,
    BookBookshelfBookId,
    BookBookshelfBookshelfId,
    LanguageId,
    LanguageCode,
    BookLanguageBookId,
    BookLanguageLanguageId,
    FormatBookId,
    FormatMimeType,
}

impl SqlColumn {
    pub fn sql(self) -> &'static str {
        match self {
            SqlColumn::BookId => "book.id",
            SqlColumn::BookTitle => "book.title",
            SqlColumn::BookDownloadCount => "book.download_count",
            SqlColumn::AuthorId => "author.id",
            SqlColumn::AuthorName => "author.name",
            SqlColumn::BookAuthorBookId => "book_author.book_id",
            SqlColumn::BookAuthorAuthorId => "book_author.author_id",
            SqlColumn::SubjectId => "subject.id",
            SqlColumn::SubjectName => "subject.name",
            SqlColumn::BookSubjectBookId => "book_subject.book_id",
            SqlColumn::BookSubjectSubjectId => "book_subject.subject_id",
            SqlColumn::BookshelfId => "bookshelf.id",
            SqlColumn::BookshelfName => "bookshelf.name",
            SqlColumn::BookBookshelfBookId => "book_bookshelf.book_id",
            SqlColumn::BookBookshelfBookshelfId => "book_bookshelf.bookshelf_id",
            SqlColumn::LanguageId => "language.id",
            SqlColumn::LanguageCode => "language.code",
            SqlColumn::BookLanguageBookId => "book_language.book_id",
            SqlColumn::BookLanguageLanguageId => "book_language.language_id",
            SqlColumn::FormatBookId => "format.book_id",
            SqlColumn::FormatMimeType => "format.mime_type",
        }
    }
}

#[derive(Clone, Debug)]
pub enum SqlExpr {
    Column(SqlColumn),
    Raw(&'static str),
}

impl SqlExpr {
    pub fn column(column: SqlColumn) -> Self {
        Self::Column(column)
    }

    pub fn raw(sql: &'static str) -> Self {
        Self::Raw(sql)
    }

    pub fn to_sql(&self) -> String {
        match self {
            SqlExpr::Column(column) => column.sql().to_string(),
            SqlExpr::Raw(sql) => (*sql).to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SqlSelectItem {
    expr: SqlExpr,
}

impl SqlSelectItem {
    pub fn new(expr: SqlExpr) -> Self {
        Self { expr }
    }

    fn to_sql(&self) -> String {
        self.expr.to_sql()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlOrderDir {
    Asc,
    Desc,
}

impl SqlOrderDir {
    fn as_str(self) -> &'static str {
        match self {
            SqlOrderDir::Asc => "ASC",
            SqlOrderDir::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SqlOrderBy {
    expr: SqlExpr,
    dir: SqlOrderDir,
}

impl SqlOrderBy {
    pub fn new(expr: SqlExpr, dir: SqlOrderDir) -> Self {
        Self { expr, dir }
    }

    pub fn asc(expr: SqlExpr) -> Self {
        Self::new(expr, SqlOrderDir::Asc)
    }

    pub fn desc(expr: SqlExpr) -> Self {
        Self::new(expr, SqlOrderDir::Desc)
    }

    fn to_sql(&self) -> String {
        format!("{} {}", self.expr.to_sql(), self.dir.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// `left = right` between two columns, used to correlate subqueries.
    pub fn columns_eq(left: SqlColumn, right: SqlColumn) -> Self {
        Self::raw(format!("{} = {}", left.sql(), right.sql()))
    }

    pub fn in_list(expr: SqlExpr, values: Vec<SqlValue>) -> Result<Self> {
        if values.is_empty() {
            bail!("IN list cannot be empty");
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!("{} IN ({})", expr.to_sql(), placeholders);
        Ok(Self {
            sql,
            params: values,
        })
    }

    /// Case-insensitive substring match. Both sides go through [`FOLD_FN`],
    /// which the store registers on every connection.
    pub fn contains(expr: SqlExpr, needle: &str) -> Self {
        let mut pattern = String::with_capacity(needle.len() + 2);
        pattern.push('%');
        for ch in fold(needle).chars() {
            if matches!(ch, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        Self {
            sql: format!("{FOLD_FN}({}) LIKE ? ESCAPE '\\'", expr.to_sql()),
            params: vec![SqlValue::Text(pattern)],
        }
    }

    pub fn exists(subquery: SqlSelectBuilder) -> Self {
        let (sql, params) = subquery.build();
        Self {
            sql: format!("EXISTS ({sql})"),
            params,
        }
    }

    pub fn and(self, other: SqlFragment) -> SqlFragment {
        let sql = format!("({}) AND ({})", self.sql, other.sql);
        let mut params = self.params;
        params.extend(other.params);
        SqlFragment { sql, params }
    }

    pub fn or(self, other: SqlFragment) -> SqlFragment {
        let sql = format!("({}) OR ({})", self.sql, other.sql);
        let mut params = self.params;
        params.extend(other.params);
        SqlFragment { sql, params }
    }

    /// AND of all fragments; `None` when there are none.
    pub fn all(fragments: impl IntoIterator<Item = SqlFragment>) -> Option<SqlFragment> {
        fragments.into_iter().reduce(SqlFragment::and)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlJoinKind {
    Inner,
}

impl SqlJoinKind {
    fn as_str(self) -> &'static str {
        match self {
            SqlJoinKind::Inner => "INNER",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SqlJoin {
    kind: SqlJoinKind,
    table: SqlTable,
    left: SqlColumn,
    right: SqlColumn,
}

impl SqlJoin {
    pub fn inner(table: SqlTable, left: SqlColumn, right: SqlColumn) -> Self {
        Self {
            kind: SqlJoinKind::Inner,
            table,
            left,
            right,
        }
    }

    fn to_sql(&self) -> String {
        format!(
            "{} JOIN {} ON {} = {}",
            self.kind.as_str(),
            self.table.as_str(),
            self.left.sql(),
            self.right.sql()
        )
    }
}

#[derive(Clone, Debug)]
pub struct SqlSelectBuilder {
    select: Vec<SqlSelectItem>,
    from: SqlTable,
    joins: Vec<SqlJoin>,
    where_clause: Option<SqlFragment>,
    order_by: Vec<SqlOrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl SqlSelectBuilder {
    pub fn new(from: SqlTable) -> Self {
        Self {
            select: Vec::new(),
            from,
            joins: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn select<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = SqlSelectItem>,
    {
        self.select.extend(items);
        self
    }

    pub fn join(mut self, join: SqlJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn where_clause(mut self, clause: SqlFragment) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn maybe_where(self, clause: Option<SqlFragment>) -> Self {
        match clause {
            Some(clause) => self.where_clause(clause),
            None => self,
        }
    }

    pub fn order_by(mut self, order: SqlOrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        sql.push_str("SELECT ");
        if self.select.is_empty() {
            sql.push('*');
        } else {
            let mut first = true;
            for item in &self.select {
                if !first {
                    sql.push_str(", ");
                }
                first = false;
                sql.push_str(&item.to_sql());
            }
        }
        sql.push_str(" FROM ");
        sql.push_str(self.from.as_str());
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        let mut params = Vec::new();
        if let Some(where_clause) = self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.sql);
            params.extend(where_clause.params);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let mut first = true;
            for order in &self.order_by {
                if !first {
                    sql.push_str(", ");
                }
                first = false;
                sql.push_str(&order.to_sql());
            }
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::from(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        if let Some(offset) = self.offset {
            sql.push_str(" OFFSET ?");
            params.push(SqlValue::from(i64::try_from(offset).unwrap_or(i64::MAX)));
        }

        (sql, params)
    }
}
