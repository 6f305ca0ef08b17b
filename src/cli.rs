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

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version,
    about = "Public-domain book catalog with natural-language search"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new catalog store
    Init {
        /// Directory to create the store in
        path: Option<PathBuf>,
    },

    /// Load books from a JSONL file
    Import(ImportArgs),

    /// Export the catalog as JSONL
    Export(ExportArgs),

    /// List books matching explicit filters
    Books(BooksArgs),

    /// Search the catalog with a natural-language request
    Chat(ChatArgs),

    /// Show stats
    Stats {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Run integrity checks and probe the language model backend
    Doctor {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct BooksArgs {
    /// Book ids
    #[arg(long)]
    pub ids: Vec<i64>,

    /// Two-letter language codes
    #[arg(long)]
    pub language: Vec<String>,

    /// Format mime type (partial match)
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Subject or bookshelf (partial match)
    #[arg(long)]
    pub topic: Vec<String>,

    /// Author name (partial match)
    #[arg(long)]
    pub author: Vec<String>,

    /// Title (partial match)
    #[arg(long)]
    pub title: Vec<String>,

    /// Number of books to skip
    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    /// Max books to return (defaults to the configured default_limit)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Request text, e.g. "top 5 books by Mark Twain"
    pub query: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file (defaults to stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Output JSON stats (requires --out)
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Input file (JSONL)
    pub path: PathBuf,

    /// Output JSON stats
    #[arg(long)]
    pub json: bool,
}
