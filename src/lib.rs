//! Bookfetch - web novel downloader.
//!
//! This library provides:
//! - A book requester that fetches whole books from a chapter source with
//!   concurrent retries and multi-page chapter reassembly
//! - Data-driven HTML and JSON chapter sources configured per site
//! - Book rendering, re-parsing and comparison

pub mod book;
pub mod config;
pub mod console;
mod cookies;
pub mod error;
pub mod logging;
pub mod request;
pub mod requester;
pub mod session;
pub mod sources;

// Re-export commonly used types
pub use book::{Book, BookInfo, Chapter};
pub use config::Config;
pub use console::Console;
pub use error::{BookError, ConfigError, RequesterError, SourceError};
pub use request::{BookInfoRequest, CatalogueRequest, ChapterRequest, PageRequest};
pub use requester::{BookRequester, RunOptions, Start, Strategy};
pub use session::{Session, SessionFactory};
pub use sources::{ChapterSource, DynSource, Fetched, Site};
