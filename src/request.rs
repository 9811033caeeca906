//! Request descriptors handed to chapter sources.
//!
//! Each site shape is one variant of a sum type. The requester only ever
//! looks at [`PageRequest::is_first`]; everything else is forwarded to the
//! source untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The one property the requester may inspect on a chapter request.
pub trait PageRequest: Clone + fmt::Debug + Send + Sync {
    /// True if this request denotes the first page of a chapter.
    ///
    /// A "next" request with `is_first` set means the source has moved on to
    /// another chapter rather than a continuation page.
    fn is_first(&self) -> bool;
}

/// How to fetch one page of chapter content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChapterRequest {
    /// A page addressed by URL (HTML sources).
    Url {
        is_first: bool,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// A page addressed by book and chapter identifiers (JSON sources).
    Api {
        is_first: bool,
        book_id: String,
        chapter_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl ChapterRequest {
    /// First page of a chapter at `url`.
    pub fn url(url: impl Into<String>) -> Self {
        ChapterRequest::Url {
            is_first: true,
            url: url.into(),
            title: None,
        }
    }

    /// Continuation page at `url`.
    pub fn continuation(url: impl Into<String>) -> Self {
        ChapterRequest::Url {
            is_first: false,
            url: url.into(),
            title: None,
        }
    }

    /// First page of an API chapter.
    pub fn api(book_id: impl Into<String>, chapter_id: impl Into<String>) -> Self {
        ChapterRequest::Api {
            is_first: true,
            book_id: book_id.into(),
            chapter_id: chapter_id.into(),
            title: None,
        }
    }

    /// Catalogue title attached to the request, if the source knew one.
    pub fn title(&self) -> Option<&str> {
        match self {
            ChapterRequest::Url { title, .. } | ChapterRequest::Api { title, .. } => {
                title.as_deref()
            }
        }
    }

    /// Returns the request with a catalogue title attached.
    pub fn with_title(mut self, new_title: impl Into<String>) -> Self {
        match &mut self {
            ChapterRequest::Url { title, .. } | ChapterRequest::Api { title, .. } => {
                *title = Some(new_title.into());
            }
        }
        self
    }
}

impl PageRequest for ChapterRequest {
    fn is_first(&self) -> bool {
        match self {
            ChapterRequest::Url { is_first, .. } | ChapterRequest::Api { is_first, .. } => {
                *is_first
            }
        }
    }
}

impl fmt::Display for ChapterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterRequest::Url { url, .. } => write!(f, "{url}"),
            ChapterRequest::Api {
                book_id,
                chapter_id,
                ..
            } => write!(f, "book {book_id} chapter {chapter_id}"),
        }
    }
}

/// How to fetch the ordered chapter list of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogueRequest {
    Url { url: String },
    Api { book_id: String },
}

/// How to fetch a book's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookInfoRequest {
    Url { url: String },
    Api { book_id: String },
}

impl From<&CatalogueRequest> for BookInfoRequest {
    fn from(req: &CatalogueRequest) -> Self {
        match req {
            CatalogueRequest::Url { url } => BookInfoRequest::Url { url: url.clone() },
            CatalogueRequest::Api { book_id } => BookInfoRequest::Api {
                book_id: book_id.clone(),
            },
        }
    }
}
