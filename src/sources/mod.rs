//! Chapter source trait and the static table of supported sites.
//!
//! A source knows how to fetch one page of a chapter and the catalogue of a
//! book. It never retries and never follows continuation pages itself; the
//! requester does both.

mod html;
mod json;

pub use html::{HtmlProfile, HtmlSource};
pub use json::{JsonProfile, JsonSource};

use crate::book::{BookInfo, Chapter};
use crate::error::SourceError;
use crate::request::{BookInfoRequest, CatalogueRequest, ChapterRequest};
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Result of fetching one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<R> {
    /// The page, or `None` if the source found nothing on it.
    pub page: Option<Chapter>,

    /// Where to continue, if anywhere.
    pub next: Option<R>,
}

impl<R> Fetched<R> {
    pub fn new(page: Option<Chapter>, next: Option<R>) -> Self {
        Self { page, next }
    }
}

/// Trait for chapter sources.
///
/// Each implementation handles one family of sites and is generic over the
/// request type so the requester can be exercised with any request shape.
#[async_trait]
pub trait ChapterSource: Send + Sync {
    /// Request type understood by this source.
    type Request: Send + Sync;

    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetches a single page. Must not retry or follow continuation pages.
    async fn fetch_chapter(
        &self,
        session: &Session,
        request: &Self::Request,
    ) -> Result<Fetched<Self::Request>, SourceError>;

    /// Fetches the ordered chapter requests of a whole book.
    async fn fetch_chapter_list(
        &self,
        session: &Session,
        catalogue: &CatalogueRequest,
    ) -> Result<Vec<Self::Request>, SourceError>;

    /// Fetches book metadata, where the site exposes it.
    async fn fetch_book_info(
        &self,
        _session: &Session,
        _request: &BookInfoRequest,
    ) -> Result<BookInfo, SourceError> {
        Err(SourceError::Unsupported("book info"))
    }
}

/// Source type used by the binary: any site source over [`ChapterRequest`].
pub type DynSource = Box<dyn ChapterSource<Request = ChapterRequest>>;

/// A user-defined site profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProfileConfig {
    Html(HtmlProfile),
    Json(JsonProfile),
}

impl ProfileConfig {
    fn into_source(self, name: String) -> Result<DynSource, SourceError> {
        let source: DynSource = match self {
            ProfileConfig::Html(profile) => Box::new(HtmlSource::new(name, &profile)?),
            ProfileConfig::Json(profile) => Box::new(JsonSource::new(name, profile)),
        };
        Ok(source)
    }

    /// Checks that the profile can be turned into a source.
    pub fn validate(&self) -> Result<(), SourceError> {
        match self {
            ProfileConfig::Html(profile) => profile.compile().map(|_| ()),
            ProfileConfig::Json(_) => Ok(()),
        }
    }
}

/// Built-in sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    Feiazw,
    Zwwx,
    Biquge,
}

impl Site {
    /// All built-in sites.
    pub const ALL: [Site; 3] = [Site::Feiazw, Site::Zwwx, Site::Biquge];

    /// Identifier used on the command line and in config.
    pub fn id(self) -> &'static str {
        match self {
            Site::Feiazw => "feiazw",
            Site::Zwwx => "zwwx",
            Site::Biquge => "biquge",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|site| site.id().eq_ignore_ascii_case(name))
    }

    /// Selector profile of the site.
    pub fn profile(self) -> HtmlProfile {
        match self {
            Site::Feiazw => HtmlProfile {
                title: ".chaptertitle".to_string(),
                content: "#content".to_string(),
                next_chapter: Some("#next".to_string()),
                catalogue_links: ".chapterlist a".to_string(),
                title_after: Some("章".to_string()),
                noise: vec!["飞速中文".to_string(), "feiazw".to_string()],
                ..HtmlProfile::default()
            },
            Site::Zwwx => HtmlProfile {
                title: ".bookname h1".to_string(),
                content: "#content".to_string(),
                next_chapter: Some("div.bottem2 a:nth-last-child(2)".to_string()),
                next_chapter_text: Some("下一章".to_string()),
                catalogue_links: "#list dd a".to_string(),
                title_after: Some("章".to_string()),
                encoding: Some("gbk".to_string()),
                ..HtmlProfile::default()
            },
            Site::Biquge => HtmlProfile {
                title: ".content h1".to_string(),
                content: "#chaptercontent".to_string(),
                next_page: Some("#pb_next".to_string()),
                next_page_text: Some("下一页".to_string()),
                next_chapter: Some("#pb_next".to_string()),
                catalogue_links: ".listmain dd a".to_string(),
                title_strip: Some(r"[（(]\d+/\d+[）)]$".to_string()),
                ..HtmlProfile::default()
            },
        }
    }

    /// Creates the source for this site.
    pub fn source(self) -> Result<DynSource, SourceError> {
        let source: DynSource = Box::new(HtmlSource::new(self.id(), &self.profile())?);
        Ok(source)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Resolves a site name to a source: built-in sites first, then the
/// user's profiles.
pub fn resolve_source(
    name: &str,
    profiles: &BTreeMap<String, ProfileConfig>,
) -> Result<DynSource, SourceError> {
    if let Some(site) = Site::from_name(name) {
        return site.source();
    }
    match profiles.get(name) {
        Some(profile) => profile.clone().into_source(name.to_string()),
        None => Err(SourceError::UnknownSite(name.to_string())),
    }
}

/// Checks the response status, mapping 429 to [`SourceError::RateLimited`].
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited(url));
    }
    Err(SourceError::Status {
        status: status.as_u16(),
        url,
    })
}

/// Resolves a possibly relative link against the page it appeared on.
pub(crate) fn resolve_url(base: &str, link: &str) -> Result<String, SourceError> {
    let base = url::Url::parse(base).map_err(|e| SourceError::InvalidUrl(format!("{base}: {e}")))?;
    base.join(link)
        .map(|u| u.to_string())
        .map_err(|e| SourceError::InvalidUrl(format!("{link}: {e}")))
}
