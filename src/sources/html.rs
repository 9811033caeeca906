//! HTML chapter source driven by CSS selectors.
//!
//! Every site detail lives in an [`HtmlProfile`]: where the title and body
//! are, which link continues the current chapter and which one starts the
//! next, and how the catalogue lists chapters.

use super::{ChapterSource, Fetched, check_status, resolve_url};
use crate::book::{BookInfo, Chapter};
use crate::error::SourceError;
use crate::request::{BookInfoRequest, CatalogueRequest, ChapterRequest};
use crate::session::Session;
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Selector profile of one HTML site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlProfile {
    /// Chapter title element.
    pub title: String,

    /// Chapter body element.
    pub content: String,

    /// Paragraphs inside the body; if unset, `<br>` separates lines.
    pub paragraph: Option<String>,

    /// Link to the next page of the same chapter.
    pub next_page: Option<String>,

    /// Text the next-page link must contain.
    pub next_page_text: Option<String>,

    /// Link to the next chapter.
    pub next_chapter: Option<String>,

    /// Text the next-chapter link must contain.
    pub next_chapter_text: Option<String>,

    /// Pattern a next-chapter URL must match to be followed.
    pub next_chapter_pattern: Option<String>,

    /// Chapter links on the catalogue page, in reading order.
    pub catalogue_links: String,

    /// Keep only the title text after the last occurrence of this marker.
    pub title_after: Option<String>,

    /// Pattern removed from titles, e.g. a `(1/3)` page counter.
    pub title_strip: Option<String>,

    /// Leading and trailing body lines containing any of these are dropped.
    pub noise: Vec<String>,

    /// Page encoding label, e.g. `gbk`. Defaults to UTF-8.
    pub encoding: Option<String>,

    /// Book name on the catalogue page.
    pub book_name: Option<String>,

    /// Book author on the catalogue page.
    pub book_author: Option<String>,

    /// Book introduction on the catalogue page.
    pub book_intro: Option<String>,
}

impl Default for HtmlProfile {
    fn default() -> Self {
        Self {
            title: "h1".to_string(),
            content: "#content".to_string(),
            paragraph: None,
            next_page: None,
            next_page_text: None,
            next_chapter: None,
            next_chapter_text: None,
            next_chapter_pattern: None,
            catalogue_links: "#list a".to_string(),
            title_after: None,
            title_strip: None,
            noise: Vec::new(),
            encoding: None,
            book_name: None,
            book_author: None,
            book_intro: None,
        }
    }
}

impl HtmlProfile {
    /// Parses every selector and pattern of the profile.
    pub fn compile(&self) -> Result<CompiledProfile, SourceError> {
        let encoding = match self.encoding.as_deref() {
            Some(label) => Some(
                encoding_rs::Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| SourceError::InvalidProfile(format!("encoding {label:?}")))?,
            ),
            None => None,
        };

        Ok(CompiledProfile {
            title: selector(&self.title)?,
            content: selector(&self.content)?,
            paragraph: optional_selector(self.paragraph.as_deref())?,
            next_page: optional_selector(self.next_page.as_deref())?,
            next_page_text: self.next_page_text.clone(),
            next_chapter: optional_selector(self.next_chapter.as_deref())?,
            next_chapter_text: self.next_chapter_text.clone(),
            next_chapter_pattern: optional_regex(self.next_chapter_pattern.as_deref())?,
            catalogue_links: selector(&self.catalogue_links)?,
            title_after: self.title_after.clone(),
            title_strip: optional_regex(self.title_strip.as_deref())?,
            noise: self.noise.clone(),
            encoding,
            book_name: optional_selector(self.book_name.as_deref())?,
            book_author: optional_selector(self.book_author.as_deref())?,
            book_intro: optional_selector(self.book_intro.as_deref())?,
        })
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::InvalidProfile(format!("selector {css:?}: {e}")))
}

fn optional_selector(css: Option<&str>) -> Result<Option<Selector>, SourceError> {
    css.map(selector).transpose()
}

fn optional_regex(pattern: Option<&str>) -> Result<Option<Regex>, SourceError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| SourceError::InvalidProfile(format!("pattern {p:?}: {e}")))
        })
        .transpose()
}

/// A profile with parsed selectors and patterns.
#[derive(Debug)]
pub struct CompiledProfile {
    title: Selector,
    content: Selector,
    paragraph: Option<Selector>,
    next_page: Option<Selector>,
    next_page_text: Option<String>,
    next_chapter: Option<Selector>,
    next_chapter_text: Option<String>,
    next_chapter_pattern: Option<Regex>,
    catalogue_links: Selector,
    title_after: Option<String>,
    title_strip: Option<Regex>,
    noise: Vec<String>,
    encoding: Option<&'static encoding_rs::Encoding>,
    book_name: Option<Selector>,
    book_author: Option<Selector>,
    book_intro: Option<Selector>,
}

/// Chapter source for one HTML site.
pub struct HtmlSource {
    name: String,
    profile: CompiledProfile,
}

impl HtmlSource {
    /// Creates a source from a profile, rejecting invalid selectors.
    pub fn new(name: impl Into<String>, profile: &HtmlProfile) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.into(),
            profile: profile.compile()?,
        })
    }

    /// Downloads a page and decodes it with the profile's encoding.
    async fn fetch_text(&self, session: &Session, url: &str) -> Result<String, SourceError> {
        session.rate_limit().await;
        let response = check_status(session.client().get(url).send().await?)?;
        let bytes = response.bytes().await?;

        Ok(match self.profile.encoding {
            Some(encoding) => encoding.decode(&bytes).0.into_owned(),
            None => String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    fn url_request<'a>(&self, request: &'a ChapterRequest) -> Result<&'a str, SourceError> {
        match request {
            ChapterRequest::Url { url, .. } => Ok(url),
            other => Err(SourceError::UnsupportedRequest {
                source_name: "html",
                detail: other.to_string(),
            }),
        }
    }

    /// Parses one chapter page.
    fn parse_chapter(
        &self,
        request: &ChapterRequest,
        url: &str,
        body: &str,
    ) -> Result<Fetched<ChapterRequest>, SourceError> {
        let doc = Html::parse_document(body);
        let profile = &self.profile;

        let title = match doc.select(&profile.title).next() {
            Some(elem) => self.clean_title(&elem.text().collect::<String>()),
            None => request
                .title()
                .map(str::to_string)
                .ok_or_else(|| SourceError::ElementNotFound("chapter title".to_string()))?,
        };

        let content_elem = doc
            .select(&profile.content)
            .next()
            .ok_or_else(|| SourceError::ElementNotFound("chapter content".to_string()))?;
        let content = self.extract_content(content_elem);

        let next = self.find_next(&doc, url)?;
        Ok(Fetched::new(Some(Chapter::new(title, content)), next))
    }

    /// Finds the continuation page, or failing that the next chapter.
    fn find_next(&self, doc: &Html, url: &str) -> Result<Option<ChapterRequest>, SourceError> {
        let profile = &self.profile;

        if let Some(sel) = &profile.next_page
            && let Some(href) = find_link(doc, sel, profile.next_page_text.as_deref())
        {
            return Ok(Some(ChapterRequest::continuation(resolve_url(url, href)?)));
        }

        if let Some(sel) = &profile.next_chapter
            && let Some(href) = find_link(doc, sel, profile.next_chapter_text.as_deref())
        {
            let next = resolve_url(url, href)?;
            let allowed = profile
                .next_chapter_pattern
                .as_ref()
                .is_none_or(|re| re.is_match(&next));
            if allowed && next != url {
                return Ok(Some(ChapterRequest::url(next)));
            }
        }

        Ok(None)
    }

    fn clean_title(&self, raw: &str) -> String {
        let mut title = raw.trim();
        if let Some(marker) = self.profile.title_after.as_deref()
            && let Some((_, tail)) = title.rsplit_once(marker)
        {
            title = tail.trim();
        }
        match &self.profile.title_strip {
            Some(re) => re.replace_all(title, "").trim().to_string(),
            None => title.to_string(),
        }
    }

    /// Extracts body text, one trimmed line per paragraph, minus noise.
    fn extract_content(&self, elem: ElementRef) -> String {
        let raw = match &self.profile.paragraph {
            Some(sel) => elem
                .select(sel)
                .map(visible_text)
                .collect::<Vec<_>>()
                .join("\n"),
            None => visible_text(elem),
        };

        let mut lines: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let is_noise = |line: &str| self.profile.noise.iter().any(|n| line.contains(n.as_str()));
        while lines.first().is_some_and(|line| is_noise(line)) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|line| is_noise(line)) {
            lines.pop();
        }

        lines.join("\n")
    }

    fn parse_catalogue(&self, url: &str, body: &str) -> Result<Vec<ChapterRequest>, SourceError> {
        let doc = Html::parse_document(body);
        let mut requests = Vec::new();

        for link in doc.select(&self.profile.catalogue_links) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let title = self.clean_title(&link.text().collect::<String>());
            requests.push(ChapterRequest::url(resolve_url(url, href)?).with_title(title));
        }

        if requests.is_empty() {
            return Err(SourceError::ElementNotFound("catalogue links".to_string()));
        }
        Ok(requests)
    }

    fn parse_book_info(&self, body: &str) -> BookInfo {
        let doc = Html::parse_document(body);
        let text_of = |sel: &Option<Selector>| {
            sel.as_ref()
                .and_then(|sel| doc.select(sel).next())
                .map(|elem| visible_text(elem).trim().to_string())
                .unwrap_or_default()
        };

        BookInfo {
            name: text_of(&self.profile.book_name),
            author: text_of(&self.profile.book_author),
            preface: text_of(&self.profile.book_intro),
        }
    }
}

/// Returns the `href` of the first link matching `sel` whose text contains
/// `text`, if given.
fn find_link<'a>(doc: &'a Html, sel: &Selector, text: Option<&str>) -> Option<&'a str> {
    doc.select(sel)
        .filter(|elem| text.is_none_or(|t| elem.text().collect::<String>().contains(t)))
        .find_map(|elem| elem.value().attr("href"))
}

/// Collects text under `elem`, turning `<br>` and block ends into newlines
/// and skipping script, style, and ruby annotations.
fn visible_text(elem: ElementRef) -> String {
    let mut text = String::new();

    for node in elem.descendants() {
        match node.value() {
            scraper::node::Node::Text(t) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|e| matches!(e.name(), "script" | "style" | "rt"))
                });
                if !hidden {
                    text.push_str(t);
                }
            }
            scraper::node::Node::Element(e) if matches!(e.name(), "br" | "p" | "div") => {
                text.push('\n');
            }
            _ => {}
        }
    }

    text
}

#[async_trait]
impl ChapterSource for HtmlSource {
    type Request = ChapterRequest;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_chapter(
        &self,
        session: &Session,
        request: &ChapterRequest,
    ) -> Result<Fetched<ChapterRequest>, SourceError> {
        let url = self.url_request(request)?;
        let body = self.fetch_text(session, url).await?;
        self.parse_chapter(request, url, &body)
    }

    async fn fetch_chapter_list(
        &self,
        session: &Session,
        catalogue: &CatalogueRequest,
    ) -> Result<Vec<ChapterRequest>, SourceError> {
        let CatalogueRequest::Url { url } = catalogue else {
            return Err(SourceError::UnsupportedRequest {
                source_name: "html",
                detail: format!("{catalogue:?}"),
            });
        };
        let body = self.fetch_text(session, url).await?;
        self.parse_catalogue(url, &body)
    }

    async fn fetch_book_info(
        &self,
        session: &Session,
        request: &BookInfoRequest,
    ) -> Result<BookInfo, SourceError> {
        let BookInfoRequest::Url { url } = request else {
            return Err(SourceError::UnsupportedRequest {
                source_name: "html",
                detail: format!("{request:?}"),
            });
        };
        if self.profile.book_name.is_none() {
            return Err(SourceError::Unsupported("book info"));
        }
        let body = self.fetch_text(session, url).await?;
        Ok(self.parse_book_info(&body))
    }
}
