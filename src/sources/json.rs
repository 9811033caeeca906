//! JSON chapter source for app-style backends.
//!
//! URLs are built from templates with `{book_id}` and `{chapter_id}`
//! placeholders; fields are located with JSON pointers (RFC 6901).

use super::{ChapterSource, Fetched, check_status};
use crate::book::{BookInfo, Chapter};
use crate::error::SourceError;
use crate::request::{BookInfoRequest, CatalogueRequest, ChapterRequest};
use crate::session::Session;
use async_trait::async_trait;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Endpoint and field layout of one JSON backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonProfile {
    /// Catalogue endpoint template (`{book_id}`).
    pub catalogue_url: String,

    /// Pointer to the array of chapter entries in the catalogue response.
    pub catalogue_items: String,

    /// Pointer to the chapter id inside one catalogue entry.
    pub item_id: String,

    /// Pointer to the chapter title inside one catalogue entry.
    pub item_title: Option<String>,

    /// Chapter endpoint template (`{book_id}`, `{chapter_id}`).
    pub chapter_url: String,

    /// Pointer to the chapter title in the chapter response.
    pub chapter_title: String,

    /// Pointer to the chapter body in the chapter response.
    pub chapter_content: String,

    /// Pointer to the id of the following chapter, if the backend links
    /// chapters.
    pub next_chapter_id: Option<String>,

    /// The body is HTML and must be reduced to text.
    pub content_is_html: bool,

    /// Book info endpoint template (`{book_id}`).
    pub info_url: Option<String>,

    pub info_name: Option<String>,
    pub info_author: Option<String>,
    pub info_intro: Option<String>,
}

impl Default for JsonProfile {
    fn default() -> Self {
        Self {
            catalogue_url: "https://api.example.com/book/{book_id}/chapters".to_string(),
            catalogue_items: "/data".to_string(),
            item_id: "/id".to_string(),
            item_title: Some("/title".to_string()),
            chapter_url: "https://api.example.com/book/{book_id}/chapter/{chapter_id}"
                .to_string(),
            chapter_title: "/data/title".to_string(),
            chapter_content: "/data/content".to_string(),
            next_chapter_id: None,
            content_is_html: false,
            info_url: None,
            info_name: None,
            info_author: None,
            info_intro: None,
        }
    }
}

/// Chapter source for one JSON backend.
pub struct JsonSource {
    name: String,
    profile: JsonProfile,
}

impl JsonSource {
    pub fn new(name: impl Into<String>, profile: JsonProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }

    async fn fetch_json(&self, session: &Session, url: &str) -> Result<JsonValue, SourceError> {
        session.rate_limit().await;
        let response = check_status(session.client().get(url).send().await?)?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SourceError::ParseError(format!("{url}: {e}")))
    }

    fn parse_chapter(
        &self,
        book_id: &str,
        body: &JsonValue,
    ) -> Result<Fetched<ChapterRequest>, SourceError> {
        let title = required_string(body, &self.profile.chapter_title)?;
        let raw = required_string(body, &self.profile.chapter_content)?;
        let content = if self.profile.content_is_html {
            html_to_text(&raw)
        } else {
            raw.trim().to_string()
        };

        let next = self
            .profile
            .next_chapter_id
            .as_deref()
            .and_then(|ptr| optional_string(body, ptr))
            .filter(|id| !id.is_empty() && id != "0")
            .map(|id| ChapterRequest::api(book_id, id));

        Ok(Fetched::new(Some(Chapter::new(title, content)), next))
    }

    fn parse_catalogue(
        &self,
        book_id: &str,
        body: &JsonValue,
    ) -> Result<Vec<ChapterRequest>, SourceError> {
        let items = body
            .pointer(&self.profile.catalogue_items)
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SourceError::ElementNotFound(self.profile.catalogue_items.clone()))?;

        items
            .iter()
            .map(|item| {
                let id = required_string(item, &self.profile.item_id)?;
                let request = ChapterRequest::api(book_id, id);
                Ok(
                    match self
                        .profile
                        .item_title
                        .as_deref()
                        .and_then(|ptr| optional_string(item, ptr))
                    {
                        Some(title) => request.with_title(title),
                        None => request,
                    },
                )
            })
            .collect()
    }

    fn parse_book_info(&self, body: &JsonValue) -> BookInfo {
        let field = |ptr: &Option<String>| {
            ptr.as_deref()
                .and_then(|ptr| optional_string(body, ptr))
                .unwrap_or_default()
        };
        BookInfo {
            name: field(&self.profile.info_name),
            author: field(&self.profile.info_author),
            preface: field(&self.profile.info_intro),
        }
    }
}

/// Fills `{book_id}` and `{chapter_id}` into a URL template.
fn fill_template(template: &str, book_id: &str, chapter_id: Option<&str>) -> String {
    let url = template.replace("{book_id}", book_id);
    match chapter_id {
        Some(id) => url.replace("{chapter_id}", id),
        None => url,
    }
}

/// Reads a string or number at `pointer`.
fn optional_string(value: &JsonValue, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_string(value: &JsonValue, pointer: &str) -> Result<String, SourceError> {
    optional_string(value, pointer).ok_or_else(|| SourceError::ElementNotFound(pointer.to_string()))
}

/// Reduces an HTML fragment to one trimmed line per paragraph.
fn html_to_text(fragment: &str) -> String {
    let normalized = fragment
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "</p>\n");
    let doc = Html::parse_fragment(&normalized);
    doc.root_element()
        .text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unsupported(request: impl std::fmt::Debug) -> SourceError {
    SourceError::UnsupportedRequest {
        source_name: "json",
        detail: format!("{request:?}"),
    }
}

#[async_trait]
impl ChapterSource for JsonSource {
    type Request = ChapterRequest;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_chapter(
        &self,
        session: &Session,
        request: &ChapterRequest,
    ) -> Result<Fetched<ChapterRequest>, SourceError> {
        let ChapterRequest::Api {
            book_id,
            chapter_id,
            ..
        } = request
        else {
            return Err(unsupported(request));
        };
        let url = fill_template(&self.profile.chapter_url, book_id, Some(chapter_id));
        let body = self.fetch_json(session, &url).await?;
        self.parse_chapter(book_id, &body)
    }

    async fn fetch_chapter_list(
        &self,
        session: &Session,
        catalogue: &CatalogueRequest,
    ) -> Result<Vec<ChapterRequest>, SourceError> {
        let CatalogueRequest::Api { book_id } = catalogue else {
            return Err(unsupported(catalogue));
        };
        let url = fill_template(&self.profile.catalogue_url, book_id, None);
        let body = self.fetch_json(session, &url).await?;
        self.parse_catalogue(book_id, &body)
    }

    async fn fetch_book_info(
        &self,
        session: &Session,
        request: &BookInfoRequest,
    ) -> Result<BookInfo, SourceError> {
        let BookInfoRequest::Api { book_id } = request else {
            return Err(unsupported(request));
        };
        let Some(template) = self.profile.info_url.as_deref() else {
            return Err(SourceError::Unsupported("book info"));
        };
        let body = self
            .fetch_json(session, &fill_template(template, book_id, None))
            .await?;
        Ok(self.parse_book_info(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PageRequest;
    use serde_json::json;

    fn linked_profile() -> JsonProfile {
        JsonProfile {
            next_chapter_id: Some("/data/next_id".to_string()),
            ..JsonProfile::default()
        }
    }

    #[test]
    fn test_fill_template() {
        assert_eq!(
            fill_template("https://a.test/{book_id}/{chapter_id}", "7", Some("9")),
            "https://a.test/7/9"
        );
        assert_eq!(fill_template("https://a.test/{book_id}", "7", None), "https://a.test/7");
    }

    #[test]
    fn test_parse_chapter_with_next() {
        let source = JsonSource::new("app", linked_profile());
        let body = json!({"data": {"title": "One", "content": " text \n", "next_id": 12}});
        let fetched = source.parse_chapter("7", &body).unwrap();

        let page = fetched.page.unwrap();
        assert_eq!(page.title.as_deref(), Some("One"));
        assert_eq!(page.content, "text");
        let next = fetched.next.unwrap();
        assert!(next.is_first());
        assert_eq!(next, ChapterRequest::api("7", "12"));
    }

    #[test]
    fn test_last_chapter_has_no_next() {
        let source = JsonSource::new("app", linked_profile());
        let body = json!({"data": {"title": "End", "content": "x", "next_id": 0}});
        assert!(source.parse_chapter("7", &body).unwrap().next.is_none());

        let source = JsonSource::new("app", JsonProfile::default());
        let body = json!({"data": {"title": "End", "content": "x", "next_id": 8}});
        assert!(source.parse_chapter("7", &body).unwrap().next.is_none());
    }

    #[test]
    fn test_missing_field() {
        let source = JsonSource::new("app", JsonProfile::default());
        let err = source
            .parse_chapter("7", &json!({"data": {"title": "T"}}))
            .unwrap_err();
        assert!(matches!(err, SourceError::ElementNotFound(p) if p == "/data/content"));
    }

    #[test]
    fn test_html_content() {
        let profile = JsonProfile {
            content_is_html: true,
            ..JsonProfile::default()
        };
        let source = JsonSource::new("app", profile);
        let body = json!({"data": {"title": "T", "content": "<p> a </p><p>b</p>c<br>d"}});
        assert_eq!(source.parse_chapter("1", &body).unwrap().page.unwrap().content, "a\nb\nc\nd");
    }

    #[test]
    fn test_parse_catalogue() {
        let source = JsonSource::new("app", JsonProfile::default());
        let body = json!({"data": [
            {"id": 101, "title": "Dawn"},
            {"id": "102"}
        ]});
        let requests = source.parse_catalogue("7", &body).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], ChapterRequest::api("7", "101").with_title("Dawn"));
        assert_eq!(requests[1].title(), None);

        assert!(source.parse_catalogue("7", &json!({"data": {}})).is_err());
    }

    #[test]
    fn test_parse_book_info() {
        let profile = JsonProfile {
            info_name: Some("/book/name".to_string()),
            info_author: Some("/book/author".to_string()),
            ..JsonProfile::default()
        };
        let source = JsonSource::new("app", profile);
        let info = source.parse_book_info(&json!({"book": {"name": "N", "author": "A"}}));
        assert_eq!(info.name, "N");
        assert_eq!(info.author, "A");
        assert!(info.preface.is_empty());
    }
}
