//! Merging the pages of one chapter.

use crate::book::Chapter;
use crate::error::RequesterError;
use crate::request::PageRequest;
use crate::session::Session;
use crate::sources::ChapterSource;
use tracing::warn;

/// Merges one fetched page into a chapter accumulator.
///
/// The first page with a title fixes the chapter title; later pages must
/// carry the same title or no title at all. With `add_enter`, a newline
/// separates the content of consecutive pages.
pub fn merge_page(
    acc: Option<Chapter>,
    page: Option<Chapter>,
    add_enter: bool,
) -> Result<Option<Chapter>, RequesterError> {
    let Some(page) = page else {
        return Ok(acc);
    };
    let mut chapter = acc.unwrap_or_default();

    if let Some(found) = page.title {
        match chapter.title.take() {
            None => chapter.title = Some(found),
            Some(expected) if expected != found => {
                return Err(RequesterError::TitleMismatch { expected, found });
            }
            Some(expected) => chapter.title = Some(expected),
        }
    }

    if add_enter && !chapter.content.is_empty() {
        chapter.content.push('\n');
    }
    chapter.content.push_str(&page.content);
    Ok(Some(chapter))
}

/// Outcome of following one chapter's page chain.
#[derive(Debug)]
pub struct Reassembled<R> {
    /// Everything merged so far, if any page arrived.
    pub chapter: Option<Chapter>,

    /// First request of the following chapter, if the chain reached one.
    pub next: Option<R>,

    /// False if the chain was cut short by an error.
    pub complete: bool,
}

/// Fetches a chapter page by page until the source points at the next
/// chapter or at nothing.
///
/// Errors never escape: a failed fetch returns the pages merged so far, and
/// a title mismatch discards the chapter. In both cases the chain ends with
/// no next request.
pub async fn reassemble<S>(
    source: &S,
    session: &Session,
    request: S::Request,
    add_enter: bool,
) -> Reassembled<S::Request>
where
    S: ChapterSource + ?Sized,
    S::Request: PageRequest,
{
    let mut chapter = None;
    let mut current = request;

    loop {
        let fetched = match source.fetch_chapter(session, &current).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(request = ?current, error = %err, "page fetch failed");
                return Reassembled {
                    chapter,
                    next: None,
                    complete: false,
                };
            }
        };

        chapter = match merge_page(chapter, fetched.page, add_enter) {
            Ok(merged) => merged,
            Err(err) => {
                warn!(request = ?current, error = %err, "dropping inconsistent chapter");
                return Reassembled {
                    chapter: None,
                    next: None,
                    complete: false,
                };
            }
        };

        match fetched.next {
            Some(next) if !next.is_first() => current = next,
            next => {
                return Reassembled {
                    chapter,
                    next,
                    complete: true,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requester::testing::{ScriptedSource, Step, TestRequest, session};

    #[test]
    fn test_merge_into_empty() {
        let merged = merge_page(None, Some(Chapter::new("T", "A")), true)
            .unwrap()
            .unwrap();
        assert_eq!(merged.title.as_deref(), Some("T"));
        assert_eq!(merged.content, "A");
    }

    #[test]
    fn test_merge_none_page_keeps_acc() {
        let acc = Some(Chapter::placeholder(3));
        assert_eq!(merge_page(acc.clone(), None, false).unwrap(), acc);
        assert_eq!(merge_page(None, None, false).unwrap(), None);
    }

    #[test]
    fn test_merge_keeps_placeholder_id() {
        let merged = merge_page(Some(Chapter::placeholder(7)), Some(Chapter::new("T", "A")), false)
            .unwrap()
            .unwrap();
        assert_eq!(merged.id, Some(7));
    }

    #[test]
    fn test_no_separator_after_empty_first_page() {
        let first = merge_page(None, Some(Chapter::new("T", "")), true).unwrap();
        let merged = merge_page(first, Some(Chapter::new("T", "B")), true)
            .unwrap()
            .unwrap();
        assert_eq!(merged.content, "B");

        let merged = merge_page(Some(merged), Some(Chapter::new("T", "C")), true)
            .unwrap()
            .unwrap();
        assert_eq!(merged.content, "B\nC");
    }

    #[test]
    fn test_merge_separator() {
        let acc = merge_page(None, Some(Chapter::new("T", "A")), false).unwrap();
        let joined = merge_page(acc, Some(Chapter::new("T", "B")), false).unwrap();
        assert_eq!(joined.unwrap().content, "AB");
    }

    #[test]
    fn test_merge_untitled_continuation() {
        let acc = merge_page(None, Some(Chapter::new("T", "A")), true).unwrap();
        let page = Chapter {
            title: None,
            ..Chapter::new("", "B")
        };
        let merged = merge_page(acc, Some(page), true).unwrap().unwrap();
        assert_eq!(merged.title.as_deref(), Some("T"));
        assert_eq!(merged.content, "A\nB");
    }

    #[test]
    fn test_merge_title_mismatch() {
        let acc = merge_page(None, Some(Chapter::new("T1", "A")), false).unwrap();
        let err = merge_page(acc, Some(Chapter::new("T2", "B")), false).unwrap_err();
        assert!(matches!(
            err,
            RequesterError::TitleMismatch { expected, found } if expected == "T1" && found == "T2"
        ));
    }

    #[tokio::test]
    async fn test_reassemble_three_pages() {
        let source = ScriptedSource::new()
            .script("p1", vec![Step::page_to("T", "A", TestRequest::continuation("p2"))])
            .script("p2", vec![Step::page_to("T", "B", TestRequest::continuation("p3"))])
            .script("p3", vec![Step::page_to("T", "C", TestRequest::first("next"))]);

        let result = reassemble(&source, &session(), TestRequest::first("p1"), true).await;

        let chapter = result.chapter.unwrap();
        assert_eq!(chapter.title.as_deref(), Some("T"));
        assert_eq!(chapter.content, "A\nB\nC");
        assert_eq!(result.next, Some(TestRequest::first("next")));
        assert!(result.complete);
        assert_eq!(source.calls("next"), 0);
    }

    #[tokio::test]
    async fn test_reassemble_mismatch_returns_none() {
        let source = ScriptedSource::new()
            .script("p1", vec![Step::page_to("T1", "A", TestRequest::continuation("p2"))])
            .script("p2", vec![Step::page("T2", "B")]);

        let result = reassemble(&source, &session(), TestRequest::first("p1"), false).await;
        assert!(result.chapter.is_none());
        assert!(result.next.is_none());
        assert!(!result.complete);
    }

    #[tokio::test]
    async fn test_reassemble_failure_keeps_partial() {
        let source = ScriptedSource::new()
            .script("p1", vec![Step::page_to("T", "A", TestRequest::continuation("p2"))])
            .script("p2", vec![Step::Fail]);

        let result = reassemble(&source, &session(), TestRequest::first("p1"), false).await;
        assert_eq!(result.chapter.unwrap().content, "A");
        assert!(result.next.is_none());
        assert!(!result.complete);
    }

    #[tokio::test]
    async fn test_reassemble_first_fetch_fails() {
        let source = ScriptedSource::new().script("p1", vec![Step::Fail]);
        let result = reassemble(&source, &session(), TestRequest::first("p1"), false).await;
        assert!(result.chapter.is_none());
        assert!(!result.complete);
    }
}
