//! Walking a catalogue one chapter at a time.

use super::reassembly::reassemble;
use crate::book::Chapter;
use crate::error::RequesterError;
use crate::request::PageRequest;
use crate::session::SessionFactory;
use crate::sources::ChapterSource;
use tracing::{info, warn};

/// Fetches catalogue chapters in order, giving each up to `attempts`
/// tries. A chapter that never completes keeps its best partial content, or
/// stays an empty placeholder.
pub async fn fetch_sequentially<S>(
    source: &S,
    sessions: &SessionFactory,
    requests: Vec<(usize, S::Request)>,
    attempts: u32,
    add_enter: bool,
) -> Result<Vec<Chapter>, RequesterError>
where
    S: ChapterSource + ?Sized,
    S::Request: PageRequest,
{
    let session = sessions.open()?;
    let mut chapters = Vec::with_capacity(requests.len());

    for (id, request) in requests {
        let mut slot = Chapter::placeholder(id);

        for attempt in 1..=attempts.max(1) {
            let result = reassemble(source, &session, request.clone(), add_enter).await;
            if let Some(mut chapter) = result.chapter {
                chapter.id = Some(id);
                slot = chapter;
            }
            if result.complete {
                info!("Chapter {}: {}", id + 1, slot.display_title());
                break;
            }
            warn!(chapter = id + 1, attempt, attempts, "chapter incomplete");
        }

        chapters.push(slot);
    }

    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requester::testing::{ScriptedSource, Step, TestRequest, sessions};

    fn requests(keys: &[&str]) -> Vec<(usize, TestRequest)> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| (i, TestRequest::first(k)))
            .collect()
    }

    #[tokio::test]
    async fn test_retries_up_to_attempts() {
        let source = ScriptedSource::new()
            .script("c0", vec![Step::Fail, Step::Fail, Step::page("One", "a")])
            .script("c1", vec![Step::Fail]);

        let chapters = fetch_sequentially(&source, &sessions(), requests(&["c0", "c1"]), 3, false)
            .await
            .unwrap();

        assert_eq!(chapters[0].title.as_deref(), Some("One"));
        assert_eq!(source.calls("c0"), 3);
        assert_eq!(source.calls("c1"), 3);
        assert!(chapters[1].is_placeholder());
        assert_eq!(chapters[1].id, Some(1));
    }

    #[tokio::test]
    async fn test_does_not_follow_next_chapter() {
        let source = ScriptedSource::new()
            .script("c0", vec![Step::page_to("One", "a", TestRequest::continuation("c0b"))])
            .script("c0b", vec![Step::page_to("One", "b", TestRequest::first("c1"))])
            .script("c1", vec![Step::page("Two", "c")]);

        let chapters = fetch_sequentially(&source, &sessions(), requests(&["c0"]), 2, true)
            .await
            .unwrap();

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].content, "a\nb");
        assert_eq!(source.calls("c1"), 0);
    }

    #[tokio::test]
    async fn test_keeps_partial_content() {
        let source = ScriptedSource::new()
            .script("c0", vec![Step::page_to("One", "a", TestRequest::continuation("c0b"))])
            .script("c0b", vec![Step::Fail]);

        let chapters = fetch_sequentially(&source, &sessions(), requests(&["c0"]), 2, false)
            .await
            .unwrap();

        assert_eq!(chapters[0].content, "a");
        assert_eq!(source.calls("c0"), 2);
    }
}
