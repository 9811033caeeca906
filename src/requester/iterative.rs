//! Following next-chapter links from a single starting chapter.

use super::reassembly::reassemble;
use crate::book::Chapter;
use crate::error::RequesterError;
use crate::request::PageRequest;
use crate::session::SessionFactory;
use crate::sources::ChapterSource;
use tracing::{info, warn};

/// Walks the chapter chain starting at `first`, one chapter at a time, over
/// a single session.
///
/// The walk ends when a chapter has no next chapter or its page chain
/// breaks. Chapters that produced no page are skipped; the rest are
/// numbered in the order they were reached.
pub async fn fetch_iteratively<S>(
    source: &S,
    sessions: &SessionFactory,
    first: S::Request,
    add_enter: bool,
) -> Result<Vec<Chapter>, RequesterError>
where
    S: ChapterSource + ?Sized,
    S::Request: PageRequest,
{
    let session = sessions.open()?;
    let mut chapters = Vec::new();
    let mut next = Some(first);

    while let Some(request) = next.take() {
        let result = reassemble(source, &session, request, add_enter).await;
        if !result.complete {
            warn!(chapters = chapters.len(), "chapter chain broken, stopping");
        }
        if let Some(mut chapter) = result.chapter {
            chapter.id = Some(chapters.len());
            info!("Chapter {}: {}", chapters.len() + 1, chapter.display_title());
            chapters.push(chapter);
        }
        next = result.next;
    }

    Ok(chapters)
}
