//! Round-based concurrent fetching with stall detection.

use super::reassembly::merge_page;
use crate::book::Chapter;
use crate::error::{RequesterError, SourceError};
use crate::request::PageRequest;
use crate::session::SessionFactory;
use crate::sources::{ChapterSource, Fetched};
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Progress of a catalogue fetch.
///
/// `chapters[slot]` holds everything merged so far for that slot;
/// `pending[slot]` is the next page still to request. A slot is finished
/// once it leaves `pending`.
#[derive(Debug, Clone)]
pub struct FetchState<R> {
    pub pending: BTreeMap<usize, R>,
    pub chapters: Vec<Chapter>,
}

impl<R: PageRequest> FetchState<R> {
    /// Starts with one empty placeholder per request, each carrying its
    /// catalogue index as chapter id.
    pub fn new(requests: Vec<(usize, R)>) -> Self {
        let mut pending = BTreeMap::new();
        let mut chapters = Vec::with_capacity(requests.len());
        for (slot, (id, request)) in requests.into_iter().enumerate() {
            chapters.push(Chapter::placeholder(id));
            pending.insert(slot, request);
        }
        Self { pending, chapters }
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Folds one round of results into the state and returns how many
    /// fetches failed. Failed slots keep their pending request.
    fn reduce(
        &mut self,
        results: Vec<(usize, Result<Fetched<R>, SourceError>)>,
        add_enter: bool,
    ) -> usize {
        let mut failed = 0;
        for (slot, result) in results {
            let id = self.chapters[slot].id.unwrap_or(slot);
            let fetched = match result {
                Ok(fetched) => fetched,
                Err(err) => {
                    failed += 1;
                    warn!(
                        chapter = id + 1,
                        request = ?self.pending.get(&slot),
                        error = %err,
                        "fetch failed, will retry"
                    );
                    continue;
                }
            };

            let acc = std::mem::take(&mut self.chapters[slot]);
            match merge_page(Some(acc), fetched.page, add_enter) {
                Ok(merged) => {
                    self.chapters[slot] = merged.unwrap_or_else(|| Chapter::placeholder(id));
                }
                Err(err) => {
                    error!(chapter = id + 1, error = %err, "discarding chapter");
                    self.chapters[slot] = Chapter::placeholder(id);
                    self.pending.remove(&slot);
                    continue;
                }
            }

            match fetched.next {
                Some(next) if !next.is_first() => {
                    debug!(chapter = id + 1, "continuation page queued");
                    self.pending.insert(slot, next);
                }
                _ => {
                    self.pending.remove(&slot);
                    info!("Chapter {}: {}", id + 1, self.chapters[slot].display_title());
                }
            }
        }
        failed
    }
}

/// Summary of a concurrent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub rounds: u32,
    pub unfinished: usize,
}

/// Fetches every pending page in rounds until nothing is pending or the
/// failure count stays the same for `stall_limit` consecutive rounds.
///
/// Each round opens one session and issues all pending requests at once;
/// completion order does not affect the result. A state with nothing
/// pending issues no requests.
pub async fn fetch_concurrently<S>(
    source: &S,
    sessions: &SessionFactory,
    state: &mut FetchState<S::Request>,
    stall_limit: u32,
    add_enter: bool,
) -> Result<FetchReport, RequesterError>
where
    S: ChapterSource + ?Sized,
    S::Request: PageRequest,
{
    let total = state.chapters.len();
    let mut rounds = 0;
    let mut stalls = 0;
    let mut last_failed = None;

    while !state.is_complete() {
        rounds += 1;
        let session = sessions.open()?;

        let fetches = state.pending.iter().map(|(&slot, request)| {
            let session = &session;
            async move { (slot, source.fetch_chapter(session, request).await) }
        });
        let results = join_all(fetches).await;
        drop(session);

        let failed = state.reduce(results, add_enter);
        let pending = state.pending.len();
        info!(
            "{}/{} completed, {}/{} failed, {}/{} undergoing",
            total - pending,
            total,
            failed,
            total,
            pending.saturating_sub(failed),
            total
        );

        if state.is_complete() {
            break;
        }

        if failed > 0 && last_failed == Some(failed) {
            stalls += 1;
        } else {
            stalls = 0;
        }
        last_failed = Some(failed);

        if stalls >= stall_limit {
            warn!(rounds, stalls, pending, "no progress, stopping");
            break;
        }
    }

    Ok(FetchReport {
        rounds,
        unfinished: state.pending.len(),
    })
}
