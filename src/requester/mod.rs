//! Book requester: drives a [`ChapterSource`] until a book is assembled.
//!
//! Three strategies share the same page-merging rules:
//! - `concurrent`: fetch the catalogue, then request every unfinished page
//!   at once, round after round, until all chapters complete or progress
//!   stalls.
//! - `sequential_catalogue`: fetch the catalogue, then walk it one chapter at
//!   a time with a fixed number of attempts per chapter.
//! - `iterative`: start from one chapter and follow next-chapter links.

mod concurrent;
mod iterative;
mod reassembly;
mod sequential;

pub use concurrent::{FetchReport, FetchState, fetch_concurrently};
pub use iterative::fetch_iteratively;
pub use reassembly::{Reassembled, merge_page, reassemble};
pub use sequential::fetch_sequentially;

use crate::book::{Book, BookInfo, Chapter};
use crate::config::RequesterConfig;
use crate::error::RequesterError;
use crate::request::{BookInfoRequest, CatalogueRequest, PageRequest};
use crate::session::SessionFactory;
use crate::sources::ChapterSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// Fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Strategy {
    Concurrent,
    SequentialCatalogue,
    Iterative,
}

impl Strategy {
    pub fn id(self) -> &'static str {
        match self {
            Strategy::Concurrent => "concurrent",
            Strategy::SequentialCatalogue => "sequential_catalogue",
            Strategy::Iterative => "iterative",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Options of one requester run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub strategy: Strategy,
    pub stall_limit: u32,
    pub add_enter: bool,
    pub attempts_per_chapter: u32,

    /// Zero-based catalogue indices to fetch; `None` fetches everything.
    pub chapters: Option<BTreeSet<usize>>,
}

impl From<&RequesterConfig> for RunOptions {
    fn from(config: &RequesterConfig) -> Self {
        Self {
            strategy: config.strategy,
            stall_limit: config.stall_limit,
            add_enter: config.add_enter,
            attempts_per_chapter: config.attempts_per_chapter,
            chapters: None,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&RequesterConfig::default())
    }
}

/// Where a run starts.
#[derive(Debug, Clone)]
pub enum Start<R> {
    /// A book catalogue, for the catalogue strategies.
    Catalogue(CatalogueRequest),

    /// The first page of the first chapter, for the iterative strategy.
    Chapter(R),
}

/// Fetches whole books from one source.
pub struct BookRequester<'a, S: ?Sized> {
    source: &'a S,
    sessions: SessionFactory,
    options: RunOptions,
}

impl<'a, S> BookRequester<'a, S>
where
    S: ChapterSource + ?Sized,
    S::Request: PageRequest,
{
    pub fn new(source: &'a S, sessions: SessionFactory, options: RunOptions) -> Self {
        Self {
            source,
            sessions,
            options,
        }
    }

    /// Fills `book` with the chapters fetched from `start`.
    ///
    /// Only misuse fails the run: a catalogue that cannot be fetched, an
    /// invalid session, or a start that does not fit the strategy. Chapters
    /// that never arrive stay in the book as empty placeholders
    /// (catalogue strategies) or are left out (iterative strategy).
    pub async fn run(
        &self,
        mut book: Book,
        start: Start<S::Request>,
    ) -> Result<Book, RequesterError> {
        book.chapters = self.fetch_chapters(start).await?;
        Ok(book)
    }

    /// Fetches the chapters without touching book metadata.
    pub async fn fetch_chapters(
        &self,
        start: Start<S::Request>,
    ) -> Result<Vec<Chapter>, RequesterError> {
        let strategy = self.options.strategy;
        info!(source = self.source.name(), %strategy, "starting book fetch");

        match (strategy, start) {
            (Strategy::Iterative, Start::Chapter(first)) => {
                if !first.is_first() {
                    warn!(request = ?first, "iterative fetch starts from a continuation page");
                }
                fetch_iteratively(self.source, &self.sessions, first, self.options.add_enter).await
            }
            (Strategy::Iterative, Start::Catalogue(_)) => Err(RequesterError::WrongStart {
                strategy: Strategy::Iterative.id(),
                expected: "a chapter request",
            }),
            (_, Start::Chapter(_)) => Err(RequesterError::WrongStart {
                strategy: strategy.id(),
                expected: "a catalogue request",
            }),
            (_, Start::Catalogue(catalogue)) => {
                let requests = self.catalogue(&catalogue).await?;
                if strategy == Strategy::SequentialCatalogue {
                    return fetch_sequentially(
                        self.source,
                        &self.sessions,
                        requests,
                        self.options.attempts_per_chapter,
                        self.options.add_enter,
                    )
                    .await;
                }

                let mut state = FetchState::new(requests);
                let report = fetch_concurrently(
                    self.source,
                    &self.sessions,
                    &mut state,
                    self.options.stall_limit,
                    self.options.add_enter,
                )
                .await?;
                if report.unfinished > 0 {
                    warn!(
                        rounds = report.rounds,
                        unfinished = report.unfinished,
                        "giving up on unfinished chapters"
                    );
                }
                Ok(state.chapters)
            }
        }
    }

    /// Fetches and filters the catalogue into `(catalogue index, request)`
    /// pairs.
    async fn catalogue(
        &self,
        catalogue: &CatalogueRequest,
    ) -> Result<Vec<(usize, S::Request)>, RequesterError> {
        let session = self.sessions.open()?;
        let requests = self
            .source
            .fetch_chapter_list(&session, catalogue)
            .await
            .map_err(RequesterError::Catalogue)?;
        info!(chapters = requests.len(), "catalogue fetched");
        Ok(select_chapters(requests, self.options.chapters.as_ref()))
    }

    /// Fetches book metadata from the source.
    pub async fn book_info(&self, request: &BookInfoRequest) -> Result<BookInfo, RequesterError> {
        let session = self.sessions.open()?;
        self.source
            .fetch_book_info(&session, request)
            .await
            .map_err(RequesterError::BookInfo)
    }
}

/// Keeps the catalogue entries whose index is in `wanted`, paired with
/// their catalogue index. Indices past the end are reported and skipped.
pub fn select_chapters<R>(requests: Vec<R>, wanted: Option<&BTreeSet<usize>>) -> Vec<(usize, R)> {
    let Some(wanted) = wanted else {
        return requests.into_iter().enumerate().collect();
    };

    let total = requests.len();
    let outside: Vec<usize> = wanted.range(total..).copied().collect();
    if !outside.is_empty() {
        warn!(?outside, total, "ignoring chapter indices outside the catalogue");
    }

    requests
        .into_iter()
        .enumerate()
        .filter(|(index, _)| wanted.contains(index))
        .collect()
}

/// Parses a chapter selection such as `"1-3,7"` into zero-based indices.
/// The input is one-based, matching chapter numbers shown to users.
pub fn parse_chapter_selection(input: &str) -> Result<BTreeSet<usize>, String> {
    let mut selected = BTreeSet::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let number = |s: &str| -> Result<usize, String> {
            match s.trim().parse::<usize>() {
                Ok(0) | Err(_) => Err(format!("invalid chapter number: {s:?}")),
                Ok(n) => Ok(n),
            }
        };
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(format!("empty chapter range: {part}"));
                }
                selected.extend(start - 1..end);
            }
            None => {
                selected.insert(number(part)? - 1);
            }
        }
    }
    if selected.is_empty() {
        return Err("no chapters selected".to_string());
    }
    Ok(selected)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory source that plays back scripted pages.

    use super::*;
    use crate::config::SessionConfig;
    use crate::error::SourceError;
    use crate::session::Session;
    use crate::sources::Fetched;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TestRequest {
        pub key: String,
        pub first: bool,
    }

    impl TestRequest {
        pub fn first(key: &str) -> Self {
            Self {
                key: key.to_string(),
                first: true,
            }
        }

        pub fn continuation(key: &str) -> Self {
            Self {
                key: key.to_string(),
                first: false,
            }
        }
    }

    impl PageRequest for TestRequest {
        fn is_first(&self) -> bool {
            self.first
        }
    }

    #[derive(Debug, Clone)]
    pub enum Step {
        Page {
            title: Option<String>,
            content: String,
            next: Option<TestRequest>,
        },
        Empty,
        Fail,
    }

    impl Step {
        pub fn page(title: &str, content: &str) -> Self {
            Step::Page {
                title: Some(title.to_string()),
                content: content.to_string(),
                next: None,
            }
        }

        pub fn page_to(title: &str, content: &str, next: TestRequest) -> Self {
            Step::Page {
                title: Some(title.to_string()),
                content: content.to_string(),
                next: Some(next),
            }
        }
    }

    /// Each key plays its steps in order; the last step repeats.
    #[derive(Default)]
    pub struct ScriptedSource {
        scripts: HashMap<String, Vec<Step>>,
        delays: HashMap<String, u64>,
        catalogue: Option<Vec<TestRequest>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(mut self, key: &str, steps: Vec<Step>) -> Self {
            self.scripts.insert(key.to_string(), steps);
            self
        }

        pub fn delay(mut self, key: &str, millis: u64) -> Self {
            self.delays.insert(key.to_string(), millis);
            self
        }

        pub fn catalogue(mut self, keys: &[&str]) -> Self {
            self.catalogue = Some(keys.iter().map(|k| TestRequest::first(k)).collect());
            self
        }

        pub fn calls(&self, key: &str) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl ChapterSource for ScriptedSource {
        type Request = TestRequest;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_chapter(
            &self,
            _session: &Session,
            request: &TestRequest,
        ) -> Result<Fetched<TestRequest>, SourceError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(request.key.clone()).or_default();
                *count += 1;
                *count - 1
            };
            if let Some(&millis) = self.delays.get(&request.key) {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }

            let steps = self
                .scripts
                .get(&request.key)
                .ok_or_else(|| SourceError::ElementNotFound(request.key.clone()))?;
            match steps.get(call).or(steps.last()) {
                Some(Step::Page {
                    title,
                    content,
                    next,
                }) => {
                    let page = Chapter {
                        title: title.clone(),
                        content: content.clone(),
                        id: None,
                    };
                    Ok(Fetched::new(Some(page), next.clone()))
                }
                Some(Step::Empty) => Ok(Fetched::new(None, None)),
                Some(Step::Fail) | None => Err(SourceError::ParseError(format!(
                    "scripted failure for {}",
                    request.key
                ))),
            }
        }

        async fn fetch_chapter_list(
            &self,
            _session: &Session,
            _catalogue: &CatalogueRequest,
        ) -> Result<Vec<TestRequest>, SourceError> {
            self.catalogue
                .clone()
                .ok_or_else(|| SourceError::ElementNotFound("catalogue".to_string()))
        }
    }

    pub fn sessions() -> SessionFactory {
        SessionFactory::new(&SessionConfig::default()).unwrap()
    }

    pub fn session() -> Session {
        sessions().open().unwrap()
    }
}
