//! Book and chapter model, plus text and JSON serialization.
//!
//! The text format is a preface block followed by one `第N章 title` heading
//! per chapter. It is written by [`Book::render_txt`] and read back by
//! [`Book::parse_txt`].

use crate::error::BookError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Chapters with fewer characters than this are flagged when rendering.
pub const DEFAULT_MIN_CHAPTER_CHARS: usize = 500;

/// One logical chapter, possibly assembled from several pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title. `None` means not yet known.
    pub title: Option<String>,

    /// Chapter text, accumulated across pages.
    #[serde(default)]
    pub content: String,

    /// Position within the book, assigned by the requester.
    pub id: Option<usize>,
}

impl Chapter {
    /// Creates a chapter page with a known title.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: content.into(),
            id: None,
        }
    }

    /// Creates an empty slot for the chapter at `id`.
    pub fn placeholder(id: usize) -> Self {
        Self {
            title: None,
            content: String::new(),
            id: Some(id),
        }
    }

    /// True if nothing has been merged into this chapter yet.
    pub fn is_placeholder(&self) -> bool {
        self.title.is_none() && self.content.is_empty()
    }

    /// Title for display; empty if unknown.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}

/// Book metadata as reported by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    pub name: String,
    pub author: String,
    pub preface: String,
}

/// A whole book: metadata plus chapters in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub chapters: Vec<Chapter>,
    pub preface: String,
    pub name: String,
    pub author: String,

    /// Number shown for the chapter with id 0.
    pub start_chapter: usize,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            chapters: Vec::new(),
            preface: String::new(),
            name: String::new(),
            author: String::new(),
            start_chapter: 1,
        }
    }
}

impl From<BookInfo> for Book {
    fn from(info: BookInfo) -> Self {
        Self {
            name: info.name,
            author: info.author,
            preface: info.preface,
            ..Self::default()
        }
    }
}

impl Book {
    /// Creates an empty book with fixed metadata.
    pub fn new(name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    /// Ids of chapters that never received any content.
    pub fn missing_chapters(&self) -> Vec<usize> {
        self.chapters
            .iter()
            .enumerate()
            .filter(|(_, chap)| chap.is_placeholder())
            .map(|(pos, chap)| chap.id.unwrap_or(pos))
            .collect()
    }

    /// Shifts ids so the first chapter is 0, moving the offset into
    /// `start_chapter`.
    pub fn normalize_ids(&mut self) {
        let Some(first) = self.chapters.iter().filter_map(|chap| chap.id).min() else {
            return;
        };
        for chap in &mut self.chapters {
            if let Some(id) = chap.id.as_mut() {
                *id -= first;
            }
        }
        self.start_chapter += first;
    }

    /// Resolves the id every chapter is rendered under.
    ///
    /// Chapters without ids get their position, but only if no chapter has
    /// one.
    fn resolved_ids(&self) -> Result<Vec<usize>, BookError> {
        let missing: Vec<usize> = self
            .chapters
            .iter()
            .enumerate()
            .filter(|(_, chap)| chap.id.is_none())
            .map(|(pos, _)| pos)
            .collect();

        if missing.is_empty() {
            Ok(self.chapters.iter().filter_map(|chap| chap.id).collect())
        } else if missing.len() == self.chapters.len() {
            Ok((0..self.chapters.len()).collect())
        } else {
            Err(BookError::MissingIds(missing))
        }
    }

    /// Renders the book as text.
    ///
    /// Chapters are written in ascending id order. Any chapter shorter than
    /// `min_chapter_chars` is logged as possibly invalid.
    pub fn render_txt(&self, min_chapter_chars: usize) -> Result<String, BookError> {
        let ids = self.resolved_ids()?;
        let mut order: Vec<(usize, &Chapter)> = ids.into_iter().zip(&self.chapters).collect();
        order.sort_by_key(|(id, _)| *id);

        let mut out = format!("【{}】{}\n\n{}", self.author, self.name, self.preface);
        out.push_str("\n\n");

        for (id, chapter) in order {
            let heading = format!("第{}章 {}", self.start_chapter + id, chapter.display_title());
            let len = chapter.content.chars().count();
            if len < min_chapter_chars {
                warn!(chapter = %heading, chars = len, "maybe invalid chapter");
            }
            out.push_str(&heading);
            out.push_str("\n\n");
            out.push_str(chapter.content.trim());
            out.push_str("\n\n\n");
        }

        Ok(out)
    }

    /// Writes the book as a text file.
    pub fn write_txt(&self, path: &Path, min_chapter_chars: usize) -> Result<(), BookError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render_txt(min_chapter_chars)?)?;
        Ok(())
    }

    /// Parses a book previously written by [`Book::render_txt`].
    pub fn parse_txt(text: &str) -> Self {
        let mut book = Book {
            start_chapter: 0,
            ..Book::default()
        };
        let mut current: Option<Chapter> = None;

        for line in text.split_inclusive('\n') {
            if let Some((number, title)) = parse_heading(line) {
                if let Some(chap) = current.take() {
                    book.chapters.push(finish_chapter(chap));
                }
                current = Some(Chapter {
                    title: Some(title.trim().to_string()),
                    content: String::new(),
                    id: Some(number),
                });
            } else if let Some(chap) = current.as_mut() {
                chap.content.push_str(line);
            } else {
                book.preface.push_str(line);
            }
        }
        if let Some(chap) = current.filter(|chap| chap.title.is_some()) {
            book.chapters.push(finish_chapter(chap));
        }

        book.normalize_ids();
        if book.chapters.is_empty() {
            book.start_chapter = 1;
        }
        book.split_preface();
        book
    }

    /// Reads a text book from disk.
    pub fn read_txt(path: &Path) -> Result<Self, BookError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse_txt(&text))
    }

    /// Pulls `【author】name` out of the first preface block.
    fn split_preface(&mut self) {
        let preface = std::mem::take(&mut self.preface);
        let mut blocks = preface.splitn(2, "\n\n");
        let first = blocks.next().unwrap_or_default().trim();
        let rest = blocks.next();

        let header = first
            .strip_prefix('【')
            .and_then(|tail| tail.split_once('】'));
        match (header, rest) {
            (Some((author, name)), Some(rest)) => {
                self.author = author.to_string();
                self.name = name.to_string();
                self.preface = rest.trim().to_string();
            }
            _ => self.preface = preface,
        }
    }

    /// Writes the book as JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), BookError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reads a JSON book and normalizes its ids.
    pub fn read_json(path: &Path) -> Result<Self, BookError> {
        let content = std::fs::read_to_string(path)?;
        let mut book: Book = serde_json::from_str(&content)?;
        book.normalize_ids();
        Ok(book)
    }
}

/// Recognizes a `第N章 title` heading line.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let (marker, title) = line.split_once(' ')?;
    let digits = marker.strip_prefix('第')?.strip_suffix('章')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, title))
}

fn finish_chapter(mut chap: Chapter) -> Chapter {
    chap.content = chap.content.trim().to_string();
    chap
}

/// Differences found by [`compare`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDiff {
    /// Chapter counts when they differ.
    pub count_mismatch: Option<(usize, usize)>,

    /// 1-based chapter numbers whose title stems differ.
    pub title_mismatches: Vec<usize>,

    /// 1-based chapter numbers whose content differs, with the first
    /// differing line of each side.
    pub content_mismatches: Vec<(usize, String, String)>,
}

impl BookDiff {
    pub fn is_empty(&self) -> bool {
        self.count_mismatch.is_none()
            && self.title_mismatches.is_empty()
            && self.content_mismatches.is_empty()
    }

    /// Differing chapters as compact ranges, e.g. `["1-3", "7"]`.
    pub fn content_ranges(&self) -> Vec<String> {
        let numbers: BTreeSet<usize> = self.content_mismatches.iter().map(|(n, _, _)| *n).collect();
        compact_ranges(numbers.into_iter())
    }
}

/// Compares two books chapter by chapter.
///
/// Titles are compared by their stem (text before the first space or `（`);
/// contents by their non-blank trimmed lines.
pub fn compare(left: &Book, right: &Book) -> BookDiff {
    let mut diff = BookDiff::default();
    if left.chapters.len() != right.chapters.len() {
        diff.count_mismatch = Some((left.chapters.len(), right.chapters.len()));
    }

    for (idx, (a, b)) in left.chapters.iter().zip(&right.chapters).enumerate() {
        let number = idx + 1;
        if title_stem(a.display_title()) != title_stem(b.display_title()) {
            diff.title_mismatches.push(number);
        }

        let lines_a = content_lines(&a.content);
        let lines_b = content_lines(&b.content);
        if let Some((la, lb)) = lines_a.iter().zip(&lines_b).find(|(la, lb)| la != lb) {
            diff.content_mismatches
                .push((number, la.to_string(), lb.to_string()));
        }
    }

    diff
}

fn title_stem(title: &str) -> &str {
    let head = title.split('（').next().unwrap_or_default();
    head.split(' ').next().unwrap_or_default()
}

fn content_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

fn compact_ranges(numbers: impl Iterator<Item = usize>) -> Vec<String> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for n in numbers {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == n => *end = n,
            _ => ranges.push((n, n)),
        }
    }
    ranges
        .into_iter()
        .map(|(s, e)| if s == e { s.to_string() } else { format!("{s}-{e}") })
        .collect()
}
