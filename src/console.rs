//! Styled terminal output for the command line.
//!
//! Colors are used only when stdout is a terminal and `NO_COLOR` is unset.
//! Diagnostics go through `tracing`; this is for results meant for the user.

use crate::book::{Book, BookDiff};
use std::io::{self, IsTerminal};

/// ANSI SGR codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Style {
    Bold = 1,
    Dim = 2,
    Red = 31,
    Green = 32,
    Yellow = 33,
    Blue = 34,
    Magenta = 35,
    Cyan = 36,
    Gray = 90,
}

const RESET: &str = "\x1b[0m";

/// Labelled, optionally colored output.
#[derive(Debug)]
pub struct Console {
    colors: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self::with_colors(std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal())
    }

    pub fn with_colors(colors: bool) -> Self {
        Self { colors }
    }

    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors || styles.is_empty() {
            return text.to_string();
        }
        let codes: Vec<String> = styles.iter().map(|s| (*s as u8).to_string()).collect();
        format!("\x1b[{}m{text}{RESET}", codes.join(";"))
    }

    /// A bracketed label such as `[OK]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        format!("[{}]", self.style(label, &[color, Style::Bold]))
    }

    fn line(&self, label: &str, color: Style, message: &str) -> String {
        format!("{} {message}", self.label(label, color))
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.line("INFO", Style::Blue, message));
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.line("OK", Style::Green, message));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.line("WARN", Style::Yellow, message));
    }

    pub fn step(&self, message: &str) {
        println!("{}", self.line("STEP", Style::Cyan, message));
    }

    /// Blank line, then a bold heading.
    pub fn section(&self, title: &str) {
        println!("\n{}", self.style(title, &[Style::Magenta, Style::Bold]));
    }

    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    /// One-line summary of a fetched book.
    pub fn book_summary(&self, book: &Book) -> String {
        let fetched = book.chapters.len() - book.missing_chapters().len();
        let chars: usize = book.chapters.iter().map(|c| c.content.chars().count()).sum();
        format!(
            "【{}】{}: {}/{} chapters, {} characters",
            book.author,
            book.name,
            self.count(fetched),
            book.chapters.len(),
            self.count(chars)
        )
    }

    /// Prints the result of comparing two books.
    pub fn print_diff(&self, diff: &BookDiff) {
        if diff.is_empty() {
            self.success("Books match");
            return;
        }

        if let Some((left, right)) = diff.count_mismatch {
            self.warning(&format!("Chapter count differs: {left} vs {right}"));
        }
        for number in &diff.title_mismatches {
            self.warning(&format!("Title differs in chapter {number}"));
        }
        for (number, left, right) in &diff.content_mismatches {
            self.warning(&format!("Content differs in chapter {number}"));
            println!("    {} {left}", self.muted("<"));
            println!("    {} {right}", self.muted(">"));
        }
        if !diff.content_mismatches.is_empty() {
            self.info(&format!(
                "Differing chapters: {}",
                diff.content_ranges().join(", ")
            ));
        }
    }
}
