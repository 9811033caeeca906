//! Bookfetch CLI - web novel downloader.

use anyhow::{Context, Result};
use bookfetch::book::{self, Book};
use bookfetch::config::Config;
use bookfetch::console::Console;
use bookfetch::request::{BookInfoRequest, CatalogueRequest, ChapterRequest};
use bookfetch::requester::{BookRequester, RunOptions, Start, Strategy, parse_chapter_selection};
use bookfetch::session::SessionFactory;
use bookfetch::sources::{Site, resolve_source};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Web novel downloader.
#[derive(Parser, Debug)]
#[command(name = "bookfetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a book and write it as a text file.
    Fetch(FetchArgs),

    /// Compare two books (.txt or .json) chapter by chapter.
    Compare { left: PathBuf, right: PathBuf },

    /// List built-in sites and configured profiles.
    Sites,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Built-in site or profile name from the config file.
    site: String,

    /// Catalogue URL or book id. With `--strategy iterative`, the first
    /// chapter: a URL or `BOOK_ID:CHAPTER_ID`.
    target: String,

    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Rounds without progress before giving up.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    stall_limit: Option<u32>,

    /// Attempts per chapter for the sequential strategy.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    attempts: Option<u32>,

    /// Insert a newline between the pages of a chapter.
    #[arg(long)]
    add_enter: bool,

    /// Chapters to fetch, 1-based, e.g. `1-10,15`.
    #[arg(long, value_parser = parse_chapter_selection)]
    chapters: Option<BTreeSet<usize>>,

    /// Book name; fetched from the site if omitted.
    #[arg(long)]
    name: Option<String>,

    /// Book author; fetched from the site if omitted.
    #[arg(long)]
    author: Option<String>,

    #[arg(long)]
    preface: Option<String>,

    /// Output text file; defaults to the configured directory and name.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also save the book as JSON.
    #[arg(long)]
    json: Option<PathBuf>,

    #[arg(long)]
    user_agent: Option<String>,

    /// Raw cookie header, e.g. `"a=1; b=2"`.
    #[arg(long)]
    cookie: Option<String>,

    /// Netscape cookie file.
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Seconds to wait before each request.
    #[arg(long)]
    delay: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    bookfetch::logging::init(cli.verbose).context("init logging")?;
    let console = Console::new();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Fetch(args) => fetch(config, args, &console).await,
        Command::Compare { left, right } => compare(&left, &right, &console),
        Command::Sites => {
            sites(&config, &console);
            Ok(())
        }
    }
}

async fn fetch(mut config: Config, args: FetchArgs, console: &Console) -> Result<()> {
    console.section("Bookfetch - Web Novel Downloader");

    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let source = resolve_source(&args.site, &config.profiles)
        .with_context(|| format!("Cannot use site {}", args.site))?;
    let sessions =
        SessionFactory::new(&config.session).context("Invalid session configuration")?;
    let options = RunOptions {
        chapters: args.chapters.clone(),
        ..RunOptions::from(&config.requester)
    };
    let strategy = options.strategy;
    let requester = BookRequester::new(source.as_ref(), sessions, options);
    console.success(&format!("Using {} with {} strategy", source.name(), strategy));

    let (start, info_request) = match strategy {
        Strategy::Iterative => {
            let first = chapter_request(&args.target)?;
            let info = match &first {
                ChapterRequest::Url { url, .. } => BookInfoRequest::Url { url: url.clone() },
                ChapterRequest::Api { book_id, .. } => BookInfoRequest::Api {
                    book_id: book_id.clone(),
                },
            };
            (Start::Chapter(first), info)
        }
        _ => {
            let catalogue = catalogue_request(&args.target);
            let info = BookInfoRequest::from(&catalogue);
            (Start::Catalogue(catalogue), info)
        }
    };

    let mut book = if args.name.is_some() && args.author.is_some() {
        Book::default()
    } else {
        console.step("Fetching book information...");
        match requester.book_info(&info_request).await {
            Ok(info) => Book::from(info),
            Err(e) => {
                console.warning(&format!("No book information: {e}"));
                Book::default()
            }
        }
    };
    if let Some(name) = args.name {
        book.name = name;
    }
    if let Some(author) = args.author {
        book.author = author;
    }
    if let Some(preface) = args.preface {
        book.preface = preface;
    }
    if book.name.is_empty() {
        book.name = "untitled".to_string();
    }

    console.step("Fetching chapters...");
    let mut book = requester.run(book, start).await.context("Fetch failed")?;
    book.normalize_ids();
    console.success(&console.book_summary(&book));

    let missing = book.missing_chapters();
    if !missing.is_empty() {
        let numbers: Vec<String> = missing
            .iter()
            .map(|id| (id + book.start_chapter).to_string())
            .collect();
        console.warning(&format!("Missing chapters: {}", numbers.join(", ")));
    }

    let path = args
        .output
        .unwrap_or_else(|| config.output.book_path(&book.name, &book.author));
    book.write_txt(&path, config.output.min_chapter_chars)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    console.success(&format!("Wrote {}", path.display()));

    if let Some(json) = args.json {
        book.write_json(&json)
            .with_context(|| format!("Failed to write {}", json.display()))?;
        console.success(&format!("Wrote {}", json.display()));
    }

    Ok(())
}

/// Lets command line flags override the loaded configuration.
fn apply_overrides(config: &mut Config, args: &FetchArgs) {
    if let Some(strategy) = args.strategy {
        config.requester.strategy = strategy;
    }
    if let Some(limit) = args.stall_limit {
        config.requester.stall_limit = limit;
    }
    if let Some(attempts) = args.attempts {
        config.requester.attempts_per_chapter = attempts;
    }
    if args.add_enter {
        config.requester.add_enter = true;
    }
    if let Some(agent) = &args.user_agent {
        config.session.user_agent = agent.clone();
    }
    if let Some(cookie) = &args.cookie {
        config.session.cookie = Some(cookie.clone());
    }
    if let Some(file) = &args.cookie_file {
        config.session.cookie_file = Some(file.clone());
    }
    if let Some(delay) = args.delay {
        config.session.delay_between_requests_sec = delay;
    }
}

fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn catalogue_request(target: &str) -> CatalogueRequest {
    if is_url(target) {
        CatalogueRequest::Url {
            url: target.to_string(),
        }
    } else {
        CatalogueRequest::Api {
            book_id: target.to_string(),
        }
    }
}

fn chapter_request(target: &str) -> Result<ChapterRequest> {
    if is_url(target) {
        return Ok(ChapterRequest::url(target));
    }
    let (book_id, chapter_id) = target
        .split_once(':')
        .with_context(|| format!("Expected a URL or BOOK_ID:CHAPTER_ID, got {target:?}"))?;
    Ok(ChapterRequest::api(book_id, chapter_id))
}

fn read_book(path: &Path) -> Result<Book> {
    let book = if path.extension().is_some_and(|ext| ext == "json") {
        Book::read_json(path)
    } else {
        Book::read_txt(path)
    };
    book.with_context(|| format!("Failed to read {}", path.display()))
}

fn compare(left: &Path, right: &Path, console: &Console) -> Result<()> {
    let left_book = read_book(left)?;
    let right_book = read_book(right)?;
    console.info(&console.book_summary(&left_book));
    console.info(&console.book_summary(&right_book));

    let diff = book::compare(&left_book, &right_book);
    console.print_diff(&diff);
    if !diff.is_empty() {
        anyhow::bail!("{} and {} differ", left.display(), right.display());
    }
    Ok(())
}

fn sites(config: &Config, console: &Console) {
    console.section("Built-in sites");
    for site in Site::ALL {
        println!("  {site}");
    }

    console.section("Configured profiles");
    if config.profiles.is_empty() {
        println!("  {}", console.muted("(none)"));
    }
    for (name, profile) in &config.profiles {
        let status = match profile.validate() {
            Ok(()) => console.muted("ok"),
            Err(e) => console.style(&e.to_string(), &[bookfetch::console::Style::Red]),
        };
        println!("  {name} {status}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_fetch() {
        let cli = Cli::try_parse_from([
            "bookfetch",
            "fetch",
            "zwwx",
            "https://a.test/book/",
            "--strategy",
            "sequential_catalogue",
            "--chapters",
            "1-3",
        ])
        .unwrap();
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.strategy, Some(Strategy::SequentialCatalogue));
        assert_eq!(args.chapters, Some(BTreeSet::from([0, 1, 2])));
    }

    #[test]
    fn test_cli_rejects_zero_stall_limit() {
        let parsed = Cli::try_parse_from([
            "bookfetch",
            "fetch",
            "zwwx",
            "x",
            "--stall-limit",
            "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_requests_from_target() {
        assert!(matches!(catalogue_request("https://a.test/"), CatalogueRequest::Url { .. }));
        assert!(matches!(catalogue_request("123"), CatalogueRequest::Api { .. }));
        assert_eq!(chapter_request("7:9").unwrap(), ChapterRequest::api("7", "9"));
        assert!(chapter_request("79").is_err());
    }
}
