use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bookfetch::book::Book;
use bookfetch::config::SessionConfig;
use bookfetch::request::{BookInfoRequest, CatalogueRequest, ChapterRequest};
use bookfetch::requester::{BookRequester, RunOptions, Start, Strategy};
use bookfetch::session::SessionFactory;
use bookfetch::sources::{HtmlProfile, HtmlSource, JsonProfile, JsonSource};

type Hits = Arc<Mutex<HashMap<String, usize>>>;

struct TestServer {
    base_url: String,
    hits: Hits,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Serves `route(path, hit_count)`; `None` answers 404.
fn spawn_server<F>(route: F) -> TestServer
where
    F: Fn(&str, usize) -> Option<(u16, String)> + Send + 'static,
{
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());
    let hits: Hits = Arc::default();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let counter = Arc::clone(&hits);
    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(20)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let path = request.url().to_string();
            let hit = {
                let mut hits = counter.lock().unwrap();
                let count = hits.entry(path.clone()).or_default();
                *count += 1;
                *count
            };

            let (status, body) = route(&path, hit).unwrap_or((404, "not found".to_string()));
            let header = tiny_http::Header::from_bytes(
                &b"Content-Type"[..],
                &b"text/html; charset=utf-8"[..],
            )
            .unwrap();
            let _ = request.respond(
                tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header),
            );
        }
    });

    TestServer {
        base_url,
        hits,
        shutdown: shutdown_tx,
        handle: Some(handle),
    }
}

fn chapter_page(
    title: &str,
    body: &str,
    next_page: Option<&str>,
    next_chapter: Option<&str>,
) -> String {
    let next_page = next_page
        .map(|href| format!(r#"<a id="pager" href="{href}">下一页</a>"#))
        .unwrap_or_default();
    let next_chapter = next_chapter
        .map(|href| format!(r#"<a id="next" href="{href}">下一章</a>"#))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html><body>
  <h1>{title}</h1>
  <div id="content">{body}</div>
  {next_page}{next_chapter}
</body></html>"#
    )
}

fn html_route(path: &str, hit: usize) -> Option<(u16, String)> {
    let page = match path {
        "/book/" => r#"<!doctype html>
<html><body>
  <h2 id="name">Night Road</h2>
  <p id="author">Someone</p>
  <div id="list">
    <a href="1.html">Chapter One</a>
    <a href="2.html">Chapter Two</a>
    <a href="3.html">Chapter Three</a>
  </div>
</body></html>"#
            .to_string(),
        "/book/1.html" => chapter_page(
            "Chapter One",
            "Alpha<br>Beta",
            Some("1_2.html"),
            Some("2.html"),
        ),
        "/book/1_2.html" => chapter_page("Chapter One", "Gamma", None, Some("2.html")),
        "/book/2.html" if hit == 1 => return Some((500, "busy".to_string())),
        "/book/2.html" => chapter_page("Chapter Two", "Delta", None, Some("3.html")),
        "/book/3.html" => return Some((503, "down".to_string())),
        _ => return None,
    };
    Some((200, page))
}

fn html_source() -> HtmlSource {
    let profile = HtmlProfile {
        next_page: Some("#pager".to_string()),
        next_page_text: Some("下一页".to_string()),
        next_chapter: Some("#next".to_string()),
        book_name: Some("#name".to_string()),
        book_author: Some("#author".to_string()),
        ..HtmlProfile::default()
    };
    HtmlSource::new("local", &profile).unwrap()
}

fn sessions() -> SessionFactory {
    let config = SessionConfig {
        timeout_sec: 5.0,
        ..SessionConfig::default()
    };
    SessionFactory::new(&config).unwrap()
}

fn options(strategy: Strategy) -> RunOptions {
    RunOptions {
        strategy,
        stall_limit: 2,
        add_enter: true,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn concurrent_fetch_over_http() {
    let server = spawn_server(html_route);
    let source = html_source();
    let requester = BookRequester::new(&source, sessions(), options(Strategy::Concurrent));
    let catalogue = CatalogueRequest::Url {
        url: format!("{}/book/", server.base_url),
    };

    let info = requester
        .book_info(&BookInfoRequest::from(&catalogue))
        .await
        .unwrap();
    assert_eq!(info.name, "Night Road");
    assert_eq!(info.author, "Someone");

    let book = requester
        .run(Book::from(info), Start::Catalogue(catalogue))
        .await
        .unwrap();

    assert_eq!(book.chapters.len(), 3);
    assert_eq!(book.chapters[0].title.as_deref(), Some("Chapter One"));
    assert_eq!(book.chapters[0].content, "Alpha\nBeta\nGamma");
    assert_eq!(book.chapters[1].content, "Delta");
    assert!(book.chapters[2].is_placeholder());
    assert_eq!(book.missing_chapters(), vec![2]);

    assert_eq!(server.hits("/book/1.html"), 1);
    assert_eq!(server.hits("/book/2.html"), 2);
    // rounds: 2 failures, 1, 1 (stall 1), 1 (stall 2)
    assert_eq!(server.hits("/book/3.html"), 4);

    let text = book.render_txt(0).unwrap();
    assert!(text.starts_with("【Someone】Night Road\n\n"));
    assert!(text.contains("第1章 Chapter One\n\nAlpha\nBeta\nGamma\n\n\n"));
    assert!(text.contains("第2章 Chapter Two\n\nDelta\n\n\n"));
}

#[tokio::test]
async fn iterative_fetch_follows_links() {
    let server = spawn_server(|path, _| match path {
        "/book/1.html" => Some((
            200,
            chapter_page("Chapter One", "Alpha", Some("1_2.html"), Some("2.html")),
        )),
        "/book/1_2.html" => Some((200, chapter_page("Chapter One", "Beta", None, Some("2.html")))),
        "/book/2.html" => Some((200, chapter_page("Chapter Two", "Gamma", None, None))),
        _ => None,
    });
    let source = html_source();
    let requester = BookRequester::new(&source, sessions(), options(Strategy::Iterative));

    let start = ChapterRequest::url(format!("{}/book/1.html", server.base_url));
    let chapters = requester
        .fetch_chapters(Start::Chapter(start))
        .await
        .unwrap();

    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].content, "Alpha\nBeta");
    assert_eq!(chapters[1].title.as_deref(), Some("Chapter Two"));
    assert_eq!(server.hits("/book/2.html"), 1);
}

#[tokio::test]
async fn sequential_fetch_over_json() {
    let server = spawn_server(|path, hit| {
        let body = match path {
            "/api/book/7/chapters" => r#"{"data": [{"id": 1, "title": "One"}, {"id": 2, "title": "Two"}]}"#,
            "/api/book/7/chapter/1" => r#"{"data": {"title": "One", "content": "first"}}"#,
            "/api/book/7/chapter/2" if hit < 3 => return Some((500, "{}".to_string())),
            "/api/book/7/chapter/2" => r#"{"data": {"title": "Two", "content": "second"}}"#,
            _ => return None,
        };
        Some((200, body.to_string()))
    });
    let profile = JsonProfile {
        catalogue_url: format!("{}/api/book/{{book_id}}/chapters", server.base_url),
        chapter_url: format!("{}/api/book/{{book_id}}/chapter/{{chapter_id}}", server.base_url),
        ..JsonProfile::default()
    };
    let source = JsonSource::new("app", profile);
    let requester = BookRequester::new(&source, sessions(), options(Strategy::SequentialCatalogue));

    let chapters = requester
        .fetch_chapters(Start::Catalogue(CatalogueRequest::Api {
            book_id: "7".to_string(),
        }))
        .await
        .unwrap();

    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].content, "first");
    assert_eq!(chapters[1].content, "second");
    assert_eq!(server.hits("/api/book/7/chapter/2"), 3);
}

#[tokio::test]
async fn missing_catalogue_fails_the_run() {
    let server = spawn_server(|_, _| None);
    let source = html_source();
    let requester = BookRequester::new(&source, sessions(), options(Strategy::Concurrent));

    let result = requester
        .fetch_chapters(Start::Catalogue(CatalogueRequest::Url {
            url: format!("{}/book/", server.base_url),
        }))
        .await;

    assert!(matches!(
        result,
        Err(bookfetch::RequesterError::Catalogue(_))
    ));
}
