//! Cookie handling for fetch sessions.
//!
//! Cookies come either from a Netscape cookie file (as exported by browser
//! extensions) or from a raw `name=value; name2=value2` string.

use reqwest::Url;
use reqwest::cookie::Jar;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// One line of a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CookieLine {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    expires_unix: Option<u64>,
    name: String,
    value: String,
    http_only: bool,
}

impl CookieLine {
    fn is_expired(&self, now_unix: u64) -> bool {
        self.expires_unix.is_some_and(|ts| ts <= now_unix)
    }

    fn to_set_cookie(&self) -> String {
        let mut out = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            out.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

#[derive(Error, Debug)]
pub enum CookieError {
    #[error("Cannot read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// A line without the seven tab-separated fields
    #[error("Malformed cookie line: {0}")]
    InvalidLine(String),

    #[error("Cookie domain {0:?} is not a host name")]
    InvalidDomain(String),
}

/// Loads a Netscape cookie file into a fresh cookie jar.
///
/// Expired cookies are skipped. Returns the jar and the number of cookies
/// loaded.
pub fn load_cookie_file(path: &Path) -> Result<(Arc<Jar>, usize), CookieError> {
    let content = std::fs::read_to_string(path)?;
    let lines = parse_netscape(&content)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let jar = Arc::new(Jar::default());
    let mut loaded = 0;
    for line in lines.iter().filter(|line| !line.is_expired(now)) {
        let host = line.domain.trim_start_matches('.');
        if host.is_empty() {
            return Err(CookieError::InvalidDomain(line.domain.clone()));
        }
        let url = Url::parse(&format!("https://{host}/"))
            .map_err(|_| CookieError::InvalidDomain(line.domain.clone()))?;
        jar.add_cookie_str(&line.to_set_cookie(), &url);
        loaded += 1;
    }

    Ok((jar, loaded))
}

fn parse_netscape(content: &str) -> Result<Vec<CookieLine>, CookieError> {
    let mut cookies = Vec::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let (http_only, line) = match line.strip_prefix("#HttpOnly_") {
            Some(stripped) => (true, stripped),
            None if line.starts_with('#') => continue,
            None => (false, line),
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(CookieError::InvalidLine(line.to_string()));
        };

        cookies.push(CookieLine {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            expires_unix: expires.parse::<u64>().ok().filter(|ts| *ts != 0),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        });
    }

    Ok(cookies)
}

/// Normalizes a raw cookie string into a `Cookie` header value.
///
/// Accepts `;`-separated `name=value` pairs with arbitrary spacing and drops
/// fragments without a name.
pub fn normalize_cookie_header(raw: &str) -> String {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(format!("{}={}", name, value.trim()))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
