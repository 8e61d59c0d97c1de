//! Sitemap loading
//!
//! Fetches a sitemap and extracts the page URLs it lists. A sitemap index is
//! followed one level deep; nested indexes below that are ignored.
//!
//! Elements are matched by local name, so namespace prefixes such as
//! `<sm:loc>` are accepted.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SitemapError {
    #[error("failed to fetch sitemap {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("sitemap {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed sitemap {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid regex filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: regex::Error,
    },
}

/// Source of page URLs for a sitemap URL
#[async_trait]
pub trait SitemapLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Vec<String>, SitemapError>;
}

/// Parsed sitemap document
#[derive(Debug, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of further sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

/// Classifies a sitemap body by its root element and extracts its `<loc>`
/// entries
pub fn parse_document(body: &str) -> Result<SitemapDocument, quick_xml::Error> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut is_index = None;
    let mut in_loc = false;
    let mut text = String::new();
    let mut locations = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name = e.local_name();
                if is_index.is_none() {
                    is_index = Some(name.as_ref().eq_ignore_ascii_case(b"sitemapindex"));
                }
                if is_loc(name.as_ref()) {
                    in_loc = true;
                    text.clear();
                }
            }
            Event::Text(ref e) if in_loc => text.push_str(&e.unescape()?),
            Event::CData(ref e) if in_loc => text.push_str(&String::from_utf8_lossy(e)),
            Event::End(ref e) if in_loc && is_loc(e.local_name().as_ref()) => {
                in_loc = false;
                let loc = text.trim();
                if !loc.is_empty() {
                    locations.push(loc.to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(if is_index == Some(true) {
        SitemapDocument::Index(locations)
    } else {
        SitemapDocument::UrlSet(locations)
    })
}

fn is_loc(local_name: &[u8]) -> bool {
    local_name.eq_ignore_ascii_case(b"loc")
}

/// Applies an optional regex filter and drops duplicates, keeping order
pub fn filter_urls(urls: Vec<String>, filter: Option<&str>) -> Result<Vec<String>, SitemapError> {
    let pattern = filter
        .map(|f| {
            Regex::new(f).map_err(|source| SitemapError::InvalidFilter {
                filter: f.to_string(),
                source,
            })
        })
        .transpose()?;

    let mut seen = HashSet::new();
    Ok(urls
        .into_iter()
        .filter(|url| pattern.as_ref().is_none_or(|p| p.is_match(url)))
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

/// Loads sitemaps over HTTP
pub struct HttpSitemapLoader {
    client: reqwest::Client,
}

impl HttpSitemapLoader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("harvest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_document(&self, url: &str) -> Result<SitemapDocument, SitemapError> {
        let body = self.fetch(url).await?;
        parse_document(&body).map_err(|source| SitemapError::Parse {
            url: url.to_string(),
            source,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, SitemapError> {
        let fetch_error = |source| SitemapError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SitemapError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(fetch_error)
    }
}

#[async_trait]
impl SitemapLoader for HttpSitemapLoader {
    async fn load(&self, url: &str) -> Result<Vec<String>, SitemapError> {
        match self.fetch_document(url).await? {
            SitemapDocument::UrlSet(urls) => Ok(urls),
            SitemapDocument::Index(children) => {
                tracing::debug!("Sitemap index {} lists {} sitemaps", url, children.len());
                let mut urls = Vec::new();
                for child in children {
                    match self.fetch_document(&child).await? {
                        SitemapDocument::UrlSet(found) => urls.extend(found),
                        SitemapDocument::Index(_) => {
                            tracing::warn!("Ignoring nested sitemap index {}", child)
                        }
                    }
                }
                Ok(urls)
            }
        }
    }
}
