//! Web research tools: search and read webpages.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::{json, Value};
use thiserror::Error;
use url::{Host, Origin, Url};

use super::{ParamSpec, ParamType, ToolArgs, ToolHandler, ToolRegistry, ToolSpec};

pub const RESEARCH_CATEGORY: &str = "research";

/// DuckDuckGo's HTML endpoint; takes the query as a form POST.
pub const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ResearchAgents/1.0)";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PAGE_CHARS: usize = 8000;
const MAX_REDIRECTS: usize = 5;

const RESTRICTED_URL: &str = "Error: Invalid or restricted URL.";

const SKIP_TAGS: &[&str] = &["script", "style", "noscript"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "header", "footer", "pre", "blockquote",
];

/// Install `search_web` and `read_webpage` under the `research` category.
pub fn register_research_tools(registry: &mut ToolRegistry) {
    registry.register(SearchWeb::spec(), SearchWeb::default());
    registry.register(ReadWebpage::spec(), ReadWebpage::default());
}

/// Search the web via DuckDuckGo's HTML endpoint.
#[derive(Debug, Clone)]
pub struct SearchWeb {
    endpoint: String,
}

impl Default for SearchWeb {
    fn default() -> Self {
        Self {
            endpoint: DDG_HTML_URL.to_string(),
        }
    }
}

impl SearchWeb {
    /// Post queries to `endpoint` instead of DuckDuckGo.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "search_web",
            "Search the internet for up-to-date information. MUST be used when answer is not known.",
        )
        .category(RESEARCH_CATEGORY)
        .param(ParamSpec::required("query", ParamType::String).describe("The search query"))
        .param(
            ParamSpec::optional("max_results", ParamType::Integer, 5)
                .describe("Maximum number of results to return"),
        )
    }

    async fn fetch_results_page(&self, query: &str) -> reqwest::Result<String> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?
            .post(&self.endpoint)
            .form(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl ToolHandler for SearchWeb {
    async fn call(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let query = args.str("query")?;
        let max_results = args.i64("max_results")?.max(0) as usize;

        let html = match self.fetch_results_page(query).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Search failed: {}", e);
                return Ok(json!(format!("Search failed: {}", e)));
            }
        };

        let mut blocks = Vec::new();
        for hit in extract_ddg_results(&html, max_results)? {
            if validate_url(&hit.link).await {
                blocks.push(format!("{}\n{}\n{}", hit.title, hit.link, hit.snippet));
            } else {
                tracing::debug!("Dropping restricted search result: {}", hit.link);
            }
        }

        if blocks.is_empty() {
            Ok(json!("No relevant web results found."))
        } else {
            Ok(json!(blocks.join("\n\n---\n\n")))
        }
    }
}

/// Fetch a webpage and return its readable text.
///
/// Redirects are followed by hand so every hop passes [`validate_url`].
#[derive(Debug, Clone, Default)]
pub struct ReadWebpage {
    trusted_origins: Vec<Origin>,
}

impl ReadWebpage {
    /// Skip address checks for URLs on `origin`, e.g. an intranet docs host.
    pub fn trust_origin(mut self, origin: &str) -> anyhow::Result<Self> {
        self.trusted_origins.push(Url::parse(origin)?.origin());
        Ok(self)
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "read_webpage",
            "Read full content from a webpage URL. Use after search_web.",
        )
        .category(RESEARCH_CATEGORY)
        .param(ParamSpec::required("url", ParamType::String).describe("The URL to read"))
    }

    async fn is_allowed(&self, url: &Url) -> bool {
        self.trusted_origins.contains(&url.origin()) || validate_url(url.as_str()).await
    }

    async fn fetch(&self, raw: &str) -> Result<String, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let mut current = Url::parse(raw).map_err(|_| FetchError::Restricted)?;
        for _ in 0..=MAX_REDIRECTS {
            if !self.is_allowed(&current).await {
                return Err(FetchError::Restricted);
            }

            let response = client.get(current.clone()).send().await?;
            if !response.status().is_redirection() {
                return Ok(response.error_for_status()?.text().await?);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(FetchError::MissingLocation)?;
            let next = current.join(location).map_err(|_| FetchError::Restricted)?;
            tracing::debug!("Following redirect {} -> {}", current, next);
            current = next;
        }

        Err(FetchError::TooManyRedirects)
    }
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("restricted URL")]
    Restricted,

    #[error("redirect without a Location header")]
    MissingLocation,

    #[error("more than {} redirects", MAX_REDIRECTS)]
    TooManyRedirects,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[async_trait]
impl ToolHandler for ReadWebpage {
    async fn call(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let url = args.str("url")?;

        match self.fetch(url).await {
            Ok(html) => Ok(json!(truncate_chars(&page_text(&html), MAX_PAGE_CHARS))),
            Err(FetchError::Restricted) => {
                tracing::debug!("Refusing restricted URL (or redirect from) {}", url);
                Ok(json!(RESTRICTED_URL))
            }
            Err(e) => {
                tracing::error!("Error reading {}: {}", url, e);
                Ok(json!(format!("Error reading {}: {}", url, e)))
            }
        }
    }
}

/// Accept only http(s) URLs whose host resolves exclusively to public addresses.
pub async fn validate_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    match parsed.host() {
        Some(Host::Ipv4(ip)) => is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_public_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            let port = parsed.port_or_known_default().unwrap_or(80);
            match tokio::net::lookup_host((domain, port)).await {
                Ok(addrs) => {
                    let addrs: Vec<_> = addrs.collect();
                    !addrs.is_empty() && addrs.iter().all(|a| is_public_ip(a.ip()))
                }
                Err(e) => {
                    tracing::debug!("Could not resolve {}: {}", domain, e);
                    false
                }
            }
        }
        None => false,
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            let unique_local = first & 0xfe00 == 0xfc00;
            let link_local = first & 0xffc0 == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SearchHit {
    title: String,
    link: String,
    snippet: String,
}

/// Pull title/link/snippet from the first `limit` DuckDuckGo result blocks.
fn extract_ddg_results(html: &str, limit: usize) -> anyhow::Result<Vec<SearchHit>> {
    let result_sel = selector("div.result")?;
    let title_sel = selector("a.result__a")?;
    let snippet_sel = selector("a.result__snippet")?;

    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for result in document.select(&result_sel).take(limit) {
        let Some(title_el) = result.select(&title_sel).next() else {
            continue;
        };
        let href = title_el.value().attr("href").unwrap_or_default();
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        hits.push(SearchHit {
            title: collapse_whitespace(&title_el.text().collect::<String>()),
            link: resolve_ddg_link(href),
            snippet,
        });
    }

    Ok(hits)
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector '{}': {}", css, e))
}

/// DuckDuckGo wraps result links in a redirect (`//duckduckgo.com/l/?uddg=<target>`).
fn resolve_ddg_link(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    Url::parse(&absolute)
        .ok()
        .filter(|u| u.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")))
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

/// Readable text of an HTML page: script/style/noscript dropped, one trimmed
/// non-empty line per text line.
fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef, out: &mut String) {
    let tag = element.value().name();
    if SKIP_TAGS.contains(&tag) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }

    if BLOCK_TAGS.contains(&tag) {
        out.push('\n');
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
