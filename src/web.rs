//! # Web search
//!
//! A search provider returns ranked hits; the top hits are fetched
//! concurrently and scraped for body text, code blocks and images. When a
//! model is available it can expand the query, rerank the scraped pages and
//! summarise them with citations. Every external step degrades instead of
//! failing the search: a page that cannot be loaded within the page timeout
//! is reported as `[Failed to extract content]`, a failed model step falls
//! back to the unmodified data.
//!
//! Rendered results are cached per query and user feedback is counted per
//! normalised query.

use crate::config::WebSearchConfig;
use crate::llm::{ChatMessage, LanguageModel};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const FAILED_TO_EXTRACT: &str = "[Failed to extract content]";
pub const FROM_CACHE: &str = "[From cache]";

const MAX_CONTENT_CHARS: usize = 3000;
const MAX_CODE_BLOCKS: usize = 5;
const MIN_CODE_BLOCK_CHARS: usize = 10;
const MAX_CODE_BLOCK_CHARS: usize = 500;
const MAX_IMAGES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the HTML of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Google Custom Search JSON API.
pub struct GoogleSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

impl GoogleSearchProvider {
    pub fn new(api_key: String, engine_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            api_key,
            engine_id,
        })
    }

    /// Reads the credentials from the environment variables named in the
    /// config.
    pub fn from_config(config: &WebSearchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env_var)
            .with_context(|| format!("environment variable {} not set", config.api_key_env_var))?;
        let engine_id = std::env::var(&config.engine_id_env_var).with_context(|| {
            format!("environment variable {} not set", config.engine_id_env_var)
        })?;
        Self::new(api_key, engine_id)
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
            ])
            .send()
            .await
            .context("Search request failed")?
            .error_for_status()?;
        let body: GoogleResponse = response.json().await.context("Invalid search response")?;
        Ok(body.items)
    }
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("flexpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub content: String,
    pub code_blocks: Vec<String>,
    pub images: Vec<String>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector `{css}`: {e}"))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Extracts readable content from an HTML page. Relative image sources are
/// resolved against `page_url`.
pub fn extract_page(html: &str, page_url: &str) -> Result<PageContent> {
    let document = Html::parse_document(html);

    let mut text_parts = Vec::new();
    if let Some(body) = document.select(&selector("body")?).next() {
        for node in body.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let in_script = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|parent| matches!(parent.value().name(), "script" | "style"));
            if !in_script {
                text_parts.push(&**text);
            }
        }
    }
    let collapsed = text_parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let content = truncate_chars(&collapsed, MAX_CONTENT_CHARS);

    let code_blocks = document
        .select(&selector("pre, code")?)
        .map(|el| el.text().collect::<String>())
        .filter(|code| code.chars().count() > MIN_CODE_BLOCK_CHARS)
        .take(MAX_CODE_BLOCKS)
        .map(|code| truncate_chars(&code, MAX_CODE_BLOCK_CHARS))
        .collect();

    let base = Url::parse(page_url).ok();
    let images = document
        .select(&selector("img")?)
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
        .take(MAX_IMAGES)
        .map(|src| {
            if src.starts_with("http://") || src.starts_with("https://") {
                return src.to_string();
            }
            base.as_ref()
                .and_then(|base| base.join(src).ok())
                .map(String::from)
                .unwrap_or_else(|| src.to_string())
        })
        .collect();

    Ok(PageContent {
        content,
        code_blocks,
        images,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub page: PageContent,
}

/// One entry of a structured search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebResult {
    pub query: String,
    pub url: String,
    pub title: String,
    pub extracted_content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub up: u32,
    pub down: u32,
}

#[derive(Debug, Clone)]
pub struct WebSearchOptions {
    pub max_results: usize,
    pub page_timeout: Duration,
    pub cache_ttl: Duration,
    pub expand_query: bool,
    pub rerank: bool,
    pub summarize: bool,
}

impl Default for WebSearchOptions {
    fn default() -> Self {
        WebSearchOptions::from(&WebSearchConfig::default())
    }
}

impl From<&WebSearchConfig> for WebSearchOptions {
    fn from(config: &WebSearchConfig) -> Self {
        Self {
            max_results: config.max_results,
            page_timeout: Duration::from_secs(config.page_timeout_seconds),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            expand_query: config.expand_query,
            rerank: config.rerank,
            summarize: config.summarize,
        }
    }
}

struct CachedResult {
    result: String,
    stored_at: Instant,
}

pub struct WebSearch {
    provider: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    model: Option<Arc<dyn LanguageModel>>,
    options: WebSearchOptions,
    cache: Mutex<HashMap<String, CachedResult>>,
    feedback: Mutex<HashMap<String, Feedback>>,
}

impl WebSearch {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        options: WebSearchOptions,
    ) -> Self {
        Self {
            provider,
            fetcher,
            model: None,
            options,
            cache: Mutex::new(HashMap::new()),
            feedback: Mutex::new(HashMap::new()),
        }
    }

    /// Enables the model-powered steps that are switched on in the options.
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn from_config(config: &WebSearchConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(GoogleSearchProvider::from_config(config)?),
            Arc::new(HttpPageFetcher::new()?),
            WebSearchOptions::from(config),
        ))
    }

    /// Searches and renders a markdown answer with citations. Never fails;
    /// errors are rendered inline.
    pub async fn search(&self, query: &str) -> String {
        if let Some(cached) = self.cached(query) {
            tracing::debug!(query, "web search served from cache");
            return format!("{cached}\n\n{FROM_CACHE}");
        }

        let expanded = self.expand_query(query).await;
        let hits = match self.provider.search(&expanded).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(query = %expanded, error = %e, "search provider failed");
                return format!("Failed to fetch search results: {e:#}");
            }
        };
        if hits.is_empty() {
            return "No search results found.".to_string();
        }

        let pages = self.scrape(hits).await;
        let pages = self.rerank(&expanded, pages).await;
        let summary = self.summarize(&expanded, &pages).await;
        let rendered = render_results(query, &expanded, &summary, &pages);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                query.to_string(),
                CachedResult {
                    result: rendered.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        rendered
    }

    /// Searches and returns one entry per scraped page. A failed provider
    /// call yields an empty list.
    pub async fn search_structured(&self, query: &str) -> Vec<WebResult> {
        let expanded = self.expand_query(query).await;
        let hits = match self.provider.search(&expanded).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(query = %expanded, error = %e, "search provider failed");
                return Vec::new();
            }
        };
        self.scrape(hits)
            .await
            .into_iter()
            .map(|page| WebResult {
                query: query.to_string(),
                url: page.url,
                title: page.title,
                extracted_content: page.page.content,
            })
            .collect()
    }

    pub fn record_feedback(&self, query: &str, up: bool, down: bool) {
        let key = query.trim().to_lowercase();
        if let Ok(mut feedback) = self.feedback.lock() {
            let entry = feedback.entry(key).or_default();
            if up {
                entry.up += 1;
            }
            if down {
                entry.down += 1;
            }
        }
    }

    pub fn feedback(&self, query: &str) -> Feedback {
        let key = query.trim().to_lowercase();
        self.feedback
            .lock()
            .ok()
            .and_then(|f| f.get(&key).copied())
            .unwrap_or_default()
    }

    fn cached(&self, query: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(query) {
            Some(entry) if entry.stored_at.elapsed() < self.options.cache_ttl => {
                Some(entry.result.clone())
            }
            Some(_) => {
                cache.remove(query);
                None
            }
            None => None,
        }
    }

    async fn ask_model(&self, system: &str, prompt: String) -> Option<String> {
        let model = self.model.as_ref()?;
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        match model.complete(messages, CancellationToken::new()).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::debug!(error = %e, "web search model step failed");
                None
            }
        }
    }

    async fn expand_query(&self, query: &str) -> String {
        if !self.options.expand_query {
            return query.to_string();
        }
        let prompt = format!(
            "Rewrite and expand this search query for maximum coverage (add synonyms, related terms, clarify intent, but keep it concise and relevant):\n\"{query}\""
        );
        self.ask_model(
            "You are an expert search assistant. Expand and clarify the user query for best web search coverage.",
            prompt,
        )
        .await
        .map(|answer| answer.trim().to_string())
        .filter(|answer| !answer.is_empty())
        .unwrap_or_else(|| query.to_string())
    }

    async fn scrape(&self, hits: Vec<SearchHit>) -> Vec<ScrapedPage> {
        let timeout = self.options.page_timeout;
        let fetches = hits
            .into_iter()
            .take(self.options.max_results)
            .map(|hit| async move {
                let page = match tokio::time::timeout(timeout, self.fetcher.fetch(&hit.link)).await
                {
                    Ok(Ok(html)) => extract_page(&html, &hit.link),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(anyhow!("timed out after {timeout:?}")),
                };
                let page = page.unwrap_or_else(|e| {
                    tracing::debug!(url = %hit.link, error = %e, "page extraction failed");
                    PageContent {
                        content: FAILED_TO_EXTRACT.to_string(),
                        ..PageContent::default()
                    }
                });
                ScrapedPage {
                    title: hit.title,
                    url: hit.link,
                    snippet: hit.snippet,
                    page,
                }
            });
        join_all(fetches).await
    }

    async fn rerank(&self, query: &str, pages: Vec<ScrapedPage>) -> Vec<ScrapedPage> {
        if !self.options.rerank || pages.len() < 2 {
            return pages;
        }
        let listing = pages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{i}] {} ({})\n{}\n", p.title, p.url, p.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given the expanded query: \"{query}\" and the following web search results, rerank them by relevance. Return a JSON array of indices in best order.\n\nResults:\n{listing}\n---\nJSON:"
        );
        let Some(answer) = self
            .ask_model(
                "You are a helpful assistant that reranks web search results for relevance.",
                prompt,
            )
            .await
        else {
            return pages;
        };
        match parse_ranking(&answer, pages.len()) {
            Some(order) => {
                let mut slots: Vec<Option<ScrapedPage>> = pages.into_iter().map(Some).collect();
                order.into_iter().filter_map(|i| slots[i].take()).collect()
            }
            None => pages,
        }
    }

    async fn summarize(&self, query: &str, pages: &[ScrapedPage]) -> String {
        if !self.options.summarize || self.model.is_none() {
            return pages
                .iter()
                .enumerate()
                .map(|(i, p)| format!("**[Source {}]** {}", i + 1, p.snippet.trim()))
                .collect::<Vec<_>>()
                .join("\n");
        }

        let mut prompt = format!(
            "You are a smart assistant. Given the following web search results for the query: \"{query}\", synthesize a clear, direct, and relevant answer. Use the extracted content, code, and images to answer, and cite or link to the most relevant sources.\n\n"
        );
        for (i, page) in pages.iter().enumerate() {
            prompt.push_str(&format!(
                "Source {}: {} ({})\nContent: {}\n",
                i + 1,
                page.title,
                page.url,
                page.page.content
            ));
            if !page.page.code_blocks.is_empty() {
                let code = page
                    .page
                    .code_blocks
                    .iter()
                    .map(|c| format!("```\n{c}\n```"))
                    .collect::<Vec<_>>()
                    .join("\n");
                prompt.push_str(&format!("Code Snippets:\n{code}\n"));
            }
            if !page.page.images.is_empty() {
                prompt.push_str(&format!("Images:\n{}\n", page.page.images.join("\n")));
            }
            prompt.push('\n');
        }
        prompt.push_str("\n---\nPlease write a concise answer to the query, referencing the sources as [Source 1], [Source 2], etc., where appropriate. Include links and code/images where helpful.");

        self.ask_model(
            "You are a helpful assistant that summarizes web search results and always cites sources.",
            prompt,
        )
        .await
        .unwrap_or_else(|| "[Failed to summarize with LLM]".to_string())
    }
}

/// Parses a JSON index array and accepts it only if it is a permutation of
/// `0..len`.
fn parse_ranking(answer: &str, len: usize) -> Option<Vec<usize>> {
    let start = answer.find('[')?;
    let end = answer.rfind(']')?;
    let order: Vec<usize> = serde_json::from_str(answer.get(start..=end)?).ok()?;
    let unique: HashSet<_> = order.iter().copied().collect();
    (order.len() == len && unique.len() == len && order.iter().all(|&i| i < len)).then_some(order)
}

/// Link a host can route to [`WebSearch::record_feedback`].
pub fn feedback_link(query: &str, up: bool) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    let vote = if up { "up" } else { "down" };
    format!("flexpilot:web-search-feedback?query={encoded}&{vote}=true")
}

fn render_results(query: &str, expanded: &str, summary: &str, pages: &[ScrapedPage]) -> String {
    let mut response =
        format!("**Web Search Results for:** _{expanded}_\n\n{summary}\n\nCitations:\n");
    for (i, page) in pages.iter().enumerate() {
        let domain = Url::parse(&page.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| page.url.clone());
        response.push_str(&format!(
            "[Source {}: {} - {}]({})\n",
            i + 1,
            page.title,
            domain,
            page.url
        ));
    }
    response.push_str("\n---\n");
    response.push_str(&format!(
        "Was this result helpful? [👍]({}) [👎]({})",
        feedback_link(query, true),
        feedback_link(query, false)
    ));
    response
}
