//! Thin fetch + parse step. Given a work item, produce structured fields
//! and visible text; everything heavier than tag stripping lives outside
//! this crate.

use crate::error::HarvestError;
use crate::models::{DocumentFields, ItemSource, WorkItem};
use crate::resources::Reclaim;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> Result<DocumentFields, HarvestError>;
}

#[derive(Default)]
pub struct PageCache {
    inner: Mutex<HashMap<String, DocumentFields>>,
}

impl PageCache {
    fn get(&self, url: &str) -> Option<DocumentFields> {
        self.inner.lock().ok()?.get(url).cloned()
    }

    fn insert(&self, url: &str, fields: &DocumentFields) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(url.to_string(), fields.clone());
        }
    }
}

impl Reclaim for PageCache {
    fn reclaim(&self) -> usize {
        match self.inner.lock() {
            Ok(mut map) => {
                let evicted = map.len();
                map.clear();
                map.shrink_to_fit();
                evicted
            }
            Err(_) => 0,
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    cache: Arc<PageCache>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("catalog-harvester/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: Arc::new(PageCache::default()),
        }
    }

    /// The response cache, for registration with the resource monitor.
    pub fn cache(&self) -> Arc<PageCache> {
        self.cache.clone()
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, item: &WorkItem) -> Result<DocumentFields, HarvestError> {
        match &item.source {
            ItemSource::Inline { url, html } => parse_document(url, html),
            ItemSource::Url { url } => {
                if let Some(cached) = self.cache.get(url) {
                    return Ok(cached);
                }
                let resp = self.client.get(url).send().await?;
                if !resp.status().is_success() {
                    return Err(HarvestError::Network(format!(
                        "{} returned {}",
                        url,
                        resp.status()
                    )));
                }
                let html = resp.text().await?;
                let fields = parse_document(url, &html)?;
                self.cache.insert(url, &fields);
                Ok(fields)
            }
        }
    }
}

/// Minimal HTML-to-fields extraction: title, meta description/keywords/
/// author, `spec:`-prefixed meta pairs as technical specs, and
/// tag-stripped visible text.
pub fn parse_document(url: &str, html: &str) -> Result<DocumentFields, HarvestError> {
    if html.trim().is_empty() {
        return Err(HarvestError::ParseFailure(format!("{url}: empty document")));
    }

    let mut fields = DocumentFields {
        url: url.to_string(),
        ..Default::default()
    };

    fields.title = tag_content(html, "title")
        .or_else(|| tag_content(html, "h1"))
        .unwrap_or_default();
    fields.description = meta_content(html, "description").unwrap_or_default();
    fields.provider = meta_content(html, "author")
        .or_else(|| meta_content(html, "og:site_name"))
        .unwrap_or_default();

    if let Some(keywords) = meta_content(html, "keywords") {
        for tag in keywords.split(',') {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() {
                fields.tags.insert(tag);
            }
        }
    }

    for (name, content) in meta_pairs(html) {
        if let Some(spec) = name.strip_prefix("spec:") {
            fields.technical_specs.insert(spec.to_string(), content);
        }
    }

    fields.text = strip_tags(html);

    if fields.title.is_empty() && fields.text.is_empty() {
        return Err(HarvestError::ParseFailure(format!(
            "{url}: no title or text content"
        )));
    }

    Ok(fields)
}

fn starts_with_ci(bytes: &[u8], pat: &str) -> bool {
    bytes.len() >= pat.len() && bytes[..pat.len()].eq_ignore_ascii_case(pat.as_bytes())
}

fn find_ci(bytes: &[u8], pat: &str) -> Option<usize> {
    if pat.len() > bytes.len() {
        return None;
    }
    (0..=bytes.len() - pat.len()).find(|&i| starts_with_ci(&bytes[i..], pat))
}

fn tag_content(html: &str, tag: &str) -> Option<String> {
    let bytes = html.as_bytes();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let start = find_ci(bytes, &open)?;
    let body_start = bytes[start..].iter().position(|&b| b == b'>')? + start + 1;
    let end = find_ci(&bytes[body_start..], &close)? + body_start;
    let content = collapse_ws(&strip_tags(&html[body_start..end]));
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Value of `<meta name="..." content="...">` (or `property=` for og:
/// names). Attribute order within the tag does not matter.
fn meta_content(html: &str, name: &str) -> Option<String> {
    let needle_name = format!("name=\"{name}\"");
    let needle_prop = format!("property=\"{name}\"");
    for (tag_start, tag_end) in meta_spans(html) {
        let raw = &html[tag_start..tag_end];
        if find_ci(raw.as_bytes(), &needle_name).is_some()
            || find_ci(raw.as_bytes(), &needle_prop).is_some()
        {
            if let Some(content) = attr_value(raw, "content") {
                let content = collapse_ws(&content);
                if !content.is_empty() {
                    return Some(content);
                }
            }
        }
    }
    None
}

fn meta_pairs(html: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (tag_start, tag_end) in meta_spans(html) {
        let raw = &html[tag_start..tag_end];
        if let (Some(name), Some(content)) = (attr_value(raw, "name"), attr_value(raw, "content"))
        {
            pairs.push((name.to_lowercase(), collapse_ws(&content)));
        }
    }
    pairs
}

/// Byte spans of every `<meta ...` tag, exclusive of the closing `>`.
fn meta_spans(html: &str) -> Vec<(usize, usize)> {
    let bytes = html.as_bytes();
    let mut spans = Vec::new();
    let mut search = 0;
    while let Some(at) = find_ci(&bytes[search..], "<meta") {
        let tag_start = search + at;
        let tag_end = bytes[tag_start..]
            .iter()
            .position(|&b| b == b'>')
            .map(|i| tag_start + i)
            .unwrap_or(bytes.len());
        spans.push((tag_start, tag_end));
        search = tag_end;
        if search >= bytes.len() {
            break;
        }
    }
    spans
}

fn attr_value(tag: &str, attr: &str) -> Option<String> {
    let needle = format!("{attr}=\"");
    let start = find_ci(tag.as_bytes(), &needle)? + needle.len();
    let end = tag[start..].find('"').map(|i| start + i)?;
    Some(tag[start..end].to_string())
}

/// Drops tags and the contents of script/style blocks, collapsing the
/// remaining whitespace.
pub fn strip_tags(html: &str) -> String {
    let bytes = html.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len() / 2);
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            let mut skipped = false;
            for block in ["script", "style"] {
                let open = format!("<{block}");
                let close = format!("</{block}>");
                if starts_with_ci(&bytes[i..], &open) {
                    i = match find_ci(&bytes[i..], &close) {
                        Some(end) => i + end + close.len(),
                        None => bytes.len(),
                    };
                    skipped = true;
                    break;
                }
            }
            if skipped {
                continue;
            }
            match bytes[i..].iter().position(|&b| b == b'>') {
                Some(end) => {
                    i += end + 1;
                    out.push(b' ');
                }
                None => break,
            }
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    collapse_ws(std::str::from_utf8(&out).unwrap_or_default())
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
