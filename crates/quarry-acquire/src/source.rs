//! Acquisition sources
//!
//! A source turns an item id into candidate URLs. Resolving may itself
//! call a metadata API through the shared [`HttpFetcher`], so it is rate
//! limited like any other request.

use crate::config::SourceSpec;
use crate::{AcquireError, HttpFetcher};
use async_trait::async_trait;
use quarry_domain::ItemId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// One acquisition strategy
#[async_trait]
pub trait Source: Send + Sync {
    /// Source name, as recorded in the state store
    fn name(&self) -> &str;

    /// Candidate URLs for an item, best first; empty when the source has none
    async fn candidates(&self, id: &ItemId, http: &HttpFetcher) -> Result<Vec<String>, AcquireError>;
}

/// URL built from the id; no resolver call
#[derive(Debug, Clone)]
pub struct TemplateSource {
    name: String,
    url: String,
    require_prefix: Option<String>,
}

impl TemplateSource {
    /// Create a template source
    pub fn new(name: impl Into<String>, url: impl Into<String>, require_prefix: Option<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            require_prefix: require_prefix.map(|p| p.to_lowercase()),
        }
    }

    /// Render the URL, `None` when the id is not eligible
    pub fn render(&self, id: &ItemId) -> Option<String> {
        let suffix = match &self.require_prefix {
            Some(prefix) => id.as_str().strip_prefix(prefix.as_str())?,
            None => id.as_str(),
        };
        Some(self.url.replace("{id}", id.as_str()).replace("{suffix}", suffix))
    }
}

#[async_trait]
impl Source for TemplateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(&self, id: &ItemId, _http: &HttpFetcher) -> Result<Vec<String>, AcquireError> {
        Ok(self.render(id).into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct UnpaywallRecord {
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

/// Unpaywall open-access lookup
#[derive(Debug, Clone)]
pub struct UnpaywallSource {
    name: String,
    base_url: String,
    email: String,
}

impl UnpaywallSource {
    /// Create an Unpaywall source
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
        }
    }
}

#[async_trait]
impl Source for UnpaywallSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(&self, id: &ItemId, http: &HttpFetcher) -> Result<Vec<String>, AcquireError> {
        let url = format!("{}/v2/{}", self.base_url, id);
        let Some(record) = http
            .get_json::<UnpaywallRecord>(&url, &[("email", self.email.as_str())])
            .await?
        else {
            debug!(item = %id, "unpaywall has no record");
            return Ok(Vec::new());
        };

        let urls = record
            .best_oa_location
            .into_iter()
            .chain(record.oa_locations)
            .filter_map(|loc| loc.url_for_pdf);
        Ok(dedup(urls))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcResponse {
    result_list: Option<EuropePmcResults>,
}

#[derive(Debug, Deserialize)]
struct EuropePmcResults {
    #[serde(default)]
    result: Vec<EuropePmcRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcRecord {
    pmcid: Option<String>,
    is_open_access: Option<String>,
    full_text_url_list: Option<FullTextUrlList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrlList {
    #[serde(default)]
    full_text_url: Vec<FullTextUrl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrl {
    document_style: Option<String>,
    url: Option<String>,
}

/// Europe PMC REST search by DOI
#[derive(Debug, Clone)]
pub struct EuropePmcSource {
    name: String,
    base_url: String,
    render_url: String,
}

impl EuropePmcSource {
    /// Create a Europe PMC source
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, render_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            render_url: render_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Source for EuropePmcSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(&self, id: &ItemId, http: &HttpFetcher) -> Result<Vec<String>, AcquireError> {
        if !id.is_doi() {
            return Ok(Vec::new());
        }
        let url = format!("{}/search", self.base_url);
        let query = format!("DOI:\"{}\"", id);
        let response = http
            .get_json::<EuropePmcResponse>(
                &url,
                &[("query", query.as_str()), ("resultType", "core"), ("format", "json")],
            )
            .await?;

        let records = response
            .and_then(|r| r.result_list)
            .map(|l| l.result)
            .unwrap_or_default();

        let mut urls = Vec::new();
        for record in records {
            if let Some(list) = record.full_text_url_list {
                urls.extend(
                    list.full_text_url
                        .into_iter()
                        .filter(|u| u.document_style.as_deref() == Some("pdf"))
                        .filter_map(|u| u.url),
                );
            }
            if record.is_open_access.as_deref() == Some("Y") {
                if let Some(pmcid) = record.pmcid {
                    urls.push(format!("{}/{}?pdf=render", self.render_url, pmcid));
                }
            }
        }
        Ok(dedup(urls))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemanticScholarPaper {
    open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    url: Option<String>,
}

/// DOI resolver links; they lead back to the publisher landing page
const DOI_RESOLVERS: [&str; 4] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

/// Semantic Scholar Graph API open-access lookup
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    name: String,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    /// Create a Semantic Scholar source; `api_key` is sent as `x-api-key`
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(&self, id: &ItemId, http: &HttpFetcher) -> Result<Vec<String>, AcquireError> {
        if !id.is_doi() {
            return Ok(Vec::new());
        }
        let url = format!("{}/paper/DOI:{}", self.base_url, id);
        let headers: Vec<(&str, &str)> = self
            .api_key
            .as_deref()
            .map(|key| ("x-api-key", key))
            .into_iter()
            .collect();
        let Some(paper) = http
            .get_json_with_headers::<SemanticScholarPaper>(&url, &[("fields", "openAccessPdf")], &headers)
            .await?
        else {
            debug!(item = %id, "semantic scholar has no record");
            return Ok(Vec::new());
        };

        let urls = paper
            .open_access_pdf
            .and_then(|pdf| pdf.url)
            .filter(|url| !url.is_empty())
            .filter(|url| {
                let lower = url.to_ascii_lowercase();
                !DOI_RESOLVERS.iter().any(|prefix| lower.starts_with(prefix))
            });
        Ok(urls.into_iter().collect())
    }
}

fn dedup(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for url in urls {
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

/// Build sources from configuration, preserving priority order
pub fn build_sources(specs: &[SourceSpec]) -> Vec<Arc<dyn Source>> {
    specs
        .iter()
        .map(|spec| -> Arc<dyn Source> {
            match spec {
                SourceSpec::Template {
                    name,
                    url,
                    require_prefix,
                } => Arc::new(TemplateSource::new(name, url, require_prefix.clone())),
                SourceSpec::Unpaywall { name, base_url, email } => {
                    Arc::new(UnpaywallSource::new(name, base_url, email))
                }
                SourceSpec::EuropePmc {
                    name,
                    base_url,
                    render_url,
                } => Arc::new(EuropePmcSource::new(name, base_url, render_url)),
                SourceSpec::SemanticScholar {
                    name,
                    base_url,
                    api_key,
                } => Arc::new(SemanticScholarSource::new(name, base_url, api_key.clone())),
            }
        })
        .collect()
}
