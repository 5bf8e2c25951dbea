use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use super::episode::{TranslationMode, normalize_title};
use crate::http::{RetryPolicy, get_bytes_with_retries, get_text_with_retries};

const ALLANIME_API: &str = "https://api.allanime.day/api";
const ALLANIME_REFERER: &str = "https://allanime.to";
const SEARCH_LIMIT: u32 = 40;
const MAX_COVER_BYTES: u64 = 5 * 1024 * 1024;

const SEARCH_GQL: &str = "query( $search: SearchInput $limit: Int $page: Int $translationType: VaildTranslationTypeEnumType $countryOrigin: VaildCountryOriginEnumType ) { shows( search: $search limit: $limit page: $page translationType: $translationType countryOrigin: $countryOrigin ) { edges { _id name availableEpisodes thumbnail __typename } }}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SearchResult {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) episode_count: u32,
    pub(crate) cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CatalogError {
    #[error("search failed: {0}")]
    Request(String),
    #[error("search failed: unreadable response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub(crate) struct CoverImage {
    pub(crate) bytes: Vec<u8>,
    pub(crate) content_type: Option<String>,
}

pub(crate) trait Catalog: Send + Sync {
    fn search(
        &self,
        query: &str,
        mode: TranslationMode,
    ) -> Result<Vec<SearchResult>, CatalogError>;
}

pub(crate) trait CoverSource: Send + Sync {
    /// `None` is a normal outcome: no match, no cover, or an upstream hiccup.
    fn fetch_cover(&self, title: &str) -> Option<CoverImage>;
}

#[derive(Debug, Clone)]
pub(crate) struct AllAnimeCatalog {
    endpoint: String,
    referer: String,
    policy: RetryPolicy,
}

impl Default for AllAnimeCatalog {
    fn default() -> Self {
        Self {
            endpoint: ALLANIME_API.to_string(),
            referer: ALLANIME_REFERER.to_string(),
            policy: RetryPolicy::CATALOG,
        }
    }
}

impl Catalog for AllAnimeCatalog {
    fn search(
        &self,
        query: &str,
        mode: TranslationMode,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let params = search_query_params(query.trim(), mode);
        let raw = get_text_with_retries(&self.endpoint, &self.referer, &params, self.policy)
            .map_err(CatalogError::Request)?;
        let results = parse_search_results(&raw, mode)?;
        tracing::debug!(query, %mode, count = results.len(), "catalog search finished");
        Ok(results)
    }
}

impl CoverSource for AllAnimeCatalog {
    fn fetch_cover(&self, title: &str) -> Option<CoverImage> {
        let (_, result) = lookup_title(self, title, &[TranslationMode::Dub, TranslationMode::Sub])?;
        let url = result.cover_url?;
        match get_bytes_with_retries(&url, &self.referer, RetryPolicy::COVER, MAX_COVER_BYTES) {
            Ok(fetched) => Some(CoverImage {
                bytes: fetched.bytes,
                content_type: fetched.content_type,
            }),
            Err(err) => {
                tracing::warn!(title, url, error = %err, "cover fetch failed");
                None
            }
        }
    }
}

pub(crate) fn search_query_params(query: &str, mode: TranslationMode) -> Vec<(String, String)> {
    let variables = json!({
        "search": {
            "allowAdult": false,
            "allowUnknown": false,
            "query": query,
        },
        "limit": SEARCH_LIMIT,
        "page": 1,
        "translationType": mode.as_str(),
        "countryOrigin": "ALL",
    });
    vec![
        ("variables".to_string(), variables.to_string()),
        ("query".to_string(), SEARCH_GQL.to_string()),
    ]
}

pub(crate) fn parse_search_results(
    raw: &str,
    mode: TranslationMode,
) -> Result<Vec<SearchResult>, CatalogError> {
    let parsed: Value =
        serde_json::from_str(raw).map_err(|err| CatalogError::Decode(err.to_string()))?;
    let Some(edges) = parsed
        .pointer("/data/shows/edges")
        .and_then(serde_json::Value::as_array)
    else {
        return Ok(Vec::new());
    };

    Ok(edges
        .iter()
        .filter_map(|edge| {
            let id = edge.get("_id")?.as_str()?.trim();
            let title = edge.get("name")?.as_str()?.trim();
            let episode_count = edge
                .get("availableEpisodes")
                .and_then(|available| available.get(mode.as_str()))
                .and_then(episode_count_value)?;
            if id.is_empty() || title.is_empty() || episode_count < 1 {
                return None;
            }
            let cover_url = edge
                .get("thumbnail")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
                .map(str::to_string);
            Some(SearchResult {
                id: id.to_string(),
                title: title.to_string(),
                episode_count,
                cover_url,
            })
        })
        .collect())
}

fn episode_count_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Picks the result that best names `title`, returning its 1-based position.
///
/// Exact normalized match wins, then containment in either direction, then
/// the first result.
pub(crate) fn best_match<'a>(
    results: &'a [SearchResult],
    title: &str,
) -> Option<(u32, &'a SearchResult)> {
    let target = normalize_title(title);
    let normalized = results
        .iter()
        .map(|result| normalize_title(&result.title))
        .collect::<Vec<_>>();

    let position = normalized
        .iter()
        .position(|candidate| *candidate == target)
        .or_else(|| {
            normalized.iter().position(|candidate| {
                !target.is_empty() && (candidate.contains(&target) || target.contains(candidate))
            })
        })
        .or_else(|| (!results.is_empty()).then_some(0))?;

    Some(((position + 1) as u32, &results[position]))
}

/// Searches each mode in order and returns the first usable best match.
pub(crate) fn lookup_title(
    catalog: &dyn Catalog,
    title: &str,
    modes: &[TranslationMode],
) -> Option<(u32, SearchResult)> {
    for mode in modes {
        let results = match catalog.search(title, *mode) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(title, %mode, error = %err, "catalog lookup failed");
                continue;
            }
        };
        if let Some((index, result)) = best_match(&results, title) {
            return Some((index, result.clone()));
        }
    }
    None
}
