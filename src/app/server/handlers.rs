use std::path::Path as FsPath;
use std::time::SystemTime;

use axum::{
    Json,
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::extract::{ApiJson, ApiQuery};
use crate::app::catalog::{SearchResult, best_match};
use crate::app::episode::{
    DownloadRequest, EpisodeSelector, TranslationMode, ValidationError, parse_title_and_episode,
};
use crate::app::history::{EventKind, HISTORY_LIMIT, HistoryEntry};
use crate::app::library::LibraryEntry;
use crate::app::media::MediaFile;
use crate::app::poster::poster_url;
use crate::paths::resolve_inside_root;

pub(crate) const MEDIA_ROUTE: &str = "/media";

async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal(format!("worker failed: {err}")))?
}

fn to_rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

fn media_url(file: &MediaFile) -> String {
    format!("{MEDIA_ROUTE}/{}", urlencoding::encode(&file.file_name()))
}

fn record(state: &AppState, event: EventKind, details: Map<String, Value>) -> HistoryEntry {
    match state.history.append(event.clone(), details.clone()) {
        Ok(entry) => entry,
        Err(err) => {
            tracing::warn!(%event, error = %err, "failed to persist history entry");
            HistoryEntry::new(event, details)
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn insert_some<T: Into<Value>>(details: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        details.insert(key.to_string(), value.into());
    }
}

// ---- search ----

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParams {
    q: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchResultView {
    index: u32,
    id: String,
    title: String,
    episodes: u32,
    cover_url: Option<String>,
}

impl SearchResultView {
    fn new(position: usize, result: SearchResult) -> Self {
        Self {
            index: (position + 1) as u32,
            id: result.id,
            title: result.title,
            episodes: result.episode_count,
            cover_url: result.cover_url,
        }
    }
}

pub(crate) async fn search(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> ApiResult<Json<Vec<SearchResultView>>> {
    let query = params.q.unwrap_or_default().trim().to_string();
    if query.is_empty() {
        return Err(ValidationError::EmptyQuery.into());
    }
    let mode = TranslationMode::parse_or_default(params.mode.as_deref())?;

    let results = blocking(move || Ok(state.catalog.search(&query, mode)?)).await?;
    Ok(Json(
        results
            .into_iter()
            .enumerate()
            .map(|(position, result)| SearchResultView::new(position, result))
            .collect(),
    ))
}

// ---- library ----

#[derive(Debug, Serialize)]
pub(crate) struct LibraryFileView {
    episode: u32,
    name: String,
    url: String,
    modified: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LibraryEntryView {
    title: String,
    poster_url: Option<String>,
    total_episodes: u32,
    downloaded_episodes: Vec<u32>,
    files: Vec<LibraryFileView>,
    updated_at: String,
}

impl From<LibraryEntry> for LibraryEntryView {
    fn from(entry: LibraryEntry) -> Self {
        Self {
            files: entry
                .file_by_episode
                .iter()
                .map(|(episode, file)| LibraryFileView {
                    episode: *episode,
                    name: file.file_name(),
                    url: media_url(file),
                    modified: to_rfc3339(file.modified),
                })
                .collect(),
            downloaded_episodes: entry.downloaded_episode_numbers.into_iter().collect(),
            title: entry.title,
            poster_url: entry.poster_url,
            total_episodes: entry.total_episode_count,
            updated_at: to_rfc3339(entry.most_recent_modified),
        }
    }
}

pub(crate) async fn library(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LibraryEntryView>>> {
    let entries = blocking(move || {
        state
            .library
            .list_library()
            .map_err(|err| ApiError::internal(format!("failed to scan downloads: {err}")))
    })
    .await?;
    Ok(Json(entries.into_iter().map(LibraryEntryView::from).collect()))
}

// ---- history ----

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryView {
    timestamp: String,
    display_time: String,
    event: String,
    summary: String,
    details: Map<String, Value>,
}

impl From<HistoryEntry> for HistoryView {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            display_time: crate::app::episode::format_timestamp_display(&entry.timestamp),
            summary: entry.summary(),
            event: entry.event.to_string(),
            timestamp: entry.timestamp,
            details: entry.details,
        }
    }
}

pub(crate) async fn history(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> ApiResult<Json<Vec<HistoryView>>> {
    let limit = params.limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);
    let entries = blocking(move || Ok(state.history.recent(limit))).await?;
    Ok(Json(entries.into_iter().map(HistoryView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryEventBody {
    event: Option<String>,
    #[serde(default)]
    details: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

pub(crate) async fn history_event(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<HistoryEventBody>,
) -> ApiResult<(StatusCode, Json<HistoryView>)> {
    let event = EventKind::from(body.event.unwrap_or_default());
    let mut details = body.extra;
    details.extend(body.details);

    let entry = blocking(move || Ok(record(&state, event, details))).await?;
    Ok((StatusCode::CREATED, Json(HistoryView::from(entry))))
}

// ---- single episode ----

#[derive(Debug, Deserialize)]
pub(crate) struct EpisodeBody {
    query: Option<String>,
    mode: Option<String>,
    index: i64,
    episode: i64,
    title: Option<String>,
    episodes: Option<u32>,
    cover_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EpisodeView {
    title: String,
    episode: u32,
    file: String,
    url: String,
    summary: String,
}

pub(crate) async fn play_episode(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EpisodeBody>,
) -> ApiResult<Json<EpisodeView>> {
    fetch_episode(state, body, EventKind::PlayEpisode).await
}

pub(crate) async fn download_episode(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EpisodeBody>,
) -> ApiResult<Json<EpisodeView>> {
    fetch_episode(state, body, EventKind::SearchDownload).await
}

async fn fetch_episode(
    state: AppState,
    body: EpisodeBody,
    event: EventKind,
) -> ApiResult<Json<EpisodeView>> {
    let mode = TranslationMode::parse_or_default(body.mode.as_deref())?;
    let request = DownloadRequest::new(
        body.query.as_deref().unwrap_or_default(),
        mode,
        body.index,
        EpisodeSelector::single(body.episode)?,
    )?;
    request.check_available(body.episodes)?;

    let view = blocking(move || {
        let file = state.downloads.download_episode(&request)?;
        let (file_title, file_episode) = parse_title_and_episode(&file.stem());
        let title = body
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or(file_title);
        let episode = request.selector.last();

        let mut details = object(json!({
            "query": request.title,
            "anime": title,
            "mode": request.mode.as_str(),
            "index": request.catalog_index,
            "episode": episode,
            "filename": file.file_name(),
        }));
        insert_some(&mut details, "episodes", body.episodes);
        insert_some(&mut details, "cover_url", body.cover_url);
        insert_some(&mut details, "poster", state.posters.cached(&title).map(|name| poster_url(&name)));
        if file_episode != episode {
            tracing::debug!(expected = episode, found = file_episode, "downloaded file names a different episode");
        }

        let entry = record(&state, event, details);
        Ok(EpisodeView {
            title,
            episode,
            file: file.file_name(),
            url: media_url(&file),
            summary: entry.summary(),
        })
    })
    .await?;
    Ok(Json(view))
}

// ---- detached range downloads ----

#[derive(Debug, Deserialize)]
pub(crate) struct SeasonBody {
    query: Option<String>,
    mode: Option<String>,
    index: i64,
    episodes: Value,
    title: Option<String>,
    episode_count: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartedView {
    title: String,
    range: String,
    pid: u32,
    summary: String,
}

/// Accepts `"1-12"`, `"3"` or a bare count `12` meaning `1-12`.
pub(crate) fn selector_from_value(value: &Value) -> Result<EpisodeSelector, ValidationError> {
    match value {
        Value::String(raw) => raw.parse(),
        Value::Number(number) => {
            let count = number
                .as_i64()
                .ok_or_else(|| ValidationError::InvalidSelector(number.to_string()))?;
            full_range(count)
        }
        other => Err(ValidationError::InvalidSelector(other.to_string())),
    }
}

fn full_range(count: i64) -> Result<EpisodeSelector, ValidationError> {
    match count {
        ..=0 => Err(ValidationError::NonPositiveEpisode(count)),
        1 => Ok(EpisodeSelector::Single(1)),
        _ => format!("1-{count}").parse(),
    }
}

pub(crate) async fn download_season(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SeasonBody>,
) -> ApiResult<(StatusCode, Json<StartedView>)> {
    let mode = TranslationMode::parse_or_default(body.mode.as_deref())?;
    let selector = selector_from_value(&body.episodes)?;
    let request = DownloadRequest::new(
        body.query.as_deref().unwrap_or_default(),
        mode,
        body.index,
        selector,
    )?;
    request.check_available(body.episode_count)?;
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(request.title.as_str())
        .to_string();

    let view = blocking(move || start_range(&state, request, title, body.episode_count)).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AllByTitleBody {
    title: Option<String>,
    mode: Option<String>,
}

pub(crate) async fn download_all_by_title(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AllByTitleBody>,
) -> ApiResult<(StatusCode, Json<StartedView>)> {
    let mode = TranslationMode::parse_or_default(body.mode.as_deref())?;
    let query = body.title.as_deref().unwrap_or_default().trim().to_string();
    if query.is_empty() {
        return Err(ValidationError::EmptyQuery.into());
    }

    let view = blocking(move || {
        let results = state.catalog.search(&query, mode)?;
        let Some((index, result)) = best_match(&results, &query) else {
            return Err(ApiError::not_found(format!("no catalog match for `{query}`")));
        };
        let request = DownloadRequest::new(
            &query,
            mode,
            i64::from(index),
            full_range(i64::from(result.episode_count))?,
        )?;
        start_range(&state, request, result.title.clone(), Some(result.episode_count))
    })
    .await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

fn start_range(
    state: &AppState,
    request: DownloadRequest,
    title: String,
    episode_count: Option<u32>,
) -> ApiResult<StartedView> {
    let pid = state.downloads.start_detached(&request)?;
    let range = request.selector.to_string();

    let mut details = object(json!({
        "query": request.title,
        "anime": title,
        "mode": request.mode.as_str(),
        "index": request.catalog_index,
        "range": range,
    }));
    insert_some(&mut details, "episodes", episode_count);
    insert_some(&mut details, "poster", state.posters.cached(&title).map(|name| poster_url(&name)));
    let entry = record(state, EventKind::SeasonDownload, details);

    Ok(StartedView {
        title,
        range,
        pid,
        summary: entry.summary(),
    })
}

// ---- static files ----

async fn serve_inside(root: &FsPath, name: &str, request: Request) -> ApiResult<Response> {
    let Some(path) = resolve_inside_root(root, name) else {
        return Err(ApiError::not_found(format!("no file named `{name}`")));
    };
    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .map_err(|err| ApiError::internal(format!("failed to serve file: {err}")))?;
    Ok(response.map(Body::new).into_response())
}

pub(crate) async fn media(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    serve_inside(state.downloads.root().path(), &name, request).await
}

pub(crate) async fn poster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    serve_inside(state.posters.dir(), &name, request).await
}
