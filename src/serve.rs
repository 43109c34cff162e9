use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        ConnectInfo, DefaultBodyLimit, Query, State,
    },
    http::{header, HeaderMap, HeaderName, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc as StdArc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::constants::{codes, AVAILABLE_LANGUAGES};
use crate::error::{envelope, ApiError};
use crate::ident::TimestampIds;
use crate::pipeline::Pipeline;
use crate::rate_limit::{spawn_window_reset, AbuseCounter, FixedWindowCounter};
use crate::request::{non_empty_str, CutRequest, RequestError, TransformRequest};
use crate::store::{PdbStore, SharedTransform};
use crate::tool::{ArtifactPaths, ToolRunner};
use crate::torsions::{MetaBlob, TorsionBlob};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Uploaded structures travel inside the JSON body
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// State shared by every handler
pub struct AppState {
    pub pipeline: Pipeline,
    pub counter: StdArc<dyn AbuseCounter>,
    /// Header the upstream auth layer fills with the caller's user id
    pub identity_header: HeaderName,
}

impl AppState {
    fn store(&self) -> &PdbStore {
        self.pipeline.store()
    }

    /// The caller's user id, or None for anonymous requests
    fn caller(&self, headers: &HeaderMap) -> Option<i64> {
        let value = headers.get(&self.identity_header)?;
        match value.to_str().ok().and_then(|v| v.trim().parse::<i64>().ok()) {
            Some(id) => Some(id),
            None => {
                warn!("Ignoring malformed {} header: {:?}", self.identity_header, value);
                None
            }
        }
    }

    fn require_caller(&self, headers: &HeaderMap) -> Result<i64, ApiError> {
        self.caller(headers).ok_or(ApiError::NotLoggedIn)
    }

    fn check_rate(&self, addr: &SocketAddr) -> Result<(), ApiError> {
        if self.counter.hit(addr.ip()) {
            Ok(())
        } else {
            Err(ApiError::RateLimited)
        }
    }
}

/// Run the HTTP server described by `config` until it fails
pub fn serve(config: ServerConfig) -> Result<(), DynError> {
    let identity_header = HeaderName::from_bytes(config.identity_header.as_bytes())
        .map_err(|e| format!("Invalid identity_header '{}': {}", config.identity_header, e))?;

    let paths = ArtifactPaths::new(&config.work_dir, &config.error_dir);
    paths.ensure_dirs().map_err(|e| {
        format!(
            "Failed to create work directories '{}' / '{}': {}",
            config.work_dir.display(),
            config.error_dir.display(),
            e
        )
    })?;

    println!("Database: {}", config.database_path.display());
    println!("Tool: {} in {}", config.tool.executable, config.tool.dir.display());
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", config.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = crate::db::prepare_database(&config.database_path).await?;

        let pipeline = Pipeline::new(
            PdbStore::new(pool),
            ToolRunner::local(config.tool.clone()),
            StdArc::new(TimestampIds),
            paths,
        );

        let counter: StdArc<dyn AbuseCounter> =
            StdArc::new(FixedWindowCounter::new(config.rate_limit.max_requests));
        spawn_window_reset(
            counter.clone(),
            Duration::from_secs(config.rate_limit.window_secs),
        );

        let state = StdArc::new(AppState {
            pipeline,
            counter,
            identity_header,
        });

        let listener = tokio::net::TcpListener::bind(format!("[::]:{}", config.port))
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", config.port, e))?;
        serve_on(listener, state)
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), DynError>(())
    })
}

/// Serve the API on an already bound listener
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: StdArc<AppState>,
) -> std::io::Result<()> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

pub fn build_router(state: StdArc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/databasePdb", post(database_pdb_handler))
        .route("/api/transformPdb", post(transform_pdb_handler))
        .route("/api/getPdb", get(get_pdb_handler))
        .route("/api/getPdbMeta", get(get_pdb_meta_handler))
        .route("/api/getTorsions", get(get_torsions_handler))
        .route("/api/getAllSharedTransforms", get(shared_transforms_handler))
        .route("/api/getAvailableLanguages", get(languages_handler))
        .route("/api/getUserSegments", get(user_segments_handler))
        .route("/api/getUserTransforms", get(user_transforms_handler))
        .route("/api/deleteSegment", post(delete_segment_handler))
        .route("/api/deleteTransform", post(delete_transform_handler))
        .route("/api/shareTransformOnMain", post(share_on_main_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

fn ok_json(body: Map<String, Value>) -> Response {
    (StatusCode::OK, axum::Json(Value::Object(body))).into_response()
}

fn success() -> Map<String, Value> {
    envelope(codes::SUCCESS)
}

/// The body bytes, or an enveloped error when they could not be buffered
/// (over the size limit, connection dropped)
fn body_bytes(body: Result<Bytes, BytesRejection>) -> Result<Bytes, ApiError> {
    body.map_err(|e| ApiError::Rejected {
        status: e.status(),
        reason: e.body_text(),
    })
}

/// A query string that does not deserialize (repeated keys and the like)
/// carries no usable id
fn lookup_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    match query {
        Ok(Query(query)) => Ok(query),
        Err(e) => {
            warn!("Unusable query string: {}", e.body_text());
            Err(RequestError::NoSegmentId.into())
        }
    }
}

/// Bodies that are not a JSON object are treated as empty, so they fail field
/// validation with the usual codes instead of a framework rejection
fn parse_body(body: &Bytes) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => Value::Object(Map::new()),
        Err(e) => {
            if !body.is_empty() {
                warn!("Unparseable request body: {}", e);
            }
            Value::Object(Map::new())
        }
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::Rejected {
        status: StatusCode::NOT_FOUND,
        reason: format!("No route for {}", uri.path()),
    }
}

async fn database_pdb_handler(
    State(state): State<StdArc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    state.check_rate(&addr)?;
    let request = CutRequest::from_json(&parse_body(&body_bytes(body)?))?;
    let owner = state.caller(&headers);

    let outcome = state.pipeline.cut(request, owner).await?;

    let mut result = success();
    result.insert("pdb".to_string(), json!(outcome.segment_id));
    result.insert("name".to_string(), json!(outcome.name));
    Ok(ok_json(result))
}

async fn transform_pdb_handler(
    State(state): State<StdArc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    state.check_rate(&addr)?;
    let request = TransformRequest::from_json(&parse_body(&body_bytes(body)?))?;
    let owner = state.caller(&headers);

    let transform_id = state.pipeline.transform(request, owner).await?;

    let mut result = success();
    result.insert("pdb".to_string(), json!(transform_id));
    Ok(ok_json(result))
}

#[derive(Deserialize)]
struct PdbQuery {
    pdb: Option<String>,
    pdbtype: Option<String>,
}

impl PdbQuery {
    fn is_transform(&self) -> bool {
        self.pdbtype.as_deref() == Some("transform")
    }

    fn id(&self) -> Option<&str> {
        self.pdb.as_deref().filter(|id| !id.is_empty())
    }
}

async fn get_pdb_handler(
    State(state): State<StdArc<AppState>>,
    query: Result<Query<PdbQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = lookup_query(query)?;
    let pdb = if query.is_transform() {
        let id = query.id().ok_or(ApiError::NoTransformId)?;
        state
            .store()
            .find_transform(id)
            .await?
            .ok_or(ApiError::TransformNotFound)?
            .pdb
    } else {
        let id = query.id().ok_or(RequestError::NoSegmentId)?;
        state
            .store()
            .find_segment(id)
            .await?
            .ok_or(ApiError::SegmentNotFound)?
            .pdb
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        pdb,
    )
        .into_response())
}

async fn get_pdb_meta_handler(
    State(state): State<StdArc<AppState>>,
    query: Result<Query<PdbQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = lookup_query(query)?;
    let id = query.id().ok_or(RequestError::NoSegmentId)?;
    let mut result = success();

    if query.is_transform() {
        let transform = state
            .store()
            .find_transform(id)
            .await?
            .ok_or(ApiError::TransformNotFound)?;
        let meta: MetaBlob = serde_json::from_str(&transform.meta)?;
        result.insert("name".to_string(), json!(transform.name));
        result.insert("segment".to_string(), json!(transform.segment_id));
        result.insert("transformMeta".to_string(), serde_json::to_value(meta.transform_meta)?);
    } else {
        let segment = state
            .store()
            .find_segment(id)
            .await?
            .ok_or(ApiError::SegmentNotFound)?;
        result.insert("code".to_string(), json!(segment.pdb_name));
        result.insert("name".to_string(), json!(segment.name));
        result.insert("chain".to_string(), json!(segment.chain));
        result.insert("start".to_string(), json!(segment.start));
        result.insert("end".to_string(), json!(segment.end));
    }

    Ok(ok_json(result))
}

#[derive(Deserialize)]
struct TorsionsQuery {
    tors: Option<String>,
}

async fn get_torsions_handler(
    State(state): State<StdArc<AppState>>,
    query: Result<Query<TorsionsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = lookup_query(query)?;
    let id = query
        .tors
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(RequestError::NoSegmentId)?;

    let segment = state
        .store()
        .find_segment(id)
        .await?
        .ok_or(ApiError::SegmentNotFound)?;
    let blob: TorsionBlob = serde_json::from_str(&segment.torsions)?;

    let mut result = success();
    result.insert("tors".to_string(), serde_json::to_value(blob.tors)?);
    result.insert("shared".to_string(), json!(segment.shared));
    Ok(ok_json(result))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SharedTransformJson {
    transform_id: String,
    /// RFC 3339
    date_created: Option<String>,
    protein_name: Option<String>,
    pdb_code: Option<String>,
    start: i64,
    end: i64,
    chain: String,
    segment_id: String,
}

impl From<SharedTransform> for SharedTransformJson {
    fn from(row: SharedTransform) -> Self {
        Self {
            transform_id: row.transform_id,
            date_created: chrono::DateTime::from_timestamp_millis(row.date_created)
                .map(|d| d.to_rfc3339()),
            protein_name: row.protein_name,
            pdb_code: row.pdb_code,
            start: row.start,
            end: row.end,
            chain: row.chain,
            segment_id: row.segment_id,
        }
    }
}

async fn shared_transforms_handler(
    State(state): State<StdArc<AppState>>,
) -> Result<Response, ApiError> {
    let rows: Vec<SharedTransformJson> = state
        .store()
        .shared_transforms()
        .await?
        .into_iter()
        .map(SharedTransformJson::from)
        .collect();

    let mut result = success();
    result.insert("data".to_string(), serde_json::to_value(rows)?);
    Ok(ok_json(result))
}

async fn languages_handler() -> Response {
    let data: Map<String, Value> = AVAILABLE_LANGUAGES
        .iter()
        .map(|(code, name)| (code.to_string(), json!(name)))
        .collect();

    let mut result = success();
    result.insert("data".to_string(), Value::Object(data));
    ok_json(result)
}

async fn user_segments_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = state.require_caller(&headers)?;
    let segments = state.store().segments_for_owner(owner).await?;

    let mut result = success();
    for segment in segments {
        // Each of name and code stands in for the other when missing
        let name = segment.name.clone().or_else(|| segment.pdb_name.clone());
        let pdb_code = segment.pdb_name.clone().or_else(|| segment.name.clone());
        result.insert(
            segment.id.clone(),
            json!({
                "name": name,
                "pdbCode": pdb_code,
                "id": segment.id,
                "chain": segment.chain,
                "start": segment.start,
                "end": segment.end,
            }),
        );
    }
    Ok(ok_json(result))
}

#[derive(Deserialize)]
struct UserTransformsQuery {
    segment: Option<String>,
}

async fn user_transforms_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<UserTransformsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let owner = state.require_caller(&headers)?;
    let query = lookup_query(query)?;
    let segment_id = query
        .segment
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(RequestError::NoSegmentId)?;

    let transforms = state
        .store()
        .transforms_for_segment(owner, segment_id)
        .await?;

    let mut result = success();
    for (index, transform) in transforms.into_iter().enumerate() {
        let meta: MetaBlob = serde_json::from_str(&transform.meta)?;
        let name = transform.name.map(Value::from).unwrap_or_else(|| json!(index));
        result.insert(
            transform.id.clone(),
            json!({
                "name": name,
                "id": transform.id,
                "showOnMain": transform.show_on_main,
                "transformMeta": meta.transform_meta,
            }),
        );
    }
    Ok(ok_json(result))
}

async fn delete_segment_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let owner = state.require_caller(&headers)?;
    let body = parse_body(&body_bytes(body)?);
    let segment_id = non_empty_str(&body, "segmentId").ok_or(RequestError::NoSegmentId)?;

    if state.store().delete_segment(segment_id, owner).await? {
        info!("User {} deleted segment {}", owner, segment_id);
    } else {
        warn!("User {} has no segment {} to delete", owner, segment_id);
    }
    Ok(ok_json(success()))
}

async fn delete_transform_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let owner = state.require_caller(&headers)?;
    let body = parse_body(&body_bytes(body)?);
    let transform_id = non_empty_str(&body, "transformId").ok_or(ApiError::NoTransformId)?;

    if state.store().delete_transform(transform_id, owner).await? {
        info!("User {} deleted transform {}", owner, transform_id);
    } else {
        warn!("User {} has no transform {} to delete", owner, transform_id);
    }
    Ok(ok_json(success()))
}

async fn share_on_main_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let owner = state.require_caller(&headers)?;
    let body = parse_body(&body_bytes(body)?);
    let transform_id = non_empty_str(&body, "transformId").ok_or(ApiError::NoTransformId)?;

    // Someone else's transform looks the same as a missing one
    let transform = state
        .store()
        .find_transform(transform_id)
        .await?
        .filter(|t| t.owner == Some(owner))
        .ok_or(ApiError::TransformNotFound)?;

    state.store().share_transform_on_main(&transform.id).await?;
    info!("User {} shared transform {} on main", owner, transform.id);
    Ok(ok_json(success()))
}
