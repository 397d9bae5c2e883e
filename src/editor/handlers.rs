use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{ErrorResponse, PlaceRequest, PlaceResponse, SelectRequest, TemplateResponse};
use super::placement::{apply_click, map_click};
use super::state::{EditorState, PreviewItem};
use crate::compose::{Compositor, RenderInput, encode_png};
use crate::template::TemplateParams;

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(
    params: TemplateParams,
    compositor: Arc<Compositor>,
    preview: PreviewItem,
    addr: String,
) -> Result<()> {
    let state = Arc::new(EditorState::new(params, compositor, preview));
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("editor: listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<EditorState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/template", get(template))
        .route("/select", post(select))
        .route("/place", post(place))
        .route("/preview", get(preview))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

fn error(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

async fn template(State(state): State<Arc<EditorState>>) -> Json<TemplateResponse> {
    let selection = *state.selection.read().await;
    let params = state.params.read().await.clone();
    Json(TemplateResponse { selection, params })
}

async fn select(
    State(state): State<Arc<EditorState>>,
    Json(payload): Json<SelectRequest>,
) -> Json<TemplateResponse> {
    *state.selection.write().await = payload.element;
    debug!("editor: selected {:?}", payload.element);
    let params = state.params.read().await.clone();
    Json(TemplateResponse {
        selection: payload.element,
        params,
    })
}

async fn place(
    State(state): State<Arc<EditorState>>,
    Json(payload): Json<PlaceRequest>,
) -> Result<Json<PlaceResponse>, HandlerError> {
    if !payload.display_scale.is_finite() || payload.display_scale <= 0.0 {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "display_scale must be a positive number",
        ));
    }
    if !payload.x.is_finite() || !payload.y.is_finite() {
        return Err(error(StatusCode::BAD_REQUEST, "x and y must be numbers"));
    }
    let selection = *state.selection.read().await;
    let at = map_click(payload.x, payload.y, payload.display_scale);
    let position = {
        let mut params = state.params.write().await;
        apply_click(&mut params, selection, at)
    };
    debug!(
        "editor: {:?} moved to ({}, {})",
        selection, position.x, position.y
    );
    Ok(Json(PlaceResponse {
        selection,
        position,
    }))
}

async fn preview(State(state): State<Arc<EditorState>>) -> Result<Response<Body>, HandlerError> {
    let params = state.params.read().await.clone();
    let state = state.clone();
    let png = tokio::task::spawn_blocking(move || {
        let item = &state.preview;
        let input = RenderInput {
            title: &item.title,
            price: item.price.as_deref(),
            image: item.image.as_deref(),
        };
        let canvas = state.compositor.render(&input, &params)?;
        encode_png(&canvas)
    })
    .await
    .map_err(|err| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("preview task failed: {}", err),
        )
    })?
    .map_err(|err| error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
