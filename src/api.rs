//! HTTP routes: image upload, label finalization, label search and the account endpoints.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        HeaderMap, HeaderValue,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use image::ImageFormat;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{error::Category, json, Value};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthError,
    catalog::{ImageRecord, ImageStatus},
    error::ApiError,
    identity::Identity,
    keywords, labels,
    multipart::{self, ParsedMultipartBody},
    query::BooleanQuery,
    search::{photo_urls, PhotoDocument},
    state::AppState,
    storage::CUSTOM_LABELS_METADATA_KEY,
};

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/images", post(upload_image))
        .route("/images/labels", post(finalize_labels))
        .route("/search", post(search_photos))
        .merge(auth_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Account endpoints proxied to the identity provider; callable from any origin.
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/confirm", post(confirm_sign_up))
        .route("/auth/request_confirm_code", post(resend_confirmation_code))
        .layer(middleware::map_response(cors_headers))
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("OPTIONS, POST, GET, PUT, DELETE"),
    );
    response
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub labels: Vec<String>,
    pub image_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub email: String,
    pub confirmation_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmCodeRequest {
    pub email: String,
}

/// POST /images - store an uploaded image, detect its labels and index it.
pub async fn upload_image(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let parsed = parse_form(&headers, &body)?;
    let filename = parsed.field("filename").unwrap_or_default().to_string();
    let custom_labels = parsed.field("customlabels").unwrap_or_default().to_string();
    let image = parsed
        .binary_payload
        .ok_or_else(|| ApiError::BadRequest("request contains no image".to_string()))?;
    let content_type = image_content_type(&image)?;

    let config = &state.config;
    let bucket = &config.images_bucket;
    let image_id = Uuid::new_v4().to_string();
    let object_key = format!("{user_id}/{image_id}");

    state
        .storage
        .put_image(
            bucket,
            &object_key,
            image,
            content_type,
            HashMap::from([(CUSTOM_LABELS_METADATA_KEY.to_string(), custom_labels)]),
        )
        .await?;
    info!(%object_key, "image uploaded");

    let detected = state
        .labels
        .detect_labels(bucket, &object_key, config.min_confidence)
        .await?;
    let custom = state.storage.custom_labels(bucket, &object_key).await?;
    let all_labels = labels::merge_custom_labels(detected.clone(), &custom);
    info!(%object_key, labels = ?all_labels, "labels detected");

    let s3_path = format!("{bucket}/{object_key}");
    let indexed_labels = labels::index_labels(&all_labels);
    let document = PhotoDocument {
        user_id: user_id.clone(),
        object_key: image_id.clone(),
        s3_path: s3_path.clone(),
        labels: indexed_labels.clone(),
        final_labels: indexed_labels,
        created_timestamp: Some(Utc::now().to_rfc3339()),
        timestamp: None,
    };
    state
        .search
        .index_document(&config.index_name(&user_id), &document)
        .await?;

    state
        .catalog
        .insert(&ImageRecord::new(&user_id, &image_id, s3_path, filename))
        .await?;

    Ok(Json(UploadResponse {
        labels: detected,
        image_id,
    }))
}

/// POST /images/labels - replace the searchable labels of an uploaded image.
pub async fn finalize_labels(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let parsed = parse_form(&headers, &body)?;
    let image_id = required_field(&parsed, "image_id")?;
    let final_labels = required_field(&parsed, "final_labels")?;

    let record = state
        .catalog
        .get(&user_id, image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("image {image_id} not found")))?;

    let index = state.config.index_name(&user_id);
    let doc_id = state
        .search
        .find_document(&index, &user_id, image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("image {image_id} is not indexed")))?;

    let tags = labels::split_labels(final_labels);
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    state
        .search
        .update_labels(&index, &doc_id, &labels::index_labels(&tags), &timestamp)
        .await?;
    state
        .catalog
        .set_tags(
            &record.user_id,
            &record.image_id,
            &tags,
            ImageStatus::LabelsFinalized,
        )
        .await?;
    info!(image_id, ?tags, "labels finalized");

    Ok(Json(json!({ "message": "Record updated successfully" })))
}

/// POST /search - resolve a label query to photo URLs.
pub async fn search_photos(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let decision = state
        .rate_limiter
        .check(&user_id, Utc::now().timestamp())
        .await?;
    if decision.limited {
        return Err(ApiError::RateLimited(decision));
    }

    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query is required".to_string()));
    }

    let config = &state.config;
    let compiled = if keywords::is_structured(&request.query) {
        BooleanQuery::parse(&request.query)
    } else {
        keywords::free_text_query(state.keywords.as_ref(), &request.query).await?
    };
    info!(query = ?compiled, "searching photos");

    let documents = state
        .search
        .search(
            &config.index_name(&user_id),
            &compiled.to_query_dsl(&config.search.label_field),
            config.search.max_results,
        )
        .await?;
    let urls = photo_urls(&config.s3_url_prefix, &documents);

    Ok(([(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(urls)))
}

/// POST /auth/register - create an unconfirmed account.
pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: RegisterRequest = json_body(&body)?;

    let created = state
        .identity_provider
        .sign_up(&request.email, &request.name, &request.password)
        .await
        .map_err(|err| {
            auth_error(err, |code, _| match code {
                "UsernameExistsException" => ApiError::Conflict("User already exists".to_string()),
                _ => ApiError::BadRequest(format!("Cognito error: {code}")),
            })
        })?;
    info!(user_sub = %created.user_sub, "user registered");

    Ok(Json(json!({ "message": "User registered", "data": created })))
}

/// POST /auth/login - exchange credentials for tokens.
pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: LoginRequest = json_body(&body)?;

    let tokens = state
        .identity_provider
        .login(&request.email, &request.password)
        .await
        .map_err(|err| {
            auth_error(err, |code, _| match code {
                "UserNotConfirmedException" => {
                    ApiError::Unauthorized("User account not confirmed".to_string())
                }
                "NotAuthorizedException" | "UserNotFoundException" => {
                    ApiError::Unauthorized("Incorrect username or password".to_string())
                }
                _ => ApiError::BadRequest(format!("Cognito error: {code}")),
            })
        })?;

    Ok(Json(json!({ "message": "User logged in successfully", "data": tokens })))
}

/// POST /auth/confirm - confirm an account with the code sent to its email.
pub async fn confirm_sign_up(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ConfirmRequest = json_body(&body)?;

    match state
        .identity_provider
        .confirm_sign_up(&request.email, &request.confirmation_code)
        .await
    {
        Ok(()) => Ok(Json(json!({ "message": "User confirmed successfully" }))),
        Err(err) if err.is_already_confirmed() => {
            Ok(Json(json!({ "message": "User is already confirmed." })))
        }
        Err(err) => Err(auth_error(err, |code, message| {
            ApiError::BadRequest(format!("Cognito error: {code} - {message}"))
        })),
    }
}

/// POST /auth/request_confirm_code - send a new confirmation code.
pub async fn resend_confirmation_code(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ConfirmCodeRequest = json_body(&body)?;

    match state
        .identity_provider
        .resend_confirmation_code(&request.email)
        .await
    {
        Ok(delivery) => Ok(Json(json!({
            "message": "Confirmation code resent successfully",
            "data": delivery,
        }))),
        Err(err) if err.is_already_confirmed() => {
            Ok(Json(json!({ "message": "User is already confirmed" })))
        }
        Err(err) => Err(auth_error(err, |code, _| {
            ApiError::BadRequest(format!("Cognito error: {code}"))
        })),
    }
}

/// Maps provider rejections through `rejected`; an unreachable provider is an internal error.
fn auth_error(err: AuthError, rejected: impl FnOnce(&str, &str) -> ApiError) -> ApiError {
    match err {
        AuthError::Rejected { code, message } => rejected(&code, &message),
        AuthError::Unavailable(err) => ApiError::Internal(err),
    }
}

fn json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        let message = match err.classify() {
            Category::Data => "missing required parameters",
            _ => "invalid JSON in request body",
        };
        ApiError::BadRequest(message.to_string())
    })
}

fn parse_form(headers: &HeaderMap, body: &[u8]) -> Result<ParsedMultipartBody, ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Content-Type header".to_string()))?;

    Ok(multipart::parse_request_body(content_type, body)?)
}

fn required_field<'a>(parsed: &'a ParsedMultipartBody, name: &str) -> Result<&'a str, ApiError> {
    parsed
        .field(name)
        .ok_or_else(|| ApiError::BadRequest(format!("missing form field {name}")))
}

/// Label detection only reads JPEG and PNG images.
fn image_content_type(image: &[u8]) -> Result<&'static str, ApiError> {
    match image::guess_format(image) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(format.to_mime_type()),
        Ok(format) => Err(ApiError::BadRequest(format!(
            "unsupported image format {format:?}"
        ))),
        Err(_) => Err(ApiError::BadRequest(
            "payload is not a recognizable image".to_string(),
        )),
    }
}
