//! Route handlers for the marketplace REST contract

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use gigdesk_core::{
    auth::{AccessPolicy, AuthGuard},
    error::MarketError,
    marketplace::{CreateGigRequest, Marketplace, RegisterRequest},
    models::Role,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Shared state for API routes
#[derive(Clone)]
pub struct ApiState {
    pub market: Arc<Marketplace>,
    pub guard: Arc<AuthGuard>,
}

/// Create the API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        // Gigs
        .route("/gigs", get(list_gigs).post(create_gig))
        .route("/gigs/:id", get(get_gig))
        // Orders
        .route("/orders", get(list_orders).post(place_order))
        .route("/complete-order", post(complete_order))
        // Messaging
        .route("/messages", get(list_messages).post(post_message))
        // Disputes
        .route("/disputes", post(file_dispute))
        // Admin moderation
        .route("/adm/users", get(adm_users))
        .route("/adm/gigs", get(adm_gigs))
        .route("/adm/orders", get(adm_orders))
        .route("/adm/disputes", get(adm_disputes))
        .route("/adm/delete-gig", post(adm_delete_gig))
        .route("/adm/delete-user", post(adm_delete_user))
        .route("/adm/resolve-dispute", post(adm_resolve_dispute))
        .with_state(state)
}

/// Pull the opaque credential out of the Authorization header
///
/// The token is the raw opaque string; a `Bearer ` prefix is tolerated
/// and stripped.
fn bearer(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    Some(raw.strip_prefix("Bearer ").unwrap_or(raw))
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    if raw.trim().is_empty() {
        return Err(MarketError::validation(format!("{field} is required")).into());
    }
    Uuid::parse_str(raw).map_err(|_| MarketError::validation(format!("Malformed {field}")).into())
}

// Request bodies default missing fields to empty values so the core's
// validation surfaces them as 400s instead of deserialization rejections.

#[derive(Debug, Deserialize)]
struct RegisterBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
}

async fn register(
    State(state): State<ApiState>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .market
        .register_user(RegisterRequest {
            username: body.username,
            email: body.email,
            password: body.password,
            role: body.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "userId": user.id }))))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<ApiState>,
    Json(body): Json<LoginBody>,
) -> ApiResult<impl IntoResponse> {
    let session = state.market.login(&body.email, &body.password).await?;
    Ok(Json(json!({
        "token": session.token,
        "role": session.user.role,
        "userId": session.user.id,
    })))
}

async fn list_gigs(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.market.list_gigs().await)
}

#[derive(Debug, Deserialize)]
struct CreateGigBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    price: i64,
    category: Option<String>,
}

async fn create_gig(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateGigBody>,
) -> ApiResult<impl IntoResponse> {
    let seller = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::RoleIs(Role::Seller))
        .await?;
    let gig = state
        .market
        .create_gig(
            &seller,
            CreateGigRequest {
                title: body.title,
                description: body.description,
                price_sats: body.price,
                category: body.category,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(gig)))
}

async fn get_gig(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let gig_id = parse_id(&id, "gig id")?;
    Ok(Json(state.market.get_gig(gig_id).await?))
}

async fn list_orders(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::Authenticated)
        .await?;
    Ok(Json(state.market.list_orders(&user).await))
}

#[derive(Debug, Deserialize)]
struct PlaceOrderBody {
    #[serde(default, rename = "gigId")]
    gig_id: String,
}

async fn place_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<PlaceOrderBody>,
) -> ApiResult<impl IntoResponse> {
    let buyer = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::RoleIs(Role::Buyer))
        .await?;
    let gig_id = parse_id(&body.gig_id, "gigId")?;
    let order = state.market.place_order(&buyer, gig_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
struct CompleteOrderBody {
    #[serde(default, rename = "orderId")]
    order_id: String,
}

async fn complete_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CompleteOrderBody>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::Authenticated)
        .await?;
    let order_id = parse_id(&body.order_id, "orderId")?;
    Ok(Json(state.market.complete_order(&user, order_id).await?))
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    #[serde(default, rename = "orderId")]
    order_id: String,
}

async fn list_messages(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::Authenticated)
        .await?;
    let order_id = parse_id(&query.order_id, "orderId")?;
    Ok(Json(state.market.list_messages(&user, order_id).await?))
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    #[serde(default, rename = "orderId")]
    order_id: String,
    #[serde(default)]
    text: String,
}

async fn post_message(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<PostMessageBody>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::Authenticated)
        .await?;
    let order_id = parse_id(&body.order_id, "orderId")?;
    let message = state.market.post_message(&user, order_id, body.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
struct FileDisputeBody {
    #[serde(default, rename = "orderId")]
    order_id: String,
    #[serde(default)]
    reason: String,
}

async fn file_dispute(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<FileDisputeBody>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .guard
        .authorize(bearer(&headers), AccessPolicy::Authenticated)
        .await?;
    let order_id = parse_id(&body.order_id, "orderId")?;
    let dispute = state
        .market
        .file_dispute(&user, order_id, body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

async fn adm_users(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    Ok(Json(state.market.list_users().await))
}

async fn adm_gigs(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    Ok(Json(state.market.list_gigs().await))
}

async fn adm_orders(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    Ok(Json(state.market.list_all_orders().await))
}

async fn adm_disputes(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    Ok(Json(state.market.list_disputes().await))
}

#[derive(Debug, Deserialize)]
struct DeleteGigBody {
    #[serde(default, rename = "gigId")]
    gig_id: String,
}

async fn adm_delete_gig(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DeleteGigBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    let gig_id = parse_id(&body.gig_id, "gigId")?;
    Ok(Json(state.market.delete_gig(gig_id).await?))
}

#[derive(Debug, Deserialize)]
struct DeleteUserBody {
    #[serde(default, rename = "userId")]
    user_id: String,
}

async fn adm_delete_user(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DeleteUserBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    let user_id = parse_id(&body.user_id, "userId")?;
    Ok(Json(state.market.delete_user(user_id).await?))
}

#[derive(Debug, Deserialize)]
struct ResolveDisputeBody {
    #[serde(default, rename = "disputeId")]
    dispute_id: String,
    #[serde(default)]
    resolution: String,
    #[serde(default, rename = "releaseToSeller")]
    release_to_seller: bool,
}

async fn adm_resolve_dispute(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ResolveDisputeBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .guard
        .authorize(bearer(&headers), AccessPolicy::AdminOnly)
        .await?;
    let dispute_id = parse_id(&body.dispute_id, "disputeId")?;
    let dispute = state
        .market
        .resolve_dispute(dispute_id, body.resolution, body.release_to_seller)
        .await?;
    Ok(Json(dispute))
}
