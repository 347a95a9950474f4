//! Route handlers. Each one extracts its input, runs the matching
//! [`AddressBook`] call on the blocking pool, and shapes the JSON reply.

use std::time::Duration;

use address_book::{
    Address, AddressBook, AddressId, AddressPatch, AddressPayload, DESCRIPTION, NearbyAddress,
    PROJECT_NAME, Pagination, VERSION, error::Result as BookResult,
};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::timeout;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct AppState {
    pub book: AddressBook,
    /// Deadline for a single store call. The call itself cannot be cancelled, so
    /// a write that misses it may still commit after the client sees a 500.
    pub request_timeout: Duration,
}

/// Query string of `GET /addresses/search`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
}

/// Body of `POST /addresses/nearby`.
#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

/// A search hit as sent over the wire: the address plus its distance rounded to
/// two decimals.
#[derive(Debug, Serialize)]
pub struct AddressWithDistance {
    #[serde(flatten)]
    pub address: Address,
    pub distance_km: f64,
}

impl AddressWithDistance {
    /// Rounds half up unless that would land beyond `radius_km`, in which case
    /// the distance is truncated instead. Hit order is preserved either way.
    pub fn new(hit: NearbyAddress, radius_km: f64) -> Self {
        let rounded = (hit.distance_km * 100.0).round() / 100.0;
        let distance_km = if rounded > radius_km {
            (hit.distance_km * 100.0).floor() / 100.0
        } else {
            rounded
        };
        Self {
            address: hit.address,
            distance_km,
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a store call off the async runtime, bounded by the request timeout.
async fn blocking<T, F>(state: &AppState, call: F) -> ApiResult<T>
where
    F: FnOnce(&AddressBook) -> BookResult<T> + Send + 'static,
    T: Send + 'static,
{
    let book = state.book.clone();
    let task = tokio::task::spawn_blocking(move || call(&book));
    let Ok(joined) = timeout(state.request_timeout, task).await else {
        return Err(ApiError::Internal(format!(
            "store call exceeded {:?}",
            state.request_timeout
        )));
    };
    Ok(joined??)
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", post(create_address).get(list_addresses))
        .route("/addresses/search", get(search_addresses))
        .route("/addresses/nearby", post(nearby_addresses))
        .route(
            "/addresses/{address_id}",
            get(get_address)
                .put(update_address)
                .patch(update_address)
                .delete(delete_address),
        )
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {PROJECT_NAME}"),
        "description": DESCRIPTION,
        "version": VERSION,
    }))
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let backend = state.book.store().backend();
    let addresses = blocking(&state, AddressBook::count).await?;
    Ok(Json(json!({
        "status": "healthy",
        "backend": backend,
        "addresses": addresses,
    })))
}

async fn create_address(
    State(state): State<AppState>,
    payload: Result<Json<AddressPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Address>)> {
    let Json(payload) = payload?;
    let address = blocking(&state, move |book| book.create(&payload)).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn list_addresses(
    State(state): State<AppState>,
    page: Result<Query<Pagination>, QueryRejection>,
) -> ApiResult<Json<Vec<Address>>> {
    let Query(page) = page?;
    Ok(Json(blocking(&state, move |book| book.list(page)).await?))
}

async fn get_address(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Address>> {
    let id = AddressId(id?.0);
    Ok(Json(blocking(&state, move |book| book.get(id)).await?))
}

async fn update_address(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    patch: Result<Json<AddressPatch>, JsonRejection>,
) -> ApiResult<Json<Address>> {
    let id = AddressId(id?.0);
    let Json(patch) = patch?;
    Ok(Json(
        blocking(&state, move |book| book.update(id, &patch)).await?,
    ))
}

async fn delete_address(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let id = AddressId(id?.0);
    blocking(&state, move |book| book.delete(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_addresses(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AddressWithDistance>>> {
    let Query(SearchQuery {
        lat,
        lon,
        radius_km,
    }) = query?;
    radius_search(&state, lat, lon, radius_km).await
}

async fn nearby_addresses(
    State(state): State<AppState>,
    body: Result<Json<LocationQuery>, JsonRejection>,
) -> ApiResult<Json<Vec<AddressWithDistance>>> {
    let Json(LocationQuery {
        latitude,
        longitude,
        radius_km,
    }) = body?;
    radius_search(&state, latitude, longitude, radius_km).await
}

async fn radius_search(
    state: &AppState,
    lat: f64,
    lon: f64,
    radius_km: f64,
) -> ApiResult<Json<Vec<AddressWithDistance>>> {
    let hits = blocking(state, move |book| book.search(lat, lon, radius_km)).await?;
    Ok(Json(
        hits.into_iter()
            .map(|hit| AddressWithDistance::new(hit, radius_km))
            .collect(),
    ))
}
