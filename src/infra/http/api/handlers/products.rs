//! Product handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use vitrine_api_types::{
    MessageResponse, ProductCreateRequest, ProductListQuery, ProductListResponse,
    ProductUpdateRequest,
};

use crate::application::pagination::PageRequest;
use crate::application::repos::ProductQueryFilter;
use crate::domain::products::ProductDraft;

use super::{
    json_rejection_to_api, pagination_to_api, parse_product_id, product_to_api,
    query_rejection_to_api,
};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn create_product(
    State(state): State<ApiState>,
    payload: Result<Json<ProductCreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(json_rejection_to_api)?;

    let draft = ProductDraft {
        user_id: payload.user_id,
        name: payload.name,
        description: payload.description,
        images: payload.images,
        price: payload.price,
    };

    let product = state.products.create(draft).await.map_err(product_to_api)?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_product_id(&id)?;
    let product = state.products.get(id).await.map_err(product_to_api)?;
    Ok(Json(product))
}

pub async fn list_products(
    State(state): State<ApiState>,
    query: Result<Query<ProductListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(query_rejection_to_api)?;

    let page = PageRequest::from_query(query.page, query.limit).map_err(pagination_to_api)?;
    let filter = ProductQueryFilter {
        name: query.name,
        min_price: query.min_price,
        max_price: query.max_price,
    };

    let listing = state
        .products
        .list(filter, page)
        .await
        .map_err(product_to_api)?;

    Ok(Json(ProductListResponse {
        page: listing.page.page,
        limit: listing.page.limit,
        total: listing.total,
        products: listing.products,
    }))
}

pub async fn update_product(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_product_id(&id)?;
    let Json(payload) = payload.map_err(json_rejection_to_api)?;

    let draft = ProductDraft {
        user_id: payload.user_id,
        name: payload.name,
        description: payload.description,
        images: payload.images,
        price: payload.price,
    };

    let product = state
        .products
        .update(id, draft)
        .await
        .map_err(product_to_api)?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_product_id(&id)?;
    state.products.delete(id).await.map_err(product_to_api)?;

    Ok(Json(MessageResponse {
        message: "Product deleted successfully".to_string(),
    }))
}
