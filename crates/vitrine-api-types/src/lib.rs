//! Request and response payloads shared by the vitrine server and its clients.

use serde::{Deserialize, Serialize};

/// Body of `POST /products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreateRequest {
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: f64,
}

/// Body of `PUT /products/{id}`. Every user-editable field is replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdateRequest {
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: f64,
}

/// Query string of `GET /products`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Paginated listing returned by `GET /products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductListResponse<P> {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub products: Vec<P>,
}

/// Query string of `GET /jobs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobListQuery {
    pub state: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}
