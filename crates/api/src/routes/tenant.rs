//! Tenant, user and configuration lookups

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chatrelay_shared::{
    ActiveUser, ConfigurationOption, TechnicalUserPermissions, Tenant, TestProfile,
};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantListQuery {
    pub include_logo: Option<String>,
}

/// List tenants; logos are included unless `includeLogo=false`
pub async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantListQuery>,
) -> Json<Vec<Tenant>> {
    let include_logo = query.include_logo.as_deref() != Some("false");
    Json(state.catalog.tenants(include_logo))
}

pub async fn active_user(State(state): State<AppState>) -> Json<ActiveUser> {
    Json(state.catalog.active_user().clone())
}

pub async fn current_technical_user(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<TechnicalUserPermissions> {
    Json(state.catalog.permissions(&tenant_id))
}

pub async fn configurations(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<Vec<ConfigurationOption>> {
    Json(state.catalog.configurations(&tenant_id))
}

pub async fn test_profiles(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<Vec<TestProfile>> {
    Json(state.catalog.test_profiles(&tenant_id))
}
