// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::report::CollectionResult;
use crate::domain::models::search_spec::SearchSpecification;
use crate::engines::collection::CollectionCoordinator;
use crate::presentation::errors::AppError;
use axum::{extract::Extension, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// 一次性采集
///
/// 同步执行采集并返回规范商家集合和平台报告。
pub async fn collect(
    Extension(coordinator): Extension<Arc<CollectionCoordinator>>,
    Json(spec): Json<SearchSpecification>,
) -> Result<Json<CollectionResult>, AppError> {
    info!(location = %spec.location, platforms = spec.platforms.len(), "One-shot collection requested");
    let result = coordinator.collect(&spec).await?;
    Ok(Json(result))
}

/// 身份池健康状况
pub async fn list_identities(
    Extension(coordinator): Extension<Arc<CollectionCoordinator>>,
) -> Json<serde_json::Value> {
    let pool = coordinator.identity_pool();
    Json(json!({
        "stats": pool.stats(),
        "identities": pool.snapshot(),
        "platforms": coordinator.platforms(),
    }))
}
