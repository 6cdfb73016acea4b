// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::job_repository::JobRepository;
use crate::engines::collection::CollectionCoordinator;
use crate::infrastructure::result_sink::InMemoryResultSink;
use crate::presentation::handlers::{collect_handler, job_handler};
use crate::scheduler::SchedulerHandle;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 管理接口依赖的服务
#[derive(Clone)]
pub struct AdminServices {
    pub jobs: Arc<dyn JobRepository>,
    pub scheduler: SchedulerHandle,
    pub coordinator: Arc<CollectionCoordinator>,
    pub results: Arc<InMemoryResultSink>,
}

/// 创建应用路由
///
/// 任务的写操作经由调度器句柄串行执行，读操作直接查询仓库。
pub fn routes(services: AdminServices) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let admin_routes = Router::new()
        .route(
            "/v1/jobs",
            get(job_handler::list_jobs).post(job_handler::create_job),
        )
        .route(
            "/v1/jobs/{id}",
            get(job_handler::get_job)
                .put(job_handler::update_job)
                .delete(job_handler::delete_job),
        )
        .route("/v1/jobs/{id}/cancel", post(job_handler::cancel_job))
        .route("/v1/jobs/{id}/result", get(job_handler::get_job_result))
        .route("/v1/scheduler/status", get(job_handler::scheduler_status))
        .route("/v1/collect", post(collect_handler::collect))
        .route("/v1/identities", get(collect_handler::list_identities))
        .layer(Extension(services.jobs))
        .layer(Extension(services.scheduler))
        .layer(Extension(services.coordinator))
        .layer(Extension(services.results));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
