// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::models::job::DomainError;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::utils::errors::{CollectionError, SchedulerError};

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<SchedulerError>() {
            return match err {
                SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
                SchedulerError::JobRunning(_) => StatusCode::CONFLICT,
                SchedulerError::Domain(DomainError::ValidationError(_)) => StatusCode::BAD_REQUEST,
                SchedulerError::Domain(DomainError::InvalidStateTransition { .. }) => {
                    StatusCode::CONFLICT
                }
                SchedulerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SchedulerError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            };
        }
        if let Some(err) = self.0.downcast_ref::<CollectionError>() {
            return match err {
                CollectionError::InvalidSpecification(_) => StatusCode::BAD_REQUEST,
                CollectionError::MergeInputEmpty { .. } => StatusCode::BAD_GATEWAY,
                CollectionError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            };
        }
        match self.0.downcast_ref::<RepositoryError>() {
            Some(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self(anyhow::Error::new(RepositoryError::NotFound).context(format!("{} not found", what)))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = format!("{:#}", self.0);

        let mut body = json!({ "error": error_message });
        // 采集失败时附带每个平台的结果
        if let Some(report) = self
            .0
            .downcast_ref::<CollectionError>()
            .and_then(CollectionError::report)
        {
            body["report"] = json!(report);
        }
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %error_message, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
