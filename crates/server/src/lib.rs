use api_types::error::{ErrorBody, Violation};
use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

pub use server::{ServerState, router, run, run_with_listener, spawn_with_listener};

mod accounts;
mod activities;
mod context;
mod memberships;
mod permissions;
mod server;
mod session;
mod transactions;

pub enum ServerError {
    Engine(EngineError),
    /// The route needs an authenticated principal.
    Unauthorized,
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::InsufficientFunds { .. } => StatusCode::CONFLICT,
        EngineError::Locked { .. } => StatusCode::LOCKED,
        EngineError::Validation(_)
        | EngineError::BalanceOutOfRange { .. }
        | EngineError::InactiveEndpoint { .. }
        | EngineError::MissingParentMembership { .. }
        | EngineError::InvalidQuery(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::ConservationViolation(_) | EngineError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn body_for_engine_error(err: EngineError) -> ErrorBody {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            ErrorBody {
                error: "internal server error".to_string(),
                violations: Vec::new(),
            }
        }
        EngineError::ConservationViolation(detail) => {
            tracing::error!("conservation violated: {detail}");
            ErrorBody {
                error: "internal server error".to_string(),
                violations: Vec::new(),
            }
        }
        EngineError::Validation(errors) => ErrorBody {
            error: "validation failed".to_string(),
            violations: errors
                .0
                .into_iter()
                .map(|v| Violation {
                    field: v.field,
                    code: v.code,
                    message: v.message,
                })
                .collect(),
        },
        other => ErrorBody {
            error: other.to_string(),
            violations: Vec::new(),
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), body_for_engine_error(err)),
            ServerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "authentication required".to_string(),
                    violations: Vec::new(),
                },
            ),
            ServerError::Generic(error) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error,
                    violations: Vec::new(),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::ValidationErrors;
    use http_body_util::BodyExt;

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn permission_denied_maps_to_403() {
        let res = ServerError::from(EngineError::PermissionDenied {
            model: "transaction".to_string(),
            op: "add".to_string(),
            field: None,
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn not_found_maps_to_404() {
        let res = ServerError::from(EngineError::NotFound {
            kind: "alias".to_string(),
            key: "x".to_string(),
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn insufficient_funds_maps_to_409() {
        let res = ServerError::from(EngineError::InsufficientFunds {
            user: 1,
            required: 100,
            available: 0,
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn locked_maps_to_423() {
        let res = ServerError::from(EngineError::Locked {
            entity: "invoice".to_string(),
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn validation_lists_every_violation() {
        let mut errors = ValidationErrors::default();
        errors.push("quantity", "invalid_quantity", "quantity must be positive");
        errors.push("amount", "invalid_amount", "amount must not be negative");
        let res = ServerError::from(EngineError::Validation(errors)).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(res).await;
        let codes: Vec<&str> = body["violations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["invalid_quantity", "invalid_amount"]);
    }

    #[tokio::test]
    async fn database_errors_are_masked() {
        let res = ServerError::from(EngineError::Database(sea_orm::DbErr::Custom(
            "disk on fire".to_string(),
        )))
        .into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res).await["error"], "internal server error");
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
