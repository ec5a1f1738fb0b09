//! Training submission HTTP surface
//!
//! One route: the execute endpoint. Form selections ride the query string,
//! per-request credentials ride headers, and the request body is the raw CSV
//! dataset stream. The response is always a prompt `{ success, message }`
//! acknowledgement; the job itself finishes long after this request does.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::warn;

use crate::storage::AwsCredentials;
use crate::training::orchestrator::{ExecuteResponse, JobOrchestrator, RequestAuth};
use crate::training::params::TrainingFormParams;

pub const ACCESS_KEY_HEADER: &str = "x-aws-access-key-id";
pub const SECRET_KEY_HEADER: &str = "x-aws-secret-access-key";
pub const ROLE_ARN_HEADER: &str = "x-aws-role-arn";
pub const RECIPIENT_HEADER: &str = "x-notification-email";

pub fn training_routes() -> Router<Arc<JobOrchestrator>> {
    Router::new().route("/execute", post(execute))
}

#[tracing::instrument(skip_all)]
async fn execute(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Query(form): Query<TrainingFormParams>,
    headers: HeaderMap,
    body: Body,
) -> Json<ExecuteResponse> {
    let auth = match request_auth(&headers) {
        Ok(auth) => auth,
        Err(message) => {
            return Json(ExecuteResponse {
                success: false,
                message,
            })
        },
    };

    let dataset = StreamReader::new(
        body.into_data_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    );

    match orchestrator.execute(auth, form, dataset).await {
        Ok(ack) => Json(ack),
        Err(e) => {
            warn!(error = %e, "Training submission rejected");
            Json(ExecuteResponse {
                success: false,
                message: e.to_string(),
            })
        },
    }
}

fn request_auth(headers: &HeaderMap) -> Result<RequestAuth, String> {
    Ok(RequestAuth {
        credentials: AwsCredentials {
            access_key_id: required_header(headers, ACCESS_KEY_HEADER)?,
            secret_access_key: required_header(headers, SECRET_KEY_HEADER)?,
        },
        role_arn: required_header(headers, ROLE_ARN_HEADER)?,
        recipient: required_header(headers, RECIPIENT_HEADER)?,
    })
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String, String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| format!("Missing required header: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notify::{Notification, Notifier};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            Ok(())
        }
    }

    fn app() -> Router {
        let orchestrator =
            Arc::new(JobOrchestrator::new(&Config::default(), Arc::new(NullNotifier)));
        training_routes().with_state(orchestrator)
    }

    fn request(uri: &str, with_headers: bool) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if with_headers {
            builder = builder
                .header(ACCESS_KEY_HEADER, "AKIAEXAMPLE")
                .header(SECRET_KEY_HEADER, "secret")
                .header(ROLE_ARN_HEADER, "arn:aws:iam::123456789012:role/trainer")
                .header(RECIPIENT_HEADER, "user@example.com");
        }
        builder.body(Body::from("a,b\n1,2\n")).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_header_acknowledges_failure() {
        let response = app()
            .oneshot(request("/execute?modelName=churn&bucket=models", false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(
            json["message"],
            format!("Missing required header: {ACCESS_KEY_HEADER}")
        );
    }

    #[tokio::test]
    async fn test_validation_failure_acknowledges_with_message() {
        // bucket missing from the query string
        let response = app()
            .oneshot(request("/execute?modelName=churn", true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Missing required param: bucket");
    }

    #[tokio::test]
    async fn test_out_of_range_selection_is_reported_verbatim() {
        let response = app()
            .oneshot(request(
                "/execute?modelName=churn&bucket=models&maxRuntimeInHours=100",
                true,
            ))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(
            json["message"],
            "Param maxRuntimeInHours: 100 is out of range: 1 - 72"
        );
    }
}
