use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Envelope for every successful JSON body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Default, Serialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    /// Number of systems with a running poller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked: Option<usize>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            metadata: None,
            status: StatusCode::OK,
        }
    }

    /// 202 for requests that were queued rather than completed.
    pub fn accepted(data: T) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            ..Self::success(data)
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.metadata.get_or_insert_with(Default::default).total_count = Some(count);
        self
    }

    pub fn with_tracked(mut self, tracked: usize) -> Self {
        self.metadata.get_or_insert_with(Default::default).tracked = Some(tracked);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response() {
        let response = ApiResponse::success("data");
        assert!(response.success);
        assert_eq!(response.data, "data");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.metadata.is_none());
    }

    #[test]
    fn accepted_response() {
        let response = ApiResponse::accepted(1);
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.success);
    }

    #[test]
    fn metadata_accumulates() {
        let response = ApiResponse::success(()).with_count(3).with_tracked(2);
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.total_count, Some(3));
        assert_eq!(metadata.tracked, Some(2));
    }

    #[test]
    fn status_is_not_serialized() {
        let json = serde_json::to_value(ApiResponse::accepted("x")).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["data"], "x");
    }
}
