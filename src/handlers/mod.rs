//! HTTP request handlers (route handlers).
//!
//! Handlers are thin: extract the request, call the ledger or account
//! service with the authenticated user, and map the result to JSON.

use axum::extract::FromRequest;

use crate::error::AppError;

/// Account lifecycle, balance and history endpoints
pub mod accounts;
/// Debit, credit and transfer endpoints
pub mod entries;
pub mod health;

/// JSON request body whose rejections (malformed JSON, unknown enum values,
/// missing fields) are answered as `AppError::InvalidRequest`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use axum::{
        body::{self, Body},
        http::{Request, StatusCode, header},
        response::IntoResponse,
    };

    use super::*;
    use crate::models::account::CreateAccountRequest;
    use crate::models::entry::EntryRequest;

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn rejection_of<T>(body: &str) -> (StatusCode, serde_json::Value)
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let err = match ApiJson::<T>::from_request(json_request(body), &()).await {
            Ok(_) => panic!("body should have been rejected: {body}"),
            Err(err) => err,
        };
        let response = err.into_response();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unknown_entry_kind_is_a_bad_request() {
        let (status, body) =
            rejection_of::<EntryRequest>(r#"{"account_id":1,"kind":"refund","amount_cents":10}"#)
                .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
        assert!(body["error"]["message"].as_str().unwrap().contains("refund"));
    }

    #[tokio::test]
    async fn unknown_account_type_is_a_bad_request() {
        let (status, body) =
            rejection_of::<CreateAccountRequest>(r#"{"account_type":"brokerage"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (status, body) = rejection_of::<EntryRequest>(r#"{"account_id":"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn valid_body_is_extracted() {
        let ApiJson(request) = ApiJson::<EntryRequest>::from_request(
            json_request(r#"{"account_id":7,"kind":"credit","amount_cents":250}"#),
            &(),
        )
        .await
        .unwrap();

        assert_eq!(request.account_id, 7);
        assert_eq!(request.amount_cents, 250);
        assert!(request.description.is_empty());
    }
}
