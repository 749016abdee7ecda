use std::sync::Arc;

use axum::response::IntoResponse;
use axum::Extension;

use crate::admin::service::{parse_api_error, AdminState, ApiResponse};

pub async fn get_addresses_handler(
    Extension(state): Extension<Arc<AdminState>>,
) -> impl IntoResponse {
    match state.source.addresses().await {
        Ok(addresses) => ApiResponse { payload: addresses }.into_response(),
        Err(err) => parse_api_error(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use apiary_network::Addresses;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use eyre::{bail, Result as EyreResult};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::admin::service::setup;
    use crate::admin::AddressSource;

    struct Fixed(Addresses);

    #[async_trait]
    impl AddressSource for Fixed {
        async fn addresses(&self) -> EyreResult<Addresses> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl AddressSource for Failing {
        async fn addresses(&self) -> EyreResult<Addresses> {
            bail!("event loop stopped")
        }
    }

    async fn request(source: Arc<dyn AddressSource>, method: Method) -> (StatusCode, Value) {
        let response = setup(source)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/addresses")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

        (status, body)
    }

    #[tokio::test]
    async fn test_get_addresses() {
        let overlay = "ca1e9f3938cc1425c6061b96ad9eb93e134dfe8734ad490164ef20af9d1cf59c"
            .parse()
            .unwrap();
        let underlay = "/ip4/127.0.0.1/tcp/1634/p2p/12D3KooWMgoF9xzyeKJHtRvrYwdomheRbHPELagWZwTLmXb6bCVC"
            .parse()
            .unwrap();

        let source = Arc::new(Fixed(Addresses::new(overlay, vec![underlay])));
        let (status, body) = request(source, Method::GET).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "overlay": "ca1e9f3938cc1425c6061b96ad9eb93e134dfe8734ad490164ef20af9d1cf59c",
                "underlay": [
                    "/ip4/127.0.0.1/tcp/1634/p2p/12D3KooWMgoF9xzyeKJHtRvrYwdomheRbHPELagWZwTLmXb6bCVC"
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let source = Arc::new(Fixed(Addresses::new([0; 32].into(), vec![])));
        let (status, body) = request(source, Method::POST).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body,
            json!({ "code": 405, "message": "Method Not Allowed" })
        );
    }

    #[tokio::test]
    async fn test_failing_query() {
        let (status, body) = request(Arc::new(Failing), Method::GET).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "code": 500, "message": "event loop stopped" })
        );
    }
}
