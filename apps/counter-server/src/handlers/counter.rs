//! Counter actor endpoint.

use actix_web::{HttpRequest, HttpResponse, error::InternalError, error::JsonPayloadError, web};
use folio_core::domain::CounterOp;
use folio_core::ports::CounterActor;
use folio_shared::ErrorResponse;

use crate::middleware::error::AppResult;
use crate::state::AppState;

/// Run one operation against the actor for `key`.
///
/// POST /api/counters/{key}
///
/// A denial is a normal 200 reply with `allowed: false`. Malformed operations
/// get a 400 problem body; storage failures get a 503.
pub async fn call_counter(
    state: web::Data<AppState>,
    key: web::Path<String>,
    op: web::Json<CounterOp>,
) -> AppResult<HttpResponse> {
    let key = key.into_inner();
    let op = op.into_inner();

    tracing::debug!(key = %key, op = op.name(), "Counter call");
    let reply = state.actors.call(&key, op).await?;

    Ok(HttpResponse::Ok().json(reply))
}

/// Turn an undecodable operation body into a 400 problem response.
pub fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    let body = ErrorResponse::bad_request(err.to_string()).with_instance(req.path());
    InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{App, HttpServer, http::StatusCode, test};
    use folio_core::policy::{PolicyConfig, RateLimitPolicy};
    use folio_infra::{HttpCounterClient, HttpCounterConfig, InMemoryCounterStorage};
    use serde_json::{Value, json};

    use super::*;
    use crate::config::StorageBackend;
    use crate::handlers::configure_routes;

    fn memory_state() -> AppState {
        AppState::with_storage(
            Arc::new(InMemoryCounterStorage::new()),
            StorageBackend::Memory,
            Default::default(),
        )
    }

    #[actix_web::test]
    async fn test_window_denial_is_a_normal_reply() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(memory_state()))
                .configure(configure_routes),
        )
        .await;

        let op = json!({"op": "incrementWindow", "limit": 1, "windowSeconds": 60});

        let req = test::TestRequest::post()
            .uri("/api/counters/ip:1.2.3.4:magic_link")
            .set_json(&op)
            .to_request();
        let first: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first["allowed"], true);
        assert_eq!(first["remaining"], 0);
        assert_eq!(first["count"], 1);

        let req = test::TestRequest::post()
            .uri("/api/counters/ip:1.2.3.4:magic_link")
            .set_json(&op)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let second: Value = test::read_body_json(resp).await;
        assert_eq!(second["allowed"], false);
        assert_eq!(second["count"], 1);
    }

    #[actix_web::test]
    async fn test_invalid_operation_is_a_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(memory_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/counters/user:42:message_cooldown")
            .set_json(json!({"op": "checkCooldown", "cooldownSeconds": 0}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, 400);

        let req = test::TestRequest::post()
            .uri("/api/counters/user:42:message_cooldown")
            .set_json(json!({"op": "reset"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(
            body.instance.as_deref(),
            Some("/api/counters/user:42:message_cooldown")
        );
    }

    #[actix_web::test]
    async fn test_oversized_window_is_a_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(memory_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/counters/ip:1.2.3.4:messages")
            .set_json(json!({
                "op": "incrementWindow",
                "limit": 1,
                "windowSeconds": 9223372036854775807i64
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.detail.unwrap_or_default().contains("windowSeconds"));

        // The key still answers normal calls.
        let req = test::TestRequest::post()
            .uri("/api/counters/ip:1.2.3.4:messages")
            .set_json(json!({"op": "incrementWindow", "limit": 1, "windowSeconds": 60}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["allowed"], true);
    }

    #[actix_web::test]
    async fn test_health_reports_storage_and_actors() {
        let state = memory_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes),
        )
        .await;

        state.actors.peek("ip:9.9.9.9:messages").await.unwrap();

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "memory");
        assert_eq!(body["live_actors"], 1);
    }

    #[actix_web::test]
    async fn test_http_client_against_running_server() {
        let state = memory_state();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes)
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let handle = server.run();
        let server_handle = handle.handle();
        actix_rt::spawn(handle);

        let client = HttpCounterClient::new(HttpCounterConfig {
            base_url: format!("http://{addr}"),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let first = client.check_cooldown("email:user@x.com:magic_link:cooldown", 60).await.unwrap();
        assert!(first.allowed);
        let second = client.check_cooldown("email:user@x.com:magic_link:cooldown", 60).await.unwrap();
        assert!(!second.allowed);
        assert!(second.remaining_seconds > 0);

        let err = client.increment_window("ip:1.2.3.4:messages", 0, 60).await.unwrap_err();
        assert!(err.is_client_error());

        // The policy sees the remote actor exactly as a local one.
        let policy = RateLimitPolicy::new(Arc::new(client), PolicyConfig::default());
        let allowance = policy.check_magic_link_send("New@X.com").await.unwrap();
        assert_eq!(allowance.message(), "登录链接已发送，本小时还剩 2 次");
        assert!(policy.check_magic_link_send("new@x.com").await.is_err());

        server_handle.stop(true).await;
    }
}
