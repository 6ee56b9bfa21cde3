use crate::gateway::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::worker::{TaskRequest, TaskResult};
use crate::AppState;
use actix_web::{web, HttpResponse, Responder};

pub const EXECUTE_TASK_METHOD: &str = "ExecuteTask";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/rpc").route(web::post().to(rpc)));
    cfg.service(web::resource("/api/tasks/execute").route(web::post().to(execute_task)));
}

async fn run_task(state: &AppState, request: TaskRequest) -> TaskResult {
    state
        .dispatcher
        .execute_task_with_cancel(request, state.shutdown.child_token())
        .await
}

fn validate(request: &TaskRequest) -> Result<(), String> {
    if request.task_id.trim().is_empty() {
        return Err("task_id must not be empty".to_string());
    }
    Ok(())
}

/// REST alias: bare `TaskRequest` in, bare `TaskResult` out
async fn execute_task(state: web::Data<AppState>, body: web::Json<TaskRequest>) -> impl Responder {
    let request = body.into_inner();
    if let Err(message) = validate(&request) {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": message }));
    }
    HttpResponse::Ok().json(run_task(&state, request).await)
}

/// JSON-RPC endpoint. Task failures are successful RPCs carrying
/// `success = false`; only envelope problems become RPC errors.
async fn rpc(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("[RPC] Malformed envelope: {}", e);
            return HttpResponse::Ok().json(RpcResponse::error(String::new(), RpcError::parse_error()));
        }
    };

    if request.method != EXECUTE_TASK_METHOD {
        log::warn!("[RPC] Unknown method: {}", request.method);
        return HttpResponse::Ok().json(RpcResponse::error(request.id, RpcError::method_not_found()));
    }

    let task: TaskRequest = match serde_json::from_value(request.params) {
        Ok(t) => t,
        Err(e) => {
            return HttpResponse::Ok().json(RpcResponse::error(
                request.id,
                RpcError::invalid_params(format!("Invalid TaskRequest: {}", e)),
            ));
        }
    };
    if let Err(message) = validate(&task) {
        return HttpResponse::Ok().json(RpcResponse::error(request.id, RpcError::invalid_params(message)));
    }

    let result = run_task(&state, task).await;
    match serde_json::to_value(&result) {
        Ok(value) => HttpResponse::Ok().json(RpcResponse::success(request.id, value)),
        Err(e) => HttpResponse::Ok().json(RpcResponse::error(
            request.id,
            RpcError::internal_error(format!("Failed to encode TaskResult: {}", e)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedClient;
    use crate::config::Config;
    use crate::gateway::events::EventBroadcaster;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn state(client: Arc<ScriptedClient>) -> web::Data<AppState> {
        let config = Config::from_lookup(|key| {
            (key == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .unwrap();
        web::Data::new(AppState::new(
            config,
            client,
            Arc::new(EventBroadcaster::new()),
            CancellationToken::new(),
        ))
    }

    #[actix_web::test]
    async fn test_rest_execute() {
        let client = Arc::new(ScriptedClient::replies(&[
            r#"{"decision": "execute", "reason": "small"}"#,
            "A crisp tagline.",
        ]));
        let app = test::init_service(App::new().app_data(state(client)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/tasks/execute")
            .set_json(json!({
                "task_id": "t-rest",
                "persona_prompt": "You are a copywriter.",
                "task_instructions": "Write a tagline"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["task_id"], "t-rest");
        assert_eq!(body["success"], true);
        assert_eq!(body["final_content"], "A crisp tagline.");
    }

    #[actix_web::test]
    async fn test_rest_rejects_blank_task_id() {
        let client = Arc::new(ScriptedClient::replies(&[]));
        let app = test::init_service(App::new().app_data(state(client.clone())).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/tasks/execute")
            .set_json(json!({
                "task_id": " ",
                "persona_prompt": "p",
                "task_instructions": "i"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        assert_eq!(client.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_rpc_execute_task_delegates() {
        let client = Arc::new(ScriptedClient::replies(&[r#"{
            "decision": "delegate",
            "reason": "two parts",
            "sub_tasks": [{"requested_persona": "Analyst", "task_details": "Size the market"}]
        }"#]));
        let app = test::init_service(App::new().app_data(state(client)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/rpc")
            .set_json(json!({
                "id": "42",
                "method": "ExecuteTask",
                "params": {
                    "task_id": "t-rpc",
                    "persona_prompt": "You are a strategist.",
                    "task_instructions": "Plan a launch",
                    "can_delegate": true
                }
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["id"], "42");
        assert!(body.get("error").is_none());
        assert_eq!(body["result"]["success"], true);
        assert_eq!(body["result"]["sub_tasks"][0]["requested_persona"], "Analyst");
    }

    #[actix_web::test]
    async fn test_rpc_domain_failure_is_not_rpc_error() {
        let client = Arc::new(ScriptedClient::replies(&["garbage"]));
        let app = test::init_service(App::new().app_data(state(client)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/rpc")
            .set_json(json!({
                "id": "7",
                "method": "ExecuteTask",
                "params": {"task_id": "t-bad", "persona_prompt": "p", "task_instructions": "i"}
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert!(body.get("error").is_none());
        assert_eq!(body["result"]["success"], false);
        assert_eq!(body["result"]["error_kind"], "decision");
    }

    #[actix_web::test]
    async fn test_rpc_envelope_errors() {
        let client = Arc::new(ScriptedClient::replies(&[]));
        let app = test::init_service(App::new().app_data(state(client.clone())).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/rpc")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["error"]["code"], -32700);

        let req = test::TestRequest::post()
            .uri("/rpc")
            .set_json(json!({"id": "1", "method": "Shutdown"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["error"]["code"], -32601);

        let req = test::TestRequest::post()
            .uri("/rpc")
            .set_json(json!({"id": "2", "method": "ExecuteTask", "params": {"task_id": "x"}}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["error"]["code"], -32602);

        assert_eq!(client.call_count(), 0);
    }
}
