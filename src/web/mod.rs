pub mod admin;
pub mod assessments;
pub mod auth;
pub mod dashboard;
pub mod forms;
pub mod session;
pub mod tables;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/forms", forms::router(state.clone()))
        .nest("/tables", tables::router(state.clone()))
        .nest("/assessments", assessments::router(state.clone()))
        .nest("/dashboard", dashboard::router(state.clone()))
        .nest("/charts", dashboard::charts_router(state.clone()))
        .nest("/admin", admin::router(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Store};
    use crate::domain::models::{FieldType, FormKind, NewFormDefinition, NewFormField, User};
    use crate::testing::{cast, session_key, state_with, TEST_CODE};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn bearer(user: &User) -> String {
        let token = session::sign_session(user.id, &session_key()).unwrap();
        format!("Bearer {token}")
    }

    fn request(method: Method, uri: &str, user: Option<&User>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, bearer(user));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn form_with_fields(store: &MemoryStore, owner: &User) -> (i64, Vec<i64>) {
        let form = store
            .insert_definition(NewFormDefinition {
                name: "Intake".to_string(),
                description: String::new(),
                kind: FormKind::Generic,
                is_system: false,
                created_by: Some(owner.id),
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for (key, required) in [("name", true), ("notes", false)] {
            let field = store
                .insert_field(NewFormField {
                    form_id: form.id,
                    key: key.to_string(),
                    label: key.to_string(),
                    field_type: FieldType::Text,
                    required,
                    choices_text: String::new(),
                    is_displayed: true,
                })
                .await
                .unwrap();
            ids.push(field.id);
        }
        (form.id, ids)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = routes(state_with(MemoryStore::new()));
        let response = app
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthorized() {
        let app = routes(state_with(MemoryStore::new()));
        let (status, _) = send(&app, request(Method::GET, "/forms", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_landing() {
        let store = MemoryStore::new();
        cast(&store).await;
        let app = routes(state_with(store));

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": " Volunteer@Example.org ", "code": TEST_CODE})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["landing"], "forms");
        assert_eq!(body["role"], "VOLUNTEER");

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": "staff@example.org", "code": TEST_CODE})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["landing"], "dashboard");
    }

    #[tokio::test]
    async fn test_login_rejects_bad_code_then_rate_limits() {
        let store = MemoryStore::new();
        cast(&store).await;
        let app = routes(state_with(store));
        let attempt = || {
            request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": "staff@example.org", "code": "0000"})),
            )
        };

        for _ in 0..5 {
            let (status, _) = send(&app, attempt()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _) = send(&app, attempt()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_successful_login_restarts_the_attempt_count() {
        let store = MemoryStore::new();
        cast(&store).await;
        let app = routes(state_with(store));
        let attempt = |code: &str| {
            request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": "staff@example.org", "code": code})),
            )
        };

        for _ in 0..4 {
            let (status, _) = send(&app, attempt("0000")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _) = send(&app, attempt(TEST_CODE)).await;
        assert_eq!(status, StatusCode::OK);

        for _ in 0..5 {
            let (status, _) = send(&app, attempt("0000")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _) = send(&app, attempt("0000")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_cookie_session_is_accepted() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let app = routes(state_with(store));
        let token = session::sign_session(people.staff.id, &session_key()).unwrap();

        let req = Request::builder()
            .uri("/dashboard")
            .header(header::COOKIE, format!("session={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_health_checks"], 0);
    }

    #[tokio::test]
    async fn test_inactive_user_session_is_rejected() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        store.set_user_active(people.staff.id, false).await.unwrap();
        let app = routes(state_with(store));

        let (status, _) = send(&app, request(Method::GET, "/forms", Some(&people.staff), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_volunteer_sees_tables_as_not_found() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let app = routes(state_with(store));

        for uri in ["/tables", "/tables/healthchecks", "/charts/people"] {
            let (status, body) =
                send(&app, request(Method::GET, uri, Some(&people.volunteer), None)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, json!({"ok": false, "error": "not found"}));
        }

        let (status, body) =
            send(&app, request(Method::GET, "/tables/unknown", Some(&people.staff), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"ok": false, "error": "not found"}));
    }

    #[tokio::test]
    async fn test_table_listing_reports_can_add() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let app = routes(state_with(store));

        let (status, body) =
            send(&app, request(Method::GET, "/tables", Some(&people.manager), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["key"], "healthchecks");
        assert_eq!(body[0]["can_add"], true);

        let (_, body) = send(&app, request(Method::GET, "/tables", Some(&people.staff), None)).await;
        assert_eq!(body[1]["key"], "diabetes");
        assert_eq!(body[1]["can_add"], false);
    }

    #[tokio::test]
    async fn test_reorder_contract() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let (form_id, ids) = form_with_fields(&store, &people.admin).await;
        let app = routes(state_with(store));
        let uri = format!("/forms/{form_id}/reorder");

        let (status, body) = send(
            &app,
            request(Method::POST, &uri, Some(&people.admin), Some(json!({"ids": ["x", 1]}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                &uri,
                Some(&people.admin),
                Some(json!({"ids": [ids[1], ids[0]]})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (_, schema) = send(
            &app,
            request(Method::GET, &format!("/forms/{form_id}/schema"), Some(&people.admin), None),
        )
        .await;
        assert_eq!(schema[0]["key"], "notes");
        assert_eq!(schema[1]["key"], "name");
    }

    #[tokio::test]
    async fn test_invalid_submission_echoes_values() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let (form_id, _) = form_with_fields(&store, &people.admin).await;
        let app = routes(state_with(store));
        let uri = format!("/forms/{form_id}/submissions");

        let (status, body) = send(
            &app,
            request(Method::POST, &uri, Some(&people.volunteer), Some(json!({"notes": "hello"}))),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["ok"], false);
        assert_eq!(body["errors"]["name"][0], "This field is required.");
        assert_eq!(body["values"]["notes"], "hello");

        let (status, _) = send(
            &app,
            request(Method::POST, &uri, Some(&people.volunteer), Some(json!({"name": "Ann"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_admin_routes_hidden_from_staff() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let app = routes(state_with(store));
        let uri = format!("/admin/users/{}/deactivate", people.other_staff.id);

        let (status, _) = send(&app, request(Method::POST, &uri, Some(&people.staff), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, request(Method::POST, &uri, Some(&people.admin), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, _) =
            send(&app, request(Method::GET, "/forms", Some(&people.other_staff), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_chart_selection_is_bad_request() {
        let store = MemoryStore::new();
        let people = cast(&store).await;
        let app = routes(state_with(store));

        let (status, body) = send(
            &app,
            request(
                Method::GET,
                "/charts/data?mode=correlation&x=systolic&y=shoe_size",
                Some(&people.staff),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"ok": false, "error": "Invalid x/y"}));
    }
}
