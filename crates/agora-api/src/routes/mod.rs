use axum::{
    Json, Router, middleware,
    routing::{delete, get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;

pub mod chat;
pub mod comments;
pub mod notifications;
pub mod polls;
pub mod presence;

/// All REST routes. Everything except `/health` needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        // Comments
        .route("/subjects/{subject_id}/comments", get(comments::list_thread).post(comments::create_comment))
        .route(
            "/comments/{comment_id}",
            get(comments::get_comment).patch(comments::edit_comment).delete(comments::delete_comment),
        )
        .route("/comments/{comment_id}/like", post(comments::toggle_like))
        .route(
            "/comments/{comment_id}/reactions/{emoji}",
            put(comments::add_reaction).delete(comments::remove_reaction),
        )
        // Chat
        .route("/conversations", post(chat::open_conversation))
        .route("/conversations/{conversation_id}", get(chat::get_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(chat::get_messages).post(chat::send_message),
        )
        .route(
            "/messages/{message_id}",
            get(chat::get_message).patch(chat::edit_message).delete(chat::delete_message),
        )
        .route("/messages/{message_id}/like", post(chat::toggle_like))
        .route(
            "/messages/{message_id}/reactions/{emoji}",
            put(chat::add_reaction).delete(chat::remove_reaction),
        )
        // Polls
        .route("/polls", post(polls::create_poll))
        .route("/polls/{poll_id}", get(polls::get_poll))
        .route("/polls/{poll_id}/votes", post(polls::vote).delete(polls::retract_vote))
        // Presence
        .route("/presence", get(presence::online_users))
        .route("/presence/{user_id}", get(presence::user_presence))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/notifications/{notification_id}", delete(notifications::delete))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agora_db::Database;
    use agora_gateway::dispatcher::Dispatcher;
    use agora_gateway::registry::ConnectionRegistry;
    use agora_types::api::Claims;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::state::AppStateInner;

    const SECRET: &str = "router-test-secret";

    fn app() -> Router {
        app_with(Dispatcher::new(ConnectionRegistry::new()))
    }

    fn app_with(dispatcher: Dispatcher) -> Router {
        let db = Arc::new(Database::open_in_memory().unwrap());
        router(AppStateInner::new(db, dispatcher, SECRET.into()))
    }

    fn token(user: Uuid) -> String {
        let claims = Claims {
            sub: user,
            username: "tester".into(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn request(method: &str, uri: &str, user: Uuid, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = app();
        let res = app
            .clone()
            .oneshot(Request::builder().uri("/notifications").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn comment_thread_round_trip() {
        let app = app();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let subject = Uuid::new_v4();

        let (status, top) = send(
            &app,
            request("POST", &format!("/subjects/{subject}/comments"), alice, Some(serde_json::json!({ "body": "first" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let top_id = top["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            request(
                "POST",
                &format!("/subjects/{subject}/comments"),
                bob,
                Some(serde_json::json!({ "body": "reply", "parent_id": top_id })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, liked) = send(&app, request("POST", &format!("/comments/{top_id}/like"), bob, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(liked["liked"], true);

        let (status, _) = send(
            &app,
            request("PATCH", &format!("/comments/{top_id}"), bob, Some(serde_json::json!({ "body": "mine now" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, thread) = send(&app, request("GET", &format!("/subjects/{subject}/comments"), bob, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(thread[0]["like_count"], 1);
        assert_eq!(thread[0]["replies"].as_array().unwrap().len(), 1);

        let (status, deleted) = send(&app, request("DELETE", &format!("/comments/{top_id}"), alice, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["removed_ids"].as_array().unwrap().len(), 2);

        let (status, body) = send(&app, request("GET", &format!("/comments/{top_id}"), alice, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn polls_over_http() {
        let app = app();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (status, poll) = send(
            &app,
            request(
                "POST",
                "/polls",
                alice,
                Some(serde_json::json!({ "question": "Tabs?", "options": ["yes", "no"] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let poll_id = poll["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            request("POST", &format!("/polls/{poll_id}/votes"), bob, Some(serde_json::json!({ "option_index": 9 }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, poll) = send(
            &app,
            request("POST", &format!("/polls/{poll_id}/votes"), bob, Some(serde_json::json!({ "option_index": 0 }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(poll["options"][0]["percentage"], 100);

        let (status, unread) = send(&app, request("GET", "/notifications/unread", alice, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unread["unread"], 1);
    }

    #[tokio::test]
    async fn strangers_cannot_read_conversations() {
        let app = app();
        let (alice, bob, mallory) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let (status, conv) = send(
            &app,
            request("POST", "/conversations", alice, Some(serde_json::json!({ "member_ids": [bob] }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let conv_id = conv["id"].as_str().unwrap().to_string();

        let (status, msg) = send(
            &app,
            request(
                "POST",
                &format!("/conversations/{conv_id}/messages"),
                bob,
                Some(serde_json::json!({ "body": "hey" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let msg_id = msg["id"].as_str().unwrap().to_string();

        let (status, reacted) =
            send(&app, request("PUT", &format!("/messages/{msg_id}/reactions/%F0%9F%91%8D"), alice, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reacted["changed"], true);
        assert_eq!(reacted["reactions"][0]["emoji"], "👍");

        let (status, _) = send(&app, request("GET", &format!("/conversations/{conv_id}/messages"), mallory, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, page) =
            send(&app, request("GET", &format!("/conversations/{conv_id}/messages?limit=10"), alice, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn presence_reflects_live_connections() {
        let dispatcher = Dispatcher::new(ConnectionRegistry::new());
        let app = app_with(dispatcher.clone());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (tx, _rx) = tokio::sync::mpsc::channel::<agora_gateway::registry::OutboundEvent>(4);
        dispatcher
            .registry()
            .register(bob, agora_gateway::registry::ConnectionId::new(), Arc::new(tx))
            .await;

        let (status, online) = send(&app, request("GET", &format!("/presence/{bob}"), alice, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(online["online"], true);

        let (_, offline) = send(&app, request("GET", &format!("/presence/{alice}"), bob, None)).await;
        assert_eq!(offline["online"], false);

        let (_, all) = send(&app, request("GET", "/presence", alice, None)).await;
        assert_eq!(all["user_ids"], serde_json::json!([bob]));
        assert_eq!(all["connections"], 1);
    }
}
