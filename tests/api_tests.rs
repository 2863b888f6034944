/// End-to-end tests driving the router in-process
use aura_server::{
    config::ServerConfig, context::AppContext, push::LogPushGateway, server::build_router,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";
const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

struct TestApp {
    router: Router,
    _dir: TempDir,
}

struct User {
    uid: String,
    token: String,
}

async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::new(dir.path().to_path_buf(), JWT_SECRET.to_string());
    config.rate_limit.enabled = false;

    let ctx = AppContext::with_gateway(config, Arc::new(LogPushGateway))
        .await
        .unwrap();

    TestApp {
        router: build_router(ctx),
        _dir: dir,
    }
}

async fn into_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

impl TestApp {
    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, into_json(response).await)
    }

    async fn signup(&self, username: &str) -> User {
        let (status, body) = self
            .request(
                Method::POST,
                "/v1/auth/signup",
                None,
                Some(json!({
                    "email": format!("{}@example.com", username),
                    "password": "hunter22",
                    "username": username,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);

        User {
            uid: body["session"]["uid"].as_str().unwrap().to_string(),
            token: body["session"]["accessJwt"].as_str().unwrap().to_string(),
        }
    }
}

#[tokio::test]
async fn test_health_and_fallback() {
    let app = spawn_app().await;

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.request(Method::GET, "/v1/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = spawn_app().await;

    let (status, body) = app.request(Method::GET, "/v1/feed", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationRequired");

    let (status, _) = app
        .request(Method::GET, "/v1/feed", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_login_and_duplicate_username() {
    let app = spawn_app().await;
    let alice = app.signup("alice").await;

    let (status, body) = app
        .request(Method::GET, "/v1/auth/session", Some(&alice.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["email"], "alice@example.com");
    assert_eq!(body["profile"]["username"], "alice");
    assert!(body["profile"].get("email").is_none());

    let (status, body) = app
        .request(
            Method::POST,
            "/v1/auth/signup",
            None,
            Some(json!({ "email": "other@example.com", "password": "hunter22", "username": "alice" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (status, _) = app
        .request(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "ALICE@example.com", "password": "hunter22" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], alice.uid.as_str());
}

#[tokio::test]
async fn test_follow_post_like_feed_and_notifications() {
    let app = spawn_app().await;
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;

    let follow_uri = format!("/v1/profiles/{}/follow", alice.uid);
    let (status, body) = app
        .request(Method::POST, &follow_uri, Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "active": true, "changed": true }));

    let (_, profile) = app
        .request(Method::GET, &format!("/v1/profiles/{}", alice.uid), Some(&bob.token), None)
        .await;
    assert_eq!(profile["followersCount"], 1);

    let (status, post) = app
        .request(
            Method::POST,
            "/v1/posts",
            Some(&alice.token),
            Some(json!({ "caption": "hello world" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["id"].as_str().unwrap().to_string();

    let like_uri = format!("/v1/posts/{}/like", post_id);
    let (_, first) = app
        .request(Method::PUT, &like_uri, Some(&bob.token), Some(json!({ "active": true })))
        .await;
    let (_, second) = app
        .request(Method::PUT, &like_uri, Some(&bob.token), Some(json!({ "active": true })))
        .await;
    assert_eq!(first["changed"], true);
    assert_eq!(second["changed"], false);

    let (status, feed) = app
        .request(Method::GET, "/v1/feed", Some(&bob.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = feed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], post_id.as_str());
    assert_eq!(items[0]["likeCount"], 1);
    assert_eq!(items[0]["likedByViewer"], true);
    assert_eq!(items[0]["author"]["username"], "alice");

    let (_, unread) = app
        .request(Method::GET, "/v1/notifications/unread", Some(&alice.token), None)
        .await;
    assert_eq!(unread["count"], 2);

    let (_, notifications) = app
        .request(Method::GET, "/v1/notifications", Some(&alice.token), None)
        .await;
    let mut kinds: Vec<&str> = notifications
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["follow", "like"]);

    // Listing leaves them unread
    let (_, unread) = app
        .request(Method::GET, "/v1/notifications/unread", Some(&alice.token), None)
        .await;
    assert_eq!(unread["count"], 2);

    let (status, body) = app
        .request(Method::POST, "/v1/notifications/read", Some(&alice.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);

    let (_, unread) = app
        .request(Method::GET, "/v1/notifications/unread", Some(&alice.token), None)
        .await;
    assert_eq!(unread["count"], 0);

    let (_, body) = app
        .request(Method::POST, &follow_uri, Some(&bob.token), None)
        .await;
    assert_eq!(body, json!({ "active": false, "changed": true }));
    let (_, profile) = app
        .request(Method::GET, "/v1/profile", Some(&alice.token), None)
        .await;
    assert_eq!(profile["followersCount"], 0);
}

#[tokio::test]
async fn test_comments_and_chats() {
    let app = spawn_app().await;
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;

    let (_, post) = app
        .request(
            Method::POST,
            "/v1/posts",
            Some(&alice.token),
            Some(json!({ "caption": "comment on me" })),
        )
        .await;
    let comments_uri = format!("/v1/posts/{}/comments", post["id"].as_str().unwrap());

    let (status, _) = app
        .request(Method::POST, &comments_uri, Some(&bob.token), Some(json!({ "text": "nice" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, comments) = app
        .request(Method::GET, &comments_uri, Some(&alice.token), None)
        .await;
    assert_eq!(comments[0]["text"], "nice");
    assert_eq!(comments[0]["author"]["username"], "bob");

    let (status, chat) = app
        .request(Method::POST, "/v1/chats", Some(&alice.token), Some(json!({ "uid": bob.uid })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let messages_uri = format!("/v1/chats/{}/messages", chat["id"].as_str().unwrap());

    let (status, _) = app
        .request(Method::POST, &messages_uri, Some(&alice.token), Some(json!({ "text": "hi bob" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, messages) = app
        .request(Method::GET, &messages_uri, Some(&bob.token), None)
        .await;
    assert_eq!(messages[0]["text"], "hi bob");

    let (_, chats) = app
        .request(Method::GET, "/v1/chats", Some(&bob.token), None)
        .await;
    assert_eq!(chats[0]["lastMessage"], "hi bob");
    assert_eq!(chats[0]["other"]["username"], "alice");
}

#[tokio::test]
async fn test_private_profile_hides_posts_from_strangers() {
    let app = spawn_app().await;
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;

    let (status, _) = app
        .request(Method::PUT, "/v1/profile", Some(&alice.token), Some(json!({ "isPrivate": true })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let posts_uri = format!("/v1/profiles/{}/posts", alice.uid);
    let (status, _) = app.request(Method::GET, &posts_uri, Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request(Method::GET, &posts_uri, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_avatar_upload_updates_profile_and_serves_with_etag() {
    let app = spawn_app().await;
    let alice = app.signup("alice").await;

    let mut image = PNG_HEADER.to_vec();
    image.extend_from_slice(&[0u8; 64]);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/media/avatar")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(image.clone()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let media = into_json(response).await;
    assert_eq!(
        media["path"],
        format!("profilePictures/{}/profile.jpg", alice.uid)
    );

    let (_, profile) = app
        .request(Method::GET, "/v1/profile", Some(&alice.token), None)
        .await;
    assert_eq!(profile["photoUrl"], media["url"]);

    let media_uri = format!("/media/{}", media["path"].as_str().unwrap());
    let response = app
        .router
        .clone()
        .oneshot(Request::get(&media_uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let etag = response.headers()[header::ETAG].clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), image.as_slice());

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(&media_uri)
                .header(header::IF_NONE_MATCH, etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/media/post")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("not an image"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
