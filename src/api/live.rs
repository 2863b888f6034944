/// WebSocket live subscriptions
///
/// A client opens `/v1/live?topic=…&id=…` and receives a JSON snapshot frame
/// immediately and again after every committed change to that topic. Each
/// frame carries the full current result, never a diff.
///
/// Access is checked once, before the upgrade, so a client that may not see
/// the record gets an ordinary HTTP error instead of a socket.
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::{AuraError, AuraResult},
    live::{Subscription, Topic},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{future::Future, sync::Arc};
use tokio::{
    sync::mpsc,
    time::{interval, timeout, Duration},
};

const BUFFER_SIZE: usize = 16;
const SEND_TIMEOUT_MS: u64 = 5000;
const PING_INTERVAL_SECS: u64 = 30;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/v1/live", get(subscribe))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveTopic {
    Profile,
    Post,
    Like,
    Following,
    Comments,
    Notifications,
    Chat,
    Chats,
    Stories,
}

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    pub topic: LiveTopic,
    pub id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum LiveFrame {
    Snapshot {
        topic: LiveTopic,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: Value,
    },
    Error {
        message: String,
    },
}

fn snapshot<T: Serialize>(value: T) -> AuraResult<Value> {
    serde_json::to_value(value).map_err(|e| AuraError::Internal(e.to_string()))
}

fn require_id(params: &LiveParams) -> AuraResult<String> {
    params
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AuraError::Validation("Missing id parameter".to_string()))
}

/// The story bar changes with any story and with whom the viewer follows
fn stories_topics(viewer: &str) -> Vec<Topic> {
    vec![Topic::Stories, Topic::Following(viewer.to_string())]
}

/// Build a subscription whose fetch gets its own handle to the context
fn watch<F, Fut>(ctx: &AppContext, topics: Vec<Topic>, fetch: F) -> Subscription<Value>
where
    F: Fn(AppContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AuraResult<Value>> + Send + 'static,
{
    let fetch = Arc::new(fetch);
    let owned = ctx.clone();
    Subscription::new(&ctx.change_bus, topics, move || {
        let fetch = fetch.clone();
        let ctx = owned.clone();
        async move { fetch(ctx).await }
    })
}

/// Check access and build the subscription for one topic
async fn open_subscription(
    ctx: &AppContext,
    viewer: &str,
    params: &LiveParams,
) -> AuraResult<Subscription<Value>> {
    let viewer = viewer.to_string();

    let subscription = match params.topic {
        LiveTopic::Profile => {
            let uid = require_id(params)?;
            ctx.social.get_profile(&uid).await?;
            watch(ctx, vec![Topic::Profile(uid.clone())], move |ctx| {
                let uid = uid.clone();
                async move { snapshot(ctx.social.get_profile(&uid).await?) }
            })
        }
        LiveTopic::Post => {
            let post_id = require_id(params)?;
            ctx.social.get_post_for(&viewer, &post_id).await?;
            watch(ctx, vec![Topic::Post(post_id.clone())], move |ctx| {
                let post_id = post_id.clone();
                let viewer = viewer.clone();
                async move {
                    let post = ctx.social.get_post_for(&viewer, &post_id).await?;
                    snapshot(post.masked_for(&viewer))
                }
            })
        }
        LiveTopic::Like => {
            let post_id = require_id(params)?;
            ctx.social.get_post_for(&viewer, &post_id).await?;
            watch(ctx, vec![Topic::PostLikes(post_id.clone())], move |ctx| {
                let post_id = post_id.clone();
                let viewer = viewer.clone();
                async move {
                    let liked = ctx.social.has_liked(&viewer, &post_id).await?;
                    Ok(json!({ "liked": liked }))
                }
            })
        }
        LiveTopic::Following => {
            let target = require_id(params)?;
            watch(ctx, vec![Topic::Following(viewer.clone())], move |ctx| {
                let target = target.clone();
                let viewer = viewer.clone();
                async move {
                    let following = ctx.social.is_following(&viewer, &target).await?;
                    Ok(json!({ "following": following }))
                }
            })
        }
        LiveTopic::Comments => {
            let post_id = require_id(params)?;
            ctx.social.get_post_for(&viewer, &post_id).await?;
            watch(ctx, vec![Topic::Comments(post_id.clone())], move |ctx| {
                let post_id = post_id.clone();
                let viewer = viewer.clone();
                async move { snapshot(ctx.social.list_comments(&viewer, &post_id).await?) }
            })
        }
        LiveTopic::Notifications => {
            watch(ctx, vec![Topic::Notifications(viewer.clone())], move |ctx| {
                let viewer = viewer.clone();
                async move {
                    let count = ctx.social.unread_notification_count(&viewer).await?;
                    Ok(json!({ "count": count }))
                }
            })
        }
        LiveTopic::Chat => {
            let chat_id = require_id(params)?;
            ctx.social.get_chat(&viewer, &chat_id).await?;
            watch(ctx, vec![Topic::Chat(chat_id.clone())], move |ctx| {
                let chat_id = chat_id.clone();
                let viewer = viewer.clone();
                async move { snapshot(ctx.social.list_messages(&viewer, &chat_id).await?) }
            })
        }
        LiveTopic::Chats => watch(ctx, vec![Topic::ChatList(viewer.clone())], move |ctx| {
            let viewer = viewer.clone();
            async move { snapshot(ctx.social.list_chats(&viewer).await?) }
        }),
        LiveTopic::Stories => watch(ctx, stories_topics(&viewer), move |ctx| {
            let viewer = viewer.clone();
            async move { snapshot(ctx.social.active_stories_for_viewer(&viewer).await?) }
        }),
    };

    Ok(subscription)
}

/// WebSocket handler for live subscriptions
async fn subscribe(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(params): Query<LiveParams>,
    headers: HeaderMap,
) -> AuraResult<Response> {
    let token = extract_bearer_token(&headers)
        .or_else(|| params.access_token.clone())
        .ok_or_else(|| AuraError::Authentication("Missing access token".to_string()))?;
    let session = ctx.account_manager.validate_access_token(&token).await?;

    let subscription = open_subscription(&ctx, &session.uid, &params).await?;

    tracing::debug!(uid = %session.uid, topic = ?params.topic, id = ?params.id, "Live subscription opened");

    Ok(ws.on_upgrade(move |socket| {
        handle_socket(socket, subscription, params.topic, params.id)
    }))
}

/// Pump snapshots to the client until either side goes away
async fn handle_socket(
    socket: WebSocket,
    mut subscription: Subscription<Value>,
    topic: LiveTopic,
    id: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Snapshots are produced on their own task so the select below never
    // cancels a fetch halfway.
    let (frame_tx, mut frame_rx) = mpsc::channel::<LiveFrame>(BUFFER_SIZE);
    let producer = tokio::spawn(async move {
        while let Some(result) = subscription.next().await {
            let frame = match result {
                Ok(data) => LiveFrame::Snapshot {
                    topic,
                    id: id.clone(),
                    data,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Live snapshot failed");
                    LiveFrame::Error {
                        message: "Failed to load snapshot".to_string(),
                    }
                }
            };
            if frame_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!("Change bus closed, ending live subscription");
                    break;
                };
                if send_frame(&mut sender, &frame).await.is_err() {
                    tracing::debug!("Client disconnected during send");
                    break;
                }
            }

            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("Client closed live connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    producer.abort();
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &LiveFrame,
) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    match timeout(
        Duration::from_millis(SEND_TIMEOUT_MS),
        sender.send(Message::Text(text)),
    )
    .await
    {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
