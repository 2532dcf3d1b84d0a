use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use tally_api::{FeedMessage, Notice, UserId, Uuid};
use tokio::sync::RwLock;

/// Registry of connected comment-feed sockets.
///
/// One instance is created at startup, handed to the handlers through
/// `AppState`, and torn down with `shutdown` when the server stops. Each
/// socket gets a relayer task that multiplexes fanned-out notices with the
/// client side of the websocket.
#[derive(Clone, Debug)]
pub struct UserFeeds(
    Arc<RwLock<HashMap<UserId, HashMap<Uuid, mpsc::UnboundedSender<FeedMessage>>>>>,
);

impl UserFeeds {
    pub fn new() -> UserFeeds {
        UserFeeds(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Registers an authenticated websocket and spawns its relayer task.
    pub async fn add_socket<W, R>(self, user: UserId, mut write: W, read: R)
    where
        W: 'static + Send + Unpin + futures::Sink<Message>,
        <W as futures::Sink<Message>>::Error: Send,
        R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
    {
        // Unbounded on purpose: with a bounded channel the write-lock taken
        // to drop a socket could deadlock against a fan-out holding the
        // read-lock while blocked on that same socket's queue.
        let (sender, mut receiver) = mpsc::unbounded();
        let socket_id = Uuid::new_v4();

        self.0
            .write()
            .await
            .entry(user)
            .or_insert_with(HashMap::new)
            .insert(socket_id, sender);

        let mut read = read.fuse();
        tokio::spawn(async move {
            loop {
                select! {
                    msg = receiver.next() => match msg {
                        None => break,
                        Some(msg) => {
                            if !send_to_socket(&mut write, &msg).await {
                                break;
                            }
                        }
                    },
                    msg = read.next() => match msg {
                        None | Some(Ok(Message::Close(_))) => break,
                        Some(Ok(Message::Text(msg))) if msg == "ping" => {
                            if !send_to_socket(&mut write, &FeedMessage::Pong).await {
                                break;
                            }
                        }
                        Some(msg) => {
                            tracing::warn!(?msg, "unexpected message from feed client");
                            break;
                        }
                    },
                }
            }
            let mut feeds = self.0.write().await;
            if let Some(sockets) = feeds.get_mut(&user) {
                sockets.remove(&socket_id);
            }
            if feeds.get(&user).map_or(false, HashMap::is_empty) {
                feeds.remove(&user);
            }
        });
    }

    /// Fire-and-forget fan-out of one notice to every connected socket.
    pub async fn relay_notice(&self, notice: &Notice) {
        for sockets in self.0.read().await.values() {
            for s in sockets.values() {
                let _ = s.unbounded_send(FeedMessage::Notice(notice.clone()));
            }
        }
    }

    /// Drops every relayer channel; the relayer tasks then tear their
    /// sockets down.
    pub async fn shutdown(&self) {
        self.0.write().await.clear();
    }
}

async fn send_to_socket<W>(write: &mut W, msg: &FeedMessage) -> bool
where
    W: Unpin + futures::Sink<Message>,
{
    let json = match serde_json::to_vec(msg) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(?err, ?msg, "failed serializing feed message");
            return true;
        }
    };
    write.send(Message::Binary(json)).await.is_ok()
}
