#![cfg(test)]

use std::panic::AssertUnwindSafe;

use axum::{
    extract::{ws::Message, FromRequestParts},
    http,
};
use futures::{channel::mpsc, SinkExt, StreamExt};
use tally_api::{
    CommentAction, CommentId, Error as ApiError, FeedMessage, ItemId, Notice, UserId,
};
use tally_mock_server::MockServer;

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::PermissionDenied)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

fn tokio_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed initializing tokio runtime")
}

/// Registers one fake socket on `feeds`, returning the frames it receives
/// plus the client side (which must stay alive for the socket to stay up).
async fn fake_socket(
    feeds: &UserFeeds,
) -> (
    mpsc::UnboundedReceiver<Message>,
    mpsc::UnboundedSender<Result<Message, axum::Error>>,
) {
    let (write, received) = mpsc::unbounded();
    let (client, read) = mpsc::unbounded();
    feeds.clone().add_socket(UserId::stub(), write, read).await;
    (received, client)
}

fn parse_frame(frame: Option<Message>) -> FeedMessage {
    match frame {
        Some(Message::Binary(json)) => {
            serde_json::from_slice(&json).expect("parsing feed message")
        }
        other => panic!("expected a binary frame, got {other:?}"),
    }
}

#[test]
fn feed_sockets_receive_relayed_notices() {
    tokio_runtime().block_on(async {
        let feeds = UserFeeds::new();
        let (mut received, _client) = fake_socket(&feeds).await;

        let notice = Notice::Unflagged {
            comment_id: CommentId::stub(),
            user_id: UserId::stub(),
        };
        feeds.relay_notice(&notice).await;
        match parse_frame(received.next().await) {
            FeedMessage::Notice(n) => assert_eq!(n, notice),
            other => panic!("expected a notice, got {other:?}"),
        }
    });
}

#[test]
fn feed_answers_ping() {
    tokio_runtime().block_on(async {
        let feeds = UserFeeds::new();
        let (write, mut received) = mpsc::unbounded();
        let (mut client, read) = mpsc::unbounded();
        feeds.clone().add_socket(UserId::stub(), write, read).await;

        client
            .send(Ok(Message::Text(String::from("ping"))))
            .await
            .expect("sending ping");
        assert!(matches!(
            parse_frame(received.next().await),
            FeedMessage::Pong
        ));
    });
}

#[test]
fn shutdown_disconnects_sockets() {
    tokio_runtime().block_on(async {
        let feeds = UserFeeds::new();
        let (mut received, _client) = fake_socket(&feeds).await;

        feeds.shutdown().await;
        assert!(received.next().await.is_none());
    });
}

#[test]
fn applied_actions_relay_to_sockets() {
    tokio_runtime().block_on(async {
        let feeds = UserFeeds::new();
        let (mut received, _client) = fake_socket(&feeds).await;

        let mut store = MockServer::new();
        let action = CommentAction::Add {
            item_id: ItemId::stub(),
            author_id: UserId::stub(),
            message: String::from("over budget again"),
            parent_id: None,
            mention_user_ids: Vec::new(),
        };
        let notice = action.apply(&mut store).await.expect("applying action");
        feeds.relay_notice(&notice).await;

        match parse_frame(received.next().await) {
            FeedMessage::Notice(n) => assert_eq!(n, notice),
            other => panic!("expected a notice, got {other:?}"),
        }
    });
}
