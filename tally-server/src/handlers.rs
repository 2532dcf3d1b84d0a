use anyhow::Context;
use axum::{
    extract::{ws::Message, Path, Query, State, WebSocketUpgrade},
    Json,
};
use futures::{SinkExt, StreamExt};
use tally_api::{
    build_forest, AuthToken, CommentAction, CommentView, Item, ItemId, NewItem, NewSession,
    NewTransaction, NewUser, Transaction, TransactionId, User, UserId, Uuid,
};

use crate::{db, extractors::*, Error, UserFeeds};

pub async fn auth(mut conn: PgConn, Json(data): Json<NewSession>) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::invalid_credentials())?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn register(mut conn: PgConn, Json(data): Json<NewUser>) -> Result<Json<User>, Error> {
    data.validate()?;
    db::create_user(&mut *conn, data.clone()).await?;
    Ok(Json(User {
        id: data.id,
        name: data.name,
        email: data.email,
        phone: data.phone,
    }))
}

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_user(&mut *conn, data).await?;
    Ok(())
}

pub async fn fetch_users(Auth(user): Auth, mut conn: PgConn) -> Result<Json<Vec<User>>, Error> {
    Ok(Json(db::fetch_users(&mut *conn).await.with_context(
        || format!("fetching user list for {:?}", user),
    )?))
}

pub async fn fetch_items(Auth(user): Auth, mut conn: PgConn) -> Result<Json<Vec<Item>>, Error> {
    Ok(Json(db::fetch_items(&mut *conn).await.with_context(
        || format!("fetching item list for {:?}", user),
    )?))
}

pub async fn create_item(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewItem>,
) -> Result<Json<Item>, Error> {
    data.validate()?;
    Ok(Json(
        db::create_item(&mut *conn, user, data)
            .await
            .context("creating item")?,
    ))
}

pub async fn edit_item(
    Auth(user): Auth,
    Path(id): Path<Uuid>,
    mut conn: PgConn,
    Json(data): Json<NewItem>,
) -> Result<Json<Item>, Error> {
    data.validate()?;
    Ok(Json(
        db::update_item(&mut *conn, ItemId(id), data)
            .await
            .with_context(|| format!("updating item {id} for {user:?}"))?,
    ))
}

pub async fn delete_item(
    Auth(user): Auth,
    Path(id): Path<Uuid>,
    mut conn: PgConn,
) -> Result<(), Error> {
    db::delete_item(&mut *conn, ItemId(id))
        .await
        .with_context(|| format!("deleting item {id} for {user:?}"))?;
    Ok(())
}

/// The reply forest for one item, decorated for the requesting user. Rebuilt
/// from the flat fetch on every call.
pub async fn fetch_comment_tree(
    Auth(user): Auth,
    Path(id): Path<Uuid>,
    mut conn: PgConn,
) -> Result<Json<Vec<CommentView>>, Error> {
    let comments = db::fetch_comments_for_item(&mut *conn, ItemId(id))
        .await
        .with_context(|| format!("fetching comments of item {id}"))?;
    Ok(Json(CommentView::render_forest(
        build_forest(comments),
        user,
    )))
}

#[derive(serde::Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_transactions_limit")]
    limit: i64,
}

fn default_transactions_limit() -> i64 {
    50
}

pub async fn fetch_transactions(
    Auth(user): Auth,
    Query(q): Query<TransactionsQuery>,
    mut conn: PgConn,
) -> Result<Json<Vec<Transaction>>, Error> {
    Ok(Json(
        db::fetch_transactions(&mut *conn, user, q.limit)
            .await
            .with_context(|| format!("fetching transactions for {:?}", user))?,
    ))
}

pub async fn add_transaction(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewTransaction>,
) -> Result<Json<Transaction>, Error> {
    data.validate()?;
    Ok(Json(
        db::add_transaction(&mut *conn, user, data)
            .await
            .context("recording transaction")?,
    ))
}

pub async fn delete_transaction(
    Auth(user): Auth,
    Path(id): Path<Uuid>,
    mut conn: PgConn,
) -> Result<(), Error> {
    db::delete_transaction(&mut *conn, TransactionId(id))
        .await
        .with_context(|| format!("deleting transaction {id} for {user:?}"))?;
    Ok(())
}

pub async fn submit_comment_action(
    Auth(user): Auth,
    State(feeds): State<UserFeeds>,
    mut conn: PgConn,
    Json(action): Json<CommentAction>,
) -> Result<(), Error> {
    action.validate()?;
    if action.acting_user().map_or(false, |u| u != user) {
        return Err(Error::permission_denied());
    }
    let mut store = db::PgStore { conn: &mut *conn };
    let notice = action
        .apply(&mut store)
        .await
        .context("applying comment action")?;
    feeds.relay_notice(&notice).await;
    Ok(())
}

pub async fn comment_feed(
    ws: WebSocketUpgrade,
    State(db): State<PgPool>,
    State(feeds): State<UserFeeds>,
) -> Result<axum::response::Response, Error> {
    Ok(ws.on_upgrade(move |sock| {
        let (write, read) = sock.split();
        comment_feed_impl(write, read, db, feeds)
    }))
}

pub async fn comment_feed_impl<W, R>(mut write: W, mut read: R, db: PgPool, feeds: UserFeeds)
where
    W: 'static + Send + Unpin + futures::Sink<Message>,
    <W as futures::Sink<Message>>::Error: Send,
    R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
{
    // The first client frame must be a session token; everything after that
    // is handled by the feed relayer.
    tracing::debug!("comment feed websocket connected");
    if let Some(Ok(Message::Text(token))) = read.next().await {
        if let Ok(token) = Uuid::try_parse(&token) {
            if let Ok(mut conn) = db.acquire().await {
                if let Ok(user) = db::recover_session(&mut *conn, AuthToken(token)).await {
                    if write.send(Message::Text(String::from("ok"))).await.is_ok() {
                        tracing::debug!(?user, "comment feed websocket auth success");
                        feeds.add_socket(user, write, read).await;
                        return;
                    }
                }
            }
        }
        tracing::debug!(?token, "comment feed websocket auth failure");
        let _ = write
            .send(Message::Text(String::from("permission denied")))
            .await;
    }
}
