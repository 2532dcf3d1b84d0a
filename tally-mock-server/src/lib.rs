use std::collections::{btree_map, BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tally_api::{
    build_forest, AuthToken, Comment, CommentAction, CommentId, CommentView, Error, FeedMessage,
    Flag, Item, ItemId, NewItem, NewSession, NewUser, Notice, Reaction, Store, User, UserId, Uuid,
};
use tokio::sync::mpsc;

/// In-memory stand-in for the real server: same gateway semantics, same
/// notice fan-out, no Postgres and no websocket.
pub struct MockServer {
    users: BTreeMap<UserId, MockUser>,
    items: BTreeMap<ItemId, Item>,
    /// Creation order, which is also ascending `created_at` order.
    comments: Vec<Comment>,
    feeds: Vec<mpsc::UnboundedSender<FeedMessage>>,
}

#[derive(Debug)]
struct MockUser {
    name: String,
    password: String,
    email: Option<String>,
    sessions: HashMap<AuthToken, String>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            items: BTreeMap::new(),
            comments: Vec::new(),
            feeds: Vec::new(),
        }
    }

    pub fn create_user(&mut self, u: NewUser) -> Result<User, Error> {
        u.validate()?;
        if self.users.values().any(|db| db.name == u.name) {
            return Err(Error::NameAlreadyUsed(u.name));
        }
        if let Some(email) = &u.email {
            if self
                .users
                .values()
                .any(|db| db.email.as_deref() == Some(email))
            {
                return Err(Error::EmailAlreadyUsed(email.clone()));
            }
        }
        match self.users.entry(u.id) {
            btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(MockUser {
                    name: u.name.clone(),
                    password: u.password,
                    email: u.email.clone(),
                    sessions: HashMap::new(),
                });
                Ok(User {
                    id: u.id,
                    name: u.name,
                    email: u.email,
                    phone: u.phone,
                })
            }
        }
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        for u in self.users.values_mut() {
            if u.name == s.name {
                if u.password != s.password {
                    return Err(Error::InvalidCredentials);
                }
                let token = AuthToken(Uuid::new_v4());
                u.sessions.insert(token, s.device);
                return Ok(token);
            }
        }
        Err(Error::InvalidCredentials)
    }

    pub fn unauth(&mut self, token: AuthToken) -> Result<(), Error> {
        for u in self.users.values_mut() {
            if u.sessions.remove(&token).is_some() {
                return Ok(());
            }
        }
        Err(Error::PermissionDenied)
    }

    pub fn whoami(&self, token: AuthToken) -> Result<UserId, Error> {
        self.resolve(token)
    }

    fn resolve(&self, token: AuthToken) -> Result<UserId, Error> {
        for (id, u) in self.users.iter() {
            if u.sessions.contains_key(&token) {
                return Ok(*id);
            }
        }
        Err(Error::PermissionDenied)
    }

    pub fn add_item(&mut self, author: UserId, data: NewItem) -> Item {
        let item = Item {
            id: ItemId(Uuid::new_v4()),
            author_id: author,
            name: data.name,
            cost: data.cost,
            note: data.note,
            date: Utc::now(),
        };
        self.items.insert(item.id, item.clone());
        item
    }

    pub fn fetch_items(&self, token: AuthToken) -> Result<Vec<Item>, Error> {
        self.resolve(token)?;
        Ok(self.items.values().cloned().collect())
    }

    /// What `GET /api/item/:id/comments` serves: flat fetch, forest rebuild,
    /// per-viewer rendering.
    pub async fn comment_tree(
        &mut self,
        token: AuthToken,
        item: ItemId,
    ) -> Result<Vec<CommentView>, Error> {
        let viewer = self.resolve(token)?;
        let comments = self
            .comments_for_item(item)
            .await
            .map_err(|err| Error::Unknown(format!("{err:#}")))?;
        Ok(CommentView::render_forest(build_forest(comments), viewer))
    }

    /// What `POST /api/comment` does: validate, apply, fan out the notice.
    pub async fn submit(
        &mut self,
        token: AuthToken,
        action: CommentAction,
    ) -> Result<Notice, Error> {
        let user = self.resolve(token)?;
        action.validate()?;
        if action.acting_user().map_or(false, |u| u != user) {
            return Err(Error::PermissionDenied);
        }
        let notice = action
            .apply(&mut *self)
            .await
            .map_err(|err| Error::Unknown(format!("{err:#}")))?;
        self.feeds
            .retain_mut(|f| f.send(FeedMessage::Notice(notice.clone())).is_ok());
        Ok(notice)
    }

    pub fn feed(&mut self, token: AuthToken) -> Result<mpsc::UnboundedReceiver<FeedMessage>, Error> {
        self.resolve(token)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.feeds.push(sender);
        Ok(receiver)
    }

    fn comment_mut(&mut self, id: CommentId) -> anyhow::Result<&mut Comment> {
        self.comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("no comment {:?} in mock store", id))
    }
}

#[async_trait]
impl Store for MockServer {
    async fn comments_for_item(&mut self, item: ItemId) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .comments
            .iter()
            .filter(|c| c.item_id == item)
            .cloned()
            .collect())
    }

    async fn add_comment(
        &mut self,
        item: ItemId,
        author: UserId,
        message: String,
        parent: Option<CommentId>,
        mentions: Vec<UserId>,
    ) -> anyhow::Result<Comment> {
        let comment = Comment::new(item, author, message, parent, mentions);
        self.comments.push(comment.clone());
        Ok(comment)
    }

    async fn edit_comment(
        &mut self,
        comment: CommentId,
        message: String,
    ) -> anyhow::Result<Comment> {
        let c = self.comment_mut(comment)?;
        c.message = message;
        c.edited_at = Some(Utc::now());
        Ok(c.clone())
    }

    async fn delete_comment(&mut self, comment: CommentId) -> anyhow::Result<Comment> {
        let c = self.comment_mut(comment)?;
        c.is_deleted = true;
        Ok(c.clone())
    }

    async fn add_reaction(
        &mut self,
        comment: CommentId,
        user: UserId,
        emoji: String,
    ) -> anyhow::Result<()> {
        let c = self.comment_mut(comment)?;
        if !c
            .reactions
            .iter()
            .any(|r| r.user_id == user && r.emoji == emoji)
        {
            c.reactions.push(Reaction {
                user_id: user,
                emoji,
            });
        }
        Ok(())
    }

    async fn remove_reaction(
        &mut self,
        comment: CommentId,
        user: UserId,
        emoji: String,
    ) -> anyhow::Result<()> {
        let c = self.comment_mut(comment)?;
        c.reactions
            .retain(|r| !(r.user_id == user && r.emoji == emoji));
        Ok(())
    }

    async fn flag_comment(
        &mut self,
        comment: CommentId,
        user: UserId,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        let c = self.comment_mut(comment)?;
        match c.flags.iter_mut().find(|f| f.user_id == user) {
            Some(f) => f.reason = reason,
            None => c.flags.push(Flag {
                user_id: user,
                reason,
            }),
        }
        Ok(())
    }

    async fn remove_flag(&mut self, comment: CommentId, user: UserId) -> anyhow::Result<()> {
        let c = self.comment_mut(comment)?;
        c.flags.retain(|f| f.user_id != user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed initializing tokio runtime")
            .block_on(f)
    }

    fn setup() -> (MockServer, AuthToken, UserId, ItemId) {
        let mut mock = MockServer::new();
        let user = UserId(Uuid::new_v4());
        mock.create_user(NewUser::new(
            user,
            String::from("wilfred"),
            String::from("wilfred"),
        ))
        .expect("creating user");
        let token = mock
            .auth(NewSession {
                name: String::from("wilfred"),
                password: String::from("wilfred"),
                device: String::from("tests"),
            })
            .expect("logging in");
        let item = mock
            .add_item(
                user,
                NewItem {
                    name: String::from("Groceries"),
                    cost: 50.75,
                    note: String::from("Weekly shopping"),
                },
            )
            .id;
        (mock, token, user, item)
    }

    fn add(item: ItemId, user: UserId, message: &str, parent: Option<CommentId>) -> CommentAction {
        CommentAction::Add {
            item_id: item,
            author_id: user,
            message: String::from(message),
            parent_id: parent,
            mention_user_ids: Vec::new(),
        }
    }

    fn added(notice: Notice) -> Comment {
        match notice {
            Notice::Added(c) => c,
            other => panic!("expected an Added notice, got {other:?}"),
        }
    }

    #[test]
    fn wrong_password_is_rejected() {
        let (mut mock, _token, _user, _item) = setup();
        assert_eq!(
            mock.auth(NewSession {
                name: String::from("wilfred"),
                password: String::from("not-wilfred"),
                device: String::from("tests"),
            }),
            Err(Error::InvalidCredentials),
        );
    }

    #[test]
    fn unknown_token_is_rejected() {
        let (mut mock, _token, _user, item) = setup();
        let denied = run(mock.comment_tree(AuthToken(Uuid::new_v4()), item));
        assert_eq!(denied, Err(Error::PermissionDenied));
    }

    #[test]
    fn reacting_twice_keeps_one_reaction() {
        run(async {
            let (mut mock, token, user, item) = setup();
            let comment = added(
                mock.submit(token, add(item, user, "too expensive", None))
                    .await
                    .expect("adding comment"),
            );
            for _ in 0..2 {
                mock.submit(
                    token,
                    CommentAction::React {
                        comment_id: comment.id,
                        user_id: user,
                        emoji: String::from("👍"),
                    },
                )
                .await
                .expect("reacting");
            }
            let tree = mock.comment_tree(token, item).await.expect("fetching tree");
            assert_eq!(tree[0].reactions.len(), 1);
            assert_eq!(tree[0].reactions[0].count, 1);
            assert!(tree[0].reactions[0].viewer_reacted);

            mock.submit(
                token,
                CommentAction::Unreact {
                    comment_id: comment.id,
                    user_id: user,
                    emoji: String::from("👍"),
                },
            )
            .await
            .expect("removing reaction");
            let tree = mock.comment_tree(token, item).await.expect("fetching tree");
            assert!(tree[0].reactions.is_empty());
        });
    }

    #[test]
    fn reflagging_replaces_the_reason() {
        run(async {
            let (mut mock, token, user, item) = setup();
            let comment = added(
                mock.submit(token, add(item, user, "rude remark", None))
                    .await
                    .expect("adding comment"),
            );
            for reason in ["spam", "abuse"] {
                mock.submit(
                    token,
                    CommentAction::Flag {
                        comment_id: comment.id,
                        user_id: user,
                        reason: Some(String::from(reason)),
                    },
                )
                .await
                .expect("flagging");
            }
            let flags = &mock.comment_mut(comment.id).expect("finding comment").flags;
            assert_eq!(flags.len(), 1);
            assert_eq!(flags[0].reason.as_deref(), Some("abuse"));

            mock.submit(
                token,
                CommentAction::Unflag {
                    comment_id: comment.id,
                    user_id: user,
                },
            )
            .await
            .expect("unflagging");
            assert!(mock
                .comment_mut(comment.id)
                .expect("finding comment")
                .flags
                .is_empty());
        });
    }

    #[test]
    fn soft_deleted_comment_keeps_its_replies() {
        run(async {
            let (mut mock, token, user, item) = setup();
            let parent = added(
                mock.submit(token, add(item, user, "weekly shop", None))
                    .await
                    .expect("adding parent"),
            );
            let reply = added(
                mock.submit(token, add(item, user, "again?", Some(parent.id)))
                    .await
                    .expect("adding reply"),
            );
            mock.submit(token, CommentAction::Delete { comment_id: parent.id })
                .await
                .expect("deleting parent");

            let tree = mock.comment_tree(token, item).await.expect("fetching tree");
            assert_eq!(tree.len(), 1);
            assert!(tree[0].is_deleted);
            assert_eq!(tree[0].replies.len(), 1);
            assert_eq!(tree[0].replies[0].id, reply.id);
        });
    }

    #[test]
    fn reply_to_another_items_comment_floats() {
        run(async {
            let (mut mock, token, user, item) = setup();
            let other_item = mock
                .add_item(
                    user,
                    NewItem {
                        name: String::from("Fuel"),
                        cost: 70.0,
                        note: String::from("Trip to Nairobi"),
                    },
                )
                .id;
            let anchor = added(
                mock.submit(token, add(item, user, "on the first item", None))
                    .await
                    .expect("adding anchor"),
            );
            // the store accepts a cross-item parent; the fetched set for
            // other_item won't contain it
            let stray = added(
                mock.submit(token, add(other_item, user, "stray reply", Some(anchor.id)))
                    .await
                    .expect("adding stray reply"),
            );

            let tree = mock
                .comment_tree(token, other_item)
                .await
                .expect("fetching tree");
            assert_eq!(tree.len(), 1);
            assert_eq!(tree[0].id, stray.id);
            assert!(tree[0].replies.is_empty());
            assert_eq!(mock.fetch_items(token).expect("listing items").len(), 2);
        });
    }

    #[test]
    fn edits_stamp_edited_at_and_notify() {
        run(async {
            let (mut mock, token, user, item) = setup();
            let mut feed = mock.feed(token).expect("opening feed");
            let comment = added(
                mock.submit(token, add(item, user, "typo'd mesage", None))
                    .await
                    .expect("adding comment"),
            );
            let edited = mock
                .submit(
                    token,
                    CommentAction::Edit {
                        comment_id: comment.id,
                        message: String::from("typo'd message"),
                    },
                )
                .await
                .expect("editing comment");
            match &edited {
                Notice::Edited(c) => assert!(c.edited_at.is_some()),
                other => panic!("expected an Edited notice, got {other:?}"),
            }

            let first = feed.try_recv().expect("receiving add notice");
            assert!(matches!(first, FeedMessage::Notice(Notice::Added(_))));
            let second = feed.try_recv().expect("receiving edit notice");
            match second {
                FeedMessage::Notice(n) => assert_eq!(n, edited),
                other => panic!("expected a notice, got {other:?}"),
            }
        });
    }

    #[test]
    fn acting_as_someone_else_is_denied() {
        run(async {
            let (mut mock, token, _user, item) = setup();
            let someone_else = UserId(Uuid::new_v4());
            let denied = mock
                .submit(token, add(item, someone_else, "impersonated", None))
                .await;
            assert_eq!(denied, Err(Error::PermissionDenied));
        });
    }

    #[test]
    fn mentions_ride_along() {
        run(async {
            let (mut mock, token, user, item) = setup();
            let friend = UserId(Uuid::new_v4());
            let comment = added(
                mock.submit(
                    token,
                    CommentAction::Add {
                        item_id: item,
                        author_id: user,
                        message: String::from("should we split this?"),
                        parent_id: None,
                        mention_user_ids: vec![friend],
                    },
                )
                .await
                .expect("adding comment"),
            );
            assert_eq!(comment.mentions, vec![friend]);
        });
    }
}
