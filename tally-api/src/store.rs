use async_trait::async_trait;

use crate::{Comment, CommentId, ItemId, UserId};

/// The comment store's mutation surface, as consumed by
/// `CommentAction::apply`. Implemented by the server's Postgres layer and by
/// the in-memory mock, so gateway semantics can be exercised without a
/// database.
#[async_trait]
pub trait Store {
    /// Every comment on `item`, flat, ascending creation time.
    async fn comments_for_item(&mut self, item: ItemId) -> anyhow::Result<Vec<Comment>>;

    async fn add_comment(
        &mut self,
        item: ItemId,
        author: UserId,
        message: String,
        parent: Option<CommentId>,
        mentions: Vec<UserId>,
    ) -> anyhow::Result<Comment>;

    /// Replaces the message and stamps `edited_at`.
    async fn edit_comment(&mut self, comment: CommentId, message: String)
        -> anyhow::Result<Comment>;

    /// Soft delete: the record stays so replies keep their anchor.
    async fn delete_comment(&mut self, comment: CommentId) -> anyhow::Result<Comment>;

    /// Upsert on `(comment, user, emoji)`; reacting twice is a no-op.
    async fn add_reaction(
        &mut self,
        comment: CommentId,
        user: UserId,
        emoji: String,
    ) -> anyhow::Result<()>;

    async fn remove_reaction(
        &mut self,
        comment: CommentId,
        user: UserId,
        emoji: String,
    ) -> anyhow::Result<()>;

    /// Upsert on `(comment, user)`; re-flagging replaces the reason.
    async fn flag_comment(
        &mut self,
        comment: CommentId,
        user: UserId,
        reason: Option<String>,
    ) -> anyhow::Result<()>;

    async fn remove_flag(&mut self, comment: CommentId, user: UserId) -> anyhow::Result<()>;
}
