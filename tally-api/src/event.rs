use crate::{Comment, CommentId, Error, ItemId, Store, UserId};

/// One mutation against the comment store, as submitted by clients.
///
/// The serde envelope matches the `{ "event": ..., "data": ... }` messages
/// spoken on the comment feed, so a client can echo a received notice's tag
/// back as an action of the same shape.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "event", content = "data")]
pub enum CommentAction {
    #[serde(rename = "comment:add")]
    Add {
        item_id: ItemId,
        author_id: UserId,
        message: String,
        /// Optional reply target; not checked against `item_id`.
        #[serde(default)]
        parent_id: Option<CommentId>,
        #[serde(default)]
        mention_user_ids: Vec<UserId>,
    },
    #[serde(rename = "comment:edit")]
    Edit {
        comment_id: CommentId,
        message: String,
    },
    #[serde(rename = "comment:delete")]
    Delete { comment_id: CommentId },
    #[serde(rename = "comment:react")]
    React {
        comment_id: CommentId,
        user_id: UserId,
        emoji: String,
    },
    #[serde(rename = "comment:unreact")]
    Unreact {
        comment_id: CommentId,
        user_id: UserId,
        emoji: String,
    },
    #[serde(rename = "comment:flag")]
    Flag {
        comment_id: CommentId,
        user_id: UserId,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "comment:unflag")]
    Unflag {
        comment_id: CommentId,
        user_id: UserId,
    },
}

impl CommentAction {
    // See comments on other `validate` functions throughout tally-api
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            CommentAction::Add { message, .. } => crate::validate_string(message),
            CommentAction::Edit { message, .. } => crate::validate_string(message),
            CommentAction::Delete { .. } => Ok(()),
            CommentAction::React { emoji, .. } | CommentAction::Unreact { emoji, .. } => {
                crate::validate_string(emoji)
            }
            CommentAction::Flag { reason, .. } => match reason {
                Some(reason) => crate::validate_string(reason),
                None => Ok(()),
            },
            CommentAction::Unflag { .. } => Ok(()),
        }
    }

    /// The user this action acts as, when the payload carries one. `Edit`
    /// and `Delete` don't (the wire format never did), so they can't be
    /// checked against the session.
    pub fn acting_user(&self) -> Option<UserId> {
        match self {
            CommentAction::Add { author_id, .. } => Some(*author_id),
            CommentAction::Edit { .. } | CommentAction::Delete { .. } => None,
            CommentAction::React { user_id, .. }
            | CommentAction::Unreact { user_id, .. }
            | CommentAction::Flag { user_id, .. }
            | CommentAction::Unflag { user_id, .. } => Some(*user_id),
        }
    }

    /// Runs this mutation against `store` and returns the notice to fan out
    /// to connected viewers.
    pub async fn apply<S: Store>(self, store: &mut S) -> anyhow::Result<Notice> {
        Ok(match self {
            CommentAction::Add {
                item_id,
                author_id,
                message,
                parent_id,
                mention_user_ids,
            } => Notice::Added(
                store
                    .add_comment(item_id, author_id, message, parent_id, mention_user_ids)
                    .await?,
            ),
            CommentAction::Edit {
                comment_id,
                message,
            } => Notice::Edited(store.edit_comment(comment_id, message).await?),
            CommentAction::Delete { comment_id } => {
                Notice::Deleted(store.delete_comment(comment_id).await?)
            }
            CommentAction::React {
                comment_id,
                user_id,
                emoji,
            } => {
                store
                    .add_reaction(comment_id, user_id, emoji.clone())
                    .await?;
                Notice::Reacted {
                    comment_id,
                    user_id,
                    emoji,
                }
            }
            CommentAction::Unreact {
                comment_id,
                user_id,
                emoji,
            } => {
                store
                    .remove_reaction(comment_id, user_id, emoji.clone())
                    .await?;
                Notice::Unreacted {
                    comment_id,
                    user_id,
                    emoji,
                }
            }
            CommentAction::Flag {
                comment_id,
                user_id,
                reason,
            } => {
                store
                    .flag_comment(comment_id, user_id, reason.clone())
                    .await?;
                Notice::Flagged {
                    comment_id,
                    user_id,
                    reason,
                }
            }
            CommentAction::Unflag {
                comment_id,
                user_id,
            } => {
                store.remove_flag(comment_id, user_id).await?;
                Notice::Unflagged {
                    comment_id,
                    user_id,
                }
            }
        })
    }
}

/// What gets broadcast to connected viewers after a successful mutation.
/// Every mutation notifies, including un-react/flag/unflag.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "event", content = "data")]
pub enum Notice {
    #[serde(rename = "comment:add")]
    Added(Comment),
    #[serde(rename = "comment:edit")]
    Edited(Comment),
    #[serde(rename = "comment:delete")]
    Deleted(Comment),
    #[serde(rename = "comment:react")]
    Reacted {
        comment_id: CommentId,
        user_id: UserId,
        emoji: String,
    },
    #[serde(rename = "comment:unreact")]
    Unreacted {
        comment_id: CommentId,
        user_id: UserId,
        emoji: String,
    },
    #[serde(rename = "comment:flag")]
    Flagged {
        comment_id: CommentId,
        user_id: UserId,
        reason: Option<String>,
    },
    #[serde(rename = "comment:unflag")]
    Unflagged {
        comment_id: CommentId,
        user_id: UserId,
    },
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    Notice(Notice),
}
