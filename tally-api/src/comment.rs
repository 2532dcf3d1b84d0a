use chrono::Utc;
use uuid::Uuid;

use crate::{ItemId, Time, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

/// One user's emoji reaction on a comment. The store keeps at most one row
/// per `(user_id, emoji)` pair on a given comment.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
}

/// A moderation flag. The store keeps at most one row per user on a given
/// comment; re-flagging replaces the reason.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Flag {
    pub user_id: UserId,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,

    /// `None` marks a top-level comment. A `Some` value is what the author's
    /// client sent at creation time: the store does not re-check that it
    /// still resolves, or that it names a comment of the same item. See
    /// `build_forest` for how unresolvable links are handled.
    pub parent_id: Option<CommentId>,

    pub message: String,
    pub created_at: Time,

    /// Set iff the message was modified after creation.
    pub edited_at: Option<Time>,

    /// Soft-deletion: the record stays so replies keep their anchor; hiding
    /// the message is the renderer's job.
    pub is_deleted: bool,

    pub mentions: Vec<UserId>,
    pub reactions: Vec<Reaction>,
    pub flags: Vec<Flag>,
}

impl Comment {
    pub fn new(
        item_id: ItemId,
        author_id: UserId,
        message: String,
        parent_id: Option<CommentId>,
        mentions: Vec<UserId>,
    ) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            item_id,
            author_id,
            parent_id,
            message,
            created_at: Utc::now(),
            edited_at: None,
            is_deleted: false,
            mentions,
            reactions: Vec::new(),
            flags: Vec::new(),
        }
    }
}

/// Per-emoji rollup of a comment's reactions, for one viewing user.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub viewer_reacted: bool,
}

/// Groups `reactions` by emoji, counting occurrences and remembering whether
/// `viewer` is among the reactors. Emojis come out in first-seen order.
pub fn summarize_reactions(reactions: &[Reaction], viewer: UserId) -> Vec<ReactionSummary> {
    let mut summaries: Vec<ReactionSummary> = Vec::new();
    for r in reactions {
        match summaries.iter_mut().find(|s| s.emoji == r.emoji) {
            Some(s) => {
                s.count += 1;
                s.viewer_reacted |= r.user_id == viewer;
            }
            None => summaries.push(ReactionSummary {
                emoji: r.emoji.clone(),
                count: 1,
                viewer_reacted: r.user_id == viewer,
            }),
        }
    }
    summaries
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FlagSummary {
    pub count: usize,
    pub viewer_flagged: bool,
}

pub fn flag_summary(flags: &[Flag], viewer: UserId) -> FlagSummary {
    FlagSummary {
        count: flags.len(),
        viewer_flagged: flags.iter().any(|f| f.user_id == viewer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(n: u128) -> UserId {
        UserId(Uuid::from_u128(n))
    }

    fn reaction(n: u128, emoji: &str) -> Reaction {
        Reaction {
            user_id: user(n),
            emoji: String::from(emoji),
        }
    }

    #[test]
    fn reactions_group_in_first_seen_order() {
        let reactions = vec![
            reaction(1, "👍"),
            reaction(2, "🎉"),
            reaction(2, "👍"),
            reaction(3, "👍"),
        ];
        let summaries = summarize_reactions(&reactions, user(2));
        assert_eq!(
            summaries,
            vec![
                ReactionSummary {
                    emoji: String::from("👍"),
                    count: 3,
                    viewer_reacted: true,
                },
                ReactionSummary {
                    emoji: String::from("🎉"),
                    count: 1,
                    viewer_reacted: true,
                },
            ],
        );
    }

    #[test]
    fn viewer_absent_from_reactions() {
        let reactions = vec![reaction(1, "👍"), reaction(2, "👍")];
        let summaries = summarize_reactions(&reactions, user(9));
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 2);
        assert!(!summaries[0].viewer_reacted);
    }

    #[test]
    fn no_reactions_no_summaries() {
        assert_eq!(summarize_reactions(&[], user(1)), Vec::new());
    }

    #[test]
    fn flag_summary_tracks_viewer() {
        let flags = vec![
            Flag {
                user_id: user(1),
                reason: Some(String::from("spam")),
            },
            Flag {
                user_id: user(2),
                reason: None,
            },
        ];
        assert_eq!(
            flag_summary(&flags, user(2)),
            FlagSummary {
                count: 2,
                viewer_flagged: true,
            },
        );
        assert_eq!(
            flag_summary(&flags, user(3)),
            FlagSummary {
                count: 2,
                viewer_flagged: false,
            },
        );
    }
}
