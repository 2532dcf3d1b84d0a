use std::collections::HashMap;

use crate::{
    flag_summary, summarize_reactions, Comment, CommentId, FlagSummary, ItemId, ReactionSummary,
    Time, UserId,
};

/// A comment with its direct replies, recursively nested.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Rebuilds the reply forest for one item's comments.
///
/// `comments` is the flat fetch for a single item, in ascending `created_at`
/// order; that order is preserved among roots and within every reply list
/// (nothing is re-sorted here). Every input comment ends up in the output
/// exactly once:
/// - `parent_id == None` makes a root;
/// - a `parent_id` that no comment in the set carries makes a root too (the
///   parent may have been purged, or belong to another item);
/// - a comment that would become its own ancestor makes a root, so a stored
///   parent cycle can neither loop the builder nor swallow its members;
/// - everything else becomes a reply of its parent.
///
/// Two comments sharing an id is an upstream integrity bug; both records are
/// still emitted, with parent lookups resolving to the last one.
pub fn build_forest(comments: Vec<Comment>) -> Vec<CommentNode> {
    // First pass: index every comment's parent link.
    let mut parents = HashMap::with_capacity(comments.len());
    for c in &comments {
        if parents.insert(c.id, c.parent_id).is_some() {
            tracing::warn!(id = ?c.id, "duplicate comment id in fetched set");
        }
    }

    // Second pass: link each comment under its parent, in input order.
    let mut roots = Vec::new();
    let mut replies: HashMap<CommentId, Vec<Comment>> = HashMap::new();
    for c in comments {
        match c.parent_id {
            None => roots.push(c),
            Some(p) if !parents.contains_key(&p) => {
                tracing::warn!(id = ?c.id, parent = ?p, "reply to an unknown comment, keeping it top-level");
                roots.push(c);
            }
            Some(p) if is_own_ancestor(c.id, p, &parents) => {
                tracing::warn!(id = ?c.id, "comment is part of a parent cycle, keeping it top-level");
                roots.push(c);
            }
            Some(p) => replies.entry(p).or_insert_with(Vec::new).push(c),
        }
    }

    roots.into_iter().map(|c| assemble(c, &mut replies)).collect()
}

/// Whether following parent links from `from` reaches `id`. The walk is
/// bounded by the index size so that a cycle not containing `id` also
/// terminates.
fn is_own_ancestor(
    id: CommentId,
    from: CommentId,
    parents: &HashMap<CommentId, Option<CommentId>>,
) -> bool {
    let mut cur = from;
    for _ in 0..parents.len() {
        if cur == id {
            return true;
        }
        match parents.get(&cur) {
            Some(Some(next)) => cur = *next,
            _ => return false,
        }
    }
    cur == id
}

fn assemble(comment: Comment, replies: &mut HashMap<CommentId, Vec<Comment>>) -> CommentNode {
    let children = replies.remove(&comment.id).unwrap_or_default();
    CommentNode {
        replies: children.into_iter().map(|c| assemble(c, replies)).collect(),
        comment,
    }
}

/// A `CommentNode` decorated for one viewing user: reactions rolled up per
/// emoji, flags reduced to a count plus the viewer's own state. This is the
/// shape the rendering layer consumes; it decides itself what to show for
/// `is_deleted` nodes.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub message: String,
    pub created_at: Time,
    pub edited_at: Option<Time>,
    pub is_deleted: bool,
    pub mentions: Vec<UserId>,
    pub reactions: Vec<ReactionSummary>,
    pub flags: FlagSummary,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    pub fn render(node: CommentNode, viewer: UserId) -> CommentView {
        let CommentNode { comment: c, replies } = node;
        CommentView {
            reactions: summarize_reactions(&c.reactions, viewer),
            flags: flag_summary(&c.flags, viewer),
            replies: Self::render_forest(replies, viewer),
            id: c.id,
            item_id: c.item_id,
            author_id: c.author_id,
            parent_id: c.parent_id,
            message: c.message,
            created_at: c.created_at,
            edited_at: c.edited_at,
            is_deleted: c.is_deleted,
            mentions: c.mentions,
        }
    }

    pub fn render_forest(forest: Vec<CommentNode>, viewer: UserId) -> Vec<CommentView> {
        forest
            .into_iter()
            .map(|node| Self::render(node, viewer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::Reaction;

    fn comment(id: u128, parent: Option<u128>, at: i64) -> Comment {
        Comment {
            id: CommentId(Uuid::from_u128(id)),
            item_id: ItemId::stub(),
            author_id: UserId::stub(),
            parent_id: parent.map(|p| CommentId(Uuid::from_u128(p))),
            message: format!("comment {id}"),
            created_at: Utc.timestamp_opt(at, 0).unwrap(),
            edited_at: None,
            is_deleted: false,
            mentions: Vec::new(),
            reactions: Vec::new(),
            flags: Vec::new(),
        }
    }

    fn id(n: u128) -> CommentId {
        CommentId(Uuid::from_u128(n))
    }

    fn count(forest: &[CommentNode]) -> usize {
        forest.iter().map(|n| 1 + count(&n.replies)).sum()
    }

    #[test]
    fn empty_input_empty_forest() {
        assert_eq!(build_forest(Vec::new()), Vec::new());
    }

    #[test]
    fn chain_nests_and_orphan_floats() {
        // 1 <- 2 <- 3 plus 4 whose parent 99 is nowhere in the set
        let forest = build_forest(vec![
            comment(1, None, 0),
            comment(2, Some(1), 1),
            comment(3, Some(2), 2),
            comment(4, Some(99), 3),
        ]);
        assert_eq!(count(&forest), 4);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].comment.id, id(1));
        assert_eq!(forest[0].replies.len(), 1);
        assert_eq!(forest[0].replies[0].comment.id, id(2));
        assert_eq!(forest[0].replies[0].replies[0].comment.id, id(3));
        assert_eq!(forest[1].comment.id, id(4));
        assert!(forest[1].replies.is_empty());
    }

    #[test]
    fn roots_keep_input_order() {
        let forest = build_forest(vec![
            comment(1, None, 10),
            comment(2, None, 20),
            comment(3, None, 30),
        ]);
        let ids: Vec<_> = forest.iter().map(|n| n.comment.id).collect();
        assert_eq!(ids, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn replies_keep_input_order() {
        let forest = build_forest(vec![
            comment(1, None, 0),
            comment(2, Some(1), 1),
            comment(3, Some(1), 2),
            comment(4, Some(1), 3),
        ]);
        let ids: Vec<_> = forest[0].replies.iter().map(|n| n.comment.id).collect();
        assert_eq!(ids, vec![id(2), id(3), id(4)]);
    }

    #[test]
    fn two_comment_cycle_both_top_level() {
        let forest = build_forest(vec![comment(1, Some(2), 0), comment(2, Some(1), 1)]);
        assert_eq!(forest.len(), 2);
        assert_eq!(count(&forest), 2);
        assert!(forest.iter().all(|n| n.replies.is_empty()));
    }

    #[test]
    fn self_parent_is_top_level() {
        let forest = build_forest(vec![comment(1, Some(1), 0)]);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].replies.is_empty());
    }

    #[test]
    fn reply_under_cycle_member_stays_attached() {
        // 1 and 2 reference each other; 3 replies to 1
        let forest = build_forest(vec![
            comment(1, Some(2), 0),
            comment(2, Some(1), 1),
            comment(3, Some(1), 2),
        ]);
        assert_eq!(count(&forest), 3);
        assert_eq!(forest.len(), 2);
        let under_1 = forest.iter().find(|n| n.comment.id == id(1)).unwrap();
        assert_eq!(under_1.replies.len(), 1);
        assert_eq!(under_1.replies[0].comment.id, id(3));
    }

    #[test]
    fn deleted_parent_still_anchors_replies() {
        let mut parent = comment(1, None, 0);
        parent.is_deleted = true;
        let forest = build_forest(vec![parent, comment(2, Some(1), 1)]);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].comment.is_deleted);
        assert_eq!(forest[0].replies[0].comment.id, id(2));
    }

    #[test]
    fn duplicate_ids_all_survive() {
        let forest = build_forest(vec![
            comment(1, None, 0),
            comment(1, None, 1),
            comment(2, Some(1), 2),
        ]);
        assert_eq!(count(&forest), 3);
    }

    fn contains(node: &CommentNode, needle: CommentId) -> bool {
        node.comment.id == needle || node.replies.iter().any(|n| contains(n, needle))
    }

    fn assert_no_self_descendant(node: &CommentNode) {
        for r in &node.replies {
            assert!(
                !contains(r, node.comment.id),
                "{:?} is nested under itself",
                node.comment.id
            );
            assert_no_self_descendant(r);
        }
    }

    #[test]
    fn conservation_on_arbitrary_links() {
        // Parent links are picked from a tiny id space so that orphans,
        // duplicates, self-references and cycles all come up.
        bolero::check!()
            .with_type::<Vec<(u8, Option<u8>)>>()
            .cloned()
            .for_each(|links| {
                let mut seen = std::collections::HashSet::new();
                let unique_ids = links.iter().all(|(id, _)| seen.insert(*id));
                let comments: Vec<Comment> = links
                    .iter()
                    .enumerate()
                    .map(|(i, (id, parent))| {
                        comment(*id as u128, parent.map(|p| p as u128), i as i64)
                    })
                    .collect();
                let n = comments.len();
                let forest = build_forest(comments);
                assert_eq!(count(&forest), n);
                // with duplicate ids two records may legitimately share one,
                // so the structural check only makes sense without them
                if unique_ids {
                    for root in &forest {
                        assert_no_self_descendant(root);
                    }
                }
            });
    }

    #[test]
    fn render_rolls_up_reactions_per_viewer() {
        let viewer = UserId(Uuid::from_u128(7));
        let mut c = comment(1, None, 0);
        c.reactions = vec![
            Reaction {
                user_id: viewer,
                emoji: String::from("👍"),
            },
            Reaction {
                user_id: UserId(Uuid::from_u128(8)),
                emoji: String::from("👍"),
            },
        ];
        let views = CommentView::render_forest(build_forest(vec![c, comment(2, Some(1), 1)]), viewer);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].reactions.len(), 1);
        assert_eq!(views[0].reactions[0].count, 2);
        assert!(views[0].reactions[0].viewer_reacted);
        assert_eq!(views[0].replies.len(), 1);
        assert!(views[0].replies[0].reactions.is_empty());
    }
}
