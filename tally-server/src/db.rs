use std::collections::HashMap;

use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use futures::TryStreamExt;
use sqlx::Row;
use tally_api::{
    AuthToken, Comment, CommentId, Flag, Item, ItemId, NewItem, NewSession, NewTransaction,
    NewUser, Reaction, Store, Time, Transaction, TransactionId, User, UserId, Uuid,
};

use crate::Error;

// TIMESTAMP columns come back naive; everything in them was written as UTC.
fn utc(d: NaiveDateTime) -> Time {
    d.and_local_timezone(Utc).unwrap()
}

pub async fn create_user(conn: &mut sqlx::PgConnection, u: NewUser) -> Result<(), Error> {
    let id_taken = sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(u.id.0)
        .fetch_optional(&mut *conn)
        .await
        .context("checking id uniqueness")?;
    if id_taken.is_some() {
        return Err(Error::uuid_already_used(u.id.0));
    }
    let name_taken = sqlx::query("SELECT 1 FROM users WHERE name = $1")
        .bind(&u.name)
        .fetch_optional(&mut *conn)
        .await
        .context("checking name uniqueness")?;
    if name_taken.is_some() {
        return Err(Error::name_already_used(u.name));
    }
    if let Some(email) = &u.email {
        let email_taken = sqlx::query("SELECT 1 FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *conn)
            .await
            .context("checking email uniqueness")?;
        if email_taken.is_some() {
            return Err(Error::email_already_used(email.clone()));
        }
    }
    let res = sqlx::query("INSERT INTO users VALUES ($1, $2, $3, $4, $5)")
        .bind(u.id.0)
        .bind(&u.name)
        .bind(&u.password)
        .bind(&u.email)
        .bind(&u.phone)
        .execute(&mut *conn)
        .await
        .context("inserting user")?;
    if res.rows_affected() != 1 {
        return Err(anyhow::anyhow!(
            "insertion of user {:?} affected {} rows",
            u.id,
            res.rows_affected()
        )
        .into());
    }
    Ok(())
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    s: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let user = sqlx::query("SELECT id, password FROM users WHERE name = $1")
        .bind(&s.name)
        .fetch_optional(&mut *conn)
        .await
        .context("querying users table")?;
    let user = match user {
        Some(user) => user,
        None => return Ok(None),
    };
    // Passwords are compared verbatim, matching what the store holds.
    let stored: String = user
        .try_get("password")
        .context("retrieving the password field")?;
    if stored != s.password {
        return Ok(None);
    }
    let user_id: Uuid = user.try_get("id").context("retrieving the id field")?;
    let token = AuthToken(Uuid::new_v4());
    sqlx::query("INSERT INTO sessions VALUES ($1, $2, $3, $4)")
        .bind(token.0)
        .bind(user_id)
        .bind(&s.device)
        .bind(Utc::now().naive_utc())
        .execute(&mut *conn)
        .await
        .context("inserting session")?;
    Ok(Some(token))
}

pub async fn logout_user(conn: &mut sqlx::PgConnection, token: &AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() > 0)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let row = sqlx::query("SELECT user_id FROM sessions WHERE token = $1")
        .bind(token.0)
        .fetch_optional(&mut *conn)
        .await
        .context("querying sessions table")?;
    match row {
        Some(row) => Ok(UserId(
            row.try_get("user_id")
                .context("retrieving the user_id field")?,
        )),
        None => Err(Error::permission_denied()),
    }
}

pub async fn fetch_users(conn: &mut sqlx::PgConnection) -> anyhow::Result<Vec<User>> {
    let mut users = Vec::new();
    let mut rows = sqlx::query("SELECT id, name, email, phone FROM users ORDER BY name").fetch(conn);
    while let Some(u) = rows.try_next().await.context("querying users table")? {
        users.push(User {
            id: UserId(u.try_get("id").context("retrieving the id field")?),
            name: u.try_get("name").context("retrieving the name field")?,
            email: u.try_get("email").context("retrieving the email field")?,
            phone: u.try_get("phone").context("retrieving the phone field")?,
        });
    }
    Ok(users)
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<Item> {
    Ok(Item {
        id: ItemId(row.try_get("id").context("retrieving the id field")?),
        author_id: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        name: row.try_get("name").context("retrieving the name field")?,
        cost: row.try_get("cost").context("retrieving the cost field")?,
        note: row.try_get("note").context("retrieving the note field")?,
        date: utc(row.try_get("date").context("retrieving the date field")?),
    })
}

pub async fn fetch_items(conn: &mut sqlx::PgConnection) -> anyhow::Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut rows =
        sqlx::query("SELECT id, author_id, name, cost, note, date FROM items ORDER BY date").fetch(conn);
    while let Some(i) = rows.try_next().await.context("querying items table")? {
        items.push(item_from_row(&i)?);
    }
    Ok(items)
}

pub async fn create_item(
    conn: &mut sqlx::PgConnection,
    author: UserId,
    data: NewItem,
) -> anyhow::Result<Item> {
    let item = Item {
        id: ItemId(Uuid::new_v4()),
        author_id: author,
        name: data.name,
        cost: data.cost,
        note: data.note,
        date: Utc::now(),
    };
    let res = sqlx::query("INSERT INTO items VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(item.id.0)
        .bind(item.author_id.0)
        .bind(&item.name)
        .bind(item.cost)
        .bind(&item.note)
        .bind(item.date.naive_utc())
        .execute(conn)
        .await
        .context("inserting item")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "insertion of item {:?} affected {} rows",
        item.id,
        res.rows_affected()
    );
    Ok(item)
}

pub async fn update_item(
    conn: &mut sqlx::PgConnection,
    id: ItemId,
    data: NewItem,
) -> anyhow::Result<Item> {
    let row = sqlx::query(
        "UPDATE items SET name = $2, cost = $3, note = $4 WHERE id = $1 RETURNING author_id, date",
    )
    .bind(id.0)
    .bind(&data.name)
    .bind(data.cost)
    .bind(&data.note)
    .fetch_one(conn)
    .await
    .with_context(|| format!("updating item {:?}", id))?;
    Ok(Item {
        id,
        author_id: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        name: data.name,
        cost: data.cost,
        note: data.note,
        date: utc(row.try_get("date").context("retrieving the date field")?),
    })
}

pub async fn delete_item(conn: &mut sqlx::PgConnection, id: ItemId) -> anyhow::Result<()> {
    let res = sqlx::query("DELETE FROM items WHERE id = $1")
        .bind(id.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting item {:?}", id))?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "deletion of item {:?} affected {} rows",
        id,
        res.rows_affected()
    );
    Ok(())
}

pub async fn fetch_transactions(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    limit: i64,
) -> anyhow::Result<Vec<Transaction>> {
    let mut transactions = Vec::new();
    let mut rows = sqlx::query(
        "SELECT id, user_id, description, amount, category, date
            FROM transactions
        WHERE user_id = $1
        ORDER BY date DESC
        LIMIT $2",
    )
    .bind(user.0)
    .bind(limit)
    .fetch(conn);
    while let Some(t) = rows
        .try_next()
        .await
        .context("querying transactions table")?
    {
        transactions.push(Transaction {
            id: TransactionId(t.try_get("id").context("retrieving the id field")?),
            user_id: UserId(
                t.try_get("user_id")
                    .context("retrieving the user_id field")?,
            ),
            description: t
                .try_get("description")
                .context("retrieving the description field")?,
            amount: t.try_get("amount").context("retrieving the amount field")?,
            category: t
                .try_get("category")
                .context("retrieving the category field")?,
            date: utc(t.try_get("date").context("retrieving the date field")?),
        });
    }
    Ok(transactions)
}

pub async fn add_transaction(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    data: NewTransaction,
) -> anyhow::Result<Transaction> {
    let transaction = Transaction {
        id: TransactionId(Uuid::new_v4()),
        user_id: user,
        description: data.description,
        amount: data.amount,
        category: data.category,
        date: data.date.unwrap_or_else(Utc::now),
    };
    let res = sqlx::query("INSERT INTO transactions VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(transaction.id.0)
        .bind(transaction.user_id.0)
        .bind(&transaction.description)
        .bind(transaction.amount)
        .bind(&transaction.category)
        .bind(transaction.date.naive_utc())
        .execute(conn)
        .await
        .context("inserting transaction")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "insertion of transaction {:?} affected {} rows",
        transaction.id,
        res.rows_affected()
    );
    Ok(transaction)
}

pub async fn delete_transaction(
    conn: &mut sqlx::PgConnection,
    id: TransactionId,
) -> anyhow::Result<()> {
    let res = sqlx::query("DELETE FROM transactions WHERE id = $1")
        .bind(id.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting transaction {:?}", id))?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "deletion of transaction {:?} affected {} rows",
        id,
        res.rows_affected()
    );
    Ok(())
}

fn comment_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        item_id: ItemId(
            row.try_get("item_id")
                .context("retrieving the item_id field")?,
        ),
        author_id: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        message: row
            .try_get("message")
            .context("retrieving the message field")?,
        created_at: utc(row
            .try_get("created_at")
            .context("retrieving the created_at field")?),
        edited_at: row
            .try_get::<Option<NaiveDateTime>, _>("edited_at")
            .context("retrieving the edited_at field")?
            .map(utc),
        is_deleted: row
            .try_get("is_deleted")
            .context("retrieving the is_deleted field")?,
        mentions: Vec::new(),
        reactions: Vec::new(),
        flags: Vec::new(),
    })
}

/// Flat, ascending-creation-time fetch of one item's comments, with
/// mentions/reactions/flags folded back onto their comment.
pub async fn fetch_comments_for_item(
    conn: &mut sqlx::PgConnection,
    item: ItemId,
) -> anyhow::Result<Vec<Comment>> {
    let mut comments = Vec::new();
    let mut by_id: HashMap<CommentId, usize> = HashMap::new();
    {
        let mut rows = sqlx::query(
            "SELECT id, item_id, author_id, parent_id, message, created_at, edited_at, is_deleted
                FROM comments
            WHERE item_id = $1
            ORDER BY created_at, id",
        )
        .bind(item.0)
        .fetch(&mut *conn);
        while let Some(c) = rows.try_next().await.context("querying comments table")? {
            let comment = comment_from_row(&c)?;
            by_id.insert(comment.id, comments.len());
            comments.push(comment);
        }
    }

    {
        let mut rows = sqlx::query(
            "SELECT m.comment_id, m.user_id
                FROM comment_mentions m
            INNER JOIN comments c ON c.id = m.comment_id
            WHERE c.item_id = $1
            ORDER BY m.user_id",
        )
        .bind(item.0)
        .fetch(&mut *conn);
        while let Some(m) = rows
            .try_next()
            .await
            .context("querying comment_mentions table")?
        {
            let comment_id = CommentId(
                m.try_get("comment_id")
                    .context("retrieving the comment_id field")?,
            );
            if let Some(&i) = by_id.get(&comment_id) {
                comments[i].mentions.push(UserId(
                    m.try_get("user_id")
                        .context("retrieving the user_id field")?,
                ));
            }
        }
    }

    {
        let mut rows = sqlx::query(
            "SELECT r.comment_id, r.user_id, r.emoji
                FROM comment_reactions r
            INNER JOIN comments c ON c.id = r.comment_id
            WHERE c.item_id = $1
            ORDER BY r.created_at, r.user_id",
        )
        .bind(item.0)
        .fetch(&mut *conn);
        while let Some(r) = rows
            .try_next()
            .await
            .context("querying comment_reactions table")?
        {
            let comment_id = CommentId(
                r.try_get("comment_id")
                    .context("retrieving the comment_id field")?,
            );
            if let Some(&i) = by_id.get(&comment_id) {
                comments[i].reactions.push(Reaction {
                    user_id: UserId(
                        r.try_get("user_id")
                            .context("retrieving the user_id field")?,
                    ),
                    emoji: r.try_get("emoji").context("retrieving the emoji field")?,
                });
            }
        }
    }

    {
        let mut rows = sqlx::query(
            "SELECT f.comment_id, f.user_id, f.reason
                FROM comment_flags f
            INNER JOIN comments c ON c.id = f.comment_id
            WHERE c.item_id = $1
            ORDER BY f.created_at, f.user_id",
        )
        .bind(item.0)
        .fetch(&mut *conn);
        while let Some(f) = rows
            .try_next()
            .await
            .context("querying comment_flags table")?
        {
            let comment_id = CommentId(
                f.try_get("comment_id")
                    .context("retrieving the comment_id field")?,
            );
            if let Some(&i) = by_id.get(&comment_id) {
                comments[i].flags.push(Flag {
                    user_id: UserId(
                        f.try_get("user_id")
                            .context("retrieving the user_id field")?,
                    ),
                    reason: f.try_get("reason").context("retrieving the reason field")?,
                });
            }
        }
    }

    Ok(comments)
}

pub async fn fetch_comment(
    conn: &mut sqlx::PgConnection,
    id: CommentId,
) -> anyhow::Result<Comment> {
    let row = sqlx::query(
        "SELECT id, item_id, author_id, parent_id, message, created_at, edited_at, is_deleted
            FROM comments
        WHERE id = $1",
    )
    .bind(id.0)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("querying comment {:?}", id))?;
    let mut comment = comment_from_row(&row)?;

    {
        let mut rows =
            sqlx::query("SELECT user_id FROM comment_mentions WHERE comment_id = $1 ORDER BY user_id")
                .bind(id.0)
                .fetch(&mut *conn);
        while let Some(m) = rows
            .try_next()
            .await
            .context("querying comment_mentions table")?
        {
            comment.mentions.push(UserId(
                m.try_get("user_id")
                    .context("retrieving the user_id field")?,
            ));
        }
    }

    {
        let mut rows = sqlx::query(
            "SELECT user_id, emoji FROM comment_reactions WHERE comment_id = $1 ORDER BY created_at, user_id",
        )
        .bind(id.0)
        .fetch(&mut *conn);
        while let Some(r) = rows
            .try_next()
            .await
            .context("querying comment_reactions table")?
        {
            comment.reactions.push(Reaction {
                user_id: UserId(
                    r.try_get("user_id")
                        .context("retrieving the user_id field")?,
                ),
                emoji: r.try_get("emoji").context("retrieving the emoji field")?,
            });
        }
    }

    {
        let mut rows = sqlx::query(
            "SELECT user_id, reason FROM comment_flags WHERE comment_id = $1 ORDER BY created_at, user_id",
        )
        .bind(id.0)
        .fetch(&mut *conn);
        while let Some(f) = rows
            .try_next()
            .await
            .context("querying comment_flags table")?
        {
            comment.flags.push(Flag {
                user_id: UserId(
                    f.try_get("user_id")
                        .context("retrieving the user_id field")?,
                ),
                reason: f.try_get("reason").context("retrieving the reason field")?,
            });
        }
    }

    Ok(comment)
}

pub async fn add_comment(
    conn: &mut sqlx::PgConnection,
    item: ItemId,
    author: UserId,
    message: String,
    parent: Option<CommentId>,
    mentions: Vec<UserId>,
) -> anyhow::Result<Comment> {
    let comment = Comment::new(item, author, message, parent, mentions);
    let res = sqlx::query("INSERT INTO comments VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
        .bind(comment.id.0)
        .bind(comment.item_id.0)
        .bind(comment.author_id.0)
        .bind(comment.parent_id.map(|p| p.0))
        .bind(&comment.message)
        .bind(comment.created_at.naive_utc())
        .bind(comment.edited_at.map(|t| t.naive_utc()))
        .bind(comment.is_deleted)
        .execute(&mut *conn)
        .await
        .context("inserting comment")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "insertion of comment {:?} affected {} rows",
        comment.id,
        res.rows_affected()
    );
    for user in &comment.mentions {
        sqlx::query("INSERT INTO comment_mentions VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(comment.id.0)
            .bind(user.0)
            .execute(&mut *conn)
            .await
            .context("inserting comment mention")?;
    }
    Ok(comment)
}

pub async fn edit_comment(
    conn: &mut sqlx::PgConnection,
    id: CommentId,
    message: String,
) -> anyhow::Result<Comment> {
    let res = sqlx::query("UPDATE comments SET message = $2, edited_at = $3 WHERE id = $1")
        .bind(id.0)
        .bind(&message)
        .bind(Utc::now().naive_utc())
        .execute(&mut *conn)
        .await
        .context("updating comment")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "edit of comment {:?} affected {} rows",
        id,
        res.rows_affected()
    );
    fetch_comment(conn, id).await
}

pub async fn delete_comment(
    conn: &mut sqlx::PgConnection,
    id: CommentId,
) -> anyhow::Result<Comment> {
    let res = sqlx::query("UPDATE comments SET is_deleted = true WHERE id = $1")
        .bind(id.0)
        .execute(&mut *conn)
        .await
        .context("soft-deleting comment")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "deletion of comment {:?} affected {} rows",
        id,
        res.rows_affected()
    );
    fetch_comment(conn, id).await
}

pub async fn add_reaction(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
    emoji: String,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO comment_reactions VALUES ($1, $2, $3, $4)
        ON CONFLICT (comment_id, user_id, emoji) DO NOTHING",
    )
    .bind(comment.0)
    .bind(user.0)
    .bind(&emoji)
    .bind(Utc::now().naive_utc())
    .execute(conn)
    .await
    .context("upserting reaction")?;
    Ok(())
}

pub async fn remove_reaction(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
    emoji: String,
) -> anyhow::Result<()> {
    sqlx::query(
        "DELETE FROM comment_reactions WHERE comment_id = $1 AND user_id = $2 AND emoji = $3",
    )
    .bind(comment.0)
    .bind(user.0)
    .bind(&emoji)
    .execute(conn)
    .await
    .context("deleting reaction")?;
    Ok(())
}

pub async fn flag_comment(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
    reason: Option<String>,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO comment_flags VALUES ($1, $2, $3, $4)
        ON CONFLICT (comment_id, user_id) DO UPDATE SET reason = EXCLUDED.reason",
    )
    .bind(comment.0)
    .bind(user.0)
    .bind(&reason)
    .bind(Utc::now().naive_utc())
    .execute(conn)
    .await
    .context("upserting flag")?;
    Ok(())
}

pub async fn remove_flag(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM comment_flags WHERE comment_id = $1 AND user_id = $2")
        .bind(comment.0)
        .bind(user.0)
        .execute(conn)
        .await
        .context("deleting flag")?;
    Ok(())
}

/// `tally_api::Store` over a live connection, so `CommentAction::apply`
/// drives the same queries the handlers use.
pub struct PgStore<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

#[async_trait::async_trait]
impl Store for PgStore<'_> {
    async fn comments_for_item(&mut self, item: ItemId) -> anyhow::Result<Vec<Comment>> {
        fetch_comments_for_item(&mut *self.conn, item).await
    }

    async fn add_comment(
        &mut self,
        item: ItemId,
        author: UserId,
        message: String,
        parent: Option<CommentId>,
        mentions: Vec<UserId>,
    ) -> anyhow::Result<Comment> {
        add_comment(&mut *self.conn, item, author, message, parent, mentions).await
    }

    async fn edit_comment(
        &mut self,
        comment: CommentId,
        message: String,
    ) -> anyhow::Result<Comment> {
        edit_comment(&mut *self.conn, comment, message).await
    }

    async fn delete_comment(&mut self, comment: CommentId) -> anyhow::Result<Comment> {
        delete_comment(&mut *self.conn, comment).await
    }

    async fn add_reaction(
        &mut self,
        comment: CommentId,
        user: UserId,
        emoji: String,
    ) -> anyhow::Result<()> {
        add_reaction(&mut *self.conn, comment, user, emoji).await
    }

    async fn remove_reaction(
        &mut self,
        comment: CommentId,
        user: UserId,
        emoji: String,
    ) -> anyhow::Result<()> {
        remove_reaction(&mut *self.conn, comment, user, emoji).await
    }

    async fn flag_comment(
        &mut self,
        comment: CommentId,
        user: UserId,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        flag_comment(&mut *self.conn, comment, user, reason).await
    }

    async fn remove_flag(&mut self, comment: CommentId, user: UserId) -> anyhow::Result<()> {
        remove_flag(&mut *self.conn, comment, user).await
    }
}
