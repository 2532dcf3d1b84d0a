use chrono::{Duration, Utc};
use rand::Rng;

const NUM_COMMENTS_PER_ITEM: usize = 8;
const REPLY_CHANCE: f64 = 0.5;
const COMMENT_WORD_COUNT: usize = 12;
const NUM_TRANSACTIONS: usize = 40;

fn gen_n_rows(table: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    println!("INSERT INTO {} VALUES", table);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn sql_time(t: chrono::DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn main() {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::days(30);

    let users = [
        ("Wilfred", "wilfred"),
        ("John", "john"),
        ("Peter", "peter"),
        ("Reuben", "reuben"),
    ];
    let user_ids: Vec<String> = users
        .iter()
        .map(|_| uuid::Uuid::new_v4().to_string())
        .collect();
    gen_n_rows("users", users.len(), |i| {
        let (name, password) = users[i];
        format!(
            "('{}', '{}', '{}', NULL, NULL)",
            user_ids[i], name, password
        )
    });

    let items = [
        ("Groceries", 50.75, "Weekly shopping"),
        ("Electricity Bill", 120.5, "KPLC August bill"),
        ("Internet Subscription", 35.0, "Monthly WiFi"),
        ("School Fees", 200.0, "Term 3 Payment"),
        ("Fuel", 70.0, "Trip to Nairobi"),
    ];
    let item_ids: Vec<String> = items
        .iter()
        .map(|_| uuid::Uuid::new_v4().to_string())
        .collect();
    gen_n_rows("items", items.len(), |i| {
        let (name, cost, note) = items[i];
        format!(
            "('{}', '{}', '{}', {}, '{}', '{}')",
            item_ids[i],
            user_ids[rng.gen_range(0..user_ids.len())],
            name,
            cost,
            note,
            sql_time(start + Duration::hours(i as i64)),
        )
    });

    // Comment threads: each comment either starts a thread or replies to an
    // earlier comment of the same item.
    let mut comments: Vec<(String, usize, Option<String>)> = Vec::new();
    for item_idx in 0..items.len() {
        let mut on_this_item: Vec<String> = Vec::new();
        for _ in 0..NUM_COMMENTS_PER_ITEM {
            let id = uuid::Uuid::new_v4().to_string();
            let parent = if !on_this_item.is_empty() && rng.gen_bool(REPLY_CHANCE) {
                Some(on_this_item[rng.gen_range(0..on_this_item.len())].clone())
            } else {
                None
            };
            comments.push((id.clone(), item_idx, parent));
            on_this_item.push(id);
        }
    }
    gen_n_rows("comments", comments.len(), |i| {
        let (id, item_idx, parent) = &comments[i];
        format!(
            "('{}', '{}', '{}', {}, '{}', '{}', NULL, false)",
            id,
            item_ids[*item_idx],
            user_ids[rng.gen_range(0..user_ids.len())],
            match parent {
                Some(p) => format!("'{}'", p),
                None => String::from("NULL"),
            },
            lipsum::lipsum_words(COMMENT_WORD_COUNT),
            sql_time(start + Duration::minutes(i as i64)),
        )
    });

    let emojis = ["👍", "🎉", "😅"];
    gen_n_rows("comment_reactions", comments.len() / 2, |i| {
        let (comment, _, _) = &comments[i * 2];
        format!(
            "('{}', '{}', '{}', '{}')",
            comment,
            user_ids[rng.gen_range(0..user_ids.len())],
            emojis[rng.gen_range(0..emojis.len())],
            sql_time(start + Duration::minutes((comments.len() + i) as i64)),
        )
    });

    let categories = ["food", "utilities", "transport", "school"];
    gen_n_rows("transactions", NUM_TRANSACTIONS, |i| {
        format!(
            "('{}', '{}', '{}', {:.2}, '{}', '{}')",
            uuid::Uuid::new_v4(),
            user_ids[rng.gen_range(0..user_ids.len())],
            lipsum::lipsum_words(3),
            rng.gen_range(1.0..250.0),
            categories[rng.gen_range(0..categories.len())],
            sql_time(start + Duration::hours(i as i64 * 3)),
        )
    });
}
