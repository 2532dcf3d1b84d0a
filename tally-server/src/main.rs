use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tally_api::AuthToken;
use uuid::Uuid;

mod db;
mod error;
mod extractors;
mod feeds;
mod fuzz;
mod handlers;

pub use error::Error;
pub use extractors::{AppState, PgPool};
pub use feeds::UserFeeds;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(short, long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Token granting access to the admin endpoints; they stay disabled
    /// when unset
    #[structopt(long)]
    admin_token: Option<Uuid>,
}

async fn create_sqlx_pool(url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(url)
        .await
        .with_context(|| format!("opening database {:?}", url))
}

fn app(db: PgPool, feeds: UserFeeds, admin_token: Option<AuthToken>) -> Router {
    Router::new()
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/register", post(handlers::register))
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route("/api/users", get(handlers::fetch_users))
        .route(
            "/api/items",
            get(handlers::fetch_items).post(handlers::create_item),
        )
        .route(
            "/api/item/:id",
            put(handlers::edit_item).delete(handlers::delete_item),
        )
        .route("/api/item/:id/comments", get(handlers::fetch_comment_tree))
        .route(
            "/api/transactions",
            get(handlers::fetch_transactions).post(handlers::add_transaction),
        )
        .route("/api/transaction/:id", delete(handlers::delete_transaction))
        .route("/api/comment", post(handlers::submit_comment_action))
        .route("/ws/comment-feed", get(handlers::comment_feed))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState {
            db,
            feeds,
            admin_token,
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = create_sqlx_pool(&db_url).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("applying database migrations")?;

    let feeds = UserFeeds::new();
    let app = app(
        PgPool::new(pool),
        feeds.clone(),
        opt.admin_token.map(AuthToken),
    );

    tracing::info!("listening on {}", opt.addr);
    let served = axum::Server::bind(&opt.addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    feeds.shutdown().await;
    served.context("serving axum webserver")
}
