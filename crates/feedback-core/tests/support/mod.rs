use std::path::PathBuf;

use feedback_core::repos::Store;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::OnceCell;

static MIGRATIONS_APPLIED: OnceCell<()> = OnceCell::const_new();

/// Store backed by `DATABASE_URL`, or `None` when no database is configured.
pub async fn test_store() -> Option<Store> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping store test");
        return None;
    };
    apply_migrations_once(&database_url).await;

    Some(
        Store::connect(&database_url, 4)
            .await
            .expect("test store connection should succeed"),
    )
}

async fn apply_migrations_once(database_url: &str) {
    MIGRATIONS_APPLIED
        .get_or_init(|| async move {
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect(database_url)
                .await
                .expect("migration pool connection should succeed");

            let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
            let migrator = sqlx::migrate::Migrator::new(migrations_dir)
                .await
                .expect("migrations should load");
            migrator
                .run(&pool)
                .await
                .expect("migrations should apply successfully");
        })
        .await;
}
