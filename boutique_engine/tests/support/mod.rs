use boutique_engine::SqliteDatabase;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

/// Creates a fresh SQLite database at a random temp path, runs the migrations and hands back a connected
/// backend. Each test gets its own database, so tests are free to run in parallel.
pub async fn prepare_test_env() -> SqliteDatabase {
    dotenvy::dotenv().ok();
    let _ = env_logger::try_init();
    let url = random_db_url();
    if let Err(e) = Sqlite::drop_database(&url).await {
        trace!("Nothing to drop at {url}: {e}");
    }
    Sqlite::create_database(&url).await.expect("Error creating test database");
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to test database");
    db.run_migrations().await.expect("Error running migrations");
    info!("🚀️ Test database ready at {url}");
    db
}

fn random_db_url() -> String {
    format!("sqlite://{}/boutique_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}
