use crate::error::DbError;
use configuration::StoreSettings;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL database.
///
/// The URL comes from `store.database_url`, falling back to `DATABASE_URL`
/// (a `.env` file is honoured). The pool is shared by every account; its size
/// bounds how many store calls run at once.
pub async fn connect(settings: &StoreSettings) -> Result<PgPool, DbError> {
    let database_url = match &settings.database_url {
        Some(url) => url.clone(),
        None => {
            dotenvy::dotenv().ok();
            env::var("DATABASE_URL").map_err(|_e| {
                DbError::ConnectionConfigError("DATABASE_URL must be set.".to_string())
            })?
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    tracing::info!(max_connections = settings.max_connections, "Database pool ready.");
    Ok(pool)
}

/// Applies the embedded migrations so the schema is up-to-date on start.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    // Use a relative path from the crate root
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
