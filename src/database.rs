//! PostgreSQL connection pool.
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "accounts";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Open a pool and run pending migrations.
pub async fn connect(
    hostname: &str,
    username: &str,
    password: &str,
    db: &str,
    pool: u32,
) -> Result<PgPool, sqlx::Error> {
    let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
    let postgres = PgPoolOptions::new()
        .max_connections(pool)
        .connect(&addr)
        .await?;

    tracing::info!(%hostname, %db, "postgres connected");

    sqlx::migrate!().run(&postgres).await?;
    tracing::debug!("migrations applied");

    Ok(postgres)
}
