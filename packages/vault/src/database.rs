use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Open a connection pool for `db_url` without touching the schema.
pub async fn connect(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    if db_url.starts_with("sqlite:") {
        // An in-memory SQLite database lives and dies with its only connection.
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
    } else {
        opt.max_connections(100)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(8))
            .max_lifetime(Duration::from_secs(8))
            .sqlx_logging(true);
    }

    Database::connect(opt).await
}

/// Connect and bring the `resource` and `purchase` tables up to date.
pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = connect(db_url).await?;
    sync_schema(&db).await?;
    Ok(db)
}

pub async fn sync_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.get_schema_registry("vault::entity::*").sync(db).await?;
    Ok(())
}
