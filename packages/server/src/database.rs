use sea_orm::{DatabaseConnection, DbErr};

/// Connect and sync every table the server touches: the vault's
/// `resource`/`purchase` plus the dead letter table.
pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = vault::database::connect(db_url).await?;
    vault::database::sync_schema(&db).await?;
    db.get_schema_registry("server::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}
