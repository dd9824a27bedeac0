use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

const DEFAULT_URL: &str = "sqlite:./note.db?mode=rwc";

async fn pending(db: &DatabaseConnection) -> Result<usize, sea_orm::DbErr> {
    Ok(Migrator::get_pending_migrations(db).await?.len())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cmd = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let db = Database::connect(&db_url).await?;

    match cmd.as_str() {
        "up" => {
            let count = pending(&db).await?;
            Migrator::up(&db, None).await?;
            println!("applied {count} migration(s)");
        }
        // Rolls back one step at a time; the seeded special accounts go first.
        "down" => Migrator::down(&db, Some(1)).await?,
        // Drops every table, then rebuilds the schema and the special accounts.
        "fresh" => Migrator::fresh(&db).await?,
        "status" => Migrator::status(&db).await?,
        _ => {
            eprintln!("usage: migration [up|down|fresh|status]  (DATABASE_URL, default {DEFAULT_URL})");
            std::process::exit(2);
        }
    }

    Ok(())
}
