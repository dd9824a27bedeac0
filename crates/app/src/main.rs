use std::{sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "note={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.server.database).await?;

    let mut builder = engine::Engine::builder()
        .database(db)
        .memoize(settings.engine.memoize);
    if let Some(name) = settings.engine.partner_bank_name {
        builder = builder.partner_bank(name);
    }
    if let Some(special_type) = settings.engine.credit_source {
        builder = builder.credit_source(special_type);
    }
    let engine = Arc::new(builder.build().await?);

    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", bind, settings.server.port);
    let server_engine = engine.clone();
    tasks.spawn(async move {
        server::run(server_engine, &addr).await;
    });

    if settings.engine.memoize {
        let every = Duration::from_secs(settings.engine.cache_sweep_secs.max(1));
        tasks.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match engine.sweep_permission_cache().await {
                    Ok(0) => {}
                    Ok(dropped) => tracing::debug!(dropped, "permission cache swept"),
                    Err(err) => tracing::error!("permission cache sweep failed: {err}"),
                }
            }
        });
    }

    // The server task ends on shutdown; stop the sweeper with it.
    if tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    tracing::info!("database ready");
    Ok(database)
}
