use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use texchat_migration::{Migrator, MigratorTrait};
use tracing::{debug, info};

/// 创建 SQLite 连接选项
fn create_sqlite_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30))
        .pragma("temp_store", "MEMORY")
}

async fn migrate_database(path: &Path) -> Result<()> {
    if !path.exists() {
        debug!("数据库文件不存在，将创建新的数据库: {:?}", path);
    }

    // 迁移使用单连接池，避免多连接导致的迁移顺序问题
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(create_sqlite_options(path))
        .await
        .context("打开迁移连接失败")?;
    let connection = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());

    Migrator::up(&connection, None).await.context("数据库迁移失败")?;

    pool.close().await;
    debug!("迁移完成，已关闭迁移连接池");
    Ok(())
}

/// 进行数据库迁移并获取连接池
pub async fn setup_database(path: &Path) -> Result<DatabaseConnection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| format!("创建数据目录 {:?} 失败", parent))?;
        }
    }

    migrate_database(path).await?;

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(create_sqlite_options(path))
        .await
        .context("创建数据库连接池失败")?;

    info!("数据库已就绪: {:?}", path);
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// 测试用内存数据库，单连接保证所有查询落在同一个库上
#[cfg(test)]
pub async fn setup_memory_database() -> DatabaseConnection {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    let connection = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool);
    Migrator::up(&connection, None).await.expect("apply migrations");
    connection
}

/// 未执行迁移的内存数据库，用于模拟用户文档读取失败
#[cfg(test)]
pub async fn setup_broken_database() -> DatabaseConnection {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    SqlxSqliteConnector::from_sqlx_sqlite_pool(pool)
}
