//! Sqlite-backed player state.
//!
//! Stores the persisted keys of the dialogue system: global flags, item
//! counts, quest stages, per-NPC dialogue progress, and learned NPC
//! display names.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::player::{NpcProgress, PlayerStateStore};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_flags (
                flag_name TEXT PRIMARY KEY,
                flag_value INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_items (
                item_id TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_stages (
                quest_id TEXT PRIMARY KEY,
                stage INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS npc_progress (
                npc_key TEXT PRIMARY KEY,
                node_id TEXT,
                stage INTEGER NOT NULL DEFAULT 0,
                graph_key TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS npc_names (
                npc_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl PlayerStateStore for Database {
    async fn flag(&self, key: &str) -> Result<bool, String> {
        let row = sqlx::query("SELECT flag_value FROM player_flags WHERE flag_name = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        Ok(row.map(|r| r.get::<i64, _>("flag_value") != 0).unwrap_or(false))
    }

    async fn set_flag(&self, key: &str, value: bool) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO player_flags (flag_name, flag_value) VALUES (?, ?)
            ON CONFLICT(flag_name) DO UPDATE SET flag_value = excluded.flag_value
            "#,
        )
        .bind(key)
        .bind(value as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Database error: {}", e))?;

        Ok(())
    }

    async fn item_count(&self, item_id: &str) -> Result<i64, String> {
        let row = sqlx::query("SELECT count FROM player_items WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        Ok(row.map(|r| r.get::<i64, _>("count")).unwrap_or(0))
    }

    async fn add_item(&self, item_id: &str, count: i64) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO player_items (item_id, count) VALUES (?, MAX(0, ?))
            ON CONFLICT(item_id) DO UPDATE SET count = MAX(0, count + excluded.count)
            "#,
        )
        .bind(item_id)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Database error: {}", e))?;

        Ok(())
    }

    async fn quest_stage(&self, quest_id: &str) -> Result<i64, String> {
        let row = sqlx::query("SELECT stage FROM quest_stages WHERE quest_id = ?")
            .bind(quest_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        Ok(row.map(|r| r.get::<i64, _>("stage")).unwrap_or(0))
    }

    async fn set_quest_stage(&self, quest_id: &str, stage: i64) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO quest_stages (quest_id, stage) VALUES (?, ?)
            ON CONFLICT(quest_id) DO UPDATE SET stage = excluded.stage
            "#,
        )
        .bind(quest_id)
        .bind(stage)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Database error: {}", e))?;

        Ok(())
    }

    async fn npc_progress(&self, npc_key: &str) -> Result<Option<NpcProgress>, String> {
        let row = sqlx::query("SELECT node_id, stage, graph_key FROM npc_progress WHERE npc_key = ?")
            .bind(npc_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        Ok(row.map(|r| NpcProgress {
            node_id: r.get("node_id"),
            stage: r.get("stage"),
            graph_key: r.get("graph_key"),
        }))
    }

    async fn set_npc_progress(
        &self,
        npc_key: &str,
        progress: &NpcProgress,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO npc_progress (npc_key, node_id, stage, graph_key) VALUES (?, ?, ?, ?)
            ON CONFLICT(npc_key) DO UPDATE SET
                node_id = excluded.node_id,
                stage = excluded.stage,
                graph_key = excluded.graph_key,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(npc_key)
        .bind(&progress.node_id)
        .bind(progress.stage)
        .bind(&progress.graph_key)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Database error: {}", e))?;

        Ok(())
    }

    async fn npc_name(&self, npc_id: &str) -> Result<Option<String>, String> {
        let row = sqlx::query("SELECT display_name FROM npc_names WHERE npc_id = ?")
            .bind(npc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        Ok(row.map(|r| r.get("display_name")))
    }

    async fn set_npc_name(&self, npc_id: &str, name: &str) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO npc_names (npc_id, display_name) VALUES (?, ?)
            ON CONFLICT(npc_id) DO UPDATE SET display_name = excluded.display_name
            "#,
        )
        .bind(npc_id)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Database error: {}", e))?;

        Ok(())
    }
}
