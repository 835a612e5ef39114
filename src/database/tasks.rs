use sqlx::Row;

use super::Database;
use crate::models::TaskRecord;

impl Database {
    pub async fn list_task_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query("SELECT id FROM etl_tasks ORDER BY id")
            .fetch_all(&self.pool())
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<TaskRecord>, sqlx::Error> {
        sqlx::query_as::<_, TaskRecord>(
            "SELECT id, enabled, source_name, source_settings,
             target_name, target_settings, processor_name, processor_settings
             FROM etl_tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool())
        .await
    }

    pub async fn insert_task(&self, record: &TaskRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO etl_tasks (enabled, source_name, source_settings,
             target_name, target_settings, processor_name, processor_settings)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.enabled)
        .bind(&record.source_name)
        .bind(&record.source_settings)
        .bind(&record.target_name)
        .bind(&record.target_settings)
        .bind(&record.processor_name)
        .bind(&record.processor_settings)
        .execute(&self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_task(&self, record: &TaskRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE etl_tasks SET enabled = ?, source_name = ?, source_settings = ?,
             target_name = ?, target_settings = ?, processor_name = ?, processor_settings = ?
             WHERE id = ?",
        )
        .bind(record.enabled)
        .bind(&record.source_name)
        .bind(&record.source_settings)
        .bind(&record.target_name)
        .bind(&record.target_settings)
        .bind(&record.processor_name)
        .bind(&record.processor_settings)
        .bind(record.id)
        .execute(&self.pool())
        .await?;
        Ok(())
    }

    /// Remove a task together with its schedule row.
    pub async fn delete_task(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM etl_schedules WHERE task_id = ?")
            .bind(id)
            .execute(&self.pool())
            .await?;
        sqlx::query("DELETE FROM etl_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_database;
    use crate::models::TaskRecord;

    fn sample_task() -> TaskRecord {
        TaskRecord {
            id: 0,
            enabled: true,
            source_name: "folder".to_string(),
            source_settings: "{}".to_string(),
            target_name: "local_dir".to_string(),
            target_settings: "{}".to_string(),
            processor_name: "passthrough".to_string(),
            processor_settings: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_get_update_delete_round_trip() {
        let db = test_database().await;

        let id = db.insert_task(&sample_task()).await.unwrap();
        assert!(id > 0);

        let mut loaded = db.get_task(id).await.unwrap().unwrap();
        assert_eq!(loaded.source_name, "folder");
        assert!(loaded.enabled);

        loaded.enabled = false;
        loaded.target_name = "sftp".to_string();
        db.update_task(&loaded).await.unwrap();

        let reloaded = db.get_task(id).await.unwrap().unwrap();
        assert!(!reloaded.enabled);
        assert_eq!(reloaded.target_name, "sftp");

        db.delete_task(id).await.unwrap();
        assert!(db.get_task(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_ids_list_in_insertion_order() {
        let db = test_database().await;
        let a = db.insert_task(&sample_task()).await.unwrap();
        let b = db.insert_task(&sample_task()).await.unwrap();
        assert_eq!(db.list_task_ids().await.unwrap(), vec![a, b]);
    }
}
