use super::Database;
use crate::models::ScheduleRecord;

impl Database {
    pub async fn get_schedule_for_task(
        &self,
        task_id: i64,
    ) -> Result<Option<ScheduleRecord>, sqlx::Error> {
        sqlx::query_as::<_, ScheduleRecord>(
            "SELECT id, task_id, frequency, schedule_param, next_event_time
             FROM etl_schedules WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool())
        .await
    }

    pub async fn insert_schedule(&self, record: &ScheduleRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO etl_schedules (task_id, frequency, schedule_param, next_event_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(record.task_id)
        .bind(record.frequency)
        .bind(record.schedule_param)
        .bind(record.next_event_time)
        .execute(&self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_schedule(&self, record: &ScheduleRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE etl_schedules SET frequency = ?, schedule_param = ?, next_event_time = ?
             WHERE id = ?",
        )
        .bind(record.frequency)
        .bind(record.schedule_param)
        .bind(record.next_event_time)
        .bind(record.id)
        .execute(&self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_database;
    use crate::models::{ScheduleRecord, TaskRecord};

    #[tokio::test]
    async fn schedule_round_trip() {
        let db = test_database().await;
        let task_id = db
            .insert_task(&TaskRecord {
                id: 0,
                enabled: true,
                source_name: "folder".into(),
                source_settings: "{}".into(),
                target_name: "local_dir".into(),
                target_settings: "{}".into(),
                processor_name: "passthrough".into(),
                processor_settings: "{}".into(),
            })
            .await
            .unwrap();

        assert!(db.get_schedule_for_task(task_id).await.unwrap().is_none());

        let id = db
            .insert_schedule(&ScheduleRecord {
                id: 0,
                task_id,
                frequency: 1,
                schedule_param: 10,
                next_event_time: 1_389_434_400,
            })
            .await
            .unwrap();

        let mut loaded = db.get_schedule_for_task(task_id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.schedule_param, 10);

        loaded.next_event_time = 1_389_520_800;
        db.update_schedule(&loaded).await.unwrap();

        let reloaded = db.get_schedule_for_task(task_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_event_time, 1_389_520_800);
    }
}
