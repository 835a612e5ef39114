use super::Database;
use crate::models::LogRecord;

impl Database {
    pub async fn insert_log(&self, record: &LogRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO etl_logs (time, run_id, task_id, log_type, element, action, info, trace)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.time)
        .bind(record.run_id)
        .bind(record.task_id)
        .bind(&record.log_type)
        .bind(&record.element)
        .bind(&record.action)
        .bind(&record.info)
        .bind(&record.trace)
        .execute(&self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn logs_for_run(&self, run_id: i64) -> Result<Vec<LogRecord>, sqlx::Error> {
        sqlx::query_as::<_, LogRecord>(
            "SELECT id, time, run_id, task_id, log_type, element, action, info, trace
             FROM etl_logs WHERE run_id = ? ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(&self.pool())
        .await
    }

    pub async fn logs_for_task(&self, task_id: i64) -> Result<Vec<LogRecord>, sqlx::Error> {
        sqlx::query_as::<_, LogRecord>(
            "SELECT id, time, run_id, task_id, log_type, element, action, info, trace
             FROM etl_logs WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool())
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_database;
    use crate::models::LogRecord;

    #[tokio::test]
    async fn log_rows_filter_by_run_and_task() {
        let db = test_database().await;
        for (run_id, task_id) in [(1, 10), (1, 11), (2, 10)] {
            db.insert_log(&LogRecord {
                id: 0,
                time: 1_389_434_400,
                run_id,
                task_id,
                log_type: "INFO".into(),
                element: "Folder source".into(),
                action: "extract".into(),
                info: String::new(),
                trace: String::new(),
            })
            .await
            .unwrap();
        }

        assert_eq!(db.logs_for_run(1).await.unwrap().len(), 2);
        assert_eq!(db.logs_for_task(10).await.unwrap().len(), 2);
        assert_eq!(db.logs_for_run(3).await.unwrap().len(), 0);
    }
}
