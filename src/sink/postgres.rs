// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// PostgreSQL 入库
///
/// 检测线程是同步线程, 这里持有一个私有的单线程 tokio 运行时驱动 sqlx
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, PgConnection, Row};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{DetectionSink, RecentDetection, CREATE_TABLE_SQL, INSERT_SQL, RECENT_SQL};
use crate::detection::DetectionRecord;
use crate::error::SinkError;

pub struct PostgresSink {
    runtime: Runtime,
    conn: PgConnection,
}

impl PostgresSink {
    /// 连接并建表
    pub fn connect(url: &str) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        let mut conn = runtime
            .block_on(PgConnection::connect(url))
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        runtime
            .block_on(sqlx::query(CREATE_TABLE_SQL).execute(&mut conn))
            .map_err(|e| SinkError::Schema(e.to_string()))?;

        info!("🗄️ 已连接 PostgreSQL");
        Ok(Self { runtime, conn })
    }
}

impl DetectionSink for PostgresSink {
    fn insert(&mut self, record: &DetectionRecord) -> Result<(), SinkError> {
        let query = sqlx::query(INSERT_SQL)
            .bind(&record.source_id)
            .bind(&record.class_name)
            .bind(record.confidence)
            .bind(&record.timestamp)
            .bind(record.frame_path.to_string_lossy().into_owned());

        self.runtime
            .block_on(query.execute(&mut self.conn))
            .map_err(|e| SinkError::Insert(e.to_string()))?;
        debug!("入库: {} {:.2}", record.class_name, record.confidence);
        Ok(())
    }
}

/// 只读查询 (查看服务使用, 运行在调用方的 tokio 运行时上)
#[derive(Clone)]
pub struct PostgresHistory {
    pool: PgPool,
}

impl PostgresHistory {
    /// 建立连接池; 表不存在时创建, 以便查看服务先于检测进程启动
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&pool)
            .await
            .map_err(|e| SinkError::Schema(e.to_string()))?;

        info!("🗄️ 查看服务已连接 PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<RecentDetection>, SinkError> {
        let rows = sqlx::query(RECENT_SQL)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SinkError::Query(e.to_string()))?;

        rows.iter()
            .map(row_to_recent)
            .collect::<Result<_, _>>()
            .map_err(|e| SinkError::Query(e.to_string()))
    }
}

// 列允许为 NULL
fn row_to_recent(row: &PgRow) -> Result<RecentDetection, sqlx::Error> {
    Ok(RecentDetection {
        device_name: row.try_get::<Option<String>, _>("device_name")?.unwrap_or_default(),
        class_name: row.try_get::<Option<String>, _>("class_name")?.unwrap_or_default(),
        confidence: row.try_get::<Option<f32>, _>("confidence")?.unwrap_or_default(),
        timestamp: row.try_get::<Option<String>, _>("timestamp")?.unwrap_or_default(),
        frame_path: row.try_get::<Option<String>, _>("frame_path")?.unwrap_or_default(),
    })
}
