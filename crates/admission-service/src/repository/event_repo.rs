//! 活动仓储
//!
//! 提供活动与报名分类的数据访问

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::EventRepositoryTrait;
use crate::error::Result;
use crate::models::{Category, Event};

/// 活动仓储
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 获取单个活动
    pub async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, status, max_capacity, created_at, updated_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// 获取单个报名分类
    pub async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, event_id, name, status, max_capacity, created_at, updated_at
            FROM event_categories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }
}

#[async_trait]
impl EventRepositoryTrait for EventRepository {
    async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        self.get_event(id).await
    }

    async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        self.get_category(id).await
    }
}
