//! 活动与分类模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::EventStatus;

/// 活动
///
/// max_capacity 为 None 表示不限制总人数
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub status: EventStatus,
    /// 活动最大付费报名人数，None = 不限
    pub max_capacity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// 是否接受新报名
    pub fn is_admittable(&self) -> bool {
        self.status == EventStatus::Active
    }
}

/// 报名分类
///
/// 从属于某个活动，可以配置独立于活动的容量上限
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub status: EventStatus,
    /// 分类最大付费报名人数，None = 不限
    pub max_capacity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_admittable(&self) -> bool {
        self.status == EventStatus::Active
    }
}
