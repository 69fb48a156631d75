//! 准入服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 容量受限资源类型
///
/// 活动和分类都可以配置最大容量，准入检查对两者同时生效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ResourceKind {
    /// 活动 - 整场活动的总容量
    Event,
    /// 分类 - 活动内单个报名分类的容量
    Category,
}

impl ResourceKind {
    /// 缓存键和锁键中使用的固定字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Category => "category",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 活动状态（运营侧）
///
/// 控制活动是否对外可见和可报名，只有 Active 状态接受准入
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum EventStatus {
    /// 草稿 - 配置中，不接受报名
    #[default]
    Draft,
    /// 已上线 - 正常接受报名
    Active,
    /// 已下线 - 停止报名，已有报名仍然有效
    Inactive,
    /// 已归档 - 历史数据
    Archived,
}

/// 支付流水状态
///
/// 只有 Paid 状态的流水计入容量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// 待支付
    #[default]
    Pending,
    /// 已支付 - 计入容量
    Paid,
    /// 支付失败
    Failed,
    /// 已退款
    Refunded,
}
