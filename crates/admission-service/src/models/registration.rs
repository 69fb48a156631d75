//! 报名与支付流水模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::TransactionStatus;

/// 报名记录
///
/// 唯一键为 (event_id, participant_email)，由数据库唯一索引保证。
/// 记录一经创建不再由本子系统修改，取消/退款流程在外部处理。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub category_id: String,
    pub participant_email: String,
    pub created_at: DateTime<Utc>,
}

/// 支付流水
///
/// 报名时现场收款会同步创建一条 Paid 流水，只有这类流水计入容量
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: String,
    pub registration_id: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// 待插入的报名记录
///
/// 由准入策略在容量校验通过后持久化
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub event_id: String,
    pub category_id: String,
    pub participant_email: String,
    /// 是否现场收款（创建 Paid 流水并计入容量）
    pub collect_payment: bool,
}

impl NewRegistration {
    /// 生成新的报名记录 ID
    pub fn fresh_id() -> String {
        Uuid::new_v4().to_string()
    }
}
