//! 准入审计
//!
//! 每次准入决定（成功或业务拒绝）产生一条审计记录，
//! 以 fire-and-forget 方式投递，失败不影响主流程。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// 审计记录
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub event_id: String,
    pub category_id: String,
    pub participant_email: String,
    /// 结果码: ADMITTED 或业务错误码
    pub outcome: String,
    /// 做出决定的策略名称
    pub strategy: String,
    pub occurred_at: DateTime<Utc>,
}

/// 审计接收器接口
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// 基于结构化日志的审计接收器
///
/// 默认实现，把审计记录写入 tracing，由日志管道收集
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        info!(
            event_id = %entry.event_id,
            category_id = %entry.category_id,
            participant_email = %entry.participant_email,
            outcome = %entry.outcome,
            strategy = %entry.strategy,
            "Admission decision recorded"
        );
    }
}
