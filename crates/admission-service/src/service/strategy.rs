//! 准入策略接口
//!
//! 两种并发控制策略（悲观事务 / 分布式锁 + 计数缓存）实现同一接口，
//! 上层服务只做校验和编排，不感知策略内部的并发控制手段。
//! 同一部署只启用一种策略，混用会破坏各自的正确性前提。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Category, Event, NewRegistration, PaymentTransaction, Registration};

/// 准入上下文
///
/// 上层服务完成存在性/激活状态校验后交给策略的快照。
/// 策略不得信任其中的计数信息，容量判定必须自行取得一致视图。
#[derive(Debug, Clone)]
pub struct AdmissionContext {
    pub event: Event,
    pub category: Category,
    pub registration: NewRegistration,
}

/// 准入策略接口
#[async_trait]
pub trait AdmissionStrategy: Send + Sync {
    /// 策略名称，用于日志和审计
    fn name(&self) -> &'static str;

    /// 执行容量校验并持久化报名
    ///
    /// 成功时返回报名记录和可选的支付流水；
    /// 容量已满/重复报名/锁竞争等业务结果以类型化错误返回。
    async fn admit(
        &self,
        ctx: &AdmissionContext,
    ) -> Result<(Registration, Option<PaymentTransaction>)>;
}
