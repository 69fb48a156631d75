//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Category, Event, NewRegistration, PaymentTransaction, Registration, ResourceKind,
};

/// 活动仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepositoryTrait: Send + Sync {
    async fn get_event(&self, id: &str) -> Result<Option<Event>>;
    async fn get_category(&self, id: &str) -> Result<Option<Category>>;
}

/// 报名仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrationRepositoryTrait: Send + Sync {
    /// 查询参与者在活动下的既有报名
    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Registration>>;

    /// 统计资源下已付费的报名数
    ///
    /// 只有关联 PAID 流水的报名计入容量
    async fn count_paid(&self, kind: ResourceKind, id: &str) -> Result<i64>;

    /// 持久化报名记录，collect_payment 时同步创建 Paid 流水
    ///
    /// 唯一索引冲突映射为 DuplicateParticipant
    async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<(Registration, Option<PaymentTransaction>)>;
}
