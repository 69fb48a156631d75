//! 分布式锁 + 计数缓存准入策略
//!
//! 并发控制前移到锁存储：对分类和活动各持一把分布式锁，
//! 容量判定读影子计数，未命中时从关系库重算回填。
//! 数据库只做普通事务写入，热路径上没有行锁。
//!
//! ## 核心流程
//!
//! 1. 获取分类锁 -> 2. 获取活动锁（先分类后活动，与悲观策略一致）
//! 3. 重复报名检查 -> 4. 读缓存计数判容量（未命中重算回填）
//! 5. 插入报名与流水 -> 6. 成功后自增两级计数 -> 7. 释放两把锁
//!
//! 计数自增失败只失效缓存不回滚报名，下一次未命中会重算出正确值。
//! 任何退出路径都释放已持有的锁，锁兜底由 TTL 过期回收。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::capacity::CapacityCounterCache;
use crate::error::{AdmissionError, Result};
use crate::lock::{LockLease, LockManager};
use crate::models::{PaymentTransaction, Registration, ResourceKind};
use crate::repository::RegistrationRepositoryTrait;
use crate::service::strategy::{AdmissionContext, AdmissionStrategy};
use crate::store::AtomicStore;

/// 分布式锁 + 计数缓存准入策略
pub struct CachedCounterStrategy<S: AtomicStore, R: RegistrationRepositoryTrait> {
    lock_manager: Arc<LockManager<S>>,
    counter_cache: Arc<CapacityCounterCache<S>>,
    registration_repo: Arc<R>,
}

impl<S: AtomicStore, R: RegistrationRepositoryTrait> CachedCounterStrategy<S, R> {
    pub fn new(
        lock_manager: Arc<LockManager<S>>,
        counter_cache: Arc<CapacityCounterCache<S>>,
        registration_repo: Arc<R>,
    ) -> Self {
        Self {
            lock_manager,
            counter_cache,
            registration_repo,
        }
    }

    /// 从关系库重算计数并回填缓存，返回重算值
    ///
    /// 缓存失效、损坏或首次访问时的恢复路径，
    /// 也供对账任务定期调用以收敛漂移。回填写失败只告警，
    /// 本次准入直接使用重算出的权威值。
    pub async fn sync_from_store(&self, kind: ResourceKind, id: &str) -> Result<i64> {
        let live = self.registration_repo.count_paid(kind, id).await?;
        if let Err(e) = self.counter_cache.set(kind, id, live).await {
            warn!(kind = %kind, id = %id, error = %e, "Counter cache write failed, using live count");
        } else {
            debug!(kind = %kind, id = %id, count = live, "Counter resynced from database");
        }
        Ok(live)
    }

    /// 读取资源当前计数，未命中或缓存故障时重算回填
    ///
    /// 缓存只是优化，读失败降级为 Unknown 走重算，不拖垮准入
    async fn current_count(&self, kind: ResourceKind, id: &str) -> Result<i64> {
        match self.counter_cache.get(kind, id).await {
            Ok(Some(count)) => Ok(count),
            Ok(None) => self.sync_from_store(kind, id).await,
            Err(e) => {
                warn!(kind = %kind, id = %id, error = %e, "Counter cache read failed, resyncing");
                self.sync_from_store(kind, id).await
            }
        }
    }

    /// 持锁临界区内的准入逻辑
    async fn admit_locked(
        &self,
        ctx: &AdmissionContext,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        let registration = &ctx.registration;

        // 重复报名检查在锁内完成，同一活动的并发请求已被串行化
        if self
            .registration_repo
            .find_by_event_and_email(&registration.event_id, &registration.participant_email)
            .await?
            .is_some()
        {
            return Err(AdmissionError::DuplicateParticipant {
                event_id: registration.event_id.clone(),
                email: registration.participant_email.clone(),
            });
        }

        // 容量判定先分类后活动
        // 现场收款本次报名立即占一个名额，未收款报名不占（delta = 0），
        // 后者只在资源已超卖的异常状态下才会被拒
        let delta: i64 = if registration.collect_payment { 1 } else { 0 };

        if let Some(max) = ctx.category.max_capacity {
            let count = self
                .current_count(ResourceKind::Category, &ctx.category.id)
                .await?;
            if count + delta > max as i64 {
                return Err(AdmissionError::CapacityExceeded {
                    kind: ResourceKind::Category,
                    id: ctx.category.id.clone(),
                    max_capacity: max,
                });
            }
        }

        if let Some(max) = ctx.event.max_capacity {
            let count = self
                .current_count(ResourceKind::Event, &ctx.event.id)
                .await?;
            if count + delta > max as i64 {
                return Err(AdmissionError::CapacityExceeded {
                    kind: ResourceKind::Event,
                    id: ctx.event.id.clone(),
                    max_capacity: max,
                });
            }
        }

        let (inserted, transaction) = self.registration_repo.insert(registration).await?;

        // 计数自增是持久化之后的尽力而为，失败只失效缓存
        if transaction.is_some() {
            self.bump_counter(ResourceKind::Category, &ctx.category.id)
                .await;
            self.bump_counter(ResourceKind::Event, &ctx.event.id).await;
        }

        Ok((inserted, transaction))
    }

    async fn bump_counter(&self, kind: ResourceKind, id: &str) {
        if let Err(e) = self.counter_cache.increment(kind, id).await {
            warn!(kind = %kind, id = %id, error = %e, "Counter increment failed, invalidating");
            if let Err(e) = self.counter_cache.invalidate(kind, id).await {
                warn!(kind = %kind, id = %id, error = %e, "Counter invalidation failed");
            }
        }
    }

    async fn release_lease(&self, lease: LockLease<S>) {
        let resource = lease.resource().to_string();
        if let Err(e) = lease.release().await {
            warn!(resource = %resource, error = %e, "Lock release failed, will expire via TTL");
        }
    }
}

#[async_trait]
impl<S, R> AdmissionStrategy for CachedCounterStrategy<S, R>
where
    S: AtomicStore,
    R: RegistrationRepositoryTrait,
{
    fn name(&self) -> &'static str {
        "cached_counter"
    }

    #[instrument(
        skip(self, ctx),
        fields(
            event_id = %ctx.registration.event_id,
            category_id = %ctx.registration.category_id
        )
    )]
    async fn admit(
        &self,
        ctx: &AdmissionContext,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        // 加锁顺序固定为先分类后活动，避免与其他路径形成死锁
        let category_resource = format!("category:{}", ctx.category.id);
        let event_resource = format!("event:{}", ctx.event.id);

        let category_lease = self.lock_manager.acquire(&category_resource).await?;
        let event_lease = match self.lock_manager.acquire(&event_resource).await {
            Ok(lease) => lease,
            Err(e) => {
                // 第二把锁失败时必须放掉第一把，否则其他请求白等 TTL
                self.release_lease(category_lease).await;
                return Err(e);
            }
        };

        let result = self.admit_locked(ctx).await;

        // 释放与获取同序：先分类后活动
        self.release_lease(category_lease).await;
        self.release_lease(event_lease).await;

        result
    }
}
