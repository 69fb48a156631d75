//! 准入服务
//!
//! 准入控制的对外入口：负责参数校验、资源存在性/激活状态检查、
//! 审计投递，容量判定与持久化委托给配置选定的策略。
//!
//! ## 核心流程
//!
//! 1. 参数校验 -> 2. 加载并校验活动 -> 3. 加载并校验分类
//! 4. 重复报名预检 -> 5. 委托策略执行准入 -> 6. 异步投递审计记录

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use evreg_shared::config::{AdmissionConfig, AdmissionStrategyKind};

use crate::capacity::CapacityCounterCache;
use crate::error::{AdmissionError, Result};
use crate::lock::{LockConfig, LockManager};
use crate::models::{NewRegistration, ResourceKind};
use crate::repository::{
    EventRepository, EventRepositoryTrait, RegistrationRepository, RegistrationRepositoryTrait,
};
use crate::service::audit::{AuditEntry, AuditSink, TracingAuditSink};
use crate::service::cached_counter::CachedCounterStrategy;
use crate::service::dto::{AdmitRequest, AdmitResponse};
use crate::service::pessimistic::{PessimisticConfig, PessimisticStrategy};
use crate::service::strategy::{AdmissionContext, AdmissionStrategy};
use crate::store::RedisStore;

/// 准入服务
pub struct AdmissionService<ER: EventRepositoryTrait, RR: RegistrationRepositoryTrait> {
    event_repo: Arc<ER>,
    registration_repo: Arc<RR>,
    strategy: Arc<dyn AdmissionStrategy>,
    /// 审计接收器，支持启动后注入替换
    audit_sink: RwLock<Option<Arc<dyn AuditSink>>>,
}

impl<ER: EventRepositoryTrait, RR: RegistrationRepositoryTrait> AdmissionService<ER, RR> {
    pub fn new(
        event_repo: Arc<ER>,
        registration_repo: Arc<RR>,
        strategy: Arc<dyn AdmissionStrategy>,
    ) -> Self {
        Self {
            event_repo,
            registration_repo,
            strategy,
            audit_sink: RwLock::new(Some(Arc::new(TracingAuditSink))),
        }
    }

    /// 注入审计接收器
    pub fn set_audit_sink(&self, sink: Arc<dyn AuditSink>) {
        *self.audit_sink.write() = Some(sink);
    }

    /// 处理准入请求
    #[instrument(
        skip(self, request),
        fields(
            event_id = %request.event_id,
            category_id = %request.category_id,
            strategy = self.strategy.name()
        )
    )]
    pub async fn admit(&self, request: AdmitRequest) -> Result<AdmitResponse> {
        let result = self.do_admit(&request).await;

        // 审计只记录明确的业务决定，系统错误不算决定
        match &result {
            Ok(_) => self.emit_audit(&request, "ADMITTED"),
            Err(e) if e.is_business_error() => self.emit_audit(&request, e.error_code()),
            Err(_) => {}
        }

        result
    }

    async fn do_admit(&self, request: &AdmitRequest) -> Result<AdmitResponse> {
        // 1. 参数校验
        Self::validate(request)?;

        // 2. 加载并校验活动
        let event = self
            .event_repo
            .get_event(&request.event_id)
            .await?
            .ok_or_else(|| AdmissionError::ResourceNotFound {
                kind: ResourceKind::Event,
                id: request.event_id.clone(),
            })?;
        if !event.is_admittable() {
            return Err(AdmissionError::ResourceInactive {
                kind: ResourceKind::Event,
                id: event.id,
            });
        }

        // 3. 加载并校验分类，分类必须从属于请求的活动
        let category = self
            .event_repo
            .get_category(&request.category_id)
            .await?
            .ok_or_else(|| AdmissionError::ResourceNotFound {
                kind: ResourceKind::Category,
                id: request.category_id.clone(),
            })?;
        if category.event_id != request.event_id {
            return Err(AdmissionError::Validation(format!(
                "分类 {} 不属于活动 {}",
                category.id, request.event_id
            )));
        }
        if !category.is_admittable() {
            return Err(AdmissionError::ResourceInactive {
                kind: ResourceKind::Category,
                id: category.id,
            });
        }

        // 4. 重复报名预检
        // 策略内部和数据库唯一索引还会各拦一道，
        // 这里提前拒绝可以避免为明显的重复请求去抢锁/开事务
        if self
            .registration_repo
            .find_by_event_and_email(&request.event_id, &request.participant_email)
            .await?
            .is_some()
        {
            return Err(AdmissionError::DuplicateParticipant {
                event_id: request.event_id.clone(),
                email: request.participant_email.clone(),
            });
        }

        // 5. 委托策略执行容量判定与持久化
        let ctx = AdmissionContext {
            event,
            category,
            registration: NewRegistration {
                event_id: request.event_id.clone(),
                category_id: request.category_id.clone(),
                participant_email: request.participant_email.clone(),
                collect_payment: request.collect_payment,
            },
        };
        let (registration, transaction) = self.strategy.admit(&ctx).await?;

        info!(
            registration_id = %registration.id,
            paid = transaction.is_some(),
            "Participant admitted"
        );

        Ok(AdmitResponse {
            registration,
            transaction,
        })
    }

    fn validate(request: &AdmitRequest) -> Result<()> {
        if request.event_id.trim().is_empty() {
            return Err(AdmissionError::Validation("event_id 不能为空".to_string()));
        }
        if request.category_id.trim().is_empty() {
            return Err(AdmissionError::Validation(
                "category_id 不能为空".to_string(),
            ));
        }
        let email = request.participant_email.trim();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(AdmissionError::Validation(format!(
                "邮箱格式无效: {}",
                request.participant_email
            )));
        }
        Ok(())
    }

    /// 异步投递审计记录，失败不影响主流程
    fn emit_audit(&self, request: &AdmitRequest, outcome: &str) {
        let Some(sink) = self.audit_sink.read().clone() else {
            warn!("Audit sink not configured, skipping audit record");
            return;
        };

        let entry = AuditEntry {
            event_id: request.event_id.clone(),
            category_id: request.category_id.clone(),
            participant_email: request.participant_email.clone(),
            outcome: outcome.to_string(),
            strategy: self.strategy.name().to_string(),
            occurred_at: Utc::now(),
        };

        tokio::spawn(async move {
            sink.record(entry).await;
        });
    }
}

/// 按配置装配准入服务
///
/// 每个部署只启用一种策略，两种策略对同一资源混用时
/// 互相看不到对方的并发控制，正确性无法保证。
pub fn build_admission_service(
    pool: PgPool,
    store: Arc<RedisStore>,
    config: &AdmissionConfig,
) -> AdmissionService<EventRepository, RegistrationRepository> {
    let event_repo = Arc::new(EventRepository::new(pool.clone()));
    let registration_repo = Arc::new(RegistrationRepository::new(pool.clone()));

    let strategy: Arc<dyn AdmissionStrategy> = match config.strategy {
        AdmissionStrategyKind::Pessimistic => Arc::new(PessimisticStrategy::new(
            pool,
            PessimisticConfig {
                lock_timeout: Duration::from_millis(config.lock_timeout_ms),
                statement_timeout: Duration::from_millis(config.statement_timeout_ms),
                commit_retry_attempts: config.commit_retry_attempts,
            },
        )),
        AdmissionStrategyKind::CachedCounter => {
            let lock_manager = Arc::new(LockManager::new(
                Arc::clone(&store),
                LockConfig {
                    default_ttl: config.lock_ttl(),
                    max_attempts: config.lock_max_attempts,
                    base_backoff: config.lock_base_backoff(),
                },
            ));
            let counter_cache = Arc::new(CapacityCounterCache::new(
                Arc::clone(&store),
                config.counter_ttl(),
            ));
            Arc::new(CachedCounterStrategy::new(
                lock_manager,
                counter_cache,
                Arc::clone(&registration_repo),
            ))
        }
    };

    AdmissionService::new(event_repo, registration_repo, strategy)
}
