//! 悲观事务准入策略
//!
//! 全部并发控制交给 PostgreSQL：SERIALIZABLE 隔离级别 + SELECT FOR UPDATE
//! 行锁把同一分类上的并发准入串行化。
//!
//! ## 核心流程
//!
//! 1. 开启 SERIALIZABLE 事务，SET LOCAL 锁等待/语句超时
//! 2. FOR UPDATE 锁定分类行 -> 3. FOR UPDATE 锁定活动行（先分类后活动，避免死锁）
//! 4. 复核激活状态与重复报名 -> 5. 事务内实时重算付费人数
//! 6. 容量判定（先分类后活动） -> 7. 插入报名与流水 -> 8. 提交
//!
//! 提交时的序列化冲突（SQLSTATE 40001）映射为 ConflictAtCommit，
//! 按配置决定是否在策略内部重试整个事务。

use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use crate::error::{AdmissionError, Result};
use crate::models::{
    Category, Event, NewRegistration, PaymentTransaction, Registration, ResourceKind,
    TransactionStatus,
};
use crate::service::strategy::{AdmissionContext, AdmissionStrategy};

use async_trait::async_trait;
use chrono::Utc;

/// 悲观策略配置
#[derive(Debug, Clone)]
pub struct PessimisticConfig {
    /// 行锁等待超时，超时返回 LockUnavailable
    pub lock_timeout: Duration,
    /// 单条语句超时
    pub statement_timeout: Duration,
    /// ConflictAtCommit 时策略内部的重试次数，0 = 直接上抛
    pub commit_retry_attempts: u32,
}

impl Default for PessimisticConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            statement_timeout: Duration::from_millis(5_000),
            commit_retry_attempts: 0,
        }
    }
}

/// 悲观事务准入策略
pub struct PessimisticStrategy {
    pool: PgPool,
    config: PessimisticConfig,
}

impl PessimisticStrategy {
    pub fn new(pool: PgPool, config: PessimisticConfig) -> Self {
        Self { pool, config }
    }

    /// 执行一次完整的准入事务
    async fn try_admit_once(
        &self,
        ctx: &AdmissionContext,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        let registration = &ctx.registration;
        let mut tx = self.pool.begin().await?;

        // SET TRANSACTION 必须是事务内第一条语句
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        // SET LOCAL 不支持绑定参数，超时值来自静态配置
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.config.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.config.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        // 先锁分类行再锁活动行，与缓存策略的加锁顺序保持一致
        let category = self
            .lock_category_row(&mut tx, &registration.category_id)
            .await
            .map_err(|e| {
                AdmissionError::from_tx_error(
                    e,
                    &registration.event_id,
                    &registration.participant_email,
                    &format!("category:{}", registration.category_id),
                )
            })?
            .ok_or_else(|| AdmissionError::ResourceNotFound {
                kind: ResourceKind::Category,
                id: registration.category_id.clone(),
            })?;

        let event = self
            .lock_event_row(&mut tx, &registration.event_id)
            .await
            .map_err(|e| {
                AdmissionError::from_tx_error(
                    e,
                    &registration.event_id,
                    &registration.participant_email,
                    &format!("event:{}", registration.event_id),
                )
            })?
            .ok_or_else(|| AdmissionError::ResourceNotFound {
                kind: ResourceKind::Event,
                id: registration.event_id.clone(),
            })?;

        // 行锁之后复核激活状态，前置校验的快照可能已过期
        if !category.is_admittable() {
            return Err(AdmissionError::ResourceInactive {
                kind: ResourceKind::Category,
                id: category.id,
            });
        }
        if !event.is_admittable() {
            return Err(AdmissionError::ResourceInactive {
                kind: ResourceKind::Event,
                id: event.id,
            });
        }

        // 重复报名复核，并发的同邮箱请求在唯一索引前就能发现
        let duplicate: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM registrations
            WHERE event_id = $1 AND participant_email = $2
            "#,
        )
        .bind(&registration.event_id)
        .bind(&registration.participant_email)
        .fetch_optional(&mut *tx)
        .await?;
        if duplicate.is_some() {
            return Err(AdmissionError::DuplicateParticipant {
                event_id: registration.event_id.clone(),
                email: registration.participant_email.clone(),
            });
        }

        // 现场收款本次报名立即占一个名额，未收款报名不占（delta = 0）
        let delta: i64 = if registration.collect_payment { 1 } else { 0 };
        self.check_capacity(&mut tx, &category, &event, delta).await?;

        let (inserted, transaction) = self.insert_rows(&mut tx, registration).await?;

        tx.commit().await.map_err(|e| {
            AdmissionError::from_tx_error(
                e,
                &registration.event_id,
                &registration.participant_email,
                &format!("event:{}", registration.event_id),
            )
        })?;

        Ok((inserted, transaction))
    }

    async fn lock_category_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
    ) -> std::result::Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, event_id, name, status, max_capacity, created_at, updated_at
            FROM event_categories
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn lock_event_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
    ) -> std::result::Result<Option<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, status, max_capacity, created_at, updated_at
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// 事务内实时重算付费人数并判定容量
    ///
    /// 行锁保证同一分类上同时只有一个事务走到这里，
    /// 重算结果在提交前不会被并发修改。先判分类再判活动。
    async fn check_capacity(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        category: &Category,
        event: &Event,
        delta: i64,
    ) -> Result<()> {
        if let Some(max) = category.max_capacity {
            let live = self
                .count_paid_in_tx(tx, ResourceKind::Category, &category.id)
                .await?;
            if live + delta > max as i64 {
                return Err(AdmissionError::CapacityExceeded {
                    kind: ResourceKind::Category,
                    id: category.id.clone(),
                    max_capacity: max,
                });
            }
        }

        if let Some(max) = event.max_capacity {
            let live = self
                .count_paid_in_tx(tx, ResourceKind::Event, &event.id)
                .await?;
            if live + delta > max as i64 {
                return Err(AdmissionError::CapacityExceeded {
                    kind: ResourceKind::Event,
                    id: event.id.clone(),
                    max_capacity: max,
                });
            }
        }

        Ok(())
    }

    async fn count_paid_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: ResourceKind,
        id: &str,
    ) -> Result<i64> {
        let column = match kind {
            ResourceKind::Event => "r.event_id",
            ResourceKind::Category => "r.category_id",
        };
        let sql = format!(
            r#"
            SELECT COUNT(*)
            FROM registrations r
            JOIN transactions t ON t.registration_id = r.id
            WHERE {} = $1 AND t.status = $2
            "#,
            column
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(TransactionStatus::Paid)
            .fetch_one(&mut **tx)
            .await?;

        Ok(count)
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        registration: &NewRegistration,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        let now = Utc::now();
        let registration_id = NewRegistration::fresh_id();

        let inserted = sqlx::query_as::<_, Registration>(
            r#"
            INSERT INTO registrations (id, event_id, category_id, participant_email, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, event_id, category_id, participant_email, created_at
            "#,
        )
        .bind(&registration_id)
        .bind(&registration.event_id)
        .bind(&registration.category_id)
        .bind(&registration.participant_email)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AdmissionError::from_tx_error(
                e,
                &registration.event_id,
                &registration.participant_email,
                &format!("event:{}", registration.event_id),
            )
        })?;

        let transaction = if registration.collect_payment {
            let transaction = sqlx::query_as::<_, PaymentTransaction>(
                r#"
                INSERT INTO transactions (id, registration_id, status, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, registration_id, status, created_at
                "#,
            )
            .bind(NewRegistration::fresh_id())
            .bind(&registration_id)
            .bind(TransactionStatus::Paid)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;
            Some(transaction)
        } else {
            None
        };

        Ok((inserted, transaction))
    }
}

#[async_trait]
impl AdmissionStrategy for PessimisticStrategy {
    fn name(&self) -> &'static str {
        "pessimistic"
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
        let mut attempt = 0;
        loop {
            match self.try_admit_once(ctx).await {
                Err(AdmissionError::ConflictAtCommit)
                    if attempt < self.config.commit_retry_attempts =>
                {
                    attempt += 1;
                    warn!(attempt = attempt, "Serialization conflict at commit, retrying");
                }
                Ok(result) => {
                    debug!("Admission committed");
                    return Ok(result);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
