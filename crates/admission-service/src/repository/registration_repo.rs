//! 报名仓储
//!
//! 提供报名记录与支付流水的数据访问。付费人数统计和带流水的
//! 插入都在这里实现，准入策略只依赖 trait 接口。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::traits::RegistrationRepositoryTrait;
use crate::error::{AdmissionError, Result};
use crate::models::{
    NewRegistration, PaymentTransaction, Registration, ResourceKind, TransactionStatus,
};

/// 报名仓储
pub struct RegistrationRepository {
    pool: PgPool,
}

impl RegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 查询参与者在活动下的既有报名
    pub async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            SELECT id, event_id, category_id, participant_email, created_at
            FROM registrations
            WHERE event_id = $1 AND participant_email = $2
            "#,
        )
        .bind(event_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    /// 统计资源下已付费的报名数
    ///
    /// 以 PAID 流水为准，未收款报名不占容量
    pub async fn count_paid(&self, kind: ResourceKind, id: &str) -> Result<i64> {
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
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// 持久化报名记录
    ///
    /// 报名与可选的 Paid 流水在同一个普通事务内写入：
    /// 1. 插入报名记录 -> 2. 现场收款时插入 PAID 流水 -> 3. 提交
    /// (event_id, participant_email) 唯一索引冲突映射为 DuplicateParticipant。
    pub async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        let mut tx = self.pool.begin().await?;

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
        .fetch_one(&mut *tx)
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
            .fetch_one(&mut *tx)
            .await?;
            Some(transaction)
        } else {
            None
        };

        tx.commit().await?;

        Ok((inserted, transaction))
    }
}

#[async_trait]
impl RegistrationRepositoryTrait for RegistrationRepository {
    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Registration>> {
        self.find_by_event_and_email(event_id, email).await
    }

    async fn count_paid(&self, kind: ResourceKind, id: &str) -> Result<i64> {
        self.count_paid(kind, id).await
    }

    async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        self.insert(registration).await
    }
}
