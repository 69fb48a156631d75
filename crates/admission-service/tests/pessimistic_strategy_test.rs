//! 悲观策略集成测试
//!
//! 悲观策略依赖 PostgreSQL 的 SERIALIZABLE 隔离和 FOR UPDATE 行锁，
//! 无法用 mock 覆盖，需要真实数据库。
//!
//! ## 运行方式
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://... \
//!   cargo test --test pessimistic_strategy_test -- --ignored
//! ```
//!
//! 依赖表结构：events / event_categories / registrations / transactions，
//! 其中 registrations 有 (event_id, participant_email) 唯一索引。

use std::sync::Arc;

use sqlx::PgPool;

use evreg_admission::error::AdmissionError;
use evreg_admission::models::{Category, Event, NewRegistration, ResourceKind};
use evreg_admission::repository::EventRepository;
use evreg_admission::service::{
    AdmissionContext, AdmissionStrategy, PessimisticConfig, PessimisticStrategy,
};

// ==================== 辅助函数 ====================

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for integration tests")
}

async fn connect() -> PgPool {
    PgPool::connect(&database_url())
        .await
        .expect("database connection failed")
}

/// 插入测试活动和分类（幂等，已存在则覆盖容量配置）
async fn seed_event_and_category(
    pool: &PgPool,
    event_id: &str,
    category_id: &str,
    event_cap: Option<i32>,
    category_cap: Option<i32>,
) {
    sqlx::query(
        r#"
        INSERT INTO events (id, name, status, max_capacity, created_at, updated_at)
        VALUES ($1, 'IntegTest Event', 'active', $2, NOW(), NOW())
        ON CONFLICT (id) DO UPDATE SET max_capacity = EXCLUDED.max_capacity
        "#,
    )
    .bind(event_id)
    .bind(event_cap)
    .execute(pool)
    .await
    .expect("插入测试活动失败");

    sqlx::query(
        r#"
        INSERT INTO event_categories (id, event_id, name, status, max_capacity, created_at, updated_at)
        VALUES ($1, $2, 'IntegTest Category', 'active', $3, NOW(), NOW())
        ON CONFLICT (id) DO UPDATE SET max_capacity = EXCLUDED.max_capacity
        "#,
    )
    .bind(category_id)
    .bind(event_id)
    .bind(category_cap)
    .execute(pool)
    .await
    .expect("插入测试分类失败");
}

/// 清理指定活动下的报名数据，保证测试可重复运行
async fn cleanup_registrations(pool: &PgPool, event_id: &str) {
    sqlx::query(
        r#"
        DELETE FROM transactions
        WHERE registration_id IN (SELECT id FROM registrations WHERE event_id = $1)
        "#,
    )
    .bind(event_id)
    .execute(pool)
    .await
    .expect("清理流水失败");

    sqlx::query("DELETE FROM registrations WHERE event_id = $1")
        .bind(event_id)
        .execute(pool)
        .await
        .expect("清理报名失败");
}

async fn load_context(pool: &PgPool, event_id: &str, category_id: &str, email: &str) -> AdmissionContext {
    let repo = EventRepository::new(pool.clone());
    let event: Event = repo.get_event(event_id).await.unwrap().unwrap();
    let category: Category = repo.get_category(category_id).await.unwrap().unwrap();

    AdmissionContext {
        event,
        category,
        registration: NewRegistration {
            event_id: event_id.to_string(),
            category_id: category_id.to_string(),
            participant_email: email.to_string(),
            collect_payment: true,
        },
    }
}

fn strategy(pool: PgPool) -> PessimisticStrategy {
    PessimisticStrategy::new(pool, PessimisticConfig::default())
}

// ==================== 测试 ====================

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_admit_within_capacity() {
    let pool = connect().await;
    seed_event_and_category(&pool, "it-evt-1", "it-cat-1", Some(10), Some(10)).await;
    cleanup_registrations(&pool, "it-evt-1").await;

    let strategy = strategy(pool.clone());
    let ctx = load_context(&pool, "it-evt-1", "it-cat-1", "p1@test.local").await;

    let (registration, transaction) = strategy.admit(&ctx).await.unwrap();
    assert_eq!(registration.event_id, "it-evt-1");
    assert!(transaction.is_some());

    cleanup_registrations(&pool, "it-evt-1").await;
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_capacity_exceeded_at_category_limit() {
    let pool = connect().await;
    seed_event_and_category(&pool, "it-evt-2", "it-cat-2", None, Some(1)).await;
    cleanup_registrations(&pool, "it-evt-2").await;

    let strategy = strategy(pool.clone());

    let ctx = load_context(&pool, "it-evt-2", "it-cat-2", "p1@test.local").await;
    strategy.admit(&ctx).await.unwrap();

    let ctx = load_context(&pool, "it-evt-2", "it-cat-2", "p2@test.local").await;
    let err = strategy.admit(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::CapacityExceeded {
            kind: ResourceKind::Category,
            max_capacity: 1,
            ..
        }
    ));

    cleanup_registrations(&pool, "it-evt-2").await;
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_duplicate_participant_rejected() {
    let pool = connect().await;
    seed_event_and_category(&pool, "it-evt-3", "it-cat-3", None, None).await;
    cleanup_registrations(&pool, "it-evt-3").await;

    let strategy = strategy(pool.clone());

    let ctx = load_context(&pool, "it-evt-3", "it-cat-3", "dup@test.local").await;
    strategy.admit(&ctx).await.unwrap();

    let err = strategy.admit(&ctx).await.unwrap_err();
    assert!(matches!(err, AdmissionError::DuplicateParticipant { .. }));

    cleanup_registrations(&pool, "it-evt-3").await;
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_concurrent_admits_respect_capacity() {
    let pool = connect().await;
    seed_event_and_category(&pool, "it-evt-4", "it-cat-4", None, Some(2)).await;
    cleanup_registrations(&pool, "it-evt-4").await;

    // 行锁把并发事务串行化，恰好 2 个成功
    let strategy = Arc::new(PessimisticStrategy::new(
        pool.clone(),
        PessimisticConfig {
            commit_retry_attempts: 3,
            ..Default::default()
        },
    ));

    let mut handles = Vec::new();
    for i in 0..5 {
        let strategy = Arc::clone(&strategy);
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let ctx = load_context(
                &pool,
                "it-evt-4",
                "it-cat-4",
                &format!("c{}@test.local", i),
            )
            .await;
            strategy.admit(&ctx).await
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AdmissionError::CapacityExceeded { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(admitted, 2);
    assert_eq!(rejected, 3);

    let paid: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM registrations r
        JOIN transactions t ON t.registration_id = r.id
        WHERE r.event_id = $1 AND t.status = 'PAID'
        "#,
    )
    .bind("it-evt-4")
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(paid, 2);

    cleanup_registrations(&pool, "it-evt-4").await;
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_unpaid_admit_does_not_consume_capacity() {
    let pool = connect().await;
    seed_event_and_category(&pool, "it-evt-5", "it-cat-5", None, Some(1)).await;
    cleanup_registrations(&pool, "it-evt-5").await;

    let strategy = strategy(pool.clone());

    // 占满付费名额
    let ctx = load_context(&pool, "it-evt-5", "it-cat-5", "paid@test.local").await;
    strategy.admit(&ctx).await.unwrap();

    // 未收款报名不受上限约束
    let mut ctx = load_context(&pool, "it-evt-5", "it-cat-5", "free@test.local").await;
    ctx.registration.collect_payment = false;
    let (_, transaction) = strategy.admit(&ctx).await.unwrap();
    assert!(transaction.is_none());

    cleanup_registrations(&pool, "it-evt-5").await;
}
