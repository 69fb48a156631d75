//! 集成测试共享工具
//!
//! 提供内存版仓储实现，让准入流程测试不依赖外部数据库。
//! 内存仓储复刻关系库的关键约束：(event_id, participant_email)
//! 唯一、只有 PAID 流水计入付费人数。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use evreg_admission::error::{AdmissionError, Result};
use evreg_admission::models::{
    Category, Event, EventStatus, NewRegistration, PaymentTransaction, Registration, ResourceKind,
    TransactionStatus,
};
use evreg_admission::repository::{EventRepositoryTrait, RegistrationRepositoryTrait};

/// 构造激活状态的测试活动
pub fn make_event(id: &str, max_capacity: Option<i32>) -> Event {
    Event {
        id: id.to_string(),
        name: format!("Event {}", id),
        status: EventStatus::Active,
        max_capacity,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// 构造激活状态的测试分类
pub fn make_category(id: &str, event_id: &str, max_capacity: Option<i32>) -> Category {
    Category {
        id: id.to_string(),
        event_id: event_id.to_string(),
        name: format!("Category {}", id),
        status: EventStatus::Active,
        max_capacity,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// 内存版活动仓储
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: Mutex<HashMap<String, Event>>,
    categories: Mutex<HashMap<String, Category>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_event(&self, event: Event) {
        self.events.lock().insert(event.id.clone(), event);
    }

    pub fn insert_category(&self, category: Category) {
        self.categories.lock().insert(category.id.clone(), category);
    }
}

#[async_trait]
impl EventRepositoryTrait for InMemoryEventRepository {
    async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.events.lock().get(id).cloned())
    }

    async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        Ok(self.categories.lock().get(id).cloned())
    }
}

#[derive(Default)]
struct RegistrationState {
    registrations: Vec<Registration>,
    transactions: Vec<PaymentTransaction>,
}

/// 内存版报名仓储
///
/// insert 在同一把锁内完成唯一性检查和写入，
/// 与数据库唯一索引的原子性等价。
#[derive(Default)]
pub struct InMemoryRegistrationRepository {
    state: Mutex<RegistrationState>,
}

impl InMemoryRegistrationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一条已付费报名，用于构造接近满容量的场景
    pub fn seed_paid(&self, event_id: &str, category_id: &str, email: &str) {
        let mut state = self.state.lock();
        let registration_id = NewRegistration::fresh_id();
        state.registrations.push(Registration {
            id: registration_id.clone(),
            event_id: event_id.to_string(),
            category_id: category_id.to_string(),
            participant_email: email.to_string(),
            created_at: Utc::now(),
        });
        state.transactions.push(PaymentTransaction {
            id: NewRegistration::fresh_id(),
            registration_id,
            status: TransactionStatus::Paid,
            created_at: Utc::now(),
        });
    }

    pub fn registration_count(&self) -> usize {
        self.state.lock().registrations.len()
    }
}

#[async_trait]
impl RegistrationRepositoryTrait for InMemoryRegistrationRepository {
    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Registration>> {
        Ok(self
            .state
            .lock()
            .registrations
            .iter()
            .find(|r| r.event_id == event_id && r.participant_email == email)
            .cloned())
    }

    async fn count_paid(&self, kind: ResourceKind, id: &str) -> Result<i64> {
        let state = self.state.lock();
        let count = state
            .registrations
            .iter()
            .filter(|r| match kind {
                ResourceKind::Event => r.event_id == id,
                ResourceKind::Category => r.category_id == id,
            })
            .filter(|r| {
                state
                    .transactions
                    .iter()
                    .any(|t| t.registration_id == r.id && t.status == TransactionStatus::Paid)
            })
            .count();
        Ok(count as i64)
    }

    async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<(Registration, Option<PaymentTransaction>)> {
        let mut state = self.state.lock();

        if state.registrations.iter().any(|r| {
            r.event_id == registration.event_id
                && r.participant_email == registration.participant_email
        }) {
            return Err(AdmissionError::DuplicateParticipant {
                event_id: registration.event_id.clone(),
                email: registration.participant_email.clone(),
            });
        }

        let now = Utc::now();
        let inserted = Registration {
            id: NewRegistration::fresh_id(),
            event_id: registration.event_id.clone(),
            category_id: registration.category_id.clone(),
            participant_email: registration.participant_email.clone(),
            created_at: now,
        };
        state.registrations.push(inserted.clone());

        let transaction = if registration.collect_payment {
            let transaction = PaymentTransaction {
                id: NewRegistration::fresh_id(),
                registration_id: inserted.id.clone(),
                status: TransactionStatus::Paid,
                created_at: now,
            };
            state.transactions.push(transaction.clone());
            Some(transaction)
        } else {
            None
        };

        Ok((inserted, transaction))
    }
}

/// 两个仓储打包，大多数测试同时需要
pub fn in_memory_repos() -> (
    Arc<InMemoryEventRepository>,
    Arc<InMemoryRegistrationRepository>,
) {
    (
        Arc::new(InMemoryEventRepository::new()),
        Arc::new(InMemoryRegistrationRepository::new()),
    )
}
