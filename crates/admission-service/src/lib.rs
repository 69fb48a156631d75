//! 准入服务
//!
//! 活动报名平台的容量受限准入控制：在并发报名下保证付费人数
//! 不超过活动/分类的容量上限，且每个参与者在同一活动下至多报名一次。
//!
//! ## 核心功能
//!
//! - **准入控制**：校验、容量判定、报名持久化的统一入口
//! - **双策略**：悲观事务（SERIALIZABLE + FOR UPDATE）与
//!   分布式锁 + 计数缓存两种并发控制策略，按配置二选一
//! - **分布式锁**：基于 SET NX PX 的带 TTL 互斥租约，token 防误删
//! - **容量计数缓存**：付费人数的影子计数，未命中从关系库重算回填
//! - **审计记录**：每次准入决定的异步审计投递
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `store`: 锁/计数存储抽象（Redis 与内存实现）
//! - `lock`: 分布式锁模块
//! - `capacity`: 容量计数缓存模块
//! - `repository`: 数据库仓储层
//! - `service`: 业务服务层

pub mod capacity;
pub mod error;
pub mod lock;
pub mod models;
pub mod repository;
pub mod service;
pub mod store;

pub use capacity::CapacityCounterCache;
pub use error::{AdmissionError, Result};
pub use lock::{LockConfig, LockLease, LockManager};
pub use models::*;
pub use repository::{EventRepository, EventRepositoryTrait, RegistrationRepository, RegistrationRepositoryTrait};
pub use service::{
    AdmissionContext, AdmissionService, AdmissionStrategy, AdmitRequest, AdmitResponse,
    AuditEntry, AuditSink, CachedCounterStrategy, PessimisticConfig, PessimisticStrategy,
    TracingAuditSink, build_admission_service,
};
pub use store::{AtomicStore, MemoryStore, RedisStore};
