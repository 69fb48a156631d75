//! 服务层模块

mod admission;
mod audit;
mod cached_counter;
mod dto;
mod pessimistic;
mod strategy;

pub use admission::{AdmissionService, build_admission_service};
pub use audit::{AuditEntry, AuditSink, TracingAuditSink};
pub use cached_counter::CachedCounterStrategy;
pub use dto::{AdmitRequest, AdmitResponse};
pub use pessimistic::{PessimisticConfig, PessimisticStrategy};
pub use strategy::{AdmissionContext, AdmissionStrategy};
