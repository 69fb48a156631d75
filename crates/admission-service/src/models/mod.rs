//! 领域模型定义

mod enums;
mod event;
mod registration;

pub use enums::{EventStatus, ResourceKind, TransactionStatus};
pub use event::{Category, Event};
pub use registration::{NewRegistration, PaymentTransaction, Registration};
