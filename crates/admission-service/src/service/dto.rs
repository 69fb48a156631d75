//! 准入请求与响应 DTO

use serde::{Deserialize, Serialize};

use crate::models::{PaymentTransaction, Registration};

/// 准入请求
#[derive(Debug, Clone, Deserialize)]
pub struct AdmitRequest {
    pub event_id: String,
    pub category_id: String,
    pub participant_email: String,
    /// 是否现场收款，收款报名才占用容量
    #[serde(default)]
    pub collect_payment: bool,
}

impl AdmitRequest {
    pub fn new(
        event_id: impl Into<String>,
        category_id: impl Into<String>,
        participant_email: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            category_id: category_id.into(),
            participant_email: participant_email.into(),
            collect_payment: false,
        }
    }

    pub fn with_payment(mut self) -> Self {
        self.collect_payment = true;
        self
    }
}

/// 准入响应
///
/// transaction 仅在现场收款时存在
#[derive(Debug, Clone, Serialize)]
pub struct AdmitResponse {
    pub registration: Registration,
    pub transaction: Option<PaymentTransaction>,
}
