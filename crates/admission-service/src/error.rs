//! 准入服务错误类型
//!
//! 定义准入控制的业务结果和系统错误。五种业务结果
//! （资源不存在、重复报名、容量已满、锁不可用、提交冲突）
//! 都是类型化的变体，绝不与基础设施错误混用。

use thiserror::Error;

use crate::models::ResourceKind;

/// 准入服务错误类型
#[derive(Debug, Error)]
pub enum AdmissionError {
    // === 校验类错误 ===
    #[error("资源不存在: {kind} id={id}")]
    ResourceNotFound { kind: ResourceKind, id: String },

    #[error("资源未激活: {kind} id={id}")]
    ResourceInactive { kind: ResourceKind, id: String },

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 准入业务结果 ===
    #[error("参与者已报名: event_id={event_id}, email={email}")]
    DuplicateParticipant { event_id: String, email: String },

    #[error("容量已满: {kind} id={id}, max_capacity={max_capacity}")]
    CapacityExceeded {
        kind: ResourceKind,
        id: String,
        max_capacity: i32,
    },

    #[error("锁竞争激烈，暂时无法获取: {resource}")]
    LockUnavailable { resource: String },

    #[error("提交时发生序列化冲突，请重试")]
    ConflictAtCommit,

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("锁存储错误: {0}")]
    LockStore(String),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 准入服务 Result 类型别名
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// PostgreSQL 序列化失败错误码（SERIALIZABLE 提交冲突）
const PG_SERIALIZATION_FAILURE: &str = "40001";
/// PostgreSQL 唯一约束冲突错误码
const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL 锁等待超时错误码（lock_not_available）
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

impl AdmissionError {
    /// 检查是否为可重试的错误
    ///
    /// LockUnavailable 和 ConflictAtCommit 是瞬时竞争信号，
    /// 调用方应退避后重新提交。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockUnavailable { .. }
                | Self::ConflictAtCommit
                | Self::Database(_)
                | Self::LockStore(_)
        )
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::LockStore(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::ResourceInactive { .. } => "RESOURCE_INACTIVE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateParticipant { .. } => "DUPLICATE_PARTICIPANT",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::LockUnavailable { .. } => "LOCK_UNAVAILABLE",
            Self::ConflictAtCommit => "CONFLICT_AT_COMMIT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::LockStore(_) => "LOCK_STORE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 将事务内的 sqlx 错误映射为业务结果
    ///
    /// - 40001（序列化失败）-> ConflictAtCommit
    /// - 23505（唯一约束）   -> DuplicateParticipant
    /// - 55P03（锁等待超时） -> LockUnavailable，resource 由调用方
    ///   标注当时正在等待的行（`category:<id>` 或 `event:<id>`）
    /// 其余保留为数据库错误。
    pub fn from_tx_error(err: sqlx::Error, event_id: &str, email: &str, resource: &str) -> Self {
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some(PG_SERIALIZATION_FAILURE) => return Self::ConflictAtCommit,
                Some(PG_UNIQUE_VIOLATION) => {
                    return Self::DuplicateParticipant {
                        event_id: event_id.to_string(),
                        email: email.to_string(),
                    };
                }
                Some(PG_LOCK_NOT_AVAILABLE) => {
                    return Self::LockUnavailable {
                        resource: resource.to_string(),
                    };
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(AdmissionError::ConflictAtCommit.is_retryable());
        assert!(
            AdmissionError::LockUnavailable {
                resource: "category:cat-1".to_string()
            }
            .is_retryable()
        );
        assert!(AdmissionError::LockStore("connection refused".to_string()).is_retryable());
        assert!(
            !AdmissionError::CapacityExceeded {
                kind: ResourceKind::Category,
                id: "cat-1".to_string(),
                max_capacity: 10,
            }
            .is_retryable()
        );
        assert!(
            !AdmissionError::DuplicateParticipant {
                event_id: "evt-1".to_string(),
                email: "a@b.c".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_is_business_error() {
        assert!(
            AdmissionError::CapacityExceeded {
                kind: ResourceKind::Event,
                id: "evt-1".to_string(),
                max_capacity: 100,
            }
            .is_business_error()
        );
        assert!(AdmissionError::ConflictAtCommit.is_business_error());
        assert!(!AdmissionError::Internal("panic".to_string()).is_business_error());
        assert!(!AdmissionError::LockStore("down".to_string()).is_business_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            AdmissionError::ConflictAtCommit.error_code(),
            "CONFLICT_AT_COMMIT"
        );
        assert_eq!(
            AdmissionError::ResourceNotFound {
                kind: ResourceKind::Event,
                id: "evt-9".to_string()
            }
            .error_code(),
            "RESOURCE_NOT_FOUND"
        );
    }

    #[test]
    fn test_error_display() {
        let err = AdmissionError::CapacityExceeded {
            kind: ResourceKind::Category,
            id: "cat-1".to_string(),
            max_capacity: 2,
        };
        assert!(err.to_string().contains("cat-1"));
        assert!(err.to_string().contains("2"));

        let err = AdmissionError::DuplicateParticipant {
            event_id: "evt-1".to_string(),
            email: "dup@test.local".to_string(),
        };
        assert!(err.to_string().contains("dup@test.local"));
    }

    #[test]
    fn test_from_tx_error_passthrough() {
        // 非数据库错误保持为 Database 变体
        let err = AdmissionError::from_tx_error(
            sqlx::Error::PoolTimedOut,
            "evt-1",
            "a@b.c",
            "event:evt-1",
        );
        assert!(matches!(err, AdmissionError::Database(_)));
    }

    /// 只携带错误码的桩数据库错误，用于驱动 SQLSTATE 映射
    #[derive(Debug)]
    struct StubDbError(&'static str);

    impl std::fmt::Display for StubDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl std::error::Error for StubDbError {}

    impl sqlx::error::DatabaseError for StubDbError {
        fn message(&self) -> &str {
            "stub database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(StubDbError(code)))
    }

    #[test]
    fn test_from_tx_error_maps_sqlstates() {
        let err = AdmissionError::from_tx_error(db_error("40001"), "evt-1", "a@b.c", "event:evt-1");
        assert!(matches!(err, AdmissionError::ConflictAtCommit));

        let err = AdmissionError::from_tx_error(db_error("23505"), "evt-1", "a@b.c", "event:evt-1");
        assert!(matches!(
            err,
            AdmissionError::DuplicateParticipant { ref event_id, .. } if event_id == "evt-1"
        ));
    }

    #[test]
    fn test_from_tx_error_labels_contended_resource() {
        // 55P03 发生在哪一行的锁等待上，resource 就标注哪一行
        let err =
            AdmissionError::from_tx_error(db_error("55P03"), "evt-1", "a@b.c", "category:cat-1");
        assert!(matches!(
            err,
            AdmissionError::LockUnavailable { ref resource } if resource == "category:cat-1"
        ));
    }
}
