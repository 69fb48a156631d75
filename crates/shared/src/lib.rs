//! 共享库
//!
//! 包含报名平台各服务共用的配置、错误处理、数据库连接、日志初始化等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod test_utils;
