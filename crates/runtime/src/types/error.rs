//! Top-level error type wrapping each module's own `thiserror` enum.
//!
//! Each subsystem (bus, wal, store, policy, ...) defines its own error enum
//! local to that module; `RuntimeError` exists only at the boundaries that
//! need to report across subsystems (the governance agent, the CLI).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("bus error: {0}")]
    Bus(#[from] crate::bus::BusError),

    #[error("wal error: {0}")]
    Wal(#[from] crate::wal::WalError),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("policy error: {0}")]
    Policy(#[from] crate::policy::PolicyError),

    #[error("authorization error: {0}")]
    Authz(#[from] crate::policy::AuthzError),

    #[error("executor error: {0}")]
    Executor(#[from] crate::executor::ExecutorError),

    #[error("graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),

    #[error("finality error: {0}")]
    Finality(#[from] crate::finality::FinalityError),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
