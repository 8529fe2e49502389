use thiserror::Error;

use super::PoolPhase;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("task queue is full: {needed} bytes needed, {free} free")]
    CapacityExceeded { needed: usize, free: usize },
    #[error("task of {size} bytes exceeds max task size {limit}")]
    TaskTooLarge { size: usize, limit: usize },
    #[error("task queue is empty")]
    Empty,
    #[error("head task is {expected} bytes, {requested} requested")]
    SizeMismatch { expected: usize, requested: usize },
    #[error("pool is {0}")]
    WrongState(PoolPhase),
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}
