//! Typed failures raised by the task store and its parsers.
//!
//! Everything else travels as `anyhow::Error`; these variants exist so that
//! callers can tell a rejected input apart from an I/O problem by
//! downcasting.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskflowError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("category name must not be empty")]
    EmptyCategoryName,

    #[error("invalid color {0:?}; expected #rgb or #rrggbb")]
    InvalidColor(String),

    #[error("unknown status {0:?}; expected todo, in-progress or completed")]
    UnknownStatus(String),

    #[error("unknown priority {0:?}; expected low, medium or high")]
    UnknownPriority(String),

    #[error("no task matches {0:?}")]
    UnknownTask(String),

    #[error("no category matches {0:?}")]
    UnknownCategory(String),

    #[error("{token:?} is ambiguous; it matches {count} ids")]
    AmbiguousId { token: String, count: usize },
}
