//! Domain model (IDs, status vocabulary, DTO snapshot, errors, table rows).
//!
//! ここには I/O を一切持たない型だけを置きます。

pub mod ids;
pub mod state;
pub mod dto;
pub mod errors;
pub mod table;

pub use self::ids::{DisplayId, ExecutionId};
pub use self::state::{ExecutionStatus, UnknownStatus};
pub use self::dto::{ExecutionDto, parse_timestamp};
pub use self::errors::{AggregateFailure, ErrorKind, JobError};
pub use self::table::{COLUMNS, JobRow, JobTable};
