//! Domain model (ids, job record, state machine, transitions, errors).
//!
//! このモジュールは外部システム（Store / Lease / HTTP）を知りません。
//! 状態遷移の判断はすべてここで純粋関数として行い、永続化は ports 側に任せます。

pub mod errors;
pub mod ids;
pub mod job;
pub mod retry;
pub mod state;
pub mod transition;

pub use errors::{ErrorKind, ExecutionError, LeaseError, StoreError};
pub use ids::{JobId, LeaseToken, ParseIdError};
pub use job::{DEFAULT_MAX_RETRIES, Job, NewJob};
pub use retry::RetryPolicy;
pub use state::{JobStatus, UnknownStatus};
pub use transition::{RECOVERED_ERROR, Transition};
