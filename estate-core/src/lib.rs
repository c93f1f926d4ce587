//! estate-core: task model and repository for the estate task table

pub mod column;
pub mod error;
pub mod memory;
pub mod repository;
pub mod session;
pub mod store;
pub mod task;
pub mod time;

pub use column::{ColumnIndex, HeaderMap};
pub use error::{ConnectionError, RepoError, RowFault, SessionError, StoreError};
pub use memory::MemoryTable;
pub use repository::{RowIndex, Snapshot, TaskRepository};
pub use session::{Role, Session};
pub use store::{StoreConnection, TableStore};
pub use task::{Changes, Field, NewTask, Priority, Status, Task, Value};
pub use time::{Clock, FixedClock, SteppingClock, SystemClock};
