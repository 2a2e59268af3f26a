mod filter;
mod task;

pub use filter::Filter;
pub use task::{Priority, Task, format_due_date, now_millis, parse_due_date};
