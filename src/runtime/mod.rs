//! The runtime value model and host routines shared by both execution
//! back-ends.

pub mod builtins;
pub mod context;
pub mod env;
pub mod operations;
pub mod symbol;
pub mod value;

pub use context::{BufferSink, Context, ExecMode, Job, OutputSink, StdoutSink};
pub use env::{AssignOutcome, Environment};
pub use operations::{format_number, to_display_string};
pub use value::{Thrown, Value};
