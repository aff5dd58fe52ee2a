//! Running the external generator
//!
//! `args` turns options into the exact command line, `invoker` runs it in a
//! throwaway staging directory, and `relocate` moves what it produced into
//! the destination tree.

mod args;
mod invoker;
mod relocate;

pub use args::{build_args, include_flags, output_flag_value};
pub use invoker::{GeneratorInvoker, Invocation, InvokeFailure};
pub use relocate::{collect_outputs, is_cross_device, move_file, move_file_with, relocate_outputs};
