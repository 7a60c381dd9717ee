//! docvec CLI binary.
//!
//! Thin command-line front end over `docvec-core`'s `VectorDatabaseManager`.

use std::process::ExitCode;

mod cli;
pub mod ui;

fn main() -> ExitCode {
    cli::run()
}
