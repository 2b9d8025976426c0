//! Text or JSON rendering of command results.

mod writer;

pub use writer::{MessageOutput, OutputWriter};
