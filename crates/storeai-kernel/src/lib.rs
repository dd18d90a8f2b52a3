//! Pure building blocks shared by the handler server and the triage driver.
//! Nothing in here performs I/O.

pub mod envelope;
pub mod markdown;
pub mod model_output;
pub mod poll;
pub mod report;
pub mod sheet_rows;
pub mod staging;
pub mod token;

pub use markdown::{clean_reply, remove_annotations, strip_markdown};
pub use poll::{classify_file, classify_run, PollOutcome, PollPolicy, PollStep};
pub use token::{derive_token, minute_bucket, AllowAll, AuthStrategy, RotatingToken};
