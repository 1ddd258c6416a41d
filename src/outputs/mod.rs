//! Run artifacts written after the batch.
//!
//! - [`json`]: the aggregate [`BatchReport`](crate::models::BatchReport) as a
//!   dated JSON file

pub mod json;
