//! # driftsync-queue
//!
//! SQS-backed notification transport: one queue carries the trigger token
//! from the pushing replica to the pulling one. Delivery is at-least-once
//! and unordered; consumers acknowledge (delete) a message only after
//! processing it.

pub mod sqs;

pub use sqs::SqsQueue;
