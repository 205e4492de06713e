#![allow(clippy::missing_docs_in_private_items)]

pub mod error;
pub mod observability;
pub mod pipeline_steps;
pub mod storage;
pub mod utils;
