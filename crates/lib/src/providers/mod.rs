//! External capabilities the pipeline depends on: the generative analysis
//! service and the document store.

pub mod ai;
pub mod db;
