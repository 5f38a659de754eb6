//! Runtime utilities for fundscope.

pub mod health;
pub mod shutdown;
