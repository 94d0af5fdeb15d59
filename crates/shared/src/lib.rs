//! Wire and domain types shared by the console client and its tools.

pub mod domain;
pub mod error;
pub mod protocol;
