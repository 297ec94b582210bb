#![forbid(unsafe_code)]

pub mod columns;
pub mod model;
pub mod sort;
pub mod user;
