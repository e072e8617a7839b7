#![allow(dead_code)]

pub mod builders;
pub mod fake_repository;
pub mod strategies;

pub use builders::*;
pub use fake_repository::*;
