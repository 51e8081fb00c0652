//! State machine test utilities.

pub mod impls;
pub mod initializer;
pub mod utils;
