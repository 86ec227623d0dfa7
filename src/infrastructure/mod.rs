//! Infrastructure layer - adapters behind the domain traits

pub mod backend;
pub mod logging;
pub mod services;
pub mod tools;
pub mod workflow;
