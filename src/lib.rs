//! Co-scientist: task scheduling and hypothesis ranking core.

pub mod agent;
pub mod config;
pub mod error;
pub mod hypothesis;
pub mod ranking;
pub mod worker;
