//! GTD Assist — proactive GTD assistant conversation core.

pub mod config;
pub mod conversation;
pub mod error;
pub mod onboarding;
pub mod permissions;
pub mod providers;
