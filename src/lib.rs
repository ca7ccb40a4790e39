//! Meeting Assist — profile dashboard and transcript-to-webhook service.

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod notification;
pub mod shell;
pub mod store;
pub mod tasks;
pub mod webhook;
pub mod workflow;
