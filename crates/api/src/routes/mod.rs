pub mod auth;
pub mod event;
pub mod notification;
pub mod project;
pub mod subtask;
pub mod webhook;
