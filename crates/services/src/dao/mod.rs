pub mod base;
pub mod event;
pub mod notification;
pub mod project;
pub mod subtask;
pub mod user;

pub use base::BaseDao;
