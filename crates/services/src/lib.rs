pub mod auth;
pub mod dao;
pub mod dispatch;
pub mod email;
pub mod fulfillment;
pub mod schedule;

pub use auth::AuthService;
pub use dao::*;
pub use fulfillment::FulfillmentService;
pub use schedule::ScheduleService;
