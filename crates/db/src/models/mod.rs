pub mod event;
pub mod project;
pub mod scheduled_notification;
pub mod subtask;
pub mod user;

pub use event::Event;
pub use project::{Project, ProjectMember};
pub use scheduled_notification::{NotificationKind, NotificationStatus, ScheduledNotification};
pub use subtask::{Subtask, SubtaskStatus};
pub use user::User;
