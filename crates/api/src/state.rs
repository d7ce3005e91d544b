use mongodb::Database;
use std::sync::Arc;
use taskhub_config::Settings;
use taskhub_services::{
    AuthService, FulfillmentService, ScheduleService,
    dao::{
        event::EventDao, notification::NotificationDao, project::ProjectDao,
        subtask::SubtaskDao, user::UserDao,
    },
    dispatch::{DispatchClient, HttpDispatchClient, MockDispatchClient},
    email::{EmailProvider, HttpEmailProvider, MockEmailProvider},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserDao>,
    pub projects: Arc<ProjectDao>,
    pub subtasks: Arc<SubtaskDao>,
    pub events: Arc<EventDao>,
    pub notifications: Arc<NotificationDao>,
    pub scheduler: Arc<ScheduleService>,
    pub fulfillment: Arc<FulfillmentService>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Self {
        let dispatch: Arc<dyn DispatchClient> = if settings.dispatch.mock {
            Arc::new(MockDispatchClient::new())
        } else {
            Arc::new(HttpDispatchClient::new(&settings.dispatch))
        };
        let email: Arc<dyn EmailProvider> = if settings.email.mock {
            Arc::new(MockEmailProvider::new())
        } else {
            Arc::new(HttpEmailProvider::new(&settings.email))
        };

        Self::with_collaborators(db, settings, dispatch, email)
    }

    /// Construction with explicit dispatch/email collaborators so tests can
    /// keep handles to the mocks they inject.
    pub fn with_collaborators(
        db: Database,
        settings: Settings,
        dispatch: Arc<dyn DispatchClient>,
        email: Arc<dyn EmailProvider>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(settings.jwt.clone()));
        let users = Arc::new(UserDao::new(&db));
        let projects = Arc::new(ProjectDao::new(&db));
        let subtasks = Arc::new(SubtaskDao::new(&db));
        let events = Arc::new(EventDao::new(&db));
        let notifications = Arc::new(NotificationDao::new(&db));
        let scheduler = Arc::new(ScheduleService::new(
            &db,
            dispatch,
            settings.notification.default_send_time.clone(),
        ));
        let fulfillment = Arc::new(FulfillmentService::new(&db, email));

        Self {
            db,
            settings,
            auth,
            users,
            projects,
            subtasks,
            events,
            notifications,
            scheduler,
            fulfillment,
        }
    }
}
