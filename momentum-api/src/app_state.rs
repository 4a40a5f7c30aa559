use std::sync::Arc;

use sqlx::PgPool;
use url::Url;

use crate::config::Settings;
use crate::domain::services::{ActivityService, RecordService, StatisticsService};
use crate::domain::{SystemClock, User};
use crate::repositories::{PgActivityRecordRepository, PgActivityRepository};

type Activities = ActivityService<PgActivityRepository, PgActivityRecordRepository>;
type Records = RecordService<PgActivityRecordRepository, PgActivityRepository>;
type Statistics = StatisticsService<PgActivityRecordRepository, PgActivityRepository>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<PgPool>,
    pub app_url: Url,
    pub activity_service: Arc<Activities>,
    pub record_service: Arc<Records>,
    pub statistics_service: Arc<Statistics>,
    /// Set only when auth is disabled; every request then runs as this user.
    pub dev_user: Option<User>,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: &Settings, dev_user: Option<User>) -> Self {
        let activities = Arc::new(PgActivityRepository::new(db_pool.clone()));
        let records = Arc::new(PgActivityRecordRepository::new(db_pool.clone()));
        let clock = Arc::new(SystemClock);
        let app_url = Url::parse(&config.application.app_url).expect("app_url is a valid URL");

        Self {
            db_pool: Arc::new(db_pool),
            app_url,
            activity_service: Arc::new(ActivityService::new(
                activities.clone(),
                records.clone(),
                clock.clone(),
            )),
            record_service: Arc::new(RecordService::new(records.clone(), activities.clone())),
            statistics_service: Arc::new(StatisticsService::new(records, activities, clock)),
            dev_user,
        }
    }
}
