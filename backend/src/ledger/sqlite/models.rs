use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::schema::{device_logs, hub_logs};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = hub_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HubLogRow {
    pub id: i32,
    pub hub_id: String,
    pub timestamp: NaiveDateTime,
    pub total_usage: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = hub_logs)]
pub struct NewHubLogRow<'a> {
    pub hub_id: &'a str,
    pub timestamp: NaiveDateTime,
    pub total_usage: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = device_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[allow(dead_code)] // Row id is only used for ordering
pub struct DeviceLogRow {
    pub id: i32,
    pub hub_log_id: i32,
    pub device_id: String,
    pub active_minutes: f64,
    pub power_usage: f64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = device_logs)]
pub struct NewDeviceLogRow<'a> {
    pub hub_log_id: i32,
    pub device_id: &'a str,
    pub active_minutes: f64,
    pub power_usage: f64,
}
