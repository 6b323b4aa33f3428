use crate::domain::gap_finder::{DEFAULT_DAY_END_HOUR, DEFAULT_DAY_START_HOUR};
use crate::domain::models::FALLBACK_TASK_DURATION_MINUTES;
use crate::domain::timer::WarningTiming;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SETTINGS_JSON: &str = "settings.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub app_name: String,
    pub timezone: String,
    pub calendar_name: String,
    /// `None` shows every calendar.
    pub visible_calendar_ids: Option<Vec<String>>,
    /// `None` imports from every reminder list.
    pub visible_reminder_list_ids: Option<Vec<String>>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "FocusBlox".to_string(),
            timezone: "UTC".to_string(),
            calendar_name: "Focus Blocks".to_string(),
            visible_calendar_ids: None,
            visible_reminder_list_ids: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone {}: {error}", self.timezone))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanningSettings {
    pub min_slot_minutes: u32,
    pub max_slot_minutes: u32,
    pub day_start_hour: u32,
    pub day_end_hour: u32,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            min_slot_minutes: 30,
            max_slot_minutes: 60,
            day_start_hour: DEFAULT_DAY_START_HOUR,
            day_end_hour: DEFAULT_DAY_END_HOUR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub warning_enabled: bool,
    pub warning_timing: WarningTiming,
    pub default_task_duration: u32,
    pub planning: PlanningSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            warning_enabled: true,
            warning_timing: WarningTiming::Standard,
            default_task_duration: FALLBACK_TASK_DURATION_MINUTES,
            planning: PlanningSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_task_duration == 0 {
            return Err("defaultTaskDuration must be > 0".to_string());
        }
        let planning = &self.planning;
        if planning.min_slot_minutes == 0 {
            return Err("planning.minSlotMinutes must be > 0".to_string());
        }
        if planning.day_end_hour > 24 {
            return Err("planning.dayEndHour must be within 0..=24".to_string());
        }
        if planning.day_start_hour >= planning.day_end_hour {
            return Err("planning.dayStartHour must be before planning.dayEndHour".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub app: AppConfig,
    pub settings: Settings,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "FocusBlox",
                "timezone": "UTC",
                "calendarName": "Focus Blocks",
                "visibleCalendarIds": null,
                "visibleReminderListIds": null,
                "logLevel": "info"
            }),
        ),
        (
            SETTINGS_JSON,
            serde_json::json!({
                "schema": 1,
                "warningEnabled": true,
                "warningTiming": 80,
                "defaultTaskDuration": 15,
                "planning": {
                    "minSlotMinutes": 30,
                    "maxSlotMinutes": 60,
                    "dayStartHour": 6,
                    "dayEndHour": 22
                }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_typed<T: DeserializeOwned>(path: &Path) -> Result<T, InfraError> {
    let value = read_config(path)?;
    serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid content in {}: {error}", path.display()))
    })
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    let app: AppConfig = read_typed(&config_dir.join(APP_JSON))?;
    app.time_zone()?;
    let settings: Settings = read_typed(&config_dir.join(SETTINGS_JSON))?;
    settings.validate().map_err(InfraError::InvalidConfig)?;
    Ok(ConfigBundle { app, settings })
}
