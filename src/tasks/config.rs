// src/tasks/config.rs

//! Background task schedule knobs, loaded from the environment.

use std::str::FromStr;

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            clean_val.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub saturation_refresh_enabled: bool,
    pub saturation_refresh_interval_secs: u64,

    pub sweep_enabled: bool,
    pub sweep_interval_secs: u64,

    pub metrics_report_enabled: bool,
    pub metrics_report_interval_secs: u64,
}

impl TaskConfig {
    pub fn from_env() -> Self {
        Self {
            saturation_refresh_enabled: env_var_or("CADENCE_SATURATION_REFRESH_ENABLED", true),
            saturation_refresh_interval_secs: env_var_or("CADENCE_SATURATION_REFRESH_INTERVAL", 600),
            sweep_enabled: env_var_or("CADENCE_SWEEP_ENABLED", true),
            sweep_interval_secs: env_var_or("CADENCE_SWEEP_INTERVAL", 3600),
            metrics_report_enabled: env_var_or("CADENCE_METRICS_REPORT_ENABLED", true),
            metrics_report_interval_secs: env_var_or("CADENCE_METRICS_REPORT_INTERVAL", 300),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            saturation_refresh_enabled: true,
            saturation_refresh_interval_secs: 600,
            sweep_enabled: true,
            sweep_interval_secs: 3600,
            metrics_report_enabled: true,
            metrics_report_interval_secs: 300,
        }
    }
}
