use std::env;

pub use common::Environment;

/// All tuning constants, fixed at startup and not reloadable.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub environment: Environment,

    // Serial link
    pub serial_port: String,
    pub baud_rate: u32,
    pub required_modules: Vec<String>,
    pub serial_retry_secs: u64,

    // Classifier stages
    pub model_path_1: String,
    pub model_path_2: String,
    pub labels_1: Vec<String>,
    pub labels_2: Vec<String>,
    pub threshold_1: f32,
    pub threshold_2: f32,
    pub margin_horizontal: f32,
    pub margin_vertical: f32,
    /// Fallback when the model does not declare a static input shape.
    pub input_size: (u32, u32),

    // Pipeline
    pub trigger_threshold: u32,
    pub reset_window_secs: f64,
    pub cooldown_secs: f64,

    // Camera
    pub camera_uri: String,
    pub camera_backoff_secs: u64,

    // Publish transport
    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
    pub mqtt_topic: String,
    pub keepalive_secs: u64,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    env::var(key)
        .map(|s| split_list(&s))
        .unwrap_or_else(|_| default.iter().map(|s| s.to_string()).collect())
}

impl ControllerConfig {
    /// Load configuration from environment variables with the deployed
    /// defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let serial_port =
            env::var("SERIAL_PORT").unwrap_or_else(|_| "/dev/serial0".to_string());
        let required_modules = env_list("REQUIRED_MODULES", &["Modulo_A", "Modulo_B"]);

        let model_path_1 =
            env::var("MODEL_PATH_1").unwrap_or_else(|_| "models/stage1_fire.onnx".to_string());
        let model_path_2 =
            env::var("MODEL_PATH_2").unwrap_or_else(|_| "models/stage2_smoke.onnx".to_string());

        let camera_uri = env::var("CAMERA_URI").unwrap_or_else(|_| "0".to_string());

        let mqtt_broker_host =
            env::var("MQTT_BROKER_HOST").unwrap_or_else(|_| "broker.emqx.io".to_string());
        let mqtt_topic =
            env::var("MQTT_TOPIC").unwrap_or_else(|_| "firewatch/modules".to_string());

        let config = Self {
            environment,
            serial_port,
            baud_rate: env_parsed("BAUD_RATE", 115_200),
            required_modules,
            serial_retry_secs: env_parsed("SERIAL_RETRY_SECS", 5),
            model_path_1,
            model_path_2,
            labels_1: env_list("LABELS_1", &["uncertain", "fire"]),
            labels_2: env_list("LABELS_2", &["no_smoke", "smoke"]),
            threshold_1: env_parsed("DETECTION_THRESHOLD_1", 0.65),
            threshold_2: env_parsed("DETECTION_THRESHOLD_2", 0.70),
            margin_horizontal: env_parsed("MARGIN_HORIZONTAL", 0.05),
            margin_vertical: env_parsed("MARGIN_VERTICAL", 0.05),
            input_size: (
                env_parsed("INPUT_WIDTH", 96),
                env_parsed("INPUT_HEIGHT", 96),
            ),
            trigger_threshold: env_parsed("TRIGGER_COUNT_THRESHOLD", 10),
            reset_window_secs: env_parsed("TRIGGER_COUNT_RESET_SECONDS", 3.0),
            cooldown_secs: env_parsed("COOLDOWN_SECONDS", 40.0),
            camera_uri,
            camera_backoff_secs: env_parsed("CAMERA_BACKOFF_SECS", 5),
            mqtt_broker_host,
            mqtt_broker_port: env_parsed("MQTT_BROKER_PORT", 1883),
            mqtt_topic,
            keepalive_secs: env_parsed("MQTT_KEEPALIVE_INTERVAL", 300),
        };

        if config.required_modules.is_empty() {
            anyhow::bail!("REQUIRED_MODULES must name at least one module id");
        }

        Ok(config)
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            serial_port: "/dev/serial0".to_string(),
            baud_rate: 115_200,
            required_modules: vec!["Modulo_A".to_string(), "Modulo_B".to_string()],
            serial_retry_secs: 5,
            model_path_1: "models/stage1_fire.onnx".to_string(),
            model_path_2: "models/stage2_smoke.onnx".to_string(),
            labels_1: vec!["uncertain".to_string(), "fire".to_string()],
            labels_2: vec!["no_smoke".to_string(), "smoke".to_string()],
            threshold_1: 0.65,
            threshold_2: 0.70,
            margin_horizontal: 0.05,
            margin_vertical: 0.05,
            input_size: (96, 96),
            trigger_threshold: 10,
            reset_window_secs: 3.0,
            cooldown_secs: 40.0,
            camera_uri: "0".to_string(),
            camera_backoff_secs: 5,
            mqtt_broker_host: "localhost".to_string(),
            mqtt_broker_port: 1883,
            mqtt_topic: "firewatch/modules".to_string(),
            keepalive_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployed_defaults_are_consistent() {
        let config = ControllerConfig::test_default();
        assert!(!config.required_modules.is_empty());
        assert_eq!(config.labels_1.len(), 2);
        assert_eq!(config.labels_2.len(), 2);
        assert!(config.threshold_1 < config.threshold_2);
        assert!(config.margin_horizontal < 0.5);
        assert!(config.margin_vertical < 0.5);
        assert!(config.reset_window_secs < config.cooldown_secs);
    }

    #[test]
    fn list_values_split_and_trim() {
        assert_eq!(split_list("Modulo_A, Modulo_B ,"), vec!["Modulo_A", "Modulo_B"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" , ,").is_empty());
    }
}
