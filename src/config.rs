/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Directory holding optional catalog overrides (crops.json, soils.json, ...).
    pub data_dir: String,
    /// Directory holding one daily weather file per location key.
    pub weather_dir: String,
    /// Program and arguments of the external crop-growth engine.
    pub engine_command: Vec<String>,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            weather_dir: std::env::var("WEATHER_DIR")
                .unwrap_or_else(|_| format!("{}/weather", data_dir.trim_end_matches('/'))),
            data_dir,
            engine_command: parse_command(
                &std::env::var("ENGINE_COMMAND").unwrap_or_else(|_| "wofost-engine".to_string()),
            ),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

/// Split a command line on whitespace. Quoting is not supported.
fn parse_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        // NOTE: set_var/remove_var in tests is unsafe in multi-threaded contexts.
        // This is the only test in the binary that touches these variables.
        unsafe {
            std::env::remove_var("PORT");
            std::env::remove_var("DATA_DIR");
            std::env::remove_var("WEATHER_DIR");
            std::env::remove_var("ENGINE_COMMAND");
            std::env::remove_var("LOG_FORMAT");
        }

        let config = AppConfig::from_env();

        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.weather_dir, "./data/weather");
        assert_eq!(config.engine_command, vec!["wofost-engine".to_string()]);
        assert!(!config.log_json);
    }

    #[test]
    fn test_parse_command_splits_arguments() {
        assert_eq!(
            parse_command("python3  -m engine.run --quiet"),
            vec!["python3", "-m", "engine.run", "--quiet"]
        );
        assert!(parse_command("   ").is_empty());
    }
}
