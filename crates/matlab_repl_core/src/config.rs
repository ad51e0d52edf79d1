use std::time::Duration;

const DEFAULT_EXECUTABLE: &str = "matlab";

#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub executable: String,
    pub license_path: Option<String>,
    /// Applied by callers around each awaited command; the session itself never times out.
    pub command_timeout: Duration,
    /// Applied by callers while waiting for the first prompt.
    pub startup_timeout: Duration,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_EXECUTABLE.to_string(),
            license_path: None,
            command_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(120),
        }
    }
}

impl ReplConfig {
    pub fn new(executable: impl Into<String>, license_path: Option<String>) -> Self {
        Self {
            executable: executable.into(),
            license_path,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let executable = std::env::var("MATLAB_EXECUTABLE_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.executable);

        let license_path = std::env::var("MATLAB_LICENSE_PATH")
            .ok()
            .filter(|v| !v.is_empty());

        let command_timeout = std::env::var("MATLAB_COMMAND_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.command_timeout);

        let startup_timeout = std::env::var("MATLAB_STARTUP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.startup_timeout);

        Self {
            executable,
            license_path,
            command_timeout,
            startup_timeout,
        }
    }

    /// `-nosplash -nodesktop -singleCompThread [-c <license>]`
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "-nosplash".to_string(),
            "-nodesktop".to_string(),
            "-singleCompThread".to_string(),
        ];
        if let Some(license) = &self.license_path {
            args.push("-c".to_string());
            args.push(license.clone());
        }
        args
    }
}
