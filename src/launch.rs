use std::path::PathBuf;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const SERVER_URL_ENV: &str = "VIALFINDER_SERVER";

pub const USAGE: &str = "Usage: vialfinder [--server <url>] [<image>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub server_url: String,
    pub initial_image: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            initial_image: None,
        }
    }
}

/// Parses argv (without the program name). `env_server` is the value of `VIALFINDER_SERVER`.
pub fn parse_launch_config_from_args(
    args: &[String],
    env_server: Option<String>,
) -> Result<LaunchConfig, String> {
    let mut config = LaunchConfig::default();
    if let Some(server) = env_server.filter(|value| !value.trim().is_empty()) {
        config.server_url = normalize_server_url(&server)?;
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--server=") {
            config.server_url = normalize_server_url(value)?;
            continue;
        }
        match arg.as_str() {
            "--server" | "-s" => {
                let Some(value) = iter.next() else {
                    return Err("Missing URL after --server.".to_string());
                };
                config.server_url = normalize_server_url(value)?;
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("Unknown option {flag}. {USAGE}"));
            }
            path => {
                if config.initial_image.is_some() {
                    return Err(format!("Only one image can be opened at start-up. {USAGE}"));
                }
                config.initial_image = Some(PathBuf::from(path));
            }
        }
    }

    Ok(config)
}

fn normalize_server_url(value: &str) -> Result<String, String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("Server URL must not be empty.".to_string());
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(format!(
            "Server URL must start with http:// or https:// (got {trimmed})."
        ));
    }
    Ok(trimmed.to_string())
}
