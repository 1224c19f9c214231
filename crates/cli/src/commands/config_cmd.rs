//! `toolstream config` — Configuration management commands.

use std::path::Path;

use toolstream_config::{AppConfig, ConfigError};

pub fn validate(config: Result<AppConfig, ConfigError>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match config {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");
            for line in summary(&config) {
                println!("   {line}");
            }
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// One line per setting worth eyeballing.
fn summary(config: &AppConfig) -> Vec<String> {
    let mut lines = vec![
        format!("Max iterations: {}", config.agent.max_iterations),
        format!("Bundle wrapper: <{}>", config.agent.bundle_wrapper),
        format!("Log level:      {}", config.logging.level),
        format!("Tools:          {}", config.tools.len()),
    ];
    for tool in &config.tools {
        let required = tool.required_params().count();
        lines.push(format!(
            "  - {} ({} params, {required} required{})",
            tool.name,
            tool.params.len(),
            if tool.views_images { ", views images" } else { "" }
        ));
    }
    lines
}

pub fn show(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(config_path: &Path) {
    println!("{}", config_path.display());
}
