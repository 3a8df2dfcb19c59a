//! Config command implementations

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::cli::ConfigCommand;
use crate::config::{self as app_config, AppConfig, RuntimeContext};
use crate::output::print_output;

pub fn run(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Path => {
            println!("{}", ctx.config_path().display());
            Ok(())
        }
        ConfigCommand::Get { key } => match key {
            Some(key) => {
                println!("{}", get_config_value(&ctx.config, &key)?);
                Ok(())
            }
            None => show(ctx),
        },
        ConfigCommand::Reset => {
            app_config::write_default_config(ctx.config_path())?;
            println!(
                "Configuration reset to defaults at: {}",
                ctx.config_path().display()
            );
            Ok(())
        }
    }
}

fn show(ctx: &RuntimeContext) -> Result<()> {
    print_output(ctx, &masked(&ctx.config)?)
}

/// Config as JSON with the access token blanked out
fn masked(config: &AppConfig) -> Result<Value> {
    let mut json = serde_json::to_value(config)?;
    if let Some(token) = json.pointer_mut("/homeassistant/token") {
        if !token.is_null() {
            *token = Value::String("********".to_string());
        }
    }
    Ok(json)
}

fn get_config_value(config: &AppConfig, key: &str) -> Result<String> {
    let json = masked(config)?;
    let current = key.split('.').try_fold(&json, |current, part| {
        current
            .get(part)
            .ok_or_else(|| anyhow!("Configuration key not found: {key}"))
    })?;

    Ok(match current {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_config_value() {
        let config = AppConfig::default();

        assert_eq!(
            get_config_value(&config, "dashboard.debounce_ms").unwrap(),
            "300"
        );
        assert_eq!(
            get_config_value(&config, "websocket.reconnect").unwrap(),
            "true"
        );
        assert_eq!(
            get_config_value(&config, "homeassistant.token").unwrap(),
            "null"
        );
        assert!(get_config_value(&config, "nonexistent.key").is_err());
    }

    #[test]
    fn test_token_is_masked() {
        let mut config = AppConfig::default();
        config.homeassistant.token = Some("secret".to_string());

        let json = masked(&config).unwrap();
        assert_eq!(json["homeassistant"]["token"], "********");
        assert!(!json.to_string().contains("secret"));
    }
}
