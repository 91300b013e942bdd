//! `stier config`: print the effective configuration.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub fn show(state: &AppState, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("data dir:").bold(),
        style(state.data_dir.display()).cyan()
    );
    println!(
        "  {} {}",
        style("database:").bold(),
        style(state.config.infra.database_url(&state.data_dir)).cyan()
    );
    println!();
    for line in toml::to_string_pretty(&state.config)?.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}
