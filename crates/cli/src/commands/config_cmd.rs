//! `parley config`: Show the effective configuration.

use parley_config::AppConfig;
use std::path::Path;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_unvalidated(Some(&path))?;

    println!("# {}", path.display());
    if !path.exists() {
        println!("# (file not found; showing defaults plus environment)");
    }
    println!("{}", config.to_redacted_toml());

    if let Err(e) = config.validate() {
        eprintln!("⚠️  {e}");
    }
    Ok(())
}
