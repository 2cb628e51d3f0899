//! `medctx init`: write a default config file.

use medctx_config::AppConfig;
use std::path::Path;

pub fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("Created config directory: {}", dir.display());
    }

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    print_next_steps(&config_path);
    Ok(())
}

fn print_next_steps(config_path: &Path) {
    println!("\nNext steps:");
    println!("   1. Point [store] at your data in {}", config_path.display());
    println!("   2. Run: medctx status");
    println!("   3. Run: medctx serve");
}
