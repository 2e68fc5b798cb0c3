//! Project initialization for habitual
//!
//! `habitual init` creates the .habitual folder, its database and a default config

use crate::config::Config;
use crate::db::{Database, DB_PATH_ENV};
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Set up .habitual/ in `root`. Safe to run twice; existing files are left alone.
pub fn init_project(root: &Path) -> Result<(), String> {
    println!("\n{}", "Initializing habitual...".cyan().bold());

    let habitual_dir = root.join(".habitual");
    create_dir_if_missing(&habitual_dir)?;

    let config_path = habitual_dir.join("config.toml");
    write_file_if_missing(&config_path, &Config::default_toml(), ".habitual/config.toml")?;

    // An explicit HABITUAL_DB_PATH wins over the project folder
    let db_path = match std::env::var(DB_PATH_ENV) {
        Ok(path) => Path::new(&path).to_path_buf(),
        Err(_) => habitual_dir.join("habitual.db"),
    };
    let existed = db_path.exists();
    let db = Database::open_at(&db_path)
        .map_err(|e| format!("Could not create database: {}", e))?;
    if existed {
        println!("   {} {} (already exists)", "Skipping".yellow(), db_path.display());
    } else {
        println!("   {} {}", "Creating".green(), db_path.display());
    }

    add_to_gitignore(root)?;

    let schema = db
        .schema_versions()
        .ok()
        .and_then(|v| v.last().map(|s| s.version.clone()))
        .unwrap_or_default();
    println!("\n{} (schema {})", "habitual initialized!".green().bold(), schema);
    println!("\nNext steps:");
    println!("  1. Run {} to get a session token", "habitual user add <name>".cyan());
    println!("  2. Export it: {}", "export HABITUAL_TOKEN=<token>".cyan());
    println!("  3. Add a habit: {}", "habitual add \"Drink water\"".cyan());
    println!();

    Ok(())
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, display_name: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
    } else {
        fs::write(path, content)
            .map_err(|e| format!("Could not write {}: {}", display_name, e))?;
        println!("   {} {}", "Creating".green(), display_name);
    }
    Ok(())
}

fn add_to_gitignore(root: &Path) -> Result<(), String> {
    let gitignore_path = root.join(".gitignore");
    let entry = ".habitual/";

    if gitignore_path.exists() {
        let existing = fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Could not read .gitignore: {}", e))?;

        if existing.lines().any(|line| line.trim() == entry || line.trim() == ".habitual") {
            return Ok(());
        }

        let new_content = format!("{}\n\n# habitual database (local)\n{}\n", existing.trim_end(), entry);
        fs::write(&gitignore_path, new_content)
            .map_err(|e| format!("Could not update .gitignore: {}", e))?;
        println!("   {} .gitignore (added .habitual/)", "Updated".green());
    } else {
        let content = format!("# habitual database (local)\n{}\n", entry);
        fs::write(&gitignore_path, content)
            .map_err(|e| format!("Could not create .gitignore: {}", e))?;
        println!("   {} .gitignore", "Creating".green());
    }

    Ok(())
}
