use anyhow::Result;
use std::path::PathBuf;

/// Find an executable: explicit environment override, then the install
/// directory (`~/.flowlab/bin`), then the system PATH
pub fn find_binary(name: &str, env_override: &str) -> Result<PathBuf> {
    let mut checked_paths = Vec::new();

    if let Ok(value) = std::env::var(env_override) {
        let path = PathBuf::from(&value);
        checked_paths.push(format!("{}: {:?}", env_override, path));
        if path.exists() {
            return Ok(path);
        }
        // A bare command name is looked up on PATH
        if let Ok(path) = which::which(&value) {
            return Ok(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let file = if cfg!(windows) {
            format!("{}.exe", name)
        } else {
            name.to_string()
        };
        let installed = home.join(".flowlab").join("bin").join(file);
        checked_paths.push(format!("Install Dir: {:?}", installed));
        if installed.exists() {
            return Ok(installed);
        }
    }

    if let Ok(path) = which::which(name) {
        return Ok(path);
    }
    checked_paths.push("PATH".to_string());

    Err(anyhow::anyhow!(
        "Could not find binary '{}'. Checked:\n{}",
        name,
        checked_paths.join("\n")
    ))
}

/// Get git path
pub fn find_git() -> Result<PathBuf> {
    find_binary("git", "FLOWLAB_GIT")
}
