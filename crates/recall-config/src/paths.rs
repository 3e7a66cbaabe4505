use std::path::PathBuf;

/// XDG app name used for every config and state path.
pub const APP_NAME: &str = "recall";

/// Environment variable pointing at an alternate config file.
pub const CONFIG_ENV: &str = "RECALL_CONFIG";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// `~/.config/recall`, when a home directory can be determined.
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// State directory: `~/.local/state/recall` on Linux; falls back to the
/// local data dir on platforms without an XDG state dir, and finally to
/// the system temp dir (e.g. containers without HOME).
pub fn state_dir() -> PathBuf {
    if let Some(dirs) = project_dirs() {
        return dirs
            .state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf();
    }

    std::env::temp_dir().join(format!("{APP_NAME}-state"))
}

/// Config file path, honouring `RECALL_CONFIG`.
pub fn config_file() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

pub fn default_memory_dir() -> PathBuf {
    state_dir().join("memories")
}

pub fn default_scheduler_state_dir() -> PathBuf {
    state_dir().join("scheduler")
}

pub fn default_tasks_file() -> PathBuf {
    config_dir()
        .unwrap_or_else(state_dir)
        .join("tasks.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_file_env_override() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe { std::env::set_var(CONFIG_ENV, "/tmp/recall-custom.toml") };
        assert_eq!(
            config_file(),
            Some(PathBuf::from("/tmp/recall-custom.toml"))
        );
        unsafe { std::env::remove_var(CONFIG_ENV) };
    }

    #[test]
    #[serial]
    fn test_config_file_ignores_empty_env() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe { std::env::set_var(CONFIG_ENV, "") };
        let path = config_file();
        unsafe { std::env::remove_var(CONFIG_ENV) };
        if let Some(path) = path {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_default_dirs_share_state_root() {
        let root = state_dir();
        assert!(default_memory_dir().starts_with(&root));
        assert!(default_scheduler_state_dir().starts_with(&root));
        assert!(default_tasks_file().ends_with("tasks.toml"));
    }
}
