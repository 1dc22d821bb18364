use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use log::info;

use crate::config;

fn event_hook_script() -> String {
    format!(
        "#!/bin/sh\nif [ \"$1\" = \"songfinish\" ]; then\n    echo \"{}\"\nfi\n",
        config::FINISH_MARKER
    )
}

/// Where the client keeps its configuration.
pub fn client_config_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(config::CLIENT_CONFIG_PREFIX)
        .context("Failed to determine config directory of the client")?;
    Ok(xdg_dirs.get_config_home())
}

/// Makes the client print the finish marker whenever a song ends. Creates
/// the hook script if it does not exist and registers it in the client's
/// config unless an event command is configured already.
pub fn install_event_hook(config_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create client config directory {:?}", config_dir))?;
    let hook = config_dir.join(config::EVENT_HOOK_FILE);
    if !hook.exists() {
        fs::write(&hook, event_hook_script())
            .and_then(|_| fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)))
            .with_context(|| format!("Failed to write event hook {:?}", hook))?;
        info!("Created event hook at {:?}", hook);
    }
    let client_config = config_dir.join(config::CLIENT_CONFIG_FILE);
    let existing = match fs::read_to_string(&client_config) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {:?}", client_config))
        }
    };
    if !existing.contains("event_command") {
        let mut entry = format!("event_command = {}\n", hook.display());
        if !existing.is_empty() && !existing.ends_with('\n') {
            entry.insert(0, '\n');
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&client_config)
            .and_then(|mut file| file.write_all(entry.as_bytes()))
            .with_context(|| format!("Failed to register event hook in {:?}", client_config))?;
        info!("Registered event hook in {:?}", client_config);
    }
    Ok(hook)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installs_hook_and_registers_it() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("pianobar");
        let hook = install_event_hook(&config_dir).unwrap();
        let script = fs::read_to_string(&hook).unwrap();
        assert!(script.contains("songfinish"));
        assert!(script.contains("SONGFINISH"));
        let mode = fs::metadata(&hook).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        let client_config = fs::read_to_string(config_dir.join("config")).unwrap();
        assert_eq!(client_config, format!("event_command = {}\n", hook.display()));
    }

    #[test]
    fn test_installing_twice_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        install_event_hook(dir.path()).unwrap();
        let first = fs::read_to_string(dir.path().join("config")).unwrap();
        install_event_hook(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("config")).unwrap(), first);
    }

    #[test]
    fn test_keeps_existing_settings_and_event_command() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config"), "user = someone").unwrap();
        let hook = install_event_hook(dir.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("config")).unwrap(),
            format!("user = someone\nevent_command = {}\n", hook.display())
        );

        let other = tempfile::tempdir().unwrap();
        fs::write(other.path().join("config"), "event_command = /usr/bin/mine\n").unwrap();
        fs::write(other.path().join("eventcmd.sh"), "#!/bin/sh\n").unwrap();
        install_event_hook(other.path()).unwrap();
        assert_eq!(
            fs::read_to_string(other.path().join("config")).unwrap(),
            "event_command = /usr/bin/mine\n"
        );
        assert_eq!(
            fs::read_to_string(other.path().join("eventcmd.sh")).unwrap(),
            "#!/bin/sh\n"
        );
    }
}
