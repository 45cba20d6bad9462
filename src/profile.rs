use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use slidectl::SliderConfig;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Settings of the live loop, not of the slider itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub interval_ms: u64,
    /// Raw samples buffered between the reader thread and the tick loop.
    pub queue_capacity: usize,
    /// Untouched reading used by `simulate`.
    pub synthetic_base: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            interval_ms: 20,
            queue_capacity: 256,
            synthetic_base: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    pub slider: SliderConfig,
    #[serde(default)]
    pub run: RunSettings,
}

impl Profile {
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.meta.name.as_deref().unwrap_or(fallback)
    }
}

/// Named profiles under `<config_dir>/profiles` plus an `active` pointer.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    pub active_name: String,
    pub profile: Profile,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn default_config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("slidectl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ProfileStore {
    pub fn open() -> Result<Self> {
        Self::load_or_install_default(&default_config_dir()?)
    }

    pub fn load_or_install_default(config_dir: &Path) -> Result<Self> {
        let profiles_dir = config_dir.join("profiles");
        fs::create_dir_all(&profiles_dir)
            .with_context(|| format!("failed to create {}", profiles_dir.display()))?;

        let def_path = profiles_dir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = config_dir.join("active");
        if !active_ptr.exists() {
            fs::write(&active_ptr, b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_file(&profiles_dir.join(format!("{active_name}.toml")))?;
        Ok(Self {
            active_name,
            profile,
            profiles_dir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.path_of(&self.active_name)
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    /// Points `active` at `name`. The pointer is only moved once the
    /// profile has loaded and validated.
    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(anyhow!("profile not found: {}", path.display()));
        }
        let profile = load_file(&path)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.profiles_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

/// Reads, parses and validates a profile file.
pub fn load_file(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    let profile: Profile =
        toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
    validate_profile(&profile).with_context(|| format!("invalid profile {}", path.display()))?;
    Ok(profile)
}

fn validate_profile(p: &Profile) -> Result<()> {
    p.slider.validate()?;
    if p.run.interval_ms == 0 {
        return Err(anyhow!("run.interval_ms must be positive"));
    }
    if p.run.queue_capacity == 0 {
        return Err(anyhow!("run.queue_capacity must be positive"));
    }
    if p.run.synthetic_base == 0 {
        return Err(anyhow!("run.synthetic_base must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
        [meta]
        name = "small"

        [slider]
        channel_ids = [4, 5, 6]
        thresholds = [0.03, 0.03, 0.03]
        position_range = 100
    "#;

    #[test]
    fn bundled_default_is_valid() {
        let p: Profile = toml::from_str(default_profile_text()).unwrap();
        validate_profile(&p).unwrap();
        assert_eq!(p.slider.channel_num(), 6);
    }

    #[test]
    fn first_open_installs_default_and_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::load_or_install_default(dir.path()).unwrap();
        assert_eq!(store.active_name, "default");
        assert!(dir.path().join("profiles/default.toml").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("active")).unwrap(),
            "default"
        );
        assert_eq!(store.list_profiles(), vec!["default".to_string()]);
    }

    #[test]
    fn switching_profiles_moves_the_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_install_default(dir.path()).unwrap();
        fs::write(store.profiles_dir.join("small.toml"), SMALL).unwrap();

        store.set_active("small").unwrap();
        assert_eq!(store.profile.slider.position_range, 100);
        assert_eq!(store.profile.display_name("?"), "small");
        assert_eq!(store.profile.run, RunSettings::default());

        let reopened = ProfileStore::load_or_install_default(dir.path()).unwrap();
        assert_eq!(reopened.active_name, "small");
        assert_eq!(reopened.list_profiles(), vec!["default", "small"]);
    }

    #[test]
    fn invalid_profile_keeps_previous_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_install_default(dir.path()).unwrap();
        let bad = SMALL.replace("[0.03, 0.03, 0.03]", "[0.03, 0.03]");
        fs::write(store.profiles_dir.join("bad.toml"), bad).unwrap();

        let err = store.set_active("bad").unwrap_err();
        assert!(format!("{err:#}").contains("expected 3 thresholds"), "{err:#}");
        assert_eq!(store.active_name, "default");
        assert!(store.set_active("missing").is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.toml");
        fs::write(&path, format!("{SMALL}\n[run]\ninterval_ms = 0\n")).unwrap();
        assert!(load_file(&path).is_err());
    }
}
