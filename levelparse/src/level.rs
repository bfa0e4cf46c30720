use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{objects::SCRIPT_FILE, source::sorted_subdirs};

const COURSE_LEVELS: &[&str] = &[
    "bob", "wf", "jrb", "ccm", "bbh", "hmc", "lll", "ssl", "ddd", "sl", "wdw", "ttm", "thi", "ttc",
    "rr",
];
const BOWSER_LEVELS: &[&str] = &["bitdw", "bitfs", "bits", "bowser_1", "bowser_2", "bowser_3"];
const CASTLE_LEVELS: &[&str] = &["castle_inside", "castle_grounds", "castle_courtyard"];
const SPECIAL_LEVELS: &[&str] = &["pss", "cotmc", "totwc", "vcutm", "wmotr", "sa"];
const MENU_LEVELS: &[&str] = &["menu", "intro", "ending"];

/// Level groups, declared in listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LevelCategory {
    Course,
    Bowser,
    Castle,
    Special,
    Menu,
    #[default]
    Other,
}

impl LevelCategory {
    pub fn of(short_name: &str) -> Self {
        [
            (COURSE_LEVELS, LevelCategory::Course),
            (BOWSER_LEVELS, LevelCategory::Bowser),
            (CASTLE_LEVELS, LevelCategory::Castle),
            (SPECIAL_LEVELS, LevelCategory::Special),
            (MENU_LEVELS, LevelCategory::Menu),
        ]
        .into_iter()
        .find(|(names, _)| names.contains(&short_name))
        .map(|(_, category)| category)
        .unwrap_or_default()
    }
}

/// A `level.yaml` record, filled in by whoever reads the yaml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LevelMetadata {
    pub short_name: String,
    pub full_name: String,
    #[serde(rename = "texture-file")]
    pub texture_files: Vec<String>,
    pub area_count: u32,
    pub objects: Vec<String>,
    pub shared_path: Vec<String>,
    pub skybox_bin: Option<String>,
    pub texture_bin: String,
    pub effects: bool,
    pub actor_bins: Vec<String>,
    pub common_bin: Vec<String>,

    #[serde(skip)]
    pub level_path: PathBuf,
    #[serde(skip)]
    pub category: LevelCategory,
}

impl LevelMetadata {
    /// Attaches the owning directory and derives the category from the short name.
    pub fn located_at(mut self, level_path: impl Into<PathBuf>) -> Self {
        self.level_path = level_path.into();
        self.category = LevelCategory::of(&self.short_name);
        self
    }

    /// Metadata for a level directory without its yaml, named after the directory.
    pub fn from_directory(level_path: &Path) -> Option<Self> {
        let short_name = level_path.file_name()?.to_string_lossy().into_owned();
        let area_count = sorted_subdirs(&level_path.join("areas")).len() as u32;

        Some(
            LevelMetadata {
                full_name: short_name.to_uppercase(),
                short_name,
                area_count,
                ..LevelMetadata::default()
            }
            .located_at(level_path),
        )
    }

    pub fn script_path(&self) -> PathBuf {
        self.level_path.join(SCRIPT_FILE)
    }

    pub fn area_dir(&self, area_number: &str) -> PathBuf {
        self.level_path.join("areas").join(area_number)
    }

    /// Area directory names, numeric ones in numeric order.
    pub fn area_numbers(&self) -> Vec<String> {
        sorted_subdirs(&self.level_path.join("areas"))
            .into_iter()
            .filter_map(|dir| Some(dir.file_name()?.to_string_lossy().into_owned()))
            .collect()
    }
}

/// Where a decomp checkout keeps its levels and shared includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn levels_dir(&self) -> PathBuf {
        let levels = self.root.join("levels");
        if levels.is_dir() {
            return levels;
        }
        self.root.join("howtomake").join("levels")
    }

    pub fn level_dir(&self, short_name: &str) -> PathBuf {
        self.levels_dir().join(short_name)
    }

    /// Candidate locations of a shared include file, in lookup order.
    pub fn include_candidates(&self, file_name: &str, level_dir: &Path) -> [PathBuf; 3] {
        [
            self.root.join("include").join(file_name),
            self.root.join("howtomake").join("include").join(file_name),
            level_dir.join("..").join("..").join("include").join(file_name),
        ]
    }

    pub fn include_file(&self, file_name: &str, level_dir: &Path) -> Option<PathBuf> {
        let found = self
            .include_candidates(file_name, level_dir)
            .into_iter()
            .find(|path| path.is_file());
        if found.is_none() {
            log::warn!("include file {file_name} not found under {}", self.root.display());
        }
        found
    }

    /// Every level directory that has a script, sorted by category then full name.
    pub fn discover_levels(&self) -> Vec<LevelMetadata> {
        let mut levels = sorted_subdirs(&self.levels_dir())
            .into_iter()
            .filter(|dir| dir.join(SCRIPT_FILE).is_file())
            .filter_map(|dir| LevelMetadata::from_directory(&dir))
            .collect::<Vec<_>>();
        levels.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.full_name.cmp(&b.full_name))
        });

        log::info!("discovered {} levels", levels.len());
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_categories() {
        assert_eq!(LevelCategory::of("bob"), LevelCategory::Course);
        assert_eq!(LevelCategory::of("bowser_2"), LevelCategory::Bowser);
        assert_eq!(LevelCategory::of("castle_grounds"), LevelCategory::Castle);
        assert_eq!(LevelCategory::of("wmotr"), LevelCategory::Special);
        assert_eq!(LevelCategory::of("intro"), LevelCategory::Menu);
        assert_eq!(LevelCategory::of("my_hack_level"), LevelCategory::Other);
        assert!(LevelCategory::Course < LevelCategory::Other);
    }

    #[test]
    fn test_include_lookup_order() {
        let dir = TempDir::new().unwrap();
        let layout = ProjectLayout::new(dir.path());
        let level_dir = dir.path().join("howtomake/levels/bob");
        fs::create_dir_all(&level_dir).unwrap();
        fs::create_dir_all(dir.path().join("howtomake/include")).unwrap();
        fs::write(dir.path().join("howtomake/include/special_presets.inc.c"), "").unwrap();

        assert_eq!(layout.levels_dir(), dir.path().join("howtomake/levels"));
        assert_eq!(
            layout.include_file("special_presets.inc.c", &level_dir),
            Some(dir.path().join("howtomake/include/special_presets.inc.c"))
        );

        fs::create_dir_all(dir.path().join("include")).unwrap();
        fs::write(dir.path().join("include/special_presets.inc.c"), "").unwrap();
        assert_eq!(
            layout.include_file("special_presets.inc.c", &level_dir),
            Some(dir.path().join("include/special_presets.inc.c"))
        );
        assert_eq!(layout.include_file("macro_presets.inc.c", &level_dir), None);
    }

    #[test]
    fn test_discover_levels() {
        let dir = TempDir::new().unwrap();
        for level in ["wmotr", "bob", "no_script"] {
            fs::create_dir_all(dir.path().join("levels").join(level).join("areas/1")).unwrap();
        }
        fs::write(dir.path().join("levels/wmotr").join(SCRIPT_FILE), "").unwrap();
        fs::write(dir.path().join("levels/bob").join(SCRIPT_FILE), "").unwrap();

        let levels = ProjectLayout::new(dir.path()).discover_levels();
        let names = levels.iter().map(|level| level.short_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["bob", "wmotr"]);
        assert_eq!(levels[0].category, LevelCategory::Course);
        assert_eq!(levels[0].area_count, 1);
        assert_eq!(levels[0].area_numbers(), vec!["1"]);
    }
}
