// Called on host startup and quit; saves the project so a session can be
// reloaded later. Only the project and the onboarding flag survive a
// reload, transient playback state never does.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::project::Project;

const BEATGRID_DIR: &str = ".beatgrid";
const PROJECT_FILE: &str = "project.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub has_onboarded: bool,
}

// <project_dir>/.beatgrid/project.json
fn project_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BEATGRID_DIR).join(PROJECT_FILE)
}

/// Missing or unreadable files just mean "fresh project".
pub fn load_state(project_dir: &Path) -> Option<PersistedState> {
    let path = project_file_path(project_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_state(project_dir: &Path, state: &PersistedState) -> anyhow::Result<()> {
    let path = project_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?; // create .beatgrid/ if needed
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::NoteName;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "beatgrid-test-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn round_trips_project_and_flag() {
        let dir = scratch_dir("roundtrip");

        let mut state = PersistedState::default();
        state.has_onboarded = true;
        state.project.set_bpm(90);
        state.project.toggle_step("kick", 0, 0, None);
        state
            .project
            .toggle_step("melody", 2, 5, Some(NoteName::new("G3")));

        save_state(&dir, &state).unwrap();
        let loaded = load_state(&dir).unwrap();
        assert_eq!(loaded, state);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_yields_none() {
        let dir = scratch_dir("missing");
        assert!(load_state(&dir).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_yields_none() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(dir.join(BEATGRID_DIR)).unwrap();
        std::fs::write(dir.join(BEATGRID_DIR).join(PROJECT_FILE), "{not json").unwrap();
        assert!(load_state(&dir).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
