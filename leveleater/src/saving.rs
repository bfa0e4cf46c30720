use levelparse::AreaScene;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub fn scene_path(output: &Path, level: &str, area_number: &str) -> PathBuf {
    output.join(format!("{level}_{area_number}.scene"))
}

pub fn save_scene_to_disk(scene: &AreaScene, path: &Path) {
    match bincode::serde::encode_to_vec(scene, bincode::config::standard()) {
        Ok(serialized) => {
            if let Some(parent) = path.parent()
                && let Err(err) = fs::create_dir_all(parent)
            {
                log::error!("failed to create {}: {err:?}", parent.display());
                return;
            }

            if let Err(err) = fs::write(path, serialized) {
                log::error!("failed to save scene: {err:?}");
            } else {
                log::info!("saved to {}", path.display());
            }
        }
        Err(err) => log::error!("failed to serialize scene: {err:?}"),
    }
}

pub fn load_scene(path: &Path) -> Result<AreaScene, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let (scene, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use levelparse::{CollisionMesh, CollisionTriangle, PlacedObject, Vertex3i};
    use tempfile::TempDir;

    #[test]
    fn test_saved_scene_loads_back() {
        let dir = TempDir::new().unwrap();
        let scene = AreaScene {
            level_name: "BOB".to_owned(),
            area_name: "Area 1".to_owned(),
            collision: Some(CollisionMesh {
                area_name: "Area 1".to_owned(),
                level_name: "BOB".to_owned(),
                vertices: vec![Vertex3i::new(-1, 2, 3); 3],
                triangles: vec![CollisionTriangle {
                    indices: [0, 1, 2],
                    surface: "SURFACE_NOT_SLIPPERY".to_owned(),
                }],
            }),
            visual: None,
            objects: vec![PlacedObject {
                model: "MODEL_STAR".to_owned(),
                params: 0x05000000,
                behavior: "bhvStar".to_owned(),
                ..PlacedObject::default()
            }],
        };

        let path = scene_path(&dir.path().join("output"), "bob", "1");
        save_scene_to_disk(&scene, &path);
        assert!(path.ends_with("output/bob_1.scene"));
        assert_eq!(load_scene(&path).unwrap(), scene);
    }

    #[test]
    fn test_load_missing_scene() {
        let dir = TempDir::new().unwrap();
        assert!(load_scene(&dir.path().join("nothing.scene")).is_err());
    }
}
