use clap::Parser;
use levelparse::{AreaScene, LevelMetadata, ProjectLayout, compose_area, compose_level};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{fs, path::Path};

mod cli;
mod export;
mod saving;

fn list_levels(project: &ProjectLayout) {
    for level in project.discover_levels() {
        println!(
            "{:<10} {:<20} {} area(s)",
            format!("{:?}", level.category),
            level.short_name,
            level.area_count
        );
    }
}

fn area_number(scene: &AreaScene) -> &str {
    scene
        .area_name
        .strip_prefix("Area ")
        .unwrap_or(&scene.area_name)
}

fn write_outputs(scene: &AreaScene, level: &str, output: &Path, obj: bool, save: bool) {
    let area = area_number(scene);

    if obj {
        let path = output.join(format!("{level}_{area}.obj"));
        if let Err(err) = export::export_obj(scene, &path) {
            log::error!("failed to export {}: {err}", path.display());
        }
    }

    if save {
        saving::save_scene_to_disk(scene, &saving::scene_path(output, level, area));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().without_time().compact().init();

    let cli::LeveleaterCli {
        project_root,
        level,
        area,
        output,
        obj,
        save,
    } = cli::LeveleaterCli::parse();

    let project = ProjectLayout::new(project_root);
    let Some(level) = level else {
        list_levels(&project);
        return Ok(());
    };

    let level_dir = project.level_dir(&level);
    if !level_dir.is_dir() {
        return Err(format!("level {level} not found at {}", level_dir.display()).into());
    }
    let metadata = LevelMetadata::from_directory(&level_dir)
        .ok_or_else(|| format!("{} is not a level directory", level_dir.display()))?;

    let scenes = match area {
        Some(area) => vec![compose_area(&project, &metadata, &area)],
        None => compose_level(&project, &metadata),
    };

    if obj {
        fs::create_dir_all(&output)?;
    }
    scenes
        .par_iter()
        .for_each(|scene| write_outputs(scene, &level, &output, obj, save));

    for scene in &scenes {
        println!("{scene}");
    }

    Ok(())
}
