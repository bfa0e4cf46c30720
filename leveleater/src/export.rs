// saves an area as an obj file, one object per sub model plus the collision

use itertools::Itertools;
use levelparse::{AreaScene, CollisionMesh, SubMesh};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub fn export_obj(scene: &AreaScene, filename: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(filename)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# Exported by leveleater")?;
    writeln!(writer, "# {} - {}", scene.level_name, scene.area_name)?;

    // obj indices start at 1
    let mut vertex_offset = 1;

    if let Some(visual) = &scene.visual {
        for sub_mesh in visual.sub_meshes.iter().filter(|sub_mesh| sub_mesh.visible) {
            write_sub_mesh(&mut writer, sub_mesh, vertex_offset)?;
            vertex_offset += sub_mesh.vertices.len() as u32;
        }
    }

    if let Some(collision) = &scene.collision {
        write_collision(&mut writer, collision, vertex_offset)?;
    }

    writer.flush()?;
    log::info!("exported {} to {}", scene.area_name, filename.display());
    Ok(())
}

fn write_sub_mesh(
    writer: &mut impl Write,
    sub_mesh: &SubMesh,
    vertex_offset: u32,
) -> std::io::Result<()> {
    writeln!(writer, "o SubModel_{}", sub_mesh.ordinal)?;
    for vertex in &sub_mesh.vertices {
        writeln!(writer, "v {} {} {}", vertex.x, vertex.y, vertex.z)?;
    }

    for (texture, triangles) in &sub_mesh
        .triangles
        .iter()
        .chunk_by(|triangle| triangle.texture.as_deref())
    {
        if let Some(texture) = texture {
            writeln!(writer, "usemtl {texture}")?;
        }
        for triangle in triangles {
            let [a, b, c] = triangle.indices.map(|index| index + vertex_offset);
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }
    writeln!(writer)
}

fn write_collision(
    writer: &mut impl Write,
    collision: &CollisionMesh,
    vertex_offset: u32,
) -> std::io::Result<()> {
    writeln!(writer, "o Collision")?;
    for vertex in &collision.vertices {
        writeln!(writer, "v {} {} {}", vertex.x, vertex.y, vertex.z)?;
    }

    for (surface, triangles) in &collision.triangles.iter().chunk_by(|triangle| &triangle.surface) {
        writeln!(writer, "g {surface}")?;
        for triangle in triangles {
            let [a, b, c] = triangle.indices.map(|index| index + vertex_offset);
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }
    writeln!(writer)
}
