//! Meshcat Core - scene reconstruction from meshcat HTML recordings.
//!
//! This crate provides:
//!
//! - **Decoding**: a decode-only MessagePack reader with meshcat's
//!   typed-array extensions (`msgpack`)
//! - **Ingestion**: payload and asset discovery in a recording page,
//!   typed commands, asset resolution (`recording`)
//! - **Scene graph**: path-indexed nodes built by applying the command
//!   stream, with world transforms and animation inheritance (`scene`)
//! - **Animation**: clips, keyframes and nearest-neighbour resampling
//!   (`animation`)
//! - **Export**: the filtered, resampled view a 3D tool consumes (`export`)
//!
//! # Example
//!
//! ```ignore
//! use meshcat_core::{build_export, ImportOptions, Recording, SceneGraph};
//!
//! let recording = Recording::from_path("sim.html")?;
//! let mut graph = SceneGraph::with_assets(recording.assets.clone());
//! graph.process(&recording.commands);
//!
//! let scene = build_export(&graph, &ImportOptions::default());
//! println!("{} objects", scene.objects.len());
//! ```

pub mod animation;
pub mod export;
pub mod geometry;
pub mod material;
pub mod msgpack;
pub mod naming;
pub mod options;
pub mod recording;
pub mod scene;

// Re-export commonly used types
pub use animation::{resample, AnimationClip, AnimationKeyframe};
pub use export::{build_export, ExportScene};
pub use geometry::{Geometry, PrimitiveShape};
pub use material::Material;
pub use options::ImportOptions;
pub use recording::{Command, CommandKind, Recording};
pub use scene::{NodeId, SceneGraph, SceneNode};

#[cfg(test)]
mod tests {
    use meshcat_math::DVec3;

    use super::*;
    use crate::msgpack::testing::{array, encode, map, matrix};
    use crate::msgpack::Value;
    use crate::recording::html_with;

    #[test]
    fn test_box_recording_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();

        let path = "/drake/illustration/box/base_link/box/visual";
        let set_object = encode(&map(vec![
            ("type", "set_object".into()),
            ("path", path.into()),
            (
                "object",
                map(vec![
                    (
                        "geometries",
                        array(vec![map(vec![
                            ("uuid", "geom".into()),
                            ("type", "BoxGeometry".into()),
                            ("width", 2.0.into()),
                            ("height", 2.0.into()),
                            ("depth", 2.0.into()),
                        ])]),
                    ),
                    (
                        "materials",
                        array(vec![map(vec![
                            ("uuid", "mat".into()),
                            ("type", "MeshStandardMaterial".into()),
                            ("color", Value::UInt(0xff0000)),
                        ])]),
                    ),
                    (
                        "object",
                        map(vec![
                            ("type", "Mesh".into()),
                            ("geometry", "geom".into()),
                            ("material", "mat".into()),
                        ]),
                    ),
                ]),
            ),
        ]));
        let set_transform = encode(&map(vec![
            ("type", "set_transform".into()),
            ("path", path.into()),
            ("matrix", matrix([5.0, 0.0, 0.0], 1.0)),
        ]));

        let doc = html_with(&[set_object, set_transform], "");
        let recording = Recording::from_html(&doc).unwrap();
        assert_eq!(recording.commands.len(), 2);

        let mut graph = SceneGraph::with_assets(recording.assets.clone());
        graph.process(&recording.commands);

        let meshes: Vec<_> = graph.mesh_nodes().collect();
        assert_eq!(meshes.len(), 1);
        let (id, node) = meshes[0];
        assert_eq!(
            node.geometry,
            Some(Geometry::Primitive(PrimitiveShape::Box {
                width: 2.0,
                height: 2.0,
                depth: 2.0
            }))
        );
        let color = node.material.as_ref().unwrap().color;
        assert!((color - glam::Vec3::new(1.0, 0.0, 0.0)).length() < 1e-6);
        let world = graph.world_transform(id);
        assert!((world.translation - DVec3::new(5.0, 0.0, 0.0)).length() < 1e-9);

        let scene = build_export(&graph, &ImportOptions::default());
        assert_eq!(scene.objects.len(), 1);
        assert_eq!(scene.objects[0].name, "box");
    }
}
