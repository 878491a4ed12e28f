//! Consumer-side view of a finished scene graph.
//!
//! This is where excluded paths are filtered and where keyframes are
//! resampled and re-based for objects that inherit an ancestor's
//! animation. The graph is read-only here, so objects are built in
//! parallel.

use glam::Vec3;
use meshcat_math::{DQuat, DVec3, Transform};
use rayon::prelude::*;
use serde::Serialize;

use crate::animation::{animation_range, resample, time_to_frame, AnimationKeyframe};
use crate::material::{Material, MaterialKind};
use crate::naming::{derive_object_name, is_excluded};
use crate::options::ImportOptions;
use crate::scene::{NodeId, SceneGraph};

/// One keyframe in target frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportKeyframe {
    pub frame: i64,
    pub position: Option<DVec3>,
    pub rotation: Option<DQuat>,
    pub scale: Option<DVec3>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportMaterial {
    pub kind: MaterialKind,
    pub color: Vec3,
    pub opacity: f32,
    pub metalness: f32,
    pub roughness: f32,
}

impl From<&Material> for ExportMaterial {
    fn from(m: &Material) -> Self {
        Self {
            kind: m.kind,
            color: m.color,
            opacity: m.opacity,
            metalness: m.metalness,
            roughness: m.effective_roughness(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportObject {
    pub path: String,
    pub name: String,
    pub geometry: &'static str,
    pub material: Option<ExportMaterial>,
    pub visible: bool,
    pub world_transform: Transform,
    /// Path of the node whose keyframes drive this object
    pub animation_source: Option<String>,
    pub keyframes: Vec<ExportKeyframe>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExportScene {
    pub recording_fps: f64,
    pub target_fps: f64,
    /// First and last frame of the illustration animation, if any
    pub frame_range: Option<(i64, i64)>,
    pub objects: Vec<ExportObject>,
    /// Mesh nodes skipped because of an excluded prefix
    pub excluded: usize,
}

/// Build the exportable objects of a processed graph.
pub fn build_export(graph: &SceneGraph, options: &ImportOptions) -> ExportScene {
    let recording_fps = options.recording_fps_or(graph.animation_fps());
    let target_fps = options.target_fps_or_default();

    let (excluded, included): (Vec<_>, Vec<_>) = graph
        .mesh_nodes()
        .map(|(id, node)| (id, is_excluded(&node.path, &options.excluded_prefixes)))
        .partition(|(_, skip)| *skip);
    let ids: Vec<NodeId> = included.into_iter().map(|(id, _)| id).collect();

    let objects: Vec<ExportObject> = ids
        .par_iter()
        .filter_map(|&id| build_object(graph, id, options, recording_fps))
        .collect();

    let illustration_clips: Vec<_> = graph
        .animated_nodes()
        .filter(|(_, n)| n.path.starts_with(&options.illustration_prefix))
        .flat_map(|(_, n)| n.clips.iter())
        .collect();
    let frame_range = (!illustration_clips.is_empty()).then(|| {
        animation_range(
            illustration_clips,
            recording_fps,
            target_fps,
            options.start_frame,
        )
    });

    log::info!(
        "export: {} object(s), {} excluded, {} fps -> {} fps",
        objects.len(),
        excluded.len(),
        recording_fps,
        target_fps
    );

    ExportScene {
        recording_fps,
        target_fps,
        frame_range,
        objects,
        excluded: excluded.len(),
    }
}

fn build_object(
    graph: &SceneGraph,
    id: NodeId,
    options: &ImportOptions,
    recording_fps: f64,
) -> Option<ExportObject> {
    let node = graph.node(id)?;
    let geometry = node.geometry.as_ref()?;

    let source = graph.find_animation_source(&node.path);
    let keyframes = match source {
        Some(source) => export_keyframes(graph, source, id, options, recording_fps),
        None => Vec::new(),
    };

    Some(ExportObject {
        path: node.path.clone(),
        name: derive_object_name(&node.path),
        geometry: geometry.kind_name(),
        material: node.material.as_ref().map(ExportMaterial::from),
        visible: node.visible,
        world_transform: graph.world_transform(id),
        animation_source: source.and_then(|s| graph.node(s)).map(|s| s.path.clone()),
        keyframes,
    })
}

/// Keyframes of `source` in target frames, re-based onto `object` when the
/// animation is inherited from an ancestor.
pub fn export_keyframes(
    graph: &SceneGraph,
    source: NodeId,
    object: NodeId,
    options: &ImportOptions,
    recording_fps: f64,
) -> Vec<ExportKeyframe> {
    let Some(source_node) = graph.node(source) else {
        return Vec::new();
    };
    let keyframes = source_node.keyframes();
    let target_fps = options.target_fps_or_default();

    let framed: Vec<(i64, AnimationKeyframe)> = if options.downsample && target_fps < recording_fps
    {
        resample(&keyframes, recording_fps, target_fps)
            .into_iter()
            .map(|kf| (options.start_frame + kf.time.round_ties_even() as i64, kf))
            .collect()
    } else {
        keyframes
            .into_iter()
            .map(|kf| {
                let frame = time_to_frame(kf.time, recording_fps, target_fps, options.start_frame);
                (frame, kf)
            })
            .collect()
    };

    let offset = match graph.relative_offset(source, object) {
        Some(offset) if source != object => Some(offset),
        Some(_) => None,
        None => {
            log::warn!("animation source is not an ancestor of its object");
            None
        }
    };

    framed
        .into_iter()
        .map(|(frame, kf)| match &offset {
            Some(offset) => rebase(frame, &kf, offset),
            None => ExportKeyframe {
                frame,
                position: kf.position,
                rotation: kf.rotation,
                scale: kf.scale,
            },
        })
        .collect()
}

/// `pose ∘ offset`; channels missing from the keyframe count as identity.
fn rebase(frame: i64, kf: &AnimationKeyframe, offset: &Transform) -> ExportKeyframe {
    let pose = Transform::new(
        kf.position.unwrap_or(DVec3::ZERO),
        kf.rotation.unwrap_or(DQuat::IDENTITY),
        kf.scale.unwrap_or(DVec3::ONE),
    );
    let combined = pose.compose(offset);
    ExportKeyframe {
        frame,
        position: Some(combined.translation),
        rotation: Some(combined.rotation),
        scale: kf.scale.map(|_| combined.scale),
    }
}
