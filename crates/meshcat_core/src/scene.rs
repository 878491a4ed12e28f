//! Path-indexed scene graph built from a command stream.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Parents
//! own their children through the `children` map; the `parent` link is a
//! plain id used for upward walks. A flat `path -> id` index is kept in
//! step with the tree.
//!
//! Commands must be applied in stream order: later commands override
//! earlier state at the same path.

use std::collections::{BTreeMap, HashMap};

use meshcat_math::Transform;
use serde::Serialize;

use crate::animation::{payload_fps, AnimationClip, AnimationKeyframe, DEFAULT_RECORDING_FPS};
use crate::geometry::{parse_geometry, parse_meshfile, Geometry};
use crate::material::{parse_material, Material};
use crate::msgpack::Value;
use crate::naming::derive_object_name;
use crate::recording::{AssetResolver, Command, CommandKind, ResolvedAsset};

const MESHFILE_OBJECT: &str = "_meshfile_object";

/// Index of a node in the graph's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A node in the scene graph.
#[derive(Clone, Debug)]
pub struct SceneNode {
    /// Full path, the node's key
    pub path: String,
    /// Last path segment
    pub name: String,
    /// Display name derived from the path by [`derive_object_name`]
    pub label: String,
    /// Three.js object type from `set_object`
    pub object_type: String,
    /// Group transform, set by `set_transform`
    pub local_transform: Transform,
    /// The object's own matrix from `set_object`, applied inside
    /// `local_transform`
    pub object_transform: Transform,
    pub geometry: Option<Geometry>,
    pub material: Option<Material>,
    pub visible: bool,
    /// Clips in the order they arrived
    pub clips: Vec<AnimationClip>,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
}

impl SceneNode {
    fn new(path: String, name: String, parent: Option<NodeId>) -> Self {
        Self {
            label: name.clone(),
            path,
            name,
            object_type: "Object3D".to_string(),
            local_transform: Transform::IDENTITY,
            object_transform: Transform::IDENTITY,
            geometry: None,
            material: None,
            visible: true,
            clips: Vec::new(),
            parent,
            children: BTreeMap::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// True if any clip carries at least one keyframe.
    pub fn is_animated(&self) -> bool {
        self.clips.iter().any(|c| !c.keyframes.is_empty())
    }

    /// Keyframes of every clip, concatenated in arrival order.
    pub fn keyframes(&self) -> Vec<AnimationKeyframe> {
        self.clips
            .iter()
            .flat_map(|c| c.keyframes.iter().cloned())
            .collect()
    }
}

/// What `process` did with a command stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub applied: usize,
    /// Commands with no scene effect (image capture, render callbacks,
    /// properties other than `visible`)
    pub ignored: usize,
    /// Commands that changed nothing (transform without a matrix, delete of
    /// an unknown path or of the root)
    pub no_op: usize,
}

enum Outcome {
    Applied,
    Ignored,
    NoOp,
}

/// Canonical form of a path: one leading slash, no empty segments.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Scene graph plus the side tables `set_object` commands carry.
///
/// Slots freed by `delete` are reused, so the arena never holds more
/// slots than the peak number of live nodes. A [`NodeId`] is only valid
/// until the node it names is deleted.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: Vec<Option<SceneNode>>,
    free: Vec<usize>,
    index: HashMap<String, NodeId>,
    root: NodeId,
    resolver: AssetResolver,
    textures: HashMap<String, Value>,
    images: HashMap<String, Value>,
    animation_fps: f64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::with_assets(HashMap::new())
    }

    /// Create an empty graph that resolves assets from `assets`.
    pub fn with_assets(assets: HashMap<String, String>) -> Self {
        let root = NodeId(0);
        let mut index = HashMap::new();
        index.insert("/".to_string(), root);
        Self {
            nodes: vec![Some(SceneNode::new("/".into(), "root".into(), None))],
            free: Vec::new(),
            index,
            root,
            resolver: AssetResolver::new(assets),
            textures: HashMap::new(),
            images: HashMap::new(),
            animation_fps: DEFAULT_RECORDING_FPS,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn id_of(&self, path: &str) -> Option<NodeId> {
        self.index.get(&normalize_path(path)).copied()
    }

    pub fn get_node(&self, path: &str) -> Option<&SceneNode> {
        self.id_of(path).and_then(|id| self.node(id))
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Frame rate of the last `set_animation` command.
    pub fn animation_fps(&self) -> f64 {
        self.animation_fps
    }

    /// All live nodes in slot order.
    pub fn all_nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
    }

    /// Nodes that carry geometry.
    pub fn mesh_nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.all_nodes().filter(|(_, n)| n.geometry.is_some())
    }

    /// Nodes that carry keyframes of their own.
    pub fn animated_nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.all_nodes().filter(|(_, n)| n.is_animated())
    }

    /// Return the node at `path`, creating it and any missing ancestors.
    pub fn get_or_create(&mut self, path: &str) -> NodeId {
        let path = normalize_path(path);
        if let Some(&id) = self.index.get(&path) {
            return id;
        }

        let mut parent = self.root;
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            parent = match self.index.get(&current) {
                Some(&id) => id,
                None => {
                    let id = self.alloc(SceneNode::new(
                        current.clone(),
                        segment.to_string(),
                        Some(parent),
                    ));
                    if let Some(p) = self.node_mut(parent) {
                        p.children.insert(segment.to_string(), id);
                    }
                    self.index.insert(current.clone(), id);
                    id
                }
            };
        }
        parent
    }

    fn alloc(&mut self, node: SceneNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Apply commands in order. A command that cannot be applied is logged
    /// and skipped.
    pub fn process(&mut self, commands: &[Command]) -> ProcessStats {
        let mut stats = ProcessStats::default();
        for cmd in commands {
            match self.apply(cmd) {
                Outcome::Applied => stats.applied += 1,
                Outcome::Ignored => stats.ignored += 1,
                Outcome::NoOp => stats.no_op += 1,
            }
        }
        log::info!(
            "scene graph: {} node(s), {} applied, {} ignored, {} no-op",
            self.node_count(),
            stats.applied,
            stats.ignored,
            stats.no_op
        );
        stats
    }

    fn apply(&mut self, cmd: &Command) -> Outcome {
        match cmd.kind {
            CommandKind::SetObject => self.set_object(cmd),
            CommandKind::SetTransform => self.set_transform(cmd),
            CommandKind::Delete => self.delete(&cmd.path),
            CommandKind::SetProperty => self.set_property(cmd),
            CommandKind::SetAnimation => self.set_animation(cmd),
            CommandKind::CaptureImage | CommandKind::SetRenderCallback => {
                log::debug!("ignoring {} command", cmd.kind);
                Outcome::Ignored
            }
        }
    }

    fn set_object(&mut self, cmd: &Command) -> Outcome {
        let top = cmd.field("object");
        let inner = top.and_then(|t| t.get("object"));
        let object_type = inner
            .and_then(|o| o.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("Object3D");

        let object_transform = inner
            .and_then(|o| o.get_non_nil("matrix"))
            .and_then(|m| match m.to_f64_vec().as_deref().and_then(Transform::from_column_major) {
                Some(t) => Some(t),
                None => {
                    log::warn!("{}: object matrix is not 16 numbers", cmd.path);
                    None
                }
            });

        let (geometry, material) = match inner {
            Some(obj) if object_type == MESHFILE_OBJECT => {
                (parse_meshfile(obj, &mut self.resolver).map(Geometry::MeshFile), None)
            }
            Some(obj) => {
                let geometry = lookup(top, "geometries", obj.get("geometry"))
                    .and_then(|g| parse_geometry(g, &mut self.resolver));
                let material = lookup(top, "materials", obj.get("material")).and_then(parse_material);
                (geometry, material)
            }
            None => (None, None),
        };

        if let Some(top) = top {
            self.record_textures(top);
        }

        let id = self.get_or_create(&cmd.path);
        let Some(node) = self.node_mut(id) else {
            return Outcome::NoOp;
        };
        node.object_type = object_type.to_string();
        node.label = derive_object_name(&node.path);
        if let Some(t) = object_transform {
            node.object_transform = t;
        }
        if geometry.is_some() {
            node.geometry = geometry;
        }
        if material.is_some() {
            node.material = material;
        }
        Outcome::Applied
    }

    fn record_textures(&mut self, top: &Value) {
        let entries = |key: &str| {
            top.get(key)
                .and_then(Value::as_array)
                .unwrap_or_default()
                .iter()
                .filter_map(|v| {
                    v.get("uuid")
                        .and_then(Value::as_str)
                        .map(|uuid| (uuid.to_string(), v.clone()))
                })
                .collect::<Vec<_>>()
        };
        self.textures.extend(entries("textures"));
        self.images.extend(entries("images"));
    }

    fn set_transform(&mut self, cmd: &Command) -> Outcome {
        let Some(matrix) = cmd.payload.get_non_nil("matrix") else {
            return Outcome::NoOp;
        };
        let Some(mut candidate) = matrix
            .to_f64_vec()
            .as_deref()
            .and_then(Transform::from_column_major)
        else {
            log::warn!("{}: transform matrix is not 16 numbers", cmd.path);
            return Outcome::NoOp;
        };

        let id = self.get_or_create(&cmd.path);
        let Some(node) = self.node_mut(id) else {
            return Outcome::NoOp;
        };
        // pose-only updates arrive with unit scale; keep a scale set earlier
        if candidate.has_identity_scale() && !node.local_transform.has_identity_scale() {
            candidate.scale = node.local_transform.scale;
        }
        node.local_transform = candidate;
        Outcome::Applied
    }

    /// Remove the node at `path` and its whole subtree.
    fn delete(&mut self, path: &str) -> Outcome {
        let path = normalize_path(path);
        if path == "/" {
            log::debug!("ignoring delete of the root");
            return Outcome::NoOp;
        }
        let Some(&id) = self.index.get(&path) else {
            return Outcome::NoOp;
        };

        if let Some((parent, name)) = self.node(id).and_then(|n| Some((n.parent?, n.name.clone()))) {
            if let Some(p) = self.node_mut(parent) {
                p.children.remove(&name);
            }
        }

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                stack.extend(node.children.values().copied());
                self.index.remove(&node.path);
                self.free.push(next.0);
            }
        }

        let prefix = format!("{}/", path);
        let stale: Vec<String> = self
            .index
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        for p in stale {
            if let Some(id) = self.index.remove(&p) {
                if self.nodes[id.0].take().is_some() {
                    self.free.push(id.0);
                }
            }
        }

        Outcome::Applied
    }

    fn set_property(&mut self, cmd: &Command) -> Outcome {
        let id = self.get_or_create(&cmd.path);
        let property = cmd.field("property").and_then(Value::as_str).unwrap_or("");
        if property != "visible" {
            log::debug!("{}: ignoring property {:?}", cmd.path, property);
            return Outcome::Ignored;
        }
        let visible = cmd.field("value").is_some_and(Value::is_truthy);
        match self.node_mut(id) {
            Some(node) => {
                node.visible = visible;
                Outcome::Applied
            }
            None => Outcome::NoOp,
        }
    }

    fn set_animation(&mut self, cmd: &Command) -> Outcome {
        self.animation_fps = payload_fps(&cmd.payload).unwrap_or(DEFAULT_RECORDING_FPS);

        let animations = cmd
            .field("animations")
            .and_then(Value::as_array)
            .unwrap_or_default();
        for anim in animations {
            let path = anim.get("path").and_then(Value::as_str).unwrap_or("");
            let clip = anim
                .get("clip")
                .map(AnimationClip::from_value)
                .unwrap_or_else(|| AnimationClip::from_value(&Value::Nil));
            let id = self.get_or_create(path);
            if let Some(node) = self.node_mut(id) {
                node.clips.push(clip);
            }
        }
        Outcome::Applied
    }

    /// World transform: every ancestor's local transform from the root
    /// down, then the node's object transform.
    pub fn world_transform(&self, id: NodeId) -> Transform {
        let mut chain = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            chain.push(node.local_transform);
            current = node.parent.and_then(|p| self.node(p));
        }

        let world = chain
            .iter()
            .rev()
            .fold(Transform::IDENTITY, |acc, local| acc.compose(local));
        match self.node(id) {
            Some(node) => world.compose(&node.object_transform),
            None => world,
        }
    }

    /// The node whose keyframes drive `path`: the node itself if animated,
    /// else the nearest animated ancestor below the root.
    pub fn find_animation_source(&self, path: &str) -> Option<NodeId> {
        let path = normalize_path(path);
        let animated = |p: &str| {
            self.index
                .get(p)
                .copied()
                .filter(|id| self.node(*id).is_some_and(SceneNode::is_animated))
        };
        if let Some(id) = animated(&path) {
            return Some(id);
        }

        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        (1..parts.len())
            .rev()
            .find_map(|i| animated(&format!("/{}", parts[..i].join("/"))))
    }

    /// Fixed transform from `ancestor` down to `descendant`: the local
    /// transforms strictly below `ancestor`, down to and including
    /// `descendant`'s own.
    ///
    /// Identity if they are the same node, `None` if `ancestor` is not on
    /// `descendant`'s parent chain.
    pub fn relative_offset(&self, ancestor: NodeId, descendant: NodeId) -> Option<Transform> {
        let mut combined = Transform::IDENTITY;
        let mut current = descendant;
        while current != ancestor {
            let node = self.node(current)?;
            combined = node.local_transform.compose(&combined);
            current = node.parent?;
        }
        Some(combined)
    }

    /// Image bytes behind a texture uuid.
    ///
    /// Follows the texture's `image` (an inline `{url}` map or an image
    /// uuid) to a URL, which may be a data URI or an asset key.
    pub fn texture_image(&mut self, uuid: &str) -> Option<&ResolvedAsset> {
        let texture = self.textures.get(uuid)?;
        let image = texture.get("image")?;
        let url = match image.as_str() {
            Some(image_uuid) => self.images.get(image_uuid)?.get("url")?.as_str()?,
            None => image.get("url")?.as_str()?,
        }
        .to_string();
        self.resolver.resolve_url(&url)
    }
}

/// Find the entry of `top[section]` whose uuid is `reference`, or use
/// `reference` itself when it is an embedded map.
fn lookup<'a>(top: Option<&'a Value>, section: &str, reference: Option<&'a Value>) -> Option<&'a Value> {
    let reference = reference?;
    if reference.is_map() {
        return Some(reference);
    }
    let uuid = reference.as_str()?;
    top?.get(section)?
        .as_array()?
        .iter()
        .rev()
        .find(|entry| entry.get("uuid").and_then(Value::as_str) == Some(uuid))
}
