//! Geometry descriptors parsed from Three.js JSON payloads.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use glam::Vec3;

use crate::msgpack::Value;
use crate::recording::{AssetResolver, CAS_PREFIX};

/// Built-in parametric shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveShape {
    Box {
        width: f64,
        height: f64,
        depth: f64,
    },
    Sphere {
        radius: f64,
        width_segments: u32,
        height_segments: u32,
    },
    Cylinder {
        radius_top: f64,
        radius_bottom: f64,
        height: f64,
        radial_segments: u32,
    },
    Plane {
        width: f64,
        height: f64,
    },
}

/// Explicit vertex data from a `BufferGeometry`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    /// Per-vertex colours
    pub colors: Option<Vec<Vec3>>,
    pub indices: Option<Vec<u32>>,
}

impl MeshGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles, indexed or not.
    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.positions.len() / 3,
        }
    }
}

/// An embedded mesh file (glTF, OBJ, STL, ...) left for an external importer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshFileGeometry {
    pub format: String,
    pub data: Vec<u8>,
    /// Side files the primary payload refers to, keyed by the name it uses
    pub resources: BTreeMap<String, Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Mesh(MeshGeometry),
    Primitive(PrimitiveShape),
    MeshFile(MeshFileGeometry),
}

impl Geometry {
    /// Short name for summaries.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Mesh(_) => "mesh",
            Geometry::Primitive(PrimitiveShape::Box { .. }) => "box",
            Geometry::Primitive(PrimitiveShape::Sphere { .. }) => "sphere",
            Geometry::Primitive(PrimitiveShape::Cylinder { .. }) => "cylinder",
            Geometry::Primitive(PrimitiveShape::Plane { .. }) => "plane",
            Geometry::MeshFile(_) => "meshfile",
        }
    }
}

/// Parse one entry of a payload's `geometries` array.
///
/// Unsupported types and unusable attribute data log a warning and yield
/// `None`.
pub fn parse_geometry(geom: &Value, resolver: &mut AssetResolver) -> Option<Geometry> {
    let type_name = geom.get("type").and_then(Value::as_str).unwrap_or("");
    match type_name {
        "BufferGeometry" => parse_buffer_geometry(geom).map(Geometry::Mesh),
        "BoxGeometry" | "BoxBufferGeometry" => Some(Geometry::Primitive(PrimitiveShape::Box {
            width: number(geom, "width", 1.0),
            height: number(geom, "height", 1.0),
            depth: number(geom, "depth", 1.0),
        })),
        "SphereGeometry" | "SphereBufferGeometry" => {
            Some(Geometry::Primitive(PrimitiveShape::Sphere {
                radius: number(geom, "radius", 1.0),
                width_segments: count(geom, "widthSegments", 32),
                height_segments: count(geom, "heightSegments", 16),
            }))
        }
        "CylinderGeometry" | "CylinderBufferGeometry" => {
            Some(Geometry::Primitive(PrimitiveShape::Cylinder {
                radius_top: number(geom, "radiusTop", 1.0),
                radius_bottom: number(geom, "radiusBottom", 1.0),
                height: number(geom, "height", 1.0),
                radial_segments: count(geom, "radialSegments", 32),
            }))
        }
        "PlaneGeometry" | "PlaneBufferGeometry" => {
            Some(Geometry::Primitive(PrimitiveShape::Plane {
                width: number(geom, "width", 1.0),
                height: number(geom, "height", 1.0),
            }))
        }
        "_meshfile_geometry" => parse_meshfile(geom, resolver).map(Geometry::MeshFile),
        other => {
            log::warn!("unsupported geometry type {:?}", other);
            None
        }
    }
}

fn number(v: &Value, key: &str, default: f64) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn count(v: &Value, key: &str, default: u32) -> u32 {
    v.get(key).and_then(Value::as_u32).unwrap_or(default)
}

fn parse_buffer_geometry(geom: &Value) -> Option<MeshGeometry> {
    let data = geom.get("data")?;
    let attributes = data.get("attributes");
    let attribute = |name: &str| attributes.and_then(|a| a.get(name));

    let Some(position) = attribute("position") else {
        log::warn!("BufferGeometry without a position attribute");
        return None;
    };
    let item_size = position.get("itemSize").and_then(Value::as_u32).unwrap_or(3);
    if item_size != 3 {
        log::warn!("BufferGeometry position itemSize {} is not 3", item_size);
        return None;
    }
    let Some(positions) = position.get("array").and_then(vec3s) else {
        log::warn!("BufferGeometry position array is not a multiple of 3 numbers");
        return None;
    };

    let normals = attribute("normal")
        .and_then(|a| a.get("array"))
        .and_then(vec3s);
    let colors = attribute("color")
        .and_then(|a| a.get("array"))
        .and_then(vec3s);
    let uvs = attribute("uv")
        .and_then(|a| a.get("array"))
        .and_then(Value::to_f64_vec)
        .filter(|v| v.len() % 2 == 0)
        .map(|v| {
            v.chunks_exact(2)
                .map(|c| [c[0] as f32, c[1] as f32])
                .collect()
        });
    let indices = data
        .get("index")
        .and_then(|i| i.get("array"))
        .and_then(Value::to_u32_vec);

    Some(MeshGeometry {
        positions,
        normals,
        uvs,
        colors,
        indices,
    })
}

fn vec3s(array: &Value) -> Option<Vec<Vec3>> {
    let flat = array.to_f64_vec()?;
    if flat.len() % 3 != 0 {
        return None;
    }
    Some(
        flat.chunks_exact(3)
            .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
            .collect(),
    )
}

/// Parse an embedded mesh file from a map carrying `format`, `data` and
/// optional `resources`.
///
/// glTF JSON text is kept as text; every `buffers[].uri` and
/// `images[].uri` that names a content-addressed asset is resolved into
/// `resources` under that same name.
pub fn parse_meshfile(geom: &Value, resolver: &mut AssetResolver) -> Option<MeshFileGeometry> {
    let format = geom
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let data = match geom.get("data") {
        Some(d) if d.is_truthy() => d,
        _ => {
            log::warn!("mesh file ({}) has no data", format);
            return None;
        }
    };

    let mut resources = BTreeMap::new();
    let bytes = match data.as_str() {
        Some(text) if format.eq_ignore_ascii_case("gltf") && text.trim_start().starts_with('{') => {
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(gltf) => {
                    collect_gltf_resources(&gltf, resolver, &mut resources);
                    text.as_bytes().to_vec()
                }
                Err(e) => {
                    log::warn!("embedded glTF is not valid JSON: {}", e);
                    decode_text_payload(text)
                }
            }
        }
        Some(text) => decode_text_payload(text),
        None => match raw_bytes(data) {
            Some(bytes) => bytes,
            None => {
                log::warn!("mesh file ({}) data is neither text nor bytes", format);
                return None;
            }
        },
    };

    if let Some(entries) = geom.get("resources").and_then(Value::as_map) {
        for (key, value) in entries {
            let Some(key) = key.as_str() else { continue };
            let decoded = match value.as_str() {
                Some(text) => Some(decode_text_payload(text)),
                None => raw_bytes(value),
            };
            match decoded {
                Some(bytes) => {
                    resources.insert(key.to_string(), bytes);
                }
                None => log::warn!("mesh file resource {:?} has unusable data", key),
            }
        }
    }

    Some(MeshFileGeometry {
        format,
        data: bytes,
        resources,
    })
}

fn collect_gltf_resources(
    gltf: &serde_json::Value,
    resolver: &mut AssetResolver,
    resources: &mut BTreeMap<String, Vec<u8>>,
) {
    let uris = ["buffers", "images"]
        .iter()
        .filter_map(|section| gltf.get(*section).and_then(serde_json::Value::as_array))
        .flatten()
        .filter_map(|entry| entry.get("uri").and_then(serde_json::Value::as_str));

    for uri in uris {
        if !uri.starts_with(CAS_PREFIX) {
            continue;
        }
        match resolver.resolve_reference(uri) {
            Ok(asset) => {
                resources.insert(uri.to_string(), asset.data.clone());
            }
            Err(e) => log::warn!("glTF resource not resolved: {}", e),
        }
    }
}

/// Base64 first, raw UTF-8 bytes if that fails.
fn decode_text_payload(text: &str) -> Vec<u8> {
    STANDARD
        .decode(text.trim())
        .unwrap_or_else(|_| text.as_bytes().to_vec())
}

fn raw_bytes(value: &Value) -> Option<Vec<u8>> {
    if let Some(bytes) = value.as_bytes() {
        return Some(bytes.to_vec());
    }
    value
        .to_u32_vec()
        .and_then(|v| v.into_iter().map(|b| u8::try_from(b).ok()).collect())
}
