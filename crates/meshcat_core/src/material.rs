//! Material descriptors parsed from Three.js JSON payloads.

use glam::Vec3;
use serde::Serialize;

use crate::msgpack::Value;

/// Shading models the importer understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MaterialKind {
    Standard,
    Phong,
    Basic,
    Lambert,
}

impl MaterialKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "MeshStandardMaterial" => Some(MaterialKind::Standard),
            "MeshPhongMaterial" => Some(MaterialKind::Phong),
            "MeshBasicMaterial" => Some(MaterialKind::Basic),
            "MeshLambertMaterial" => Some(MaterialKind::Lambert),
            _ => None,
        }
    }
}

/// Which faces are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

impl Side {
    fn from_wire(value: Option<i64>) -> Self {
        match value {
            Some(1) => Side::Back,
            Some(2) => Side::Double,
            _ => Side::Front,
        }
    }
}

/// A parsed material.
///
/// Colours are linear RGB in 0-1 as sent; no colour-space conversion is
/// applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub kind: MaterialKind,
    pub color: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub metalness: f32,
    pub roughness: f32,
    pub shininess: f32,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub emissive_intensity: f32,

    /// Texture uuid of the colour map
    pub map: Option<String>,
    pub normal_map: Option<String>,
    pub roughness_map: Option<String>,
    pub metalness_map: Option<String>,
    pub emissive_map: Option<String>,

    pub side: Side,
    pub wireframe: bool,
    pub flat_shading: bool,
    pub vertex_colors: bool,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            kind,
            color: Vec3::ONE,
            opacity: 1.0,
            transparent: false,
            metalness: 0.0,
            roughness: 1.0,
            shininess: 30.0,
            specular: Vec3::splat(0.1),
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            map: None,
            normal_map: None,
            roughness_map: None,
            metalness_map: None,
            emissive_map: None,
            side: Side::Front,
            wireframe: false,
            flat_shading: false,
            vertex_colors: false,
        }
    }

    /// Roughness to use for a PBR target. Phong materials derive it from
    /// shininess.
    pub fn effective_roughness(&self) -> f32 {
        match self.kind {
            MaterialKind::Phong => shininess_to_roughness(self.shininess),
            _ => self.roughness,
        }
    }

    pub fn has_textures(&self) -> bool {
        self.map.is_some()
            || self.normal_map.is_some()
            || self.roughness_map.is_some()
            || self.metalness_map.is_some()
            || self.emissive_map.is_some()
    }
}

/// Approximate PBR roughness for a Phong exponent.
pub fn shininess_to_roughness(shininess: f32) -> f32 {
    if shininess <= 0.0 {
        return 1.0;
    }
    (2.0 / (shininess + 2.0)).sqrt().clamp(0.0, 1.0)
}

/// Parse a colour given as `0xRRGGBB` integer or `#RRGGBB` / `0xRRGGBB` text.
pub fn parse_color(value: &Value) -> Option<Vec3> {
    let packed = match value {
        Value::String(_) => {
            let text = value.as_str()?.trim();
            let hex = text
                .strip_prefix('#')
                .or_else(|| text.strip_prefix("0x"))
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            u32::from_str_radix(hex, 16).ok()?
        }
        _ => u32::try_from(value.as_i64()?).ok()?,
    };
    Some(Vec3::new(
        ((packed >> 16) & 0xff) as f32 / 255.0,
        ((packed >> 8) & 0xff) as f32 / 255.0,
        (packed & 0xff) as f32 / 255.0,
    ))
}

/// Texture reference given as a uuid string or a `{uuid}` map.
fn texture_ref(value: Option<&Value>) -> Option<String> {
    let value = value?;
    value
        .as_str()
        .or_else(|| value.get("uuid").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse one entry of a payload's `materials` array.
///
/// Unsupported material types log a warning and yield `None`.
pub fn parse_material(mat: &Value) -> Option<Material> {
    let type_name = mat.get("type").and_then(Value::as_str).unwrap_or("");
    let Some(kind) = MaterialKind::from_type_name(type_name) else {
        log::warn!("unsupported material type {:?}", type_name);
        return None;
    };

    let mut m = Material::new(kind);
    let float = |key: &str, default: f32| {
        mat.get(key)
            .and_then(Value::as_f64)
            .map_or(default, |f| f as f32)
    };
    let flag = |key: &str| mat.get(key).is_some_and(Value::is_truthy);
    let color = |key: &str, default: Vec3| mat.get(key).and_then(parse_color).unwrap_or(default);

    m.color = color("color", m.color);
    m.specular = color("specular", m.specular);
    m.emissive = color("emissive", m.emissive);
    m.opacity = float("opacity", m.opacity);
    m.metalness = float("metalness", m.metalness);
    m.roughness = float("roughness", m.roughness);
    m.shininess = float("shininess", m.shininess);
    m.emissive_intensity = float("emissiveIntensity", m.emissive_intensity);

    m.transparent = flag("transparent");
    m.wireframe = flag("wireframe");
    m.flat_shading = flag("flatShading");
    m.vertex_colors = flag("vertexColors");
    m.side = Side::from_wire(mat.get("side").and_then(Value::as_i64));

    m.map = texture_ref(mat.get("map"));
    m.normal_map = texture_ref(mat.get("normalMap"));
    m.roughness_map = texture_ref(mat.get("roughnessMap"));
    m.metalness_map = texture_ref(mat.get("metalnessMap"));
    m.emissive_map = texture_ref(mat.get("emissiveMap"));

    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgpack::testing::map;

    #[test]
    fn test_defaults() {
        let m = parse_material(&map(vec![("type", "MeshStandardMaterial".into())])).unwrap();
        assert_eq!(m.kind, MaterialKind::Standard);
        assert_eq!(m.color, Vec3::ONE);
        assert_eq!(m.opacity, 1.0);
        assert_eq!(m.metalness, 0.0);
        assert_eq!(m.roughness, 1.0);
        assert_eq!(m.shininess, 30.0);
        assert_eq!(m.side, Side::Front);
        assert!(!m.has_textures());
    }

    #[test]
    fn test_colors() {
        assert_eq!(
            parse_color(&Value::UInt(0xff0000)),
            Some(Vec3::new(1.0, 0.0, 0.0))
        );
        assert_eq!(
            parse_color(&"#00ff00".into()),
            Some(Vec3::new(0.0, 1.0, 0.0))
        );
        assert_eq!(
            parse_color(&"0x0000ff".into()),
            Some(Vec3::new(0.0, 0.0, 1.0))
        );
        assert_eq!(parse_color(&"not a colour".into()), None);
        assert_eq!(parse_color(&Value::Int(-1)), None);
    }

    #[test]
    fn test_phong_fields() {
        let m = parse_material(&map(vec![
            ("type", "MeshPhongMaterial".into()),
            ("color", Value::UInt(0x808080)),
            ("shininess", Value::UInt(98)),
            ("side", Value::UInt(2)),
            ("transparent", true.into()),
            ("opacity", 0.5.into()),
            ("map", map(vec![("uuid", "tex-1".into())])),
            ("normalMap", "tex-2".into()),
        ]))
        .unwrap();
        assert_eq!(m.kind, MaterialKind::Phong);
        assert_eq!(m.side, Side::Double);
        assert!(m.transparent);
        assert_eq!(m.opacity, 0.5);
        assert_eq!(m.map.as_deref(), Some("tex-1"));
        assert_eq!(m.normal_map.as_deref(), Some("tex-2"));
        assert!((m.effective_roughness() - (2.0f32 / 100.0).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_shininess_to_roughness() {
        assert_eq!(shininess_to_roughness(0.0), 1.0);
        assert_eq!(shininess_to_roughness(-5.0), 1.0);
        assert!((shininess_to_roughness(30.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_type() {
        assert!(parse_material(&map(vec![("type", "LineBasicMaterial".into())])).is_none());
        assert!(parse_material(&map(vec![])).is_none());
    }
}
