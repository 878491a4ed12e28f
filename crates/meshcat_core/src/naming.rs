//! Display names and path filtering.
//!
//! None of this affects scene graph indexing, which always uses the full
//! path.

const STRIPPED_ROOTS: [&str; 2] = ["drake", "illustration"];
const GENERIC_LEAVES: [&str; 3] = ["visual", "collision", "base_link"];

/// Derive a readable object name from a Drake-style path.
///
/// ```
/// use meshcat_core::naming::derive_object_name;
///
/// assert_eq!(derive_object_name("/drake/illustration/box/base_link/box/visual"), "box");
/// assert_eq!(derive_object_name("/drake/illustration/arm/link3/arm/shell"), "arm_shell");
/// ```
pub fn derive_object_name(path: &str) -> String {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let mut parts = segments.as_slice();
    for root in STRIPPED_ROOTS {
        if parts.first() == Some(&root) {
            parts = &parts[1..];
        }
    }

    let Some(&model) = parts.first().filter(|p| !p.is_empty()) else {
        return "Object".to_string();
    };

    if parts.len() > 1 {
        let last = parts[parts.len() - 1];
        if !GENERIC_LEAVES.contains(&last) {
            if model.contains("room_geometry") {
                return last.to_string();
            }
            if last != model {
                return format!("{}_{}", model, last);
            }
        }
    }

    model.to_string()
}

/// True if `path` starts with any of the excluded prefixes.
pub fn is_excluded<S: AsRef<str>>(path: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_leaf_uses_model_name() {
        assert_eq!(
            derive_object_name("/drake/illustration/box/base_link/box/visual"),
            "box"
        );
        assert_eq!(derive_object_name("/drake/illustration/table/collision"), "table");
    }

    #[test]
    fn test_descriptive_leaf() {
        assert_eq!(
            derive_object_name("/drake/illustration/iiwa/iiwa_link_3/iiwa/link3_mesh"),
            "iiwa_link3_mesh"
        );
        assert_eq!(derive_object_name("/drake/illustration/iiwa/x/iiwa"), "iiwa");
    }

    #[test]
    fn test_room_geometry_uses_leaf() {
        assert_eq!(
            derive_object_name(
                "/drake/illustration/room_geometry_dining/room_geometry_body_link/north_wall"
            ),
            "north_wall"
        );
    }

    #[test]
    fn test_degenerate_paths() {
        assert_eq!(derive_object_name("/"), "Object");
        assert_eq!(derive_object_name("/drake/illustration"), "Object");
        assert_eq!(derive_object_name("/meshes/teapot"), "meshes_teapot");
        assert_eq!(derive_object_name("/teapot"), "teapot");
    }

    #[test]
    fn test_is_excluded() {
        let prefixes = ["/drake/proximity/", "/drake/inertia/"];
        assert!(is_excluded("/drake/proximity/box", &prefixes));
        assert!(!is_excluded("/drake/illustration/box", &prefixes));
        assert!(!is_excluded("/drake/proximity", &prefixes));
    }
}
