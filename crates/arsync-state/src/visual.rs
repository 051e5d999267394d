//! Engine-facing visuals for object instances

use arsync_core::{Color, ObjectId, ObjectInstance, PetriNetId, Transform};

use crate::{AssetCache, ResolvedPrototype};

/// What the engine draws for an object
#[derive(Debug, Clone, PartialEq)]
pub enum VisualKind {
    /// Cached mesh, tinted with the prototype's mean color
    Mesh(ResolvedPrototype),
    /// Wireframe oriented box
    WireframeBox { color: Color },
}

/// Fully resolved object ready to hand to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVisual {
    pub id: ObjectId,
    pub pn_id: PetriNetId,
    /// For meshes the scale carries the prototype bounding box half size,
    /// for boxes the box half size
    pub transform: Transform,
    pub kind: VisualKind,
}

impl ObjectVisual {
    /// Only objects with a petri-net id take part in selection
    pub fn is_selectable(&self) -> bool {
        self.pn_id.is_selectable()
    }
}

/// Outcome of resolving an instance against the asset cache
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Ready(ObjectVisual),
    /// Prototype (or its mesh) not cached yet
    Missing(String),
}

pub fn resolve_instance(instance: &ObjectInstance, assets: &AssetCache) -> Resolution {
    match instance {
        ObjectInstance::Prototype { id, pn_id, data } => {
            match assets.resolve(&data.prototype_name) {
                Some(resolved) => Resolution::Ready(ObjectVisual {
                    id: id.clone(),
                    pn_id: *pn_id,
                    transform: data
                        .transform
                        .scaled(resolved.prototype.bounding_box.extent()),
                    kind: VisualKind::Mesh(resolved),
                }),
                None => Resolution::Missing(data.prototype_name.clone()),
            }
        }
        ObjectInstance::ColoredBox { id, pn_id, data } => {
            let obb = &data.obb;
            Resolution::Ready(ObjectVisual {
                id: id.clone(),
                pn_id: *pn_id,
                transform: Transform::new(
                    obb.axis_box.center(),
                    obb.rotation,
                    obb.axis_box.extent(),
                ),
                kind: VisualKind::WireframeBox { color: data.color },
            })
        }
    }
}

/// Preview visual of a cached prototype at the identity pose
pub fn prototype_preview(
    name: &str,
    assets: &AssetCache,
) -> Option<(Transform, ResolvedPrototype)> {
    let resolved = assets.resolve(name)?;
    let transform = Transform::IDENTITY.scaled(resolved.prototype.bounding_box.extent());
    Some((transform, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsync_core::{
        Aabb, ColoredBox, MeshData, ObjectData, ObjectPrototype, Obb, Quat, Vec3,
    };

    fn cache_with_bowl() -> AssetCache {
        let cache = AssetCache::new();
        cache.insert_prototype(ObjectPrototype {
            name: "bowl".into(),
            mesh_name: "bowl_mesh".into(),
            bounding_box: Aabb::from_center_extent(Vec3::ZERO, Vec3::new(5.0, 5.0, 2.0)),
            ..Default::default()
        });
        cache.insert_mesh(MeshData {
            name: "bowl_mesh".into(),
            ..Default::default()
        });
        cache
    }

    fn bowl_instance() -> ObjectInstance {
        ObjectInstance::Prototype {
            id: ObjectId::new("X1"),
            pn_id: PetriNetId::new(1),
            data: ObjectData {
                prototype_name: "bowl".into(),
                transform: Transform::new(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE),
            },
        }
    }

    #[test]
    fn test_prototype_scaled_by_bounding_box() {
        let Resolution::Ready(visual) = resolve_instance(&bowl_instance(), &cache_with_bowl())
        else {
            panic!("bowl should resolve");
        };
        assert_eq!(visual.transform.translation, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(visual.transform.scale, Vec3::new(5.0, 5.0, 2.0));
        assert!(visual.is_selectable());
        assert!(matches!(visual.kind, VisualKind::Mesh(_)));
    }

    #[test]
    fn test_missing_prototype() {
        assert_eq!(
            resolve_instance(&bowl_instance(), &AssetCache::new()),
            Resolution::Missing("bowl".into())
        );
    }

    #[test]
    fn test_colored_box_needs_no_assets() {
        let instance = ObjectInstance::ColoredBox {
            id: ObjectId::new("zone"),
            pn_id: PetriNetId::NONE,
            data: ColoredBox {
                obb: Obb::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::new(4.0, 4.0, 1.0)),
                color: Color::YELLOW,
            },
        };

        let Resolution::Ready(visual) = resolve_instance(&instance, &AssetCache::new()) else {
            panic!("boxes always resolve");
        };
        assert_eq!(visual.transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(visual.transform.scale, Vec3::new(4.0, 4.0, 1.0));
        assert_eq!(visual.kind, VisualKind::WireframeBox { color: Color::YELLOW });
        assert!(!visual.is_selectable());
    }

    #[test]
    fn test_prototype_preview() {
        let (transform, resolved) = prototype_preview("bowl", &cache_with_bowl()).unwrap();
        assert_eq!(transform.scale, Vec3::new(5.0, 5.0, 2.0));
        assert_eq!(resolved.prototype.name, "bowl");
        assert!(prototype_preview("cup", &cache_with_bowl()).is_none());
    }
}
