use geojson::{feature::Id, Feature, FeatureCollection, Geometry, Value};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    algorithms::{convert_index_to_dict, is_clockwise},
    codec::{instance_key, unfuse},
    error::Result,
    store::MaskStore,
    types::ContourType,
};

/// Properties attached to each instance feature
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS, JsonSchema)]
#[schemars(description = "Properties of one mask instance")]
pub struct InstanceProperties {
    #[schemars(description = "Class id of the instance")]
    pub class: u8,
    #[schemars(description = "Number of pixels holding the instance id")]
    pub nb_pixels: usize,
    #[schemars(description = "Number of connected regions")]
    pub blob_count: usize,
}

impl MaskStore {
    /// One MultiPolygon feature per instance, keyed by its canonical id.
    ///
    /// Rings follow RFC 7946 read with y pointing up: exterior rings are
    /// counter-clockwise and holes clockwise. Coordinates are pixel corners.
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let stride = self.width() as usize + 1;
        let mut features = Vec::new();

        for &fused in self.fused_ids() {
            let id = unfuse(fused);
            let blobs = self.get_blobs(id, None);
            let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = Vec::with_capacity(blobs.len());
            let mut nb_pixels = 0;
            for blob in blobs.values() {
                nb_pixels += blob.nb_pixels;
                let rings: Vec<Vec<Vec<f64>>> = blob
                    .contours
                    .iter()
                    .map(|contour| {
                        let mut ring = convert_index_to_dict(&contour.points, stride);
                        // image space has y pointing down, which flips the winding
                        let want_clockwise = contour.kind == ContourType::External;
                        if is_clockwise(&ring) != want_clockwise {
                            ring.reverse();
                        }
                        if let Some(&first) = ring.first() {
                            ring.push(first);
                        }
                        ring.iter().map(|c| vec![c.x as f64, c.y as f64]).collect()
                    })
                    .collect();
                polygons.push(rings);
            }

            let properties = InstanceProperties {
                class: id[2],
                nb_pixels,
                blob_count: blobs.len(),
            };
            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::MultiPolygon(polygons))),
                id: Some(Id::String(instance_key(id))),
                properties: serde_json::to_value(properties)?.as_object().cloned(),
                foreign_members: None,
            });
        }

        let mut foreign_members = serde_json::Map::new();
        foreign_members.insert("image_width".to_string(), self.width().into());
        foreign_members.insert("image_height".to_string(), self.height().into());
        foreign_members.insert("instance_count".to_string(), features.len().into());

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }

    /// Export to GeoJSON and serialize to JSON string
    pub fn to_geojson_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_geojson()?)?)
    }
}
