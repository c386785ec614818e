//! Conversions between the three forms of an instance id.
//!
//! The raster stores `[id1, id2, class]` as three bytes, sets and maps key on
//! the fused integer, and persisted annotation records carry the JSON text of
//! the triple. Every conversion goes through this module.

use crate::{
    error::{MaskError, Result},
    types::{FusedId, InstanceId},
};

const CLASS_STRIDE: u32 = 256 * 256;
const ID2_STRIDE: u32 = 256;

/// `id1 + 256 * id2 + 65536 * class`
pub fn fuse(id: InstanceId) -> FusedId {
    id[0] as u32 + ID2_STRIDE * id[1] as u32 + CLASS_STRIDE * id[2] as u32
}

/// Inverse of [`fuse`]. `fused` must be below `2^24`.
pub fn unfuse(fused: FusedId) -> InstanceId {
    debug_assert!(fused < CLASS_STRIDE * 256, "fused id {fused} out of range");
    let class = fused / CLASS_STRIDE;
    let id2 = (fused % CLASS_STRIDE) / ID2_STRIDE;
    let id1 = fused - class * CLASS_STRIDE - id2 * ID2_STRIDE;
    [id1 as u8, id2 as u8, class as u8]
}

/// Canonical object key, e.g. `"[1,0,2]"`.
pub fn instance_key(id: InstanceId) -> String {
    format!("[{},{},{}]", id[0], id[1], id[2])
}

pub fn fused_key(fused: FusedId) -> String {
    instance_key(unfuse(fused))
}

/// Parse a key produced by [`instance_key`].
pub fn parse_instance_key(key: &str) -> Result<InstanceId> {
    serde_json::from_str::<InstanceId>(key).map_err(|_| MaskError::InvalidKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_layout() {
        assert_eq!(fuse([0, 0, 0]), 0);
        assert_eq!(fuse([1, 0, 0]), 1);
        assert_eq!(fuse([0, 1, 0]), 256);
        assert_eq!(fuse([0, 0, 1]), 65536);
        assert_eq!(fuse([255, 255, 255]), 16_777_215);
    }

    #[test]
    fn test_unfuse_inverts_fuse() {
        for class in [0u8, 1, 2, 127, 254, 255] {
            for id2 in (0..=255u8).step_by(17) {
                for id1 in 0..=255u8 {
                    let id = [id1, id2, class];
                    assert_eq!(unfuse(fuse(id)), id);
                }
            }
        }
        assert_eq!(unfuse(16_777_215), [255, 255, 255]);
    }

    #[test]
    fn test_instance_key_matches_json_text() {
        let id = [12, 0, 3];
        let key = instance_key(id);
        assert_eq!(key, "[12,0,3]");
        assert_eq!(key, serde_json::to_string(&id).expect("serializable"));
        assert_eq!(parse_instance_key(&key).expect("valid key"), id);
        assert_eq!(fused_key(fuse(id)), key);
    }

    #[test]
    fn test_parse_instance_key_rejects_garbage() {
        assert!(matches!(parse_instance_key("[1,2]"), Err(MaskError::InvalidKey(_))));
        assert!(matches!(parse_instance_key("[1,2,300]"), Err(MaskError::InvalidKey(_))));
        assert!(matches!(parse_instance_key("instance"), Err(MaskError::InvalidKey(_))));
    }
}
