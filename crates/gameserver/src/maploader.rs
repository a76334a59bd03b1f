//! Narrow boundary standing in for the BSP collision loader. Treated as
//! an opaque `load_map(name) -> checksum` service per the external
//! interfaces this workspace never reimplements.

#[derive(Debug, Clone, PartialEq)]
pub struct MapLoadError(pub String);

pub trait MapLoader {
    fn load_map(&mut self, name: &str, client_load: bool) -> Result<u32, MapLoadError>;
}

/// Stand-in used by tests and by `sv` when no real collision module is
/// loaded: accepts any non-empty name and derives a stable checksum from
/// it so repeated loads of the same map are idempotent.
#[derive(Default)]
pub struct NullMapLoader;

impl MapLoader for NullMapLoader {
    fn load_map(&mut self, name: &str, _client_load: bool) -> Result<u32, MapLoadError> {
        if name.is_empty() {
            return Err(MapLoadError("empty map name".to_string()));
        }
        let mut checksum: u32 = 5381;
        for b in name.bytes() {
            checksum = checksum.wrapping_mul(33).wrapping_add(b as u32);
        }
        Ok(checksum)
    }
}
