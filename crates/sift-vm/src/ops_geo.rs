//! Geospatial opcodes: geohash encoding, web-mercator tiles, and
//! haversine distance.

use std::f64::consts::PI;

use crate::bytecode::Bytecode;
use crate::reg::{lanes, BaseReg, MaskReg, ScalarReg};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const EARTH_RADIUS_M: f64 = 6_371_000.0;
const MAX_GEOHASH_CHARS: i64 = 12;
const MAX_TILE_ZOOM: i64 = 32;

fn geohash_bytes(lat: f64, lon: f64, chars: usize) -> Vec<u8> {
    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);
    let mut out = Vec::with_capacity(chars);
    let mut bit = 0;
    let mut acc = 0u8;
    let mut even = true;
    while out.len() < chars {
        let range = if even { &mut lon_range } else { &mut lat_range };
        let value = if even { lon } else { lat };
        let mid = (range.0 + range.1) / 2.0;
        acc <<= 1;
        if value >= mid {
            acc |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;
        bit += 1;
        if bit == 5 {
            out.push(BASE32[acc as usize]);
            acc = 0;
            bit = 0;
        }
    }
    out
}

fn tile_x(lon: f64, zoom: u32) -> i64 {
    let n = (1u64 << zoom) as f64;
    let x = ((lon + 180.0) / 360.0 * n).floor() as i64;
    x.clamp(0, (1i64 << zoom) - 1)
}

fn tile_y(lat: f64, zoom: u32) -> i64 {
    let n = (1u64 << zoom) as f64;
    let rad = lat.to_radians();
    let y = ((1.0 - rad.tan().asinh() / PI) / 2.0 * n).floor() as i64;
    y.clamp(0, (1i64 << zoom) - 1)
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// geohash / geohashimm: base-32 cell name into scratch.
pub(crate) fn geohash(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    let lat = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let lon = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let chars_reg = (!imm).then(|| ScalarReg::load(&bc.vstack, bc.word(pc + 6)));
    let imm_chars = if imm { i64::from(bc.word(pc + 6)) } else { 0 };
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = BaseReg::default();
    for i in lanes(k.mask) {
        let chars = chars_reg
            .as_ref()
            .map_or(imm_chars, |r| r.i64(i))
            .clamp(1, MAX_GEOHASH_CHARS) as usize;
        let hash = geohash_bytes(lat.f64(i), lon.f64(i), chars);
        out.offsets[i] = bc.scratch_append(&hash);
        out.sizes[i] = hash.len() as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 10
}

/// geotilex / geotiley.
pub(crate) fn geotile_axis(bc: &mut Bytecode, pc: usize, is_y: bool) -> usize {
    let coord = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let zoom = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 6));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        let z = zoom.i64(i).clamp(0, MAX_TILE_ZOOM) as u32;
        let idx = if is_y {
            tile_y(coord.f64(i), z)
        } else {
            tile_x(coord.f64(i), z)
        };
        out.set_i64(i, idx);
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 8
}

/// geotilees / geotilees.imm: "zoom/x/y" tile key into scratch.
pub(crate) fn geotile_es(bc: &mut Bytecode, pc: usize, imm: bool) -> usize {
    let lat = ScalarReg::load(&bc.vstack, bc.word(pc + 2));
    let lon = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let zoom_reg = (!imm).then(|| ScalarReg::load(&bc.vstack, bc.word(pc + 6)));
    let imm_zoom = if imm { i64::from(bc.word(pc + 6)) } else { 0 };
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 8));
    let mut out = BaseReg::default();
    for i in lanes(k.mask) {
        let z = zoom_reg
            .as_ref()
            .map_or(imm_zoom, |r| r.i64(i))
            .clamp(0, MAX_TILE_ZOOM) as u32;
        let key = format!(
            "{z}/{}/{}",
            tile_x(lon.f64(i), z),
            tile_y(lat.f64(i), z)
        );
        out.offsets[i] = bc.scratch_append(key.as_bytes());
        out.sizes[i] = key.len() as u32;
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    pc + 10
}

/// geodistance: haversine meters between two coordinate pairs.
pub(crate) fn geodistance(bc: &mut Bytecode, pc: usize) -> usize {
    let lat1 = ScalarReg::load(&bc.vstack, bc.word(pc + 4));
    let lon1 = ScalarReg::load(&bc.vstack, bc.word(pc + 6));
    let lat2 = ScalarReg::load(&bc.vstack, bc.word(pc + 8));
    let lon2 = ScalarReg::load(&bc.vstack, bc.word(pc + 10));
    let k = MaskReg::load(&bc.vstack, bc.word(pc + 12));
    let mut out = ScalarReg::default();
    for i in lanes(k.mask) {
        out.set_f64(
            i,
            haversine_m(lat1.f64(i), lon1.f64(i), lat2.f64(i), lon2.f64(i)),
        );
    }
    let off = bc.word(pc);
    out.store(&mut bc.vstack, off);
    let off = bc.word(pc + 2);
    MaskReg { mask: k.mask }.store(&mut bc.vstack, off);
    pc + 14
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_geohash() {
        // The canonical example: 57.64911, 10.40744 -> "u4pruydqqvj".
        let hash = geohash_bytes(57.64911, 10.40744, 11);
        assert_eq!(&hash, b"u4pruydqqvj");
    }

    #[test]
    fn tile_indices() {
        // Zoom 0 is a single tile.
        assert_eq!(tile_x(-180.0, 0), 0);
        assert_eq!(tile_y(85.0, 0), 0);
        // Greenwich at zoom 1 is the eastern half.
        assert_eq!(tile_x(0.1, 1), 1);
        assert_eq!(tile_y(0.0, 1), 1);
    }

    #[test]
    fn haversine_sanity() {
        // Paris to London is roughly 344 km.
        let d = haversine_m(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((330_000.0..360_000.0).contains(&d), "distance {d}");
    }
}
