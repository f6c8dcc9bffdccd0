//! Great-circle math and checkpoint lookup

use super::{Checkpoint, Fix};

/// Mean Earth radius used for haversine distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Mean position of the given fixes, `None` when empty
pub fn mean_position<'a>(fixes: impl IntoIterator<Item = &'a Fix>) -> Option<(f64, f64)> {
    let (count, lat_sum, lng_sum) = fixes
        .into_iter()
        .fold((0usize, 0.0, 0.0), |(n, lat, lng), fix| {
            (n + 1, lat + fix.lat, lng + fix.lng)
        });
    if count == 0 {
        return None;
    }
    Some((lat_sum / count as f64, lng_sum / count as f64))
}

/// Checkpoint nearest to the position; the earliest one wins ties
pub fn nearest_checkpoint(checkpoints: &[Checkpoint], lat: f64, lng: f64) -> Option<&Checkpoint> {
    let mut best: Option<(&Checkpoint, f64)> = None;
    for cp in checkpoints {
        let d = haversine_km(lat, lng, cp.lat, cp.lng);
        match best {
            Some((_, min)) if d >= min => {}
            _ => best = Some((cp, d)),
        }
    }
    best.map(|(cp, _)| cp)
}

/// First checkpoint strictly beyond the given distance
pub fn next_checkpoint(checkpoints: &[Checkpoint], km: f64) -> Option<&Checkpoint> {
    checkpoints.iter().find(|cp| cp.km > km)
}
