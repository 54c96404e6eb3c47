//! Spatial math for span bearings, line deflection and pull.

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const FEET_PER_METER: f64 = 3.280_839_895;

/// Calculate distance between two points in meters using the Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance in feet.
pub fn distance_ft(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_distance(lat1, lon1, lat2, lon2) * FEET_PER_METER
}

/// Wrap any angle into `[0, 360)`.
pub fn normalize_bearing(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Initial bearing from point 1 to point 2 in degrees, 0 = north, 90 = east.
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_bearing(x.atan2(y).to_degrees())
}

/// Bearing of travel on arrival at point 2 when coming from point 1.
pub fn final_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    normalize_bearing(initial_bearing_deg(lat2, lon2, lat1, lon1) + 180.0)
}

/// Line deflection at a pole in degrees, `0..=180`.
///
/// `incoming` is the direction of travel arriving at the pole, `outgoing` the
/// direction leaving it. A straight line deflects 0°, a full switchback 180°.
pub fn deflection_deg(incoming: f64, outgoing: f64) -> f64 {
    let diff = normalize_bearing(outgoing - incoming);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Side pull in feet measured at `reference_length_ft` along each leg.
///
/// This is the distance from the pole to the chord joining two points staked
/// `reference_length_ft` out along the incoming and outgoing lines.
pub fn pull_ft(incoming: f64, outgoing: f64, reference_length_ft: f64) -> f64 {
    let half = deflection_deg(incoming, outgoing).to_radians() / 2.0;
    reference_length_ft * half.sin()
}

/// Round to two decimals, the precision field crews record pull in.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
