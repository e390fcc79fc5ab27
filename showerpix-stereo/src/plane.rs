//! Moving telescope positions between the ground and the shower plane.

use showerpix_core::{Point2, ShowerFrame, TelescopePosition};

/// Telescope position in the plane perpendicular to the pointing
/// direction, shifted along the reconstructed source offset `source`
/// (camera degrees) by the telescope's height in that frame.
#[must_use]
pub fn project_telescope(
    frame: &ShowerFrame,
    position: &TelescopePosition,
    source: Point2,
) -> Point2 {
    let [x, y, z] = frame.to_shower(position.as_array());
    Point2::new(
        x - z * source.x.to_radians().tan(),
        y - z * source.y.to_radians().tan(),
    )
}

/// Maps a shower-plane point back to the ground, following the frame axis
/// down to `z = 0`.
#[must_use]
pub fn shower_plane_to_ground(frame: &ShowerFrame, point: Point2) -> Point2 {
    let g = frame.to_ground([point.x, point.y, 0.0]);
    let axis = frame.axis();
    if axis[2].abs() < f64::EPSILON {
        return Point2::new(g[0], g[1]);
    }
    let t = g[2] / axis[2];
    Point2::new(g[0] - t * axis[0], g[1] - t * axis[1])
}

/// Distance of a telescope from the shower axis through `core` (ground
/// coordinates).
#[must_use]
pub fn impact_distance(frame: &ShowerFrame, position: &TelescopePosition, core: Point2) -> f64 {
    let axis = frame.axis();
    let v = [position.x - core.x, position.y - core.y, position.z];
    let along = v[0] * axis[0] + v[1] * axis[1] + v[2] * axis[2];
    let perp = [
        v[0] - along * axis[0],
        v[1] - along * axis[1],
        v[2] - along * axis[2],
    ];
    (perp[0] * perp[0] + perp[1] * perp[1] + perp[2] * perp[2]).sqrt()
}
