//! Closed-form planar and spherical geometry used by the matcher and the conflater.

/// Mean Earth radius, metres.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Clamped projection of point `p` onto the segment `a`-`b`.
///
/// Returns the distance from `p` to the closest point of the segment, the clamp
/// parameter `t` in `[0, 1]`, and the closest point itself. Degenerate segments
/// (`a == b`) collapse to the distance to `a` with `t = 0`.
pub fn point_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64, (f64, f64)) {
	let (dx, dy) = (b.0 - a.0, b.1 - a.1);
	let len2 = dx * dx + dy * dy;
	if len2 == 0.0 {
		let d = ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
		return (d, 0.0, a);
	}
	let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).max(0.0).min(1.0);
	let c = (a.0 + t * dx, a.1 + t * dy);
	let d = ((p.0 - c.0).powi(2) + (p.1 - c.1).powi(2)).sqrt();
	(d, t, c)
}

/// Euclidean distance between two planar points.
pub fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
	((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Great-circle distance in metres between two `(lon, lat)` points.
pub fn haversine(a: (f64, f64), b: (f64, f64)) -> f64 {
	let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
	let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
	let dlat = lat2 - lat1;
	let dlon = lon2 - lon1;
	let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
	2.0 * EARTH_RADIUS * h.sqrt().asin()
}

/// Equirectangular `(lon, lat)` → metres frame around a reference point.
///
/// Good enough at city scale, which is all the matcher needs: it only ever compares
/// distances of nearby points.
#[derive(Clone, Copy, Debug)]
pub struct Metric {
	lon0: f64,
	lat0: f64,
	kx: f64,
	ky: f64,
}

impl Metric {
	pub fn new(reference: (f64, f64)) -> Self {
		let ky = EARTH_RADIUS.to_radians();
		Self {
			lon0: reference.0,
			lat0: reference.1,
			kx: ky * reference.1.to_radians().cos(),
			ky,
		}
	}
	/// Project `(lon, lat)` into the planar metres frame.
	pub fn to_xy(&self, p: (f64, f64)) -> (f64, f64) {
		((p.0 - self.lon0) * self.kx, (p.1 - self.lat0) * self.ky)
	}
}
