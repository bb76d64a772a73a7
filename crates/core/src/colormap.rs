//! Percentile-anchored color maps for raster previews.
//!
//! Raster statistics are fetched for six fixed percentiles. Each percentile is
//! placed on the tile server's `0..=255` rescale axis and tagged with the ramp
//! color at the same position, producing a sparse map that the server
//! interpolates linearly.

use crate::error::ClipError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentiles requested from the statistics endpoint, ascending.
pub const PERCENTILES: [u8; 6] = [2, 20, 40, 60, 80, 98];

/// An RGBA color as `[r, g, b, a]`.
pub type Rgba = [u8; 4];

/// Ordered ramp with one color per entry of [`PERCENTILES`].
pub type ColorRamp = [Rgba; PERCENTILES.len()];

/// Green to deep purple, with the lowest stop mostly transparent.
pub const DEFAULT_RAMP: ColorRamp = [
    [75, 171, 57, 50],  // #4BAB39
    [0, 143, 95, 200],  // #008F5F
    [0, 100, 110, 200], // #00646E
    [28, 58, 109, 200], // #1C3A6D
    [32, 40, 93, 200],  // #20285D
    [39, 0, 59, 200],   // #27003B
];

/// Statistics for a single raster band, as returned by the tile server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub percentile_2: f64,
    pub percentile_20: f64,
    pub percentile_40: f64,
    pub percentile_60: f64,
    pub percentile_80: f64,
    pub percentile_98: f64,
}

impl BandStatistics {
    /// Values at each of [`PERCENTILES`], in the same order.
    pub fn percentile_values(&self) -> [f64; PERCENTILES.len()] {
        [
            self.percentile_2,
            self.percentile_20,
            self.percentile_40,
            self.percentile_60,
            self.percentile_80,
            self.percentile_98,
        ]
    }

    /// Reports a constant raster. The color map copes with it; callers only
    /// log the condition.
    pub fn check(&self) -> Result<(), ClipError> {
        if self.min == self.max {
            return Err(ClipError::DegenerateStatistics { value: self.min });
        }
        Ok(())
    }
}

/// Per-band statistics keyed by band name (`b1`, `b2`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RasterStatistics {
    pub bands: BTreeMap<String, BandStatistics>,
}

impl RasterStatistics {
    /// Statistics for the 1-based band index.
    pub fn band(&self, index: usize) -> Option<&BandStatistics> {
        self.bands.get(&format!("b{}", index))
    }
}

/// Sparse `index -> color` map on the `0..=255` rescale axis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorMap {
    entries: BTreeMap<u8, Rgba>,
}

impl ColorMap {
    pub fn get(&self, index: u8) -> Option<Rgba> {
        self.entries.get(&index).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = u8> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, Rgba)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON object form expected by the tile server: `{"0":[r,g,b,a],...}`.
    pub fn to_query_json(&self) -> String {
        // BTreeMap<u8, [u8; 4]> always serializes
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "{}".to_string())
    }

    /// Linear interpolation between the surrounding stops, the way the tile
    /// server renders a `linear` colormap. Used to draw the colorbar.
    pub fn interpolate(&self, index: u8) -> Option<Rgba> {
        let below = self.entries.range(..=index).next_back();
        let above = self.entries.range(index..).next();
        match (below, above) {
            (Some((&lo, &c0)), Some((&hi, &c1))) => {
                if hi == lo {
                    return Some(c0);
                }
                let t = f32::from(index - lo) / f32::from(hi - lo);
                let mut out = [0u8; 4];
                for (channel, slot) in out.iter_mut().enumerate() {
                    let a = f32::from(c0[channel]);
                    let b = f32::from(c1[channel]);
                    *slot = (a + (b - a) * t).round() as u8;
                }
                Some(out)
            }
            (Some((_, &c)), None) | (None, Some((_, &c))) => Some(c),
            (None, None) => None,
        }
    }
}

/// Places each percentile on the `0..=255` axis and assigns it the ramp color
/// at the same position.
///
/// The first percentile always lands on 0 and the last on 255. In between,
/// values at or below `min` clamp to 0 and values at or above `max` clamp to
/// 255. Colliding indices keep the later color.
pub fn build_colormap(stats: &BandStatistics, ramp: &ColorRamp) -> ColorMap {
    let values = stats.percentile_values();
    let last = values.len() - 1;

    let mut entries = BTreeMap::new();
    for (position, value) in values.into_iter().enumerate() {
        let index = if position == 0 {
            0
        } else if position == last {
            255
        } else {
            scale_to_index(value, stats.min, stats.max)
        };
        entries.insert(index, ramp[position]);
    }

    ColorMap { entries }
}

fn scale_to_index(value: f64, min: f64, max: f64) -> u8 {
    if value <= min {
        return 0;
    }
    if value >= max {
        return 255;
    }
    let span = max - min;
    // only reachable with NaN input or a zero/negative span
    if !value.is_finite() || !(span > 0.0) {
        return 0;
    }
    (((value - min) / span) * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(min: f64, max: f64, p: [f64; 6]) -> BandStatistics {
        BandStatistics {
            min,
            max,
            percentile_2: p[0],
            percentile_20: p[1],
            percentile_40: p[2],
            percentile_60: p[3],
            percentile_80: p[4],
            percentile_98: p[5],
        }
    }

    #[test]
    fn evenly_spread_percentiles_map_to_rounded_indices() {
        let s = stats(0.0, 100.0, [0.0, 15.0, 35.0, 55.0, 75.0, 100.0]);
        let map = build_colormap(&s, &DEFAULT_RAMP);

        assert_eq!(map.keys().collect::<Vec<_>>(), vec![0, 38, 89, 140, 191, 255]);
        for (i, key) in map.keys().enumerate() {
            assert_eq!(map.get(key), Some(DEFAULT_RAMP[i]));
        }
    }

    #[test]
    fn constant_raster_populates_only_boundaries() {
        let s = stats(4.0, 4.0, [4.0; 6]);
        assert!(matches!(
            s.check(),
            Err(ClipError::DegenerateStatistics { value }) if value == 4.0
        ));

        let map = build_colormap(&s, &DEFAULT_RAMP);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![0, 255]);
        assert_eq!(map.get(0), Some(DEFAULT_RAMP[4]));
        assert_eq!(map.get(255), Some(DEFAULT_RAMP[5]));
    }

    #[test]
    fn skewed_distribution_collapses_onto_zero() {
        // most of the raster sits at the minimum
        let s = stats(0.0, 10.0, [0.0, 0.0, 0.0, 2.0, 5.0, 9.0]);
        let map = build_colormap(&s, &DEFAULT_RAMP);

        assert_eq!(map.keys().collect::<Vec<_>>(), vec![0, 51, 128, 255]);
        assert_eq!(map.get(0), Some(DEFAULT_RAMP[2]));
    }

    #[test]
    fn indices_stay_in_range_for_monotonic_input() {
        let cases = [
            stats(-50.0, 50.0, [-49.0, -20.0, -1.0, 0.5, 30.0, 49.9]),
            stats(1e-6, 2e-6, [1.1e-6, 1.2e-6, 1.3e-6, 1.4e-6, 1.5e-6, 1.9e-6]),
            stats(0.0, 1.0, [-5.0, -1.0, 0.5, 2.0, 3.0, 4.0]),
        ];
        for s in &cases {
            let map = build_colormap(s, &DEFAULT_RAMP);
            assert!(map.get(0).is_some());
            assert!(map.get(255).is_some());
            assert!(map.len() <= PERCENTILES.len());
        }
    }

    #[test]
    fn nan_percentile_does_not_panic() {
        let s = stats(0.0, 1.0, [0.0, f64::NAN, 0.5, 0.6, 0.7, 1.0]);
        let map = build_colormap(&s, &DEFAULT_RAMP);
        assert!(map.get(0).is_some());
        assert!(map.get(255).is_some());
    }

    #[test]
    fn query_json_uses_string_keys() {
        let s = stats(0.0, 100.0, [0.0, 15.0, 35.0, 55.0, 75.0, 100.0]);
        let json = build_colormap(&s, &DEFAULT_RAMP).to_query_json();
        assert!(json.starts_with(r#"{"0":[75,171,57,50],"38":[0,143,95,200]"#));
        assert!(json.ends_with(r#""255":[39,0,59,200]}"#));
    }

    #[test]
    fn interpolate_blends_between_stops() {
        let s = stats(4.0, 4.0, [4.0; 6]);
        let map = build_colormap(&s, &DEFAULT_RAMP);
        assert_eq!(map.interpolate(0), Some(DEFAULT_RAMP[4]));
        assert_eq!(map.interpolate(255), Some(DEFAULT_RAMP[5]));
        let mid = map.interpolate(128).unwrap();
        assert!(mid[0] >= 32 && mid[0] <= 39);
    }

    #[test]
    fn statistics_deserialize_from_tile_server_shape() {
        let body = r#"{"b1":{"min":0.0,"max":3.5,"mean":1.2,"count":10,
            "percentile_2":0.1,"percentile_20":0.5,"percentile_40":1.0,
            "percentile_60":1.5,"percentile_80":2.5,"percentile_98":3.4}}"#;
        let parsed: RasterStatistics = serde_json::from_str(body).unwrap();
        let band = parsed.band(1).unwrap();
        assert_eq!(band.max, 3.5);
        assert_eq!(band.percentile_values()[5], 3.4);
        assert!(parsed.band(2).is_none());
    }
}
