//! Colorized tile layer URLs for the tile-rendering boundary.

use crate::colormap::{BandStatistics, ColorMap};
use url::form_urlencoded;

/// Placeholder path the map library fills in per tile.
pub const TILE_TEMPLATE: &str = "{z}/{x}/{y}";

/// Builds the tile URL template for a colorized single-band preview.
///
/// The `{z}/{x}/{y}` segment is left literal; every query value is
/// percent-encoded.
pub fn colorized_tile_url(
    tiles_endpoint: &str,
    raster_url: &str,
    stats: &BandStatistics,
    colormap: &ColorMap,
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("url", raster_url)
        .append_pair("tile_scale", "2")
        .append_pair("format", "webp")
        .append_pair("bidx", "1")
        .append_pair(
            "rescale",
            &format!("{},{}", stats.percentile_2, stats.percentile_98),
        )
        .append_pair("colormap", &colormap.to_query_json())
        .append_pair("colormap_type", "linear")
        .finish();

    format!(
        "{}/{}?{}",
        tiles_endpoint.trim_end_matches('/'),
        TILE_TEMPLATE,
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colormap::{DEFAULT_RAMP, build_colormap};

    #[test]
    fn template_keeps_placeholders_and_encodes_query() {
        let stats = BandStatistics {
            min: 0.0,
            max: 100.0,
            percentile_2: 1.5,
            percentile_20: 15.0,
            percentile_40: 35.0,
            percentile_60: 55.0,
            percentile_80: 75.0,
            percentile_98: 99.0,
        };
        let colormap = build_colormap(&stats, &DEFAULT_RAMP);
        let url = colorized_tile_url(
            "https://tiles.example/cog/tiles/WebMercatorQuad",
            "https://storage.example/bucket/awc.tif",
            &stats,
            &colormap,
        );

        assert!(url.starts_with("https://tiles.example/cog/tiles/WebMercatorQuad/{z}/{x}/{y}?url="));
        assert!(url.contains("url=https%3A%2F%2Fstorage.example%2Fbucket%2Fawc.tif"));
        assert!(url.contains("&tile_scale=2&format=webp&bidx=1"));
        assert!(url.contains("&rescale=1.5%2C99"));
        assert!(url.contains("&colormap=%7B%220%22%3A%5B75%2C171%2C57%2C50%5D"));
        assert!(url.ends_with("&colormap_type=linear"));
    }
}
