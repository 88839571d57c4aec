//! Response compression layer.

use tower_http::compression::CompressionLayer;

/// Gzip compression for JSON responses. Converted models are already
/// binary-packed and are sent as-is.
pub fn build_compression_layer() -> CompressionLayer {
    CompressionLayer::new().gzip(true)
}
