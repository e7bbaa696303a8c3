//! Encoded polyline decoding (precision 5).

use crate::models::location::GeoPoint;
use crate::{AppError, Result};

const PRECISION: f64 = 1e5;

/// Decode an encoded polyline into its points.
///
/// # Errors
///
/// Returns `AppError::Malformed` on characters outside the encoding
/// alphabet, a truncated final chunk, or a latitude without its longitude.
pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();

    while index < bytes.len() {
        lat += next_value(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(AppError::Malformed(
                "polyline ends after a latitude".into(),
            ));
        }
        lng += next_value(bytes, &mut index)?;

        #[allow(clippy::cast_precision_loss)]
        points.push(GeoPoint::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(points)
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(AppError::Malformed("polyline chunk is truncated".into()));
        };
        *index += 1;

        if !(63..=126).contains(&byte) {
            return Err(AppError::Malformed(format!(
                "invalid polyline character at offset {}",
                *index - 1
            )));
        }
        if shift > 30 {
            return Err(AppError::Malformed("polyline value overflows".into()));
        }

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
