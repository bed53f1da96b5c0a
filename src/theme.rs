//! Two-color theme derivation from album artwork.
//!
//! The extractor reduces the artwork to a small palette, ranks palette
//! entries by how many pixels they cover, and picks:
//!
//! * **primary** - the highest-coverage color, and
//! * **secondary** - the remaining candidate with the highest WCAG contrast
//!   ratio against the primary.
//!
//! The intent is legibility (text-on-background use), not merely the two
//! most frequent colors: a near-duplicate of the primary loses to a rarer
//! but contrasting one. Quantization is a k-means pass with centroids
//! seeded from evenly spaced positions over the distinct sample colors in
//! sorted order, so the result is deterministic for a given image.

use serde::{
    ser::{SerializeTuple, Serializer},
    Serialize,
};
use thiserror::Error;

/// An sRGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Serialized as a `[r, g, b]` triple.
impl Serialize for Rgb {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.r)?;
        tuple.serialize_element(&self.g)?;
        tuple.serialize_element(&self.b)?;
        tuple.end()
    }
}

/// The two theme colors derived from one artwork image.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct Theme {
    pub primary: Rgb,
    pub secondary: Rgb,
}

/// Errors from theme derivation.
#[derive(Error, Debug)]
pub enum ThemeError {
    /// The artwork bytes are not a decodable image.
    #[error("artwork decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// The decoded image has no pixels to sample.
    #[error("artwork image is empty")]
    Empty,
}

/// Upper bound on pixels fed into clustering; larger images are strided.
const MAX_SAMPLES: usize = 6_000;

/// Iteration cap for the k-means refinement.
const MAX_ITERATIONS: usize = 10;

/// Derives a theme from raw artwork bytes.
///
/// `palette_size` is the number of candidate colors considered; the
/// reference value is 4. Deterministic for a given image and palette size.
pub fn extract(artwork: &[u8], palette_size: usize) -> Result<Theme, ThemeError> {
    let image = image::load_from_memory(artwork)?.to_rgb8();
    let samples = sample_pixels(&image);
    if samples.is_empty() {
        return Err(ThemeError::Empty);
    }

    let candidates = dominant_colors(&samples, palette_size.max(2));

    // At least one candidate exists since samples is non-empty.
    let primary = candidates[0];
    let secondary = pick_secondary(primary, &candidates[1..]).unwrap_or(primary);

    Ok(Theme { primary, secondary })
}

/// Collects at most [`MAX_SAMPLES`] pixels, evenly strided over the image.
fn sample_pixels(image: &image::RgbImage) -> Vec<Rgb> {
    let pixels = image.pixels().len();
    let stride = pixels.div_ceil(MAX_SAMPLES).max(1);

    image
        .pixels()
        .step_by(stride)
        .map(|pixel| Rgb {
            r: pixel.0[0],
            g: pixel.0[1],
            b: pixel.0[2],
        })
        .collect()
}

/// Quantizes `samples` to at most `k` palette entries and returns them
/// ordered by descending pixel coverage, ties broken by palette index.
#[expect(clippy::cast_precision_loss)]
fn dominant_colors(samples: &[Rgb], k: usize) -> Vec<Rgb> {
    // Deterministic seeding: evenly spaced positions over the distinct
    // sample colors in sorted order. An image with at most `k` distinct
    // colors gets one cluster per color.
    let mut distinct: Vec<Rgb> = samples.to_vec();
    distinct.sort_unstable_by_key(|color| (color.r, color.g, color.b));
    distinct.dedup();

    let k = k.min(distinct.len());
    let mut centroids: Vec<[f64; 3]> = (0..k)
        .map(|i| as_centroid(distinct[i * distinct.len() / k]))
        .collect();

    let mut assignments = vec![0usize; samples.len()];
    let mut counts = vec![0usize; k];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (sample, assignment) in samples.iter().zip(assignments.iter_mut()) {
            let nearest = nearest_centroid(&centroids, *sample);
            if nearest != *assignment {
                *assignment = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        counts.fill(0);
        for (sample, &assignment) in samples.iter().zip(assignments.iter()) {
            let point = as_centroid(*sample);
            for channel in 0..3 {
                sums[assignment][channel] += point[channel];
            }
            counts[assignment] += 1;
        }

        for (centroid, (sum, &count)) in centroids.iter_mut().zip(sums.iter().zip(counts.iter())) {
            // An empty cluster keeps its previous centroid.
            if count > 0 {
                for channel in 0..3 {
                    centroid[channel] = sum[channel] / count as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let mut ranked: Vec<(usize, usize)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(index, &count)| (index, count))
        .collect();
    ranked.sort_by_key(|&(index, count)| (std::cmp::Reverse(count), index));

    ranked
        .into_iter()
        .map(|(index, _)| from_centroid(centroids[index]))
        .collect()
}

fn nearest_centroid(centroids: &[[f64; 3]], sample: Rgb) -> usize {
    let point = as_centroid(sample);
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance: f64 = (0..3)
            .map(|channel| {
                let delta = centroid[channel] - point[channel];
                delta * delta
            })
            .sum();
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn as_centroid(color: Rgb) -> [f64; 3] {
    [f64::from(color.r), f64::from(color.g), f64::from(color.b)]
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_centroid(centroid: [f64; 3]) -> Rgb {
    Rgb {
        r: centroid[0].round().clamp(0.0, 255.0) as u8,
        g: centroid[1].round().clamp(0.0, 255.0) as u8,
        b: centroid[2].round().clamp(0.0, 255.0) as u8,
    }
}

/// Picks the candidate with the highest contrast ratio against `primary`.
///
/// A strict comparison keeps the earliest candidate on ties, matching the
/// frequency-sorted candidate order.
fn pick_secondary(primary: Rgb, candidates: &[Rgb]) -> Option<Rgb> {
    let primary_luminance = relative_luminance(primary);

    let mut best: Option<(Rgb, f64)> = None;
    for &candidate in candidates {
        let ratio = contrast_ratio(primary_luminance, relative_luminance(candidate));
        match best {
            Some((_, best_ratio)) if ratio <= best_ratio => {}
            _ => best = Some((candidate, ratio)),
        }
    }

    best.map(|(color, _)| color)
}

/// WCAG relative luminance of an sRGB color, in `[0, 1]`.
///
/// Each channel is normalized to `[0, 1]` and gamma-expanded: values at or
/// below 0.03928 scale linearly by 1/12.92, the rest follow the 2.4-power
/// curve. Channels combine with the 0.2126/0.7152/0.0722 weights.
#[must_use]
pub fn relative_luminance(color: Rgb) -> f64 {
    fn linearize(channel: u8) -> f64 {
        let c = f64::from(channel) / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    0.2126 * linearize(color.r) + 0.7152 * linearize(color.g) + 0.0722 * linearize(color.b)
}

/// WCAG contrast ratio between two luminances, in `[1, 21]`.
#[must_use]
pub fn contrast_ratio(a: f64, b: f64) -> f64 {
    let (lighter, darker) = if a >= b { (a, b) } else { (b, a) };
    (lighter + 0.05) / (darker + 0.05)
}
