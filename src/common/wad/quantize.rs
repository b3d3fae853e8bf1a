// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Color reduction for building palette-indexed textures from arbitrary images.

use std::collections::HashMap;

use crate::common::wad::{
    texture::{IndexedImage, PALETTE_SIZE},
    WadError,
};

use image::{Rgb, RgbImage, Rgba};

// lightness divisors for the HSB distance
const SATURATION_WEIGHT: f32 = 1.25;
const BRIGHTNESS_WEIGHT: f32 = 1.5;

lazy_static! {
    static ref BASIC_PALETTE: [Rgb<u8>; PALETTE_SIZE] = build_basic_palette();
}

/// How an image with more colors than a palette can hold is reduced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QuantizeAlgorithm {
    /// Keep the most used colors, mapping the rest to the nearest kept color in RGB space.
    MostUsedRgb,

    /// Keep the most used colors, mapping the rest to the nearest kept color in HSB space.
    MostUsedHsb,

    /// Map every pixel to the nearest color of the basic palette in RGB space.
    BasicPaletteRgb,

    /// Map every pixel to the nearest color of the basic palette in HSB space.
    BasicPaletteHsb,
}

impl Default for QuantizeAlgorithm {
    fn default() -> Self {
        QuantizeAlgorithm::BasicPaletteHsb
    }
}

impl QuantizeAlgorithm {
    fn metric(&self) -> ColorMetric {
        match *self {
            QuantizeAlgorithm::MostUsedRgb | QuantizeAlgorithm::BasicPaletteRgb => ColorMetric::Rgb,
            QuantizeAlgorithm::MostUsedHsb | QuantizeAlgorithm::BasicPaletteHsb => ColorMetric::Hsb,
        }
    }

    fn uses_basic_palette(&self) -> bool {
        match *self {
            QuantizeAlgorithm::BasicPaletteRgb | QuantizeAlgorithm::BasicPaletteHsb => true,
            QuantizeAlgorithm::MostUsedRgb | QuantizeAlgorithm::MostUsedHsb => false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorMetric {
    Rgb,
    Hsb,
}

impl ColorMetric {
    pub fn distance(&self, a: Rgb<u8>, b: Rgb<u8>) -> f32 {
        match *self {
            ColorMetric::Rgb => rgb_distance(a, b),
            ColorMetric::Hsb => hsb_distance(a, b),
        }
    }
}

/// Returns the basic palette: a gray ramp, 15 color ramps and pure blue in the last slot.
pub fn basic_palette() -> &'static [Rgb<u8>; PALETTE_SIZE] {
    &BASIC_PALETTE
}

fn build_basic_palette() -> [Rgb<u8>; PALETTE_SIZE] {
    // 0 = off, 1 = half, 2 = full
    const RAMPS: [[u8; 3]; 15] = [
        [2, 0, 0],
        [0, 2, 0],
        [0, 0, 2],
        [2, 2, 0],
        [2, 0, 2],
        [0, 2, 2],
        [2, 1, 0],
        [2, 0, 1],
        [1, 2, 0],
        [2, 2, 1],
        [2, 1, 2],
        [1, 2, 2],
        [1, 1, 2],
        [1, 2, 1],
        [2, 1, 1],
    ];

    let mut palette = [Rgb([0, 0, 0]); PALETTE_SIZE];
    palette[PALETTE_SIZE - 1] = Rgb([0, 0, 255]);

    for i in 0..15 {
        let gray = (i * 255 / 14) as u8;
        palette[254 - i] = Rgb([gray, gray, gray]);
    }

    for (k, ramp) in RAMPS.iter().enumerate() {
        for i in 0..16 {
            let full = (i * 17) as u8;
            let levels = [0, full / 2, full];
            let slot = 255 - (k + 1) * 16 - i;
            palette[slot] = Rgb([
                levels[ramp[0] as usize],
                levels[ramp[1] as usize],
                levels[ramp[2] as usize],
            ]);
        }
    }

    palette
}

pub fn rgb_distance(a: Rgb<u8>, b: Rgb<u8>) -> f32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&x, &y)| (x as i32 - y as i32).abs())
        .sum::<i32>() as f32
}

pub fn hsb_distance(a: Rgb<u8>, b: Rgb<u8>) -> f32 {
    (hue(a) - hue(b)).abs()
        + (saturation(a) - saturation(b)).abs() / SATURATION_WEIGHT
        + (brightness(a) - brightness(b)).abs() / BRIGHTNESS_WEIGHT
}

fn channels(c: Rgb<u8>) -> (f32, f32, f32) {
    (
        c.0[0] as f32 / 255.0,
        c.0[1] as f32 / 255.0,
        c.0[2] as f32 / 255.0,
    )
}

/// Returns the hue of a color in degrees, from 0 up to but excluding 360. Grays have hue 0.
pub fn hue(c: Rgb<u8>) -> f32 {
    let [r, g, b] = c.0;
    if r == g && g == b {
        return 0.0;
    }

    let (r, g, b) = channels(c);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let sector = if r == max {
        (g - b) / delta
    } else if g == max {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };

    let hue = sector * 60.0;
    if hue < 0.0 {
        hue + 360.0
    } else {
        hue
    }
}

/// Returns the saturation of a color in the HSL model, from 0 to 1.
pub fn saturation(c: Rgb<u8>) -> f32 {
    let (r, g, b) = channels(c);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);

    if max == min {
        return 0.0;
    }

    if (max + min) / 2.0 <= 0.5 {
        (max - min) / (max + min)
    } else {
        (max - min) / (2.0 - max - min)
    }
}

/// Returns the lightness of a color in the HSL model, from 0 to 1.
pub fn brightness(c: Rgb<u8>) -> f32 {
    let (r, g, b) = channels(c);
    (r.max(g).max(b) + r.min(g).min(b)) / 2.0
}

/// Returns the index of the palette entry nearest to `color`. Ties go to the lowest index.
pub fn nearest(palette: &[Rgb<u8>], color: Rgb<u8>, metric: ColorMetric) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &entry) in palette.iter().enumerate() {
        let dist = metric.distance(entry, color);
        match best {
            Some((_, d)) if d <= dist => (),
            _ => best = Some((i, dist)),
        }
    }

    best.map(|(i, _)| i)
}

/// Reduces `src` to a palette-indexed image of at most 256 colors.
pub fn quantize(src: &RgbImage, algorithm: QuantizeAlgorithm) -> Result<IndexedImage, WadError> {
    reduce(src, algorithm, PALETTE_SIZE)
}

/// Reduces `src` to a palette-indexed image of at most `target` colors.
///
/// Images with no more than `target` distinct colors are converted exactly, with the palette in
/// order of first appearance (row by row). The basic palette algorithms require a target of
/// exactly 256 colors.
pub fn reduce(
    src: &RgbImage,
    algorithm: QuantizeAlgorithm,
    target: usize,
) -> Result<IndexedImage, WadError> {
    if target == 0 || target > PALETTE_SIZE {
        return Err(WadError::Quantize(format!(
            "target of {} colors is outside 1..={}",
            target, PALETTE_SIZE
        )));
    }

    if algorithm.uses_basic_palette() && target != PALETTE_SIZE {
        return Err(WadError::Quantize(format!(
            "{:?} needs a target of {} colors, not {}",
            algorithm, PALETTE_SIZE, target
        )));
    }

    // distinct colors in order of first appearance, with pixel counts
    let mut usage: Vec<(Rgb<u8>, usize)> = Vec::new();
    let mut seen: HashMap<[u8; 3], usize> = HashMap::new();
    for pixel in src.pixels() {
        match seen.get(&pixel.0) {
            Some(&i) => usage[i].1 += 1,
            None => {
                seen.insert(pixel.0, usage.len());
                usage.push((*pixel, 1));
            }
        }
    }

    let palette: Vec<Rgb<u8>> = if usage.len() <= target {
        usage.iter().map(|&(c, _)| c).collect()
    } else if algorithm.uses_basic_palette() {
        basic_palette().to_vec()
    } else {
        // stable, so equally used colors keep their order of appearance
        usage.sort_by(|a, b| b.1.cmp(&a.1));
        usage.iter().take(target).map(|&(c, _)| c).collect()
    };

    debug!(
        "Reducing {}x{} image: {} distinct colors, palette of {}",
        src.width(),
        src.height(),
        seen.len(),
        palette.len()
    );

    let exact = seen.len() <= target;
    let metric = algorithm.metric();
    let mut mapping: HashMap<[u8; 3], u8> = HashMap::with_capacity(seen.len());
    let mut indices = Vec::with_capacity(src.width() as usize * src.height() as usize);
    for pixel in src.pixels() {
        let index = match mapping.get(&pixel.0) {
            Some(&i) => i,
            None => {
                let i = if exact {
                    seen[&pixel.0]
                } else {
                    nearest(&palette, *pixel, metric)
                        .ok_or_else(|| WadError::Quantize("empty palette".to_owned()))?
                };
                mapping.insert(pixel.0, i as u8);
                i as u8
            }
        };
        indices.push(index);
    }

    let palette = palette
        .into_iter()
        .map(|Rgb([r, g, b])| Rgba([r, g, b, 0xFF]))
        .collect();

    IndexedImage::new(src.width(), src.height(), indices, palette)
}
