//! Binary morphology on bit masks.
//!
//! Dilation and erosion use a square structuring element of side
//! `2 * radius + 1` (chessboard distance). Pixels outside the image count as
//! background, so erosion eats in from the border.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{Connectivity, connected_components};

use common::bit_buffer2::BitBuffer2;

const FOREGROUND: u8 = 255;

/// Morphological dilation.
pub fn dilate(mask: &BitBuffer2, radius: usize) -> BitBuffer2 {
    if radius == 0 || mask.is_empty() {
        return mask.clone();
    }
    from_padded(
        &imageproc::morphology::dilate(&to_padded(mask), Norm::LInf, distance(radius)),
        mask,
    )
}

/// Morphological erosion.
pub fn erode(mask: &BitBuffer2, radius: usize) -> BitBuffer2 {
    if radius == 0 || mask.is_empty() {
        return mask.clone();
    }
    from_padded(
        &imageproc::morphology::erode(&to_padded(mask), Norm::LInf, distance(radius)),
        mask,
    )
}

#[inline]
fn distance(radius: usize) -> u8 {
    u8::try_from(radius).unwrap_or(u8::MAX)
}

/// Mask as a grey image with a one pixel background frame.
fn to_padded(mask: &BitBuffer2) -> GrayImage {
    let (width, height) = (mask.width() as u32, mask.height() as u32);
    GrayImage::from_fn(width + 2, height + 2, |x, y| {
        let inside = (1..=width).contains(&x) && (1..=height).contains(&y);
        let set = inside && mask.get_xy(x as usize - 1, y as usize - 1);
        Luma([if set { FOREGROUND } else { 0 }])
    })
}

fn from_padded(image: &GrayImage, shape: &BitBuffer2) -> BitBuffer2 {
    BitBuffer2::from_fn(shape.width(), shape.height(), |x, y| {
        image.get_pixel(x as u32 + 1, y as u32 + 1)[0] != 0
    })
}

/// Set every background pixel not 4-connected to the image border.
pub fn fill_holes(mask: &BitBuffer2) -> BitBuffer2 {
    let width = mask.width();
    let height = mask.height();
    if mask.is_empty() {
        return mask.clone();
    }

    let background = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([if mask.get_xy(x as usize, y as usize) { 0 } else { FOREGROUND }])
    });
    let labels = connected_components(&background, Connectivity::Four, Luma([0u8]));

    let mut open = std::collections::HashSet::new();
    for x in 0..width as u32 {
        open.insert(labels.get_pixel(x, 0)[0]);
        open.insert(labels.get_pixel(x, height as u32 - 1)[0]);
    }
    for y in 0..height as u32 {
        open.insert(labels.get_pixel(0, y)[0]);
        open.insert(labels.get_pixel(width as u32 - 1, y)[0]);
    }

    BitBuffer2::from_fn(width, height, |x, y| {
        mask.get_xy(x, y) || !open.contains(&labels.get_pixel(x as u32, y as u32)[0])
    })
}
