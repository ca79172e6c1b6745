//! Repeated box blur.

use image::{ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

use common::buffer2::Buffer2;

/// Blur with a `(2 * radius + 1)²` box, `passes` times.
///
/// Three passes approximate a Gaussian. The image is extended by its edge
/// values, so a flat image stays flat.
pub fn box_blur(image: &Buffer2<f32>, radius: usize, passes: usize) -> Buffer2<f32> {
    if radius == 0 || image.is_empty() || passes == 0 {
        return image.clone();
    }

    let side = 2 * radius + 1;
    let kernel = vec![1.0 / side as f32; side];
    let mut current: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(image.width() as u32, image.height() as u32, |x, y| {
            Luma([image[(x as usize, y as usize)]])
        });
    for _ in 0..passes {
        current = separable_filter_equal(&current, &kernel);
    }

    Buffer2::from_fn(image.width(), image.height(), |x, y| {
        current.get_pixel(x as u32, y as u32)[0]
    })
}
