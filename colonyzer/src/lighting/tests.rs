use glam::Vec2;

use common::bit_buffer2::BitBuffer2;

use super::*;
use crate::config::GridFormat;
use crate::testing::{PlateConfig, synthetic_plate};

fn grid_for(config: &PlateConfig) -> Grid {
    Grid::regular(
        config.format,
        config.first,
        config.spacing,
        (config.width, config.height),
    )
    .unwrap()
}

fn empty_gradient_plate() -> PlateConfig {
    PlateConfig {
        colony_radius: 0.0,
        colony: 0.2,
        gradient: 0.3,
        ..Default::default()
    }
}

fn large_colony_plate() -> PlateConfig {
    PlateConfig {
        format: GridFormat::new(3, 4),
        width: 200,
        height: 160,
        first: Vec2::new(40.0, 40.0),
        spacing: Vec2::new(40.0, 40.0),
        colony_radius: 13.0,
        ..Default::default()
    }
}

#[test]
fn test_off_builds_no_model() {
    let config = PlateConfig::default();
    let plate = synthetic_plate(&config);
    assert!(build_correction(&plate, &grid_for(&config), LightingMode::Off, 0).is_none());
}

#[test]
fn test_map_positive_and_round_trip() {
    let config = empty_gradient_plate();
    let plate = synthetic_plate(&config);
    let model = build_correction(&plate, &grid_for(&config), LightingMode::AsIs, 0).unwrap();

    assert!(model.map().iter().all(|&m| m > 0.0 && m.is_finite()));

    let image = synthetic_plate(&PlateConfig {
        gradient: 0.3,
        ..Default::default()
    });
    let restored = model.invert(&model.apply(&image));
    for (a, b) in image.iter().zip(restored.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_map_positive_on_black_plate() {
    let config = PlateConfig {
        background: 0.0,
        colony: 0.0,
        ..Default::default()
    };
    let plate = synthetic_plate(&config);
    let model = build_correction(&plate, &grid_for(&config), LightingMode::AsIs, 0).unwrap();
    assert!(model.map().iter().all(|&m| m > 0.0));
    assert!(model.average_background() > 0.0);
}

#[test]
fn test_as_is_correction_flattens_gradient() {
    let config = empty_gradient_plate();
    let plate = synthetic_plate(&config);
    let grid = grid_for(&config);
    let model = build_correction(&plate, &grid, LightingMode::AsIs, 0).unwrap();
    let corrected = model.apply(&plate);

    // Far enough from the border for the blur to be exact on a linear ramp.
    let average = model.average_background();
    for y in 0..config.height {
        for x in 40..120 {
            assert!(
                (corrected[(x, y)] - average).abs() < 1e-3,
                "({x}, {y}): {} vs {average}",
                corrected[(x, y)]
            );
        }
    }
    assert!((plate[(120, 60)] - plate[(40, 60)]).abs() > 0.1);
}

#[test]
fn test_average_background_is_envelope_mean() {
    let config = PlateConfig {
        colony_radius: 0.0,
        background: 0.3,
        colony: 0.3,
        ..Default::default()
    };
    let mut plate = synthetic_plate(&config);
    // Bright plate wall outside the envelope does not count.
    for y in 0..config.height {
        plate[(0, y)] = 1.0;
    }
    let average = average_background(&plate, &grid_for(&config));
    assert!((average - 0.3).abs() < 1e-6);
}

#[test]
fn test_footprint_covers_colonies_not_agar() {
    let config = large_colony_plate();
    let plate = synthetic_plate(&config);
    let footprint = colony_footprint(&plate, &grid_for(&config));

    for center in config.centers() {
        assert!(footprint.get_xy(center.x as usize, center.y as usize));
        let between = center + Vec2::new(20.0, 20.0);
        if (between.x as usize) < config.width && (between.y as usize) < config.height {
            assert!(!footprint.get_xy(between.x as usize, between.y as usize));
        }
    }
    // Outside the envelope nothing is marked.
    assert!(!footprint.get_xy(5, 5));
}

#[test]
fn test_inpainting_replaces_colonies_deterministically() {
    let config = large_colony_plate();
    let plate = synthetic_plate(&config);
    let grid = grid_for(&config);
    let footprint = colony_footprint(&plate, &grid);

    let painted = inpaint(&plate, &footprint, &grid, 42);
    assert_eq!(painted, inpaint(&plate, &footprint, &grid, 42));

    let mut inside = Vec::new();
    for (idx, (&before, &after)) in plate.iter().zip(painted.iter()).enumerate() {
        if footprint.get(idx) {
            inside.push(after);
        } else {
            assert_eq!(before, after);
        }
    }
    let mean_inside = crate::math::mean(inside).unwrap();
    assert!(mean_inside < 0.45, "inpainted mean {mean_inside}");
}

#[test]
fn test_remove_signal_model_is_positive() {
    let config = PlateConfig {
        gradient: 0.2,
        ..large_colony_plate()
    };
    let plate = synthetic_plate(&config);
    let model =
        build_correction(&plate, &grid_for(&config), LightingMode::RemoveSignal, 3).unwrap();
    assert!(model.map().iter().all(|&m| m > 0.0));
    assert!(model.average_background() < 0.5);
}

#[test]
fn test_dilate_and_erode_square() {
    let mut mask = BitBuffer2::new_default(11, 11);
    mask.set_xy(5, 5, true);

    let dilated = dilate(&mask, 2);
    assert_eq!(dilated.count_ones(), 25);
    assert!(dilated.get_xy(3, 3) && dilated.get_xy(7, 7));
    assert!(!dilated.get_xy(2, 5));

    let eroded = erode(&dilated, 2);
    assert_eq!(eroded.count_ones(), 1);
    assert!(eroded.get_xy(5, 5));
}

#[test]
fn test_erosion_treats_outside_as_background() {
    let full = BitBuffer2::new_filled(6, 6, true);
    let eroded = erode(&full, 1);
    assert_eq!(eroded.count_ones(), 16);
    assert!(!eroded.get_xy(0, 3));
    assert!(eroded.get_xy(1, 1));
}

#[test]
fn test_dilation_clips_at_corner() {
    let mut mask = BitBuffer2::new_default(6, 6);
    mask.set_xy(0, 0, true);
    let dilated = dilate(&mask, 1);
    assert_eq!(dilated.count_ones(), 4);
    assert!(dilated.get_xy(1, 1));
    assert!(!dilated.get_xy(5, 5));
}

#[test]
fn test_fill_holes_only_fills_enclosed_regions() {
    // Closed ring around (3, 3) and an open bracket on the right edge.
    let mut mask = BitBuffer2::new_default(12, 8);
    for i in 1..=5 {
        mask.set_xy(i, 1, true);
        mask.set_xy(i, 5, true);
        mask.set_xy(1, i, true);
        mask.set_xy(5, i, true);
    }
    for x in 8..12 {
        mask.set_xy(x, 2, true);
        mask.set_xy(x, 5, true);
    }
    mask.set_xy(8, 3, true);
    mask.set_xy(8, 4, true);

    let filled = fill_holes(&mask);
    assert!(filled.get_xy(3, 3));
    assert!(filled.get_xy(2, 4));
    assert!(!filled.get_xy(10, 3));
    assert!(!filled.get_xy(0, 0));
    assert_eq!(filled.count_ones(), mask.count_ones() + 9);
}

#[test]
fn test_box_blur_keeps_flat_image_flat() {
    let flat = common::buffer2::Buffer2::new_filled(30, 20, 0.4f32);
    let blurred = box_blur(&flat, 5, 3);
    assert!(blurred.iter().all(|&v| (v - 0.4).abs() < 1e-6));
    assert_eq!(box_blur(&flat, 0, 3), flat);
}

#[test]
fn test_box_blur_extends_edges() {
    // Left half 0, right half 1: blurring keeps the outer columns at their level.
    let step = common::buffer2::Buffer2::from_fn(20, 5, |x, _| if x < 10 { 0.0f32 } else { 1.0 });
    let blurred = box_blur(&step, 2, 3);
    assert!(blurred[(0, 2)].abs() < 1e-6);
    assert!((blurred[(19, 2)] - 1.0).abs() < 1e-6);
    assert!(blurred[(9, 2)] > 0.0 && blurred[(9, 2)] < 0.5);
}

#[test]
fn test_box_blur_spreads_a_spike() {
    let mut image = common::buffer2::Buffer2::new_filled(21, 21, 0.0f32);
    image[(10, 10)] = 1.0;
    let blurred = box_blur(&image, 1, 1);
    assert!((blurred[(10, 10)] - 1.0 / 9.0).abs() < 1e-6);
    assert!((blurred[(11, 9)] - 1.0 / 9.0).abs() < 1e-6);
    assert_eq!(blurred[(12, 10)], 0.0);
}
