use serde::Serialize;

use crate::grid::Window;

/// Phenotype of one culture in one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub barcode: String,
    /// Stem of the image file.
    pub image: String,
    pub row: usize,
    pub column: usize,
    pub x: f32,
    pub y: f32,
    pub window: Window,
    /// Colony pixels in the window.
    pub area: usize,
    /// Sum of colony pixel intensities.
    pub intensity: f32,
    /// Sum of colony intensities above the plate background.
    pub trimmed: f32,
    /// Colony pixels touching background or the window edge.
    pub perimeter: usize,
    /// `4π·area / perimeter²`, 0 without colony.
    pub circularity: f32,
    pub threshold: f32,
    pub background: f32,
    /// Mean colour of colony pixels, for colour images with colony.
    pub signal_rgb: Option<[f32; 3]>,
    /// Mean colour of background pixels, for colour images.
    pub background_rgb: Option<[f32; 3]>,
}

/// Column names of the tab-delimited tables.
pub const TABLE_COLUMNS: [&str; 23] = [
    "Barcode",
    "Image",
    "Row",
    "Column",
    "X",
    "Y",
    "WindowX0",
    "WindowY0",
    "WindowX1",
    "WindowY1",
    "Area",
    "Intensity",
    "Trimmed",
    "Perimeter",
    "Circularity",
    "Threshold",
    "Background",
    "RedMean",
    "GreenMean",
    "BlueMean",
    "RedMeanBack",
    "GreenMeanBack",
    "BlueMeanBack",
];

impl MeasurementRecord {
    /// Tab-separated row matching [`TABLE_COLUMNS`]; missing colours are `NA`.
    pub fn table_row(&self) -> String {
        let mut fields = vec![
            self.barcode.clone(),
            self.image.clone(),
            self.row.to_string(),
            self.column.to_string(),
            self.x.to_string(),
            self.y.to_string(),
            self.window.x0.to_string(),
            self.window.y0.to_string(),
            self.window.x1.to_string(),
            self.window.y1.to_string(),
            self.area.to_string(),
            self.intensity.to_string(),
            self.trimmed.to_string(),
            self.perimeter.to_string(),
            self.circularity.to_string(),
            self.threshold.to_string(),
            self.background.to_string(),
        ];
        for colour in [self.signal_rgb, self.background_rgb] {
            match colour {
                Some(rgb) => fields.extend(rgb.iter().map(f32::to_string)),
                None => fields.extend(std::iter::repeat_n("NA".to_string(), 3)),
            }
        }
        fields.join("\t")
    }
}

pub fn table_header() -> String {
    TABLE_COLUMNS.join("\t")
}
