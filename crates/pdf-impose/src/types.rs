use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImposeError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    #[error("No pages to impose")]
    NoPages,
    #[error("Page {page} has no usable page box")]
    MissingPageBox { page: usize },
}

pub type Result<T> = std::result::Result<T, ImposeError>;

/// Paper orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Orientation {
    /// Portrait: height > width
    Portrait,
    /// Landscape: width > height (default: two portrait pages side by side)
    #[default]
    Landscape,
}

/// Standard paper sizes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaperSize {
    A3,
    A4,
    A5,
    /// JIS B4 (257 × 364 mm)
    B4,
    /// JIS B5 (182 × 257 mm), the size Japanese offices call "B5"
    B5,
    /// ISO B5 (176 × 250 mm)
    B5Iso,
    Letter,
    Legal,
    Tabloid,
    Custom { width_mm: f32, height_mm: f32 },
}

impl PaperSize {
    /// Get base dimensions (always portrait: width < height for standard sizes)
    pub fn dimensions_mm(self) -> (f32, f32) {
        match self {
            PaperSize::A3 => (297.0, 420.0),
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::A5 => (148.0, 210.0),
            PaperSize::B4 => (257.0, 364.0),
            PaperSize::B5 => (182.0, 257.0),
            PaperSize::B5Iso => (176.0, 250.0),
            PaperSize::Letter => (215.9, 279.4),
            PaperSize::Legal => (215.9, 355.6),
            PaperSize::Tabloid => (279.4, 431.8),
            PaperSize::Custom {
                width_mm,
                height_mm,
            } => (width_mm, height_mm),
        }
    }

    /// Get dimensions with orientation applied
    pub fn dimensions_with_orientation(self, orientation: Orientation) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        let (short, long) = if w <= h { (w, h) } else { (h, w) };
        match orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }

    /// Short label used in output file names
    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperSize::A3 => f.write_str("A3"),
            PaperSize::A4 => f.write_str("A4"),
            PaperSize::A5 => f.write_str("A5"),
            PaperSize::B4 => f.write_str("B4"),
            PaperSize::B5 => f.write_str("B5"),
            PaperSize::B5Iso => f.write_str("B5-ISO"),
            PaperSize::Letter => f.write_str("Letter"),
            PaperSize::Legal => f.write_str("Legal"),
            PaperSize::Tabloid => f.write_str("Tabloid"),
            PaperSize::Custom {
                width_mm,
                height_mm,
            } => write!(f, "{}x{}", width_mm, height_mm),
        }
    }
}

impl FromStr for PaperSize {
    type Err = ImposeError;

    /// Parse a sheet size name (case-insensitive) or `<width>x<height>` in millimeters
    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let size = match normalized.as_str() {
            "a3" => PaperSize::A3,
            "a4" => PaperSize::A4,
            "a5" => PaperSize::A5,
            "b4" | "b4-jis" => PaperSize::B4,
            "b5" | "b5-jis" => PaperSize::B5,
            "b5-iso" => PaperSize::B5Iso,
            "letter" => PaperSize::Letter,
            "legal" => PaperSize::Legal,
            "tabloid" => PaperSize::Tabloid,
            other => {
                let (w, h) = other.split_once('x').ok_or_else(|| {
                    ImposeError::Config(format!("Unknown sheet size: {}", value))
                })?;
                let parse = |s: &str| {
                    s.trim()
                        .parse::<f32>()
                        .ok()
                        .filter(|v| v.is_finite() && *v > 0.0)
                        .ok_or_else(|| ImposeError::Config(format!("Invalid sheet size: {}", value)))
                };
                PaperSize::Custom {
                    width_mm: parse(w)?,
                    height_mm: parse(h)?,
                }
            }
        };
        Ok(size)
    }
}

/// How the two logical pages share one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Arrangement {
    /// First page on the left half, second on the right half
    #[default]
    SideBySide,
    /// First page on the top half, second on the bottom half
    Stacked,
}

/// Sheet margins - printer-safe area around the entire output sheet.
/// These margins ensure content stays within the printer's printable area.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SheetMargins {
    /// Top margin of the sheet
    pub top_mm: f32,
    /// Bottom margin of the sheet
    pub bottom_mm: f32,
    /// Left margin of the sheet
    pub left_mm: f32,
    /// Right margin of the sheet
    pub right_mm: f32,
}

impl Default for SheetMargins {
    fn default() -> Self {
        Self::uniform(crate::constants::DEFAULT_SHEET_MARGIN_MM)
    }
}

impl SheetMargins {
    /// Create uniform margins on all sides
    pub fn uniform(margin_mm: f32) -> Self {
        Self {
            top_mm: margin_mm,
            bottom_mm: margin_mm,
            left_mm: margin_mm,
            right_mm: margin_mm,
        }
    }

    fn values(&self) -> [f32; 4] {
        [self.top_mm, self.bottom_mm, self.left_mm, self.right_mm]
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.values().iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Statistics about the imposition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpositionStatistics {
    /// Total number of source pages
    pub source_pages: usize,
    /// Total number of output sheets (one PDF page each)
    pub output_sheets: usize,
    /// Number of empty slots left on the last sheet
    pub blank_slots: usize,
}
