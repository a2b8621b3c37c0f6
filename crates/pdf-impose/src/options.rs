use crate::constants::DEFAULT_GUTTER_MM;
use crate::types::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Target sheet and placement rule for two-up imposition.
///
/// Immutable for the duration of a run; every document imposed with the same
/// layout produces byte-identical output.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SheetLayout {
    /// Physical sheet size
    pub paper: PaperSize,
    pub orientation: Orientation,
    pub arrangement: Arrangement,
    /// Printer-safe margins around the whole sheet
    pub margins: SheetMargins,
    /// Space between the two halves
    pub gutter_mm: f32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            paper: PaperSize::B5,
            orientation: Orientation::Landscape,
            arrangement: Arrangement::SideBySide,
            margins: SheetMargins::default(),
            gutter_mm: DEFAULT_GUTTER_MM,
        }
    }
}

impl SheetLayout {
    /// Sheet dimensions in millimeters with orientation applied
    pub fn sheet_dimensions_mm(&self) -> (f32, f32) {
        self.paper.dimensions_with_orientation(self.orientation)
    }

    /// Load a layout from a JSON file
    #[cfg(feature = "serde")]
    pub async fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let layout = serde_json::from_slice(&bytes)
            .map_err(|e| ImposeError::Config(format!("Failed to parse layout: {}", e)))?;
        Ok(layout)
    }

    /// Save the layout to a JSON file
    #[cfg(feature = "serde")]
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ImposeError::Config(format!("Failed to serialize layout: {}", e)))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Validate the layout
    pub fn validate(&self) -> Result<()> {
        let (width, height) = self.paper.dimensions_mm();
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ImposeError::Config(format!(
                "Sheet size must be positive, got {}x{} mm",
                width, height
            )));
        }

        if !self.margins.is_valid() || !(self.gutter_mm.is_finite() && self.gutter_mm >= 0.0) {
            return Err(ImposeError::Config(
                "Margins and gutter must be non-negative".to_string(),
            ));
        }

        // Each half must keep some printable area after margins and gutter
        let (sheet_w, sheet_h) = self.sheet_dimensions_mm();
        let usable_w = sheet_w - self.margins.left_mm - self.margins.right_mm;
        let usable_h = sheet_h - self.margins.top_mm - self.margins.bottom_mm;
        let (half_w, half_h) = match self.arrangement {
            Arrangement::SideBySide => ((usable_w - self.gutter_mm) / 2.0, usable_h),
            Arrangement::Stacked => (usable_w, (usable_h - self.gutter_mm) / 2.0),
        };
        if half_w <= 0.0 || half_h <= 0.0 {
            return Err(ImposeError::Config(format!(
                "Margins leave no room for pages on a {} sheet",
                self.paper
            )));
        }

        Ok(())
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::*;

    impl Serialize for PaperSize {
        fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl<'de> Deserialize<'de> for PaperSize {
        fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        }
    }
}
