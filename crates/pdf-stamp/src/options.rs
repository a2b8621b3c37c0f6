use crate::types::*;
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use std::fmt::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the processing date
pub const DATE_PLACEHOLDER: &str = "{date}";

/// Content, placement and style of the processed mark.
///
/// Lengths are physical (millimeters and points), so the stamp looks the same
/// on every page regardless of the page's size or user unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StampSpec {
    /// Stamp text; `{date}` is replaced by the formatted date
    pub text_template: String,
    /// `strftime` format for the date
    pub date_format: String,
    pub corner: Corner,
    /// Horizontal distance from the corner
    pub offset_x_mm: f32,
    /// Vertical distance from the corner
    pub offset_y_mm: f32,
    pub font_size_pt: f32,
    pub color: Rgb,
    /// Fill and stroke opacity, `0.0..=1.0`
    pub opacity: f32,
    /// Draw a rectangle around the text
    pub frame: bool,
}

impl Default for StampSpec {
    fn default() -> Self {
        Self {
            text_template: format!("済 {}", DATE_PLACEHOLDER),
            date_format: "%Y-%m-%d".to_string(),
            corner: Corner::default(),
            offset_x_mm: 5.0,
            offset_y_mm: 5.0,
            font_size_pt: 14.0,
            color: Rgb::default(),
            opacity: 1.0,
            frame: true,
        }
    }
}

impl StampSpec {
    /// Settings with the given template and every other value defaulted
    pub fn with_template(text_template: impl Into<String>) -> Self {
        Self {
            text_template: text_template.into(),
            ..Default::default()
        }
    }

    /// Expand the template for a date
    pub fn render_text(&self, date: NaiveDate) -> Result<String> {
        let mut formatted = String::new();
        write!(formatted, "{}", date.format(&self.date_format)).map_err(|_| {
            StampError::InvalidSpec(format!("Invalid date format: {}", self.date_format))
        })?;
        Ok(self.text_template.replace(DATE_PLACEHOLDER, &formatted))
    }

    /// Validate every setting
    pub fn validate(&self) -> Result<()> {
        if self.text_template.trim().is_empty() {
            return Err(StampError::InvalidSpec(
                "Stamp text must not be empty".to_string(),
            ));
        }

        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(StampError::InvalidSpec(format!(
                "Invalid date format: {}",
                self.date_format
            )));
        }

        if !(self.font_size_pt.is_finite() && self.font_size_pt > 0.0) {
            return Err(StampError::InvalidSpec(format!(
                "Font size must be positive, got {}",
                self.font_size_pt
            )));
        }

        let offsets_ok = [self.offset_x_mm, self.offset_y_mm]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        if !offsets_ok {
            return Err(StampError::InvalidSpec(
                "Stamp offsets must be non-negative".to_string(),
            ));
        }

        if !(self.opacity.is_finite() && (0.0..=1.0).contains(&self.opacity)) {
            return Err(StampError::InvalidSpec(format!(
                "Opacity must be between 0 and 1, got {}",
                self.opacity
            )));
        }

        if !self.color.is_valid() {
            return Err(StampError::InvalidSpec(
                "Colour components must be between 0 and 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_render_default_template() {
        let spec = StampSpec::default();
        assert_eq!(spec.render_text(date()).unwrap(), "済 2024-01-15");
    }

    #[test]
    fn test_render_custom_format() {
        let spec = StampSpec {
            text_template: "Done {date} ({date})".to_string(),
            date_format: "%Y/%m/%d".to_string(),
            ..Default::default()
        };
        assert_eq!(
            spec.render_text(date()).unwrap(),
            "Done 2024/01/15 (2024/01/15)"
        );
    }

    #[test]
    fn test_template_without_placeholder_is_literal() {
        let spec = StampSpec::with_template("PROCESSED");
        assert_eq!(spec.render_text(date()).unwrap(), "PROCESSED");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(StampSpec::default().validate().is_ok());

        let cases = [
            StampSpec::with_template("  "),
            StampSpec {
                font_size_pt: 0.0,
                ..Default::default()
            },
            StampSpec {
                opacity: 1.5,
                ..Default::default()
            },
            StampSpec {
                offset_x_mm: -1.0,
                ..Default::default()
            },
            StampSpec {
                color: Rgb::new(2.0, 0.0, 0.0),
                ..Default::default()
            },
            StampSpec {
                date_format: "%Q".to_string(),
                ..Default::default()
            },
        ];
        for spec in cases {
            assert!(
                matches!(spec.validate(), Err(StampError::InvalidSpec(_))),
                "{:?} should be rejected",
                spec
            );
        }
    }
}
