//! Gauge scales for the three indices.
//!
//! Drawing is left to the front end; this module only fixes the band tables
//! and where a value's needle lands on the dial.

/// A coloured band on a gauge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeBand {
    pub min: f64,
    pub max: f64,
    pub label: &'static str,
    /// Hex color, e.g. `#34d399`
    pub color: &'static str,
}

/// A gauge dial: contiguous bands from the first band's `min` to `max_value`.
#[derive(Debug, Clone, Copy)]
pub struct GaugeScale {
    pub name: &'static str,
    pub bands: &'static [GaugeBand],
    pub max_value: f64,
}

/// Where a value sits on a gauge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeReading {
    pub value: f64,
    /// Band containing the value (last band for values past the end)
    pub band: GaugeBand,
    /// Needle position in [0, 1]
    pub fraction: f64,
}

const BMI_BANDS: &[GaugeBand] = &[
    GaugeBand { min: 0.0, max: 18.5, label: "Underweight", color: "#60a5fa" },
    GaugeBand { min: 18.5, max: 25.0, label: "Normal", color: "#34d399" },
    GaugeBand { min: 25.0, max: 30.0, label: "Overweight", color: "#fbbf24" },
    GaugeBand { min: 30.0, max: 40.0, label: "Obese", color: "#f87171" },
];

const TYG_BANDS: &[GaugeBand] = &[
    GaugeBand { min: 6.0, max: 8.0, label: "Low Risk", color: "#34d399" },
    GaugeBand { min: 8.0, max: 8.5, label: "Moderate Risk", color: "#fbbf24" },
    GaugeBand { min: 8.5, max: 12.0, label: "High Risk", color: "#f87171" },
];

const TG_HDL_BANDS: &[GaugeBand] = &[
    GaugeBand { min: 0.0, max: 3.0, label: "Ideal", color: "#34d399" },
    GaugeBand { min: 3.0, max: 4.5, label: "Moderate", color: "#fbbf24" },
    GaugeBand { min: 4.5, max: 10.0, label: "High Risk", color: "#f87171" },
];

pub const BMI_GAUGE: GaugeScale = GaugeScale {
    name: "BMI",
    bands: BMI_BANDS,
    max_value: 40.0,
};

pub const TYG_GAUGE: GaugeScale = GaugeScale {
    name: "TyG Index",
    bands: TYG_BANDS,
    max_value: 12.0,
};

pub const TG_HDL_GAUGE: GaugeScale = GaugeScale {
    name: "TG/HDL Ratio",
    bands: TG_HDL_BANDS,
    max_value: 10.0,
};

impl GaugeScale {
    /// Locate a value on the dial.
    ///
    /// Bands are half-open `[min, max)`; values below the first band fall in
    /// the first band and values at or past the last bound in the last band.
    #[must_use]
    pub fn read(&self, value: f64) -> GaugeReading {
        let start = self.bands[0].min;
        let span = self.max_value - start;
        let fraction = if value.is_finite() && span > 0.0 {
            ((value - start) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let band = self
            .bands
            .iter()
            .find(|b| value < b.max)
            .or_else(|| self.bands.last())
            .copied()
            .unwrap_or(self.bands[0]);

        GaugeReading {
            value,
            band,
            fraction,
        }
    }
}
