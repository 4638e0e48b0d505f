//! Numeric quantities in free text, e.g. "2.5 L/ha" or "40 mm".
//!
//! Shared by synthesis (to lift rates out of evidence) and verification (to
//! check that a numeric claim's value appears in the evidence it cites).

use std::sync::OnceLock;

use regex::Regex;

/// A number with its unit, as written.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    /// Same unit (case-insensitive) and value within 0.1%.
    pub fn matches(&self, other: &Quantity) -> bool {
        same_unit(&self.unit, &other.unit) && approx_eq(self.value, other.value)
    }
}

pub fn same_unit(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= scale * 1e-3
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(mL/ha|L/ha|g/ha|kg/ha|t/ha|mm|%|°C|days)")
            .expect("quantity pattern is a valid regex")
    })
}

/// Every quantity in `text`, in order of appearance.
pub fn extract(text: &str) -> Vec<Quantity> {
    pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let unit = caps.get(2)?.as_str().to_string();
            Some(Quantity { value, unit })
        })
        .collect()
}

/// True when the unit is an application rate.
pub fn is_rate_unit(unit: &str) -> bool {
    unit.to_ascii_lowercase().ends_with("/ha")
}
