//! Simulated agronomy data for the FURROW reference runtime.
//!
//! All data in this module is hardcoded and fictional. Label wording follows
//! the shape of Australian product labels but the registrations, rates, and
//! stations are invented. No external systems are contacted.

use furrow_core::Vocabulary;

// ── Product labels (mock) ────────────────────────────────────────────────────

/// One registered use of a product.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: &'static str,
    pub product: &'static str,
    pub active: &'static str,
    pub weeds: &'static [&'static str],
    pub crops: &'static [&'static str],
    /// Directions for use, as printed on the label.
    pub directions: &'static str,
    pub registration: &'static str,
}

impl Label {
    /// Product, weeds, and crops, in that order.
    pub fn entities(&self) -> Vec<String> {
        std::iter::once(self.product)
            .chain(self.weeds.iter().copied())
            .chain(self.crops.iter().copied())
            .map(str::to_string)
            .collect()
    }

    /// True when `entity` names this label's product, a weed, or a crop.
    pub fn mentions(&self, entity: &str) -> bool {
        let entity = entity.to_lowercase();
        self.entities().iter().any(|e| e.to_lowercase() == entity)
    }
}

pub const LABELS: &[Label] = &[
    Label {
        id: "label-boxer-gold-wheat",
        product: "Boxer Gold",
        active: "prosulfocarb + S-metolachlor",
        weeds: &["ryegrass"],
        crops: &["wheat"],
        directions: "Boxer Gold herbicide is registered for pre-emergent control of ryegrass in wheat. \
                     Apply at 2.5 L/ha incorporated by sowing.",
        registration: "APVMA 60370 (mock)",
    },
    Label {
        id: "label-sakura-wheat",
        product: "Sakura",
        active: "pyroxasulfone",
        weeds: &["ryegrass", "brome grass"],
        crops: &["wheat"],
        directions: "Sakura herbicide controls ryegrass and suppresses brome grass in wheat. \
                     Apply at 118 g/ha before sowing.",
        registration: "APVMA 64041 (mock)",
    },
    Label {
        id: "label-trifluralin-wheat-barley",
        product: "TriflurX",
        active: "trifluralin",
        weeds: &["ryegrass", "wild oats"],
        crops: &["wheat", "barley"],
        directions: "TriflurX herbicide is registered for ryegrass and wild oats in wheat and barley. \
                     Apply at 1.7 L/ha and incorporate within 4 hours.",
        registration: "APVMA 51117 (mock)",
    },
    Label {
        id: "label-avadex-barley",
        product: "Avadex Xtra",
        active: "tri-allate",
        weeds: &["wild oats"],
        crops: &["barley", "wheat"],
        directions: "Avadex Xtra herbicide controls wild oats in barley and wheat. Apply at 1.6 L/ha pre-sowing.",
        registration: "APVMA 49902 (mock)",
    },
    Label {
        id: "label-velocity-cereals",
        product: "Velocity",
        active: "bromoxynil + pyrasulfotole",
        weeds: &["wild radish"],
        crops: &["wheat", "barley"],
        directions: "Velocity herbicide controls wild radish in wheat and barley. Apply at 670 mL/ha post-emergent.",
        registration: "APVMA 61553 (mock)",
    },
];

/// Rates a model "remembers" for products, some of them wrong.
///
/// Used by the recall synthesizer to reproduce an unsupported rate claim.
pub const RECALLED_RATES: &[(&str, f64, &str)] = &[("Boxer Gold", 4.0, "L/ha"), ("Sakura", 118.0, "g/ha")];

pub const CROPS: &[&str] = &["wheat", "barley", "canola", "lupins"];

pub const WEEDS: &[&str] = &["ryegrass", "wild radish", "wild oats", "brome grass"];

/// Planner vocabulary derived from the mock data.
pub fn vocabulary() -> Vocabulary {
    Vocabulary {
        crops: CROPS.iter().map(|s| s.to_string()).collect(),
        weeds: WEEDS.iter().map(|s| s.to_string()).collect(),
        products: LABELS.iter().map(|l| l.product.to_string()).collect(),
    }
}

// ── Conditions (mock) ────────────────────────────────────────────────────────

/// Rainfall, temperature, station, and soil for the nearest mock site.
pub struct Site {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub rainfall_mm_per_day: f64,
    pub mean_temp_c: f64,
    pub soil_texture: &'static str,
    pub soil_ph: f64,
    pub organic_carbon_pct: f64,
}

pub const SITES: &[Site] = &[
    Site {
        name: "Northam",
        latitude: -31.65,
        longitude: 116.67,
        rainfall_mm_per_day: 1.6,
        mean_temp_c: 16.2,
        soil_texture: "sandy loam",
        soil_ph: 5.6,
        organic_carbon_pct: 0.9,
    },
    Site {
        name: "Wagga Wagga",
        latitude: -35.16,
        longitude: 147.46,
        rainfall_mm_per_day: 1.4,
        mean_temp_c: 14.8,
        soil_texture: "red clay loam",
        soil_ph: 6.1,
        organic_carbon_pct: 1.3,
    },
    Site {
        name: "Horsham",
        latitude: -36.71,
        longitude: 142.2,
        rainfall_mm_per_day: 1.1,
        mean_temp_c: 15.1,
        soil_texture: "grey cracking clay",
        soil_ph: 7.8,
        organic_carbon_pct: 1.1,
    },
];

/// The site closest to a coordinate (flat-earth distance is enough here).
pub fn nearest_site(latitude: f64, longitude: f64) -> &'static Site {
    let distance = |s: &Site| (s.latitude - latitude).powi(2) + (s.longitude - longitude).powi(2);
    let mut best = &SITES[0];
    for site in SITES {
        if distance(site) < distance(best) {
            best = site;
        }
    }
    best
}

// ── Yield model (mock) ───────────────────────────────────────────────────────

/// Water-limited yield, tonnes per hectare, rounded to 0.1.
///
/// A French-Schultz style estimate: 20 kg/ha per mm of growing-season rain
/// above 110 mm of evaporation, scaled by a crop factor.
pub fn water_limited_yield(crop: &str, growing_season_rain_mm: f64) -> f64 {
    let factor = match crop {
        "wheat" => 1.0,
        "barley" => 1.05,
        "canola" => 0.5,
        "lupins" => 0.6,
        _ => 0.8,
    };
    let kg = ((growing_season_rain_mm - 110.0).max(0.0) * 20.0 * factor).max(0.0);
    (kg / 100.0).round() / 10.0
}
