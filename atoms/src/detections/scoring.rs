use std::collections::HashMap;

use super::model::{Detection, WasteCategory};

/// Per-category point weights.
///
/// Weights are unsigned, so a scan can only ever add points. Categories missing
/// from the table (including `Unknown` labels) weigh 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightTable {
    weights: HashMap<WasteCategory, u32>,
}

impl Default for WeightTable {
    fn default() -> Self {
        let weights = [
            (WasteCategory::Plastic, 15),
            (WasteCategory::Paper, 5),
            (WasteCategory::Glass, 15),
            (WasteCategory::Metal, 12),
            (WasteCategory::Can, 12),
            (WasteCategory::Cardboard, 10),
            (WasteCategory::Biodegradable, 8),
            (WasteCategory::Vinyl, 5),
            (WasteCategory::Styrofoam, 5),
            (WasteCategory::Battery, 15),
            (WasteCategory::Fluorescent, 0),
            (WasteCategory::BulkyWaste, 0),
            (WasteCategory::Other, 0),
        ]
        .into_iter()
        .collect();

        Self { weights }
    }
}

impl WeightTable {
    pub fn weight(&self, category: &WasteCategory) -> u32 {
        match category {
            WasteCategory::Unknown(_) => 0,
            known => self.weights.get(known).copied().unwrap_or(0),
        }
    }

    /// Override entries from a `category=weight,...` list (the `POINT_WEIGHTS` env var).
    /// Starts from the default table; unknown category names are rejected.
    pub fn from_overrides(overrides: &str) -> Result<Self, String> {
        let mut table = WeightTable::default();

        for entry in overrides.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("invalid weight entry '{}', expected name=value", entry))?;

            let category = WasteCategory::parse(name);
            if let WasteCategory::Unknown(label) = &category {
                return Err(format!("unknown waste category '{}'", label));
            }

            let weight: u32 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid weight '{}' for {}", value.trim(), name.trim()))?;

            table.weights.insert(category, weight);
        }

        Ok(table)
    }
}

/// Sum of the weights of every detection.
pub fn score(weights: &WeightTable, detections: &[Detection]) -> u32 {
    detections
        .iter()
        .map(|d| weights.weight(&d.category))
        .fold(0u32, u32::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::model::BoundingBox;

    fn detections(labels: &[&str]) -> Vec<Detection> {
        labels
            .iter()
            .map(|l| Detection::new(WasteCategory::parse(l), 0.8, BoundingBox::default()))
            .collect()
    }

    #[test]
    fn empty_scores_zero() {
        assert_eq!(score(&WeightTable::default(), &[]), 0);
    }

    #[test]
    fn default_table_values() {
        let table = WeightTable::default();
        assert_eq!(table.weight(&WasteCategory::Plastic), 15);
        assert_eq!(table.weight(&WasteCategory::Paper), 5);
        assert_eq!(table.weight(&WasteCategory::Metal), 12);
        assert_eq!(table.weight(&WasteCategory::Cardboard), 10);
        assert_eq!(table.weight(&WasteCategory::Biodegradable), 8);
        assert_eq!(table.weight(&WasteCategory::Battery), 15);
        assert_eq!(table.weight(&WasteCategory::Other), 0);
        assert_eq!(table.weight(&WasteCategory::Unknown("sofa".into())), 0);
    }

    #[test]
    fn score_is_additive_over_concatenation() {
        let table = WeightTable::default();
        let a = detections(&["plastic", "paper", "toaster"]);
        let b = detections(&["glass", "cardboard", "other", "battery"]);

        let mut joined = a.clone();
        joined.extend(b.clone());

        assert_eq!(score(&table, &joined), score(&table, &a) + score(&table, &b));
        assert_eq!(score(&table, &joined), 15 + 5 + 15 + 10 + 15);
    }

    #[test]
    fn overrides_replace_defaults() {
        let table = WeightTable::from_overrides("plastic=20, paper = 1").unwrap();
        assert_eq!(table.weight(&WasteCategory::Plastic), 20);
        assert_eq!(table.weight(&WasteCategory::Paper), 1);
        assert_eq!(table.weight(&WasteCategory::Glass), 15);
    }

    #[test]
    fn overrides_reject_garbage() {
        assert!(WeightTable::from_overrides("plastic").is_err());
        assert!(WeightTable::from_overrides("plastic=-3").is_err());
        assert!(WeightTable::from_overrides("sofa=4").is_err());
        assert_eq!(WeightTable::from_overrides("").unwrap(), WeightTable::default());
    }
}
