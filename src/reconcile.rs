//! Per-class statistics panel.
//!
//! The panel holds one row per catalog class, in catalog order, created once
//! at startup. Every row carries its class name as its key, so merging a
//! cycle's statistics never depends on the position of a row.
//!
//! Each reconcile is a full overwrite: a class missing from the cycle's
//! statistics snaps back to undetected/0% with no decay.
//!
//! Percentages are rounded half away from zero (86.4 → 86, 86.5 → 87) and
//! clamped to 0..=100.

use std::collections::HashMap;

use crate::catalog::ClassCatalog;
use crate::client::ClassStats;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRow {
    class: String,
    detected: bool,
    percent: u8,
}

impl ResultRow {
    fn undetected(class: &str) -> Self {
        Self {
            class: class.to_string(),
            detected: false,
            percent: 0,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Display text, e.g. `"86%"`.
    pub fn percent_label(&self) -> String {
        format!("{}%", self.percent)
    }
}

#[derive(Clone, Debug)]
pub struct ResultPanel {
    rows: Vec<ResultRow>,
    index: HashMap<String, usize>,
}

impl ResultPanel {
    /// One undetected row per catalog entry, in catalog order.
    pub fn new(catalog: &ClassCatalog) -> Self {
        let rows: Vec<ResultRow> = catalog.iter().map(ResultRow::undetected).collect();
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.class.clone()).or_insert(i);
        }
        Self { rows, index }
    }

    /// Merge one cycle's statistics into the rows.
    pub fn reconcile(&mut self, stats: &HashMap<String, ClassStats>) {
        for row in &mut self.rows {
            match stats.get(&row.class) {
                Some(s) => {
                    row.detected = true;
                    row.percent = display_percent(s.avg_confidence);
                }
                None => {
                    row.detected = false;
                    row.percent = 0;
                }
            }
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn row(&self, class: &str) -> Option<&ResultRow> {
        self.index.get(class).map(|&i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn detected_count(&self) -> usize {
        self.rows.iter().filter(|r| r.detected).count()
    }
}

/// Round a 0..=100 confidence for display: half away from zero, clamped.
pub fn display_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> ClassCatalog {
        ClassCatalog::from_classes(names.iter().map(|n| n.to_string()).collect())
    }

    fn stats(entries: &[(&str, f64)]) -> HashMap<String, ClassStats> {
        entries
            .iter()
            .map(|(c, v)| (c.to_string(), ClassStats { avg_confidence: *v }))
            .collect()
    }

    #[test]
    fn rows_follow_catalog_order_and_length() {
        let cat = catalog(&["RBC", "WBC", "SA", "Candida"]);
        let mut panel = ResultPanel::new(&cat);
        assert_eq!(panel.len(), cat.len());
        assert!(panel.rows().iter().all(|r| !r.is_detected() && r.percent() == 0));

        panel.reconcile(&stats(&[("Candida", 40.0), ("RBC", 90.0), ("Unknown", 50.0)]));
        assert_eq!(panel.len(), cat.len());
        let order: Vec<&str> = panel.rows().iter().map(ResultRow::class).collect();
        assert_eq!(order, cat.iter().collect::<Vec<_>>());
        assert_eq!(panel.detected_count(), 2);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let mut panel = ResultPanel::new(&catalog(&["A", "B", "C"]));
        panel.reconcile(&stats(&[("A", 86.4), ("B", 86.5), ("C", 0.49)]));
        assert_eq!(panel.row("A").unwrap().percent_label(), "86%");
        assert_eq!(panel.row("B").unwrap().percent_label(), "87%");
        let c = panel.row("C").unwrap();
        assert!(c.is_detected());
        assert_eq!(c.percent(), 0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(display_percent(140.0), 100);
        assert_eq!(display_percent(-3.0), 0);
        assert_eq!(display_percent(f64::NAN), 0);
    }

    #[test]
    fn missing_class_snaps_to_undetected() {
        let mut panel = ResultPanel::new(&catalog(&["RBC", "WBC"]));
        panel.reconcile(&stats(&[("RBC", 72.0)]));
        let rbc = panel.row("RBC").unwrap();
        assert!(rbc.is_detected());
        assert_eq!(rbc.percent(), 72);

        panel.reconcile(&stats(&[("WBC", 10.0)]));
        let rbc = panel.row("RBC").unwrap();
        assert!(!rbc.is_detected());
        assert_eq!(rbc.percent_label(), "0%");
        assert!(panel.row("WBC").unwrap().is_detected());
    }

    #[test]
    fn empty_catalog_gives_empty_panel() {
        let mut panel = ResultPanel::new(&catalog(&[]));
        panel.reconcile(&stats(&[("RBC", 50.0)]));
        assert!(panel.is_empty());
        assert!(panel.row("RBC").is_none());
    }
}
