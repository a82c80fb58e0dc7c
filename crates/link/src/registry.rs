use std::collections::HashMap;

/// Last-known position of one sensor module, as received on the wire.
///
/// Latitude and longitude are kept as the decimal strings the module sent;
/// they are republished verbatim and never used for arithmetic here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePosition {
    pub module_id: String,
    pub latitude: String,
    pub longitude: String,
}

/// Holds the last-known position per required module id.
///
/// The detection pipeline must not arm until every required module has
/// reported at least once; afterwards positions keep updating with
/// last-write-wins semantics and are never deleted.
#[derive(Debug)]
pub struct ModuleRegistry {
    required: Vec<String>,
    positions: HashMap<String, ModulePosition>,
    // First-report order, so snapshots are stable across updates.
    order: Vec<String>,
}

impl ModuleRegistry {
    pub fn new(required_ids: Vec<String>) -> Self {
        Self {
            required: required_ids,
            positions: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn required_ids(&self) -> &[String] {
        &self.required
    }

    /// Overwrite the stored position for the report's module id.
    ///
    /// Returns true the first time a module reports, so callers can log
    /// handshake progress.
    pub fn update(&mut self, report: ModulePosition) -> bool {
        let first_report = !self.positions.contains_key(&report.module_id);
        if first_report {
            self.order.push(report.module_id.clone());
        }
        self.positions.insert(report.module_id.clone(), report);
        first_report
    }

    /// True iff every required module id has reported at least once.
    pub fn is_armed(&self) -> bool {
        self.required
            .iter()
            .all(|id| self.positions.contains_key(id))
    }

    /// Required module ids that have not reported yet.
    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|id| !self.positions.contains_key(*id))
            .map(String::as_str)
            .collect()
    }

    /// One entry per module that has ever reported, in first-report order.
    pub fn snapshot(&self) -> Vec<ModulePosition> {
        self.order
            .iter()
            .filter_map(|id| self.positions.get(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(id: &str, lat: &str, lon: &str) -> ModulePosition {
        ModulePosition {
            module_id: id.to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
        }
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::new(vec!["A".to_string(), "B".to_string(), "C".to_string()])
    }

    #[test]
    fn not_armed_until_all_required_report() {
        let mut reg = registry();
        assert!(!reg.is_armed());

        reg.update(pos("A", "1", "2"));
        reg.update(pos("B", "3", "4"));
        assert!(!reg.is_armed(), "armed with one module still missing");

        reg.update(pos("C", "5", "6"));
        assert!(reg.is_armed());
    }

    #[test]
    fn arming_is_order_independent() {
        let mut reg = registry();
        reg.update(pos("C", "1", "2"));
        reg.update(pos("A", "3", "4"));
        reg.update(pos("B", "5", "6"));
        assert!(reg.is_armed());
    }

    #[test]
    fn repeated_reports_from_one_module_do_not_arm() {
        let mut reg = registry();
        for _ in 0..5 {
            reg.update(pos("A", "1", "2"));
        }
        assert!(!reg.is_armed());
        assert_eq!(reg.missing(), vec!["B", "C"]);
    }

    #[test]
    fn update_is_last_write_wins() {
        let mut reg = registry();
        assert!(reg.update(pos("A", "1", "2")));
        assert!(!reg.update(pos("A", "9", "9")), "second report is not new");

        let snapshot = reg.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].latitude, "9");
        assert_eq!(snapshot[0].longitude, "9");
    }

    #[test]
    fn snapshot_keeps_first_report_order() {
        let mut reg = registry();
        reg.update(pos("B", "1", "1"));
        reg.update(pos("A", "2", "2"));
        reg.update(pos("B", "3", "3")); // update must not reorder

        let snapshot = reg.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|p| p.module_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn empty_registry_snapshot_is_empty() {
        assert!(registry().snapshot().is_empty());
    }
}
