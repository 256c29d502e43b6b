//! Class catalog: the ordered list of every class the service can report.
//!
//! Established once at startup from `GET /classes`. On any failure
//! (transport, parse, empty list) the built-in list is used instead. The
//! order never changes afterwards.

use crate::client::DetectionService;

/// Fallback catalog, in display order.
pub const DEFAULT_CLASSES: [&str; 8] = [
    "RBC",
    "WBC",
    "Candida",
    "Escherichia coli",
    "Epithelial Cells",
    "SA",
    "Klebsiella",
    "Urine Crystals",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogOrigin {
    Service,
    Fallback,
}

#[derive(Clone, Debug)]
pub struct ClassCatalog {
    classes: Vec<String>,
    origin: CatalogOrigin,
}

impl ClassCatalog {
    /// Fetch from the service, falling back to `DEFAULT_CLASSES`.
    pub fn load(service: &dyn DetectionService) -> Self {
        match service.fetch_classes() {
            Ok(classes) if !classes.is_empty() => {
                log::info!(
                    "loaded {} classes from {}: {:?}",
                    classes.len(),
                    service.name(),
                    classes
                );
                Self {
                    classes,
                    origin: CatalogOrigin::Service,
                }
            }
            Ok(_) => {
                log::error!("class catalog from {} was empty; using defaults", service.name());
                Self::fallback()
            }
            Err(e) => {
                log::error!("class catalog fetch failed: {:#}; using defaults", e);
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        Self {
            classes: DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect(),
            origin: CatalogOrigin::Fallback,
        }
    }

    pub fn from_classes(classes: Vec<String>) -> Self {
        Self {
            classes,
            origin: CatalogOrigin::Service,
        }
    }

    pub fn origin(&self) -> CatalogOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DetectionResult;
    use crate::encode::EncodedImage;
    use crate::error::MonitorError;
    use anyhow::Result;

    struct FixedCatalog(Option<Vec<String>>);

    impl DetectionService for FixedCatalog {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_classes(&self) -> Result<Vec<String>> {
            self.0
                .clone()
                .ok_or_else(|| MonitorError::CatalogFetchFailed("offline".into()).into())
        }

        fn detect(&self, _image: &EncodedImage) -> DetectionResult {
            DetectionResult::failure("unused")
        }
    }

    #[test]
    fn uses_service_order() {
        let service = FixedCatalog(Some(vec!["SA".into(), "RBC".into()]));
        let catalog = ClassCatalog::load(&service);
        assert_eq!(catalog.origin(), CatalogOrigin::Service);
        assert_eq!(catalog.iter().collect::<Vec<_>>(), vec!["SA", "RBC"]);
    }

    #[test]
    fn falls_back_on_error_or_empty_list() {
        for service in [FixedCatalog(None), FixedCatalog(Some(vec![]))] {
            let catalog = ClassCatalog::load(&service);
            assert_eq!(catalog.origin(), CatalogOrigin::Fallback);
            assert_eq!(catalog.len(), 8);
            assert_eq!(catalog.get(0), Some("RBC"));
            assert_eq!(catalog.get(7), Some("Urine Crystals"));
        }
    }
}
