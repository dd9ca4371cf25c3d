//! Adapter-name ranking for the status surface.
//!
//! Device enumeration itself is external to this core: callers hand us a list of
//! adapter name strings (from whatever platform facility they use) and we apply a
//! simple substring heuristic to rank discrete GPUs above integrated ones.

use serde::Serialize;

/// Substrings identifying discrete-GPU vendors, matched case-insensitively.
const DISCRETE_VENDOR_MARKERS: [&str; 3] = ["NVIDIA", "AMD", "RADEON"];

/// Accelerator availability as reported by the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceleratorStatus {
    pub available: bool,
    pub name: Option<String>,
}

/// Pick the best adapter from `names`: the first discrete-vendor match, else the first
/// adapter of any kind, else nothing.
pub fn pick_best_adapter(names: &[String]) -> Option<&str> {
    names
        .iter()
        .find(|name| {
            let upper = name.to_uppercase();
            DISCRETE_VENDOR_MARKERS
                .iter()
                .any(|marker| upper.contains(marker))
        })
        .or_else(|| names.first())
        .map(String::as_str)
}

/// Summarize accelerator availability from a list of adapter names.
pub fn accelerator_status(names: &[String]) -> AcceleratorStatus {
    match pick_best_adapter(names) {
        Some(name) => AcceleratorStatus {
            available: true,
            name: Some(name.to_owned()),
        },
        None => AcceleratorStatus {
            available: false,
            name: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefers_discrete_vendor_over_integrated() {
        let adapters = names(&["Intel(R) UHD Graphics 630", "NVIDIA GeForce RTX 3060"]);
        assert_eq!(
            pick_best_adapter(&adapters),
            Some("NVIDIA GeForce RTX 3060")
        );
    }

    #[test]
    fn vendor_match_is_case_insensitive() {
        let adapters = names(&["amd radeon rx 6700 xt"]);
        assert_eq!(pick_best_adapter(&adapters), Some("amd radeon rx 6700 xt"));
    }

    #[test]
    fn falls_back_to_first_adapter_without_discrete_match() {
        let adapters = names(&["Intel(R) Iris Xe Graphics", "Microsoft Basic Render Driver"]);
        assert_eq!(
            pick_best_adapter(&adapters),
            Some("Intel(R) Iris Xe Graphics")
        );
    }

    #[test]
    fn empty_list_means_unavailable() {
        let status = accelerator_status(&[]);
        assert_eq!(
            status,
            AcceleratorStatus {
                available: false,
                name: None,
            }
        );
    }

    #[test]
    fn any_adapter_counts_as_available() {
        let status = accelerator_status(&names(&["Intel(R) Iris Xe Graphics"]));
        assert!(status.available);
        assert_eq!(status.name.as_deref(), Some("Intel(R) Iris Xe Graphics"));
    }
}
