//! Region preferences and in-process region usage tracking.
//!
//! Parallel scenarios each provision a VPC and a cluster, so they are spread
//! across the regions enabled for testing. The tracker hands out the region
//! with the fewest active scenarios; ties go to the lower `test_priority`,
//! then to the region name so the choice is deterministic.

use crate::error::CloudInfoError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// One entry of the region preference list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPref {
    pub name: String,

    #[serde(default = "default_use_for_test")]
    pub use_for_test: bool,

    #[serde(default)]
    pub test_priority: u32,
}

fn default_use_for_test() -> bool {
    true
}

impl RegionPref {
    pub fn new(name: impl Into<String>, test_priority: u32) -> Self {
        Self {
            name: name.into(),
            use_for_test: true,
            test_priority,
        }
    }
}

/// VPC regions that support IKS clusters, in preference order.
#[must_use]
pub fn default_region_prefs() -> Vec<RegionPref> {
    [
        "us-south", "eu-de", "eu-gb", "us-east", "jp-tok", "au-syd", "ca-tor", "br-sao",
        "jp-osa", "eu-es",
    ]
    .iter()
    .zip(1u32..)
    .map(|(name, priority)| RegionPref::new(*name, priority))
    .collect()
}

/// Load a region preference list from a YAML file.
pub fn load_region_prefs(path: &Path) -> Result<Vec<RegionPref>, CloudInfoError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CloudInfoError::RegionPrefs {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&contents).map_err(|e| CloudInfoError::RegionPrefs {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Tracks how many running scenarios use each region.
#[derive(Debug)]
pub struct RegionTracker {
    prefs: Vec<RegionPref>,
    usage: Mutex<HashMap<String, usize>>,
}

impl RegionTracker {
    #[must_use]
    pub fn new(prefs: Vec<RegionPref>) -> Self {
        Self {
            prefs,
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Pick the least-used test region and record one more use of it.
    pub fn acquire(&self) -> Result<String, CloudInfoError> {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);

        let chosen = self
            .prefs
            .iter()
            .filter(|p| p.use_for_test)
            .min_by(|a, b| {
                let used_a = usage.get(&a.name).copied().unwrap_or(0);
                let used_b = usage.get(&b.name).copied().unwrap_or(0);
                used_a
                    .cmp(&used_b)
                    .then(a.test_priority.cmp(&b.test_priority))
                    .then_with(|| a.name.cmp(&b.name))
            })
            .ok_or(CloudInfoError::NoTestRegions)?;

        let count = usage.entry(chosen.name.clone()).or_insert(0);
        *count += 1;

        debug!(
            target: "cloudinfo.regions",
            region = %chosen.name,
            in_use = *count,
            "Region acquired for test"
        );

        Ok(chosen.name.clone())
    }

    /// Record that a scenario no longer uses `region`.
    pub fn release(&self, region: &str) {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        match usage.get_mut(region) {
            Some(count) if *count > 0 => {
                *count -= 1;
                debug!(
                    target: "cloudinfo.regions",
                    region = %region,
                    in_use = *count,
                    "Region released"
                );
            }
            _ => {
                warn!(
                    target: "cloudinfo.regions",
                    region = %region,
                    "Release requested for a region that is not in use"
                );
            }
        }
    }

    /// Number of scenarios currently using `region`.
    #[must_use]
    pub fn usage(&self, region: &str) -> usize {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(region)
            .copied()
            .unwrap_or(0)
    }
}
