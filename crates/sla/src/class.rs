//! SLA classes and stage mapping
//!
//! A class is a named set of four day offsets (day3, day7, day10, day14 by
//! default). Which case stages are timed, and by which class, is
//! configuration rather than code.

use std::collections::HashMap;

use gryork_core::{CaseStatus, LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};

pub const EPC_REVIEW: &str = "EPC_REVIEW";
pub const RMT_REVIEW: &str = "RMT_REVIEW";
pub const NBFC_BIDDING: &str = "NBFC_BIDDING";
pub const KYC: &str = "KYC";

/// Named milestone offsets, in days from tracker start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaClass {
    pub name: String,
    #[serde(default = "default_offsets")]
    pub offsets_days: [u32; 4],
}

impl SlaClass {
    pub fn new(name: impl Into<String>, offsets_days: [u32; 4]) -> Self {
        Self {
            name: name.into(),
            offsets_days,
        }
    }

    /// Offsets must be positive and strictly increasing
    pub fn validate(&self) -> LifecycleResult<()> {
        if self.offsets_days[0] == 0 {
            return Err(LifecycleError::Validation(format!(
                "SLA class {}: first offset must be at least one day",
                self.name
            )));
        }
        if !self.offsets_days.windows(2).all(|w| w[0] < w[1]) {
            return Err(LifecycleError::Validation(format!(
                "SLA class {}: offsets {:?} are not strictly increasing",
                self.name, self.offsets_days
            )));
        }
        Ok(())
    }
}

/// SLA engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaConfig {
    /// Known classes
    #[serde(default = "default_classes")]
    pub classes: Vec<SlaClass>,

    /// Case stages that start a tracker on entry, and the class timing them
    #[serde(default = "default_stages")]
    pub stages: HashMap<CaseStatus, String>,
}

fn default_offsets() -> [u32; 4] {
    [3, 7, 10, 14]
}

fn default_classes() -> Vec<SlaClass> {
    [EPC_REVIEW, RMT_REVIEW, NBFC_BIDDING, KYC]
        .into_iter()
        .map(|name| SlaClass::new(name, default_offsets()))
        .collect()
}

fn default_stages() -> HashMap<CaseStatus, String> {
    HashMap::from([
        (CaseStatus::ReadyForCompanyReview, EPC_REVIEW.to_string()),
        (CaseStatus::RmtQueue, RMT_REVIEW.to_string()),
        (CaseStatus::CwcafReady, NBFC_BIDDING.to_string()),
    ])
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            classes: default_classes(),
            stages: default_stages(),
        }
    }
}

impl SlaConfig {
    pub fn class(&self, name: &str) -> Option<&SlaClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// The class timing `stage`, if that stage is tracked
    pub fn class_for_stage(&self, stage: CaseStatus) -> Option<&SlaClass> {
        self.stages.get(&stage).and_then(|name| self.class(name))
    }

    pub fn is_tracked(&self, stage: CaseStatus) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Override the offsets of an existing class, or add a new one
    pub fn with_class(mut self, class: SlaClass) -> Self {
        match self.classes.iter_mut().find(|c| c.name == class.name) {
            Some(existing) => *existing = class,
            None => self.classes.push(class),
        }
        self
    }

    /// Every class valid, every stage mapped to a known class
    pub fn validate(&self) -> LifecycleResult<()> {
        for class in &self.classes {
            class.validate()?;
        }
        for (stage, name) in &self.stages {
            if self.class(name).is_none() {
                return Err(LifecycleError::Validation(format!(
                    "stage {} refers to unknown SLA class {}",
                    stage, name
                )));
            }
        }
        Ok(())
    }
}
