//! Organ dysfunction.
//!
//! Six criteria can qualify a hospitalization: new vasopressor initiation,
//! new invasive mechanical ventilation, and four lab criteria, three of them
//! measured against the stay's own baseline (`crate::baseline`) and lactate
//! against an absolute threshold alone. An event only counts when it falls
//! strictly within (-2, +2) relative calendar days of one of the stay's
//! presumed-infection anchors. Each detector reduces to the earliest
//! qualifying time per hospitalization per criterion.

use crate::{
    baseline::Baselines,
    infection::PresumedInfections,
    window::{episode_starts, DayWindow},
    Cohort, HospitalizationId, Lab, LabCategory, VasoCategory,
};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Relative days around an anchor in which dysfunction can qualify. Both
/// bounds are exclusive: an event exactly two days out does not count.
pub const ANCHOR_WINDOW: DayWindow = DayWindow::exclusive(-2, 2);

// Deviation thresholds.
pub const AKI_RATIO: f64 = 2.0;
pub const BILIRUBIN_MIN: f64 = 2.0;
pub const BILIRUBIN_RATIO: f64 = 2.0;
pub const PLATELET_MAX: f64 = 100.0;
pub const PLATELET_RATIO: f64 = 0.5;
pub const LACTATE_MIN: f64 = 2.0;

/// The organ-dysfunction criteria.
///
/// The variant order is the tie-break precedence when several criteria
/// qualify at the identical instant, so it is load-bearing.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum Criterion {
    Thrombocytopenia,
    Aki,
    InvasiveVentilation,
    Lactate,
    Vasopressor,
    Hyperbilirubinemia,
}

impl Criterion {
    pub const ALL: [Criterion; 6] = [
        Criterion::Thrombocytopenia,
        Criterion::Aki,
        Criterion::InvasiveVentilation,
        Criterion::Lactate,
        Criterion::Vasopressor,
        Criterion::Hyperbilirubinemia,
    ];

    pub fn label(self) -> &'static str {
        use Criterion::*;
        match self {
            Thrombocytopenia => "thrombocytopenia",
            Aki => "aki",
            InvasiveVentilation => "invasive_mechanical_ventilation",
            Lactate => "lactate",
            Vasopressor => "vasopressor",
            Hyperbilirubinemia => "hyperbilirubinemia",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The criterion a lab result triggers, if any, given the stay's baseline
/// for the same analyte. Deviation criteria are unevaluable without a
/// baseline; lactate needs none.
pub fn lab_criterion(lab: &Lab, baseline: Option<f64>) -> Option<Criterion> {
    match lab.category {
        LabCategory::Lactate => (lab.value >= LACTATE_MIN).then_some(Criterion::Lactate),
        LabCategory::Creatinine => {
            let baseline = baseline?;
            (lab.value / baseline >= AKI_RATIO).then_some(Criterion::Aki)
        }
        LabCategory::BilirubinTotal => {
            let baseline = baseline?;
            (lab.value >= BILIRUBIN_MIN && lab.value / baseline >= BILIRUBIN_RATIO)
                .then_some(Criterion::Hyperbilirubinemia)
        }
        LabCategory::PlateletCount => {
            let baseline = baseline?;
            (lab.value < PLATELET_MAX && lab.value / baseline <= PLATELET_RATIO)
                .then_some(Criterion::Thrombocytopenia)
        }
    }
}

/// One reduced organ-dysfunction row: the earliest qualifying time for one
/// criterion in one hospitalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganDysfunction {
    pub hospitalization_id: HospitalizationId,
    pub criterion: Criterion,
    pub time: NaiveDateTime,
}

hosp_store! {
    /// The reduced organ-dysfunction rows, with a pre-built index for the
    /// `hospitalization_id` field.
    Dysfunctions, OrganDysfunction
}

impl Dysfunctions {
    /// Run all detectors over the cohort, keeping only events anchored to a
    /// presumed infection.
    ///
    /// Hospitalizations are independent, so detection shards across them;
    /// the final sort makes the output order independent of scheduling.
    pub fn detect(cohort: &Cohort, anchors: &PresumedInfections, baselines: &Baselines) -> Self {
        let mut els: Vec<OrganDysfunction> = cohort
            .hospitalizations
            .par_iter()
            .flat_map_iter(|hosp| detect_one(cohort, anchors, baselines, &hosp.hospitalization_id))
            .collect();
        els.sort_by(|a, b| {
            (&a.hospitalization_id, a.time, a.criterion).cmp(&(
                &b.hospitalization_id,
                b.time,
                b.criterion,
            ))
        });
        els.into_iter().collect()
    }

    /// Rows for one criterion across the cohort.
    pub fn for_criterion(
        &self,
        criterion: Criterion,
    ) -> impl Iterator<Item = &OrganDysfunction> + '_ {
        self.els.iter().filter(move |d| d.criterion == criterion)
    }
}

fn detect_one(
    cohort: &Cohort,
    anchors: &PresumedInfections,
    baselines: &Baselines,
    id: &HospitalizationId,
) -> Vec<OrganDysfunction> {
    let anchor_times = anchors.anchor_times(id);
    if anchor_times.is_empty() {
        return Vec::new();
    }

    // Earliest qualifying time per criterion.
    let mut earliest: BTreeMap<Criterion, NaiveDateTime> = BTreeMap::new();
    let mut record = |criterion: Criterion, t: NaiveDateTime| {
        if !ANCHOR_WINDOW.matches_any(&anchor_times, t) {
            return;
        }
        let entry = earliest.entry(criterion).or_insert(t);
        if t < *entry {
            *entry = t;
        }
    };

    // New vasopressor initiations, detected per drug: a dose only counts
    // when the same drug was not given on the preceding calendar day.
    for category in VasoCategory::ALL {
        let starts = episode_starts(
            cohort
                .vasoactives
                .for_hospitalization(id)
                .filter(|dose| dose.category == category && dose.dose > 0.0)
                .map(|dose| dose.admin_time),
        );
        for t in starts {
            record(Criterion::Vasopressor, t);
        }
    }

    // New invasive-ventilation episodes, detected the same way.
    for t in episode_starts(
        cohort
            .imv_records
            .for_hospitalization(id)
            .map(|r| r.recorded_time),
    ) {
        record(Criterion::InvasiveVentilation, t);
    }

    // Lab results against the stay's baselines.
    for lab in cohort.labs.for_hospitalization(id) {
        let baseline = baselines.get(id, lab.category);
        if let Some(criterion) = lab_criterion(lab, baseline) {
            record(criterion, lab.result_time);
        }
    }

    earliest
        .into_iter()
        .map(|(criterion, time)| OrganDysfunction {
            hospitalization_id: Arc::clone(id),
            criterion,
            time,
        })
        .collect()
}
