//! Presumed infection.
//!
//! A blood culture anchors a presumed infection when corroborated by enough
//! antimicrobial exposure. "Enough" is counted in qualifying antimicrobial
//! days (QAD): distinct relative calendar days in [-2, +6] around the
//! collection with at least one qualifying administration. Four or more QAD
//! always qualify. A single QAD suffices when observation was censored
//! (death, hospice or acute-care transfer) before the culture's six days of
//! follow-up ran out, since the full course could not be observed.
//!
//! A hospitalization can anchor several presumed infections, one per
//! qualifying culture time; consumers handle the one-to-many.

use crate::{
    window::{self, DayWindow},
    Cohort, Hospitalization, HospitalizationId,
};
use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};

/// Relative days around a culture on which antimicrobial days count.
pub const QAD_WINDOW: DayWindow = DayWindow::inclusive(-2, 6);

/// QADs needed when follow-up is complete.
pub const FULL_QAD: usize = 4;

/// Days of follow-up after a culture; censoring inside this span enables the
/// partial-QAD path.
pub const FOLLOW_UP_DAYS: i64 = 6;

/// Count the distinct relative calendar days in the QAD window with at least
/// one qualifying administration. Several doses on one relative day count
/// once.
pub fn qualifying_antimicrobial_days(
    culture_time: NaiveDateTime,
    admin_times: impl IntoIterator<Item = NaiveDateTime>,
) -> usize {
    let days: BTreeSet<i64> = admin_times
        .into_iter()
        .map(|t| window::day_offset(culture_time, t))
        .filter(|offset| QAD_WINDOW.contains(*offset))
        .collect();
    days.len()
}

/// The time observation ended early, if it did: the earlier of discharge and
/// death, defined when the discharge disposition is terminal or the patient
/// died by discharge. `None` means follow-up ran its course.
pub fn censoring_time(
    hosp: &Hospitalization,
    death_time: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    let censored = hosp.discharge_category.is_terminal()
        || matches!(death_time, Some(death) if death <= hosp.discharge_time);
    if !censored {
        return None;
    }
    Some(match death_time {
        Some(death) => death.min(hosp.discharge_time),
        None => hosp.discharge_time,
    })
}

/// One presumed-infection anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresumedInfection {
    pub hospitalization_id: HospitalizationId,
    pub infection_time: NaiveDateTime,
}

hosp_store! {
    /// The detected presumed-infection anchors, with a pre-built index for
    /// the `hospitalization_id` field.
    PresumedInfections, PresumedInfection
}

impl PresumedInfections {
    /// Scan every hospitalization's blood cultures for anchors.
    ///
    /// Hospitalizations are independent, so the scan shards across them; the
    /// final sort makes the output order independent of scheduling.
    pub fn detect(cohort: &Cohort) -> Self {
        let mut els: Vec<PresumedInfection> = cohort
            .hospitalizations
            .par_iter()
            .flat_map_iter(|hosp| detect_one(cohort, hosp))
            .collect();
        els.sort_by(|a, b| {
            (&a.hospitalization_id, a.infection_time)
                .cmp(&(&b.hospitalization_id, b.infection_time))
        });
        els.into_iter().collect()
    }

    /// Anchor times for one hospitalization, ascending.
    pub fn anchor_times(&self, id: &str) -> Vec<NaiveDateTime> {
        self.for_hospitalization(id)
            .map(|pi| pi.infection_time)
            .collect()
    }
}

fn detect_one(cohort: &Cohort, hosp: &Hospitalization) -> Vec<PresumedInfection> {
    let id = &hosp.hospitalization_id;
    let censor = censoring_time(hosp, cohort.death_time(hosp));
    let admins = cohort.antibiotics.for_hospitalization(id);
    // A set, as several cultures can share a collection time.
    let mut times = BTreeSet::new();
    for culture in cohort.cultures.for_hospitalization(id) {
        let qad = qualifying_antimicrobial_days(
            culture.collect_time,
            admins.clone().map(|dose| dose.admin_time),
        );
        let qualifies = qad >= FULL_QAD
            || (qad >= 1
                && matches!(
                    censor,
                    Some(censor)
                        if censor < culture.collect_time + Duration::days(FOLLOW_UP_DAYS)
                ));
        if qualifies {
            times.insert(culture.collect_time);
        }
    }
    times
        .into_iter()
        .map(|infection_time| PresumedInfection {
            hospitalization_id: Arc::clone(id),
            infection_time,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{AntibioticDose, Culture, DischargeCategory, Patient, Patients, Sex};
    use chrono::NaiveDate;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn hosp(id: &str, discharge: NaiveDateTime, category: DischargeCategory) -> Hospitalization {
        Hospitalization {
            hospitalization_id: id.into(),
            patient_id: format!("p-{}", id).into(),
            admission_time: dt(1, 0),
            discharge_time: discharge,
            discharge_category: category,
        }
    }

    fn patient(hosp_id: &str, death_time: Option<NaiveDateTime>) -> Patient {
        Patient {
            patient_id: format!("p-{}", hosp_id).into(),
            sex: Sex::Unknown,
            birth_date: None,
            death_time,
        }
    }

    fn culture(id: &str, collect_time: NaiveDateTime) -> Culture {
        Culture {
            hospitalization_id: id.into(),
            collect_time,
        }
    }

    fn dose(id: &str, admin_time: NaiveDateTime) -> AntibioticDose {
        AntibioticDose {
            hospitalization_id: id.into(),
            admin_time,
        }
    }

    fn cohort(
        hosps: Vec<Hospitalization>,
        patients: Vec<Patient>,
        cultures: Vec<Culture>,
        antibiotics: Vec<AntibioticDose>,
    ) -> Cohort {
        Cohort {
            hospitalizations: hosps.into_iter().collect(),
            patients: patients.into_iter().collect::<Patients>(),
            cultures: cultures.into_iter().collect(),
            antibiotics: antibiotics.into_iter().collect(),
            vasoactives: Vec::new().into_iter().collect(),
            imv_records: Vec::new().into_iter().collect(),
            labs: Vec::new().into_iter().collect(),
        }
    }

    #[test]
    fn qad_counts_distinct_relative_days() {
        let culture = dt(10, 12);
        let admins = vec![
            // Day -2 starts at day 8, 12:00; one hour earlier is day -3.
            dt(8, 13),
            dt(8, 11),
            // Two doses on the same relative day count once.
            dt(12, 8),
            dt(12, 9),
            // Exactly +6 relative days is still in the window; +7 is not.
            dt(16, 12),
            dt(17, 12),
        ];
        assert_eq!(qualifying_antimicrobial_days(culture, admins), 3);
        assert_eq!(qualifying_antimicrobial_days(culture, Vec::new()), 0);
    }

    #[test]
    fn censoring() {
        let home = hosp("h", dt(13, 10), DischargeCategory::Home);
        assert_eq!(censoring_time(&home, None), None);
        // Death after discharge does not censor a routine discharge.
        assert_eq!(censoring_time(&home, Some(dt(20, 0))), None);
        // Death by discharge censors at the death time.
        assert_eq!(censoring_time(&home, Some(dt(12, 0))), Some(dt(12, 0)));

        let expired = hosp("h", dt(13, 10), DischargeCategory::Expired);
        assert_eq!(censoring_time(&expired, None), Some(dt(13, 10)));

        // Terminal discharge with a later recorded death censors at discharge.
        let hospice = hosp("h", dt(13, 10), DischargeCategory::Hospice);
        assert_eq!(censoring_time(&hospice, Some(dt(15, 0))), Some(dt(13, 10)));
    }

    #[test]
    fn detect_full_and_partial_paths() {
        // h1: four QADs, discharged home alive.
        // h2: two QADs, expired on day 13 (before day-16 follow-up end).
        // h3: two QADs, discharged home alive.
        let cohort = cohort(
            vec![
                hosp("h1", dt(20, 10), DischargeCategory::Home),
                hosp("h2", dt(13, 9), DischargeCategory::Expired),
                hosp("h3", dt(20, 10), DischargeCategory::Home),
            ],
            vec![
                patient("h1", None),
                patient("h2", Some(dt(13, 9))),
                patient("h3", None),
            ],
            vec![
                culture("h1", dt(10, 12)),
                // Duplicate collection time folds into one anchor.
                culture("h1", dt(10, 12)),
                culture("h2", dt(10, 12)),
                culture("h3", dt(10, 12)),
            ],
            vec![
                dose("h1", dt(10, 13)),
                dose("h1", dt(11, 13)),
                dose("h1", dt(12, 13)),
                dose("h1", dt(13, 13)),
                dose("h2", dt(10, 13)),
                dose("h2", dt(11, 13)),
                dose("h3", dt(10, 13)),
                dose("h3", dt(11, 13)),
            ],
        );

        let anchors = PresumedInfections::detect(&cohort);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors.anchor_times("h1"), vec![dt(10, 12)]);
        assert_eq!(anchors.anchor_times("h2"), vec![dt(10, 12)]);
        assert!(anchors.anchor_times("h3").is_empty());
    }

    #[test]
    fn late_censoring_does_not_rescue_partial_qad() {
        // Two QADs and a death, but censoring lands after the six-day
        // follow-up, so the partial path does not apply.
        let cohort = cohort(
            vec![hosp("h1", dt(17, 9), DischargeCategory::Expired)],
            vec![patient("h1", Some(dt(17, 9)))],
            vec![culture("h1", dt(10, 12))],
            vec![dose("h1", dt(10, 13)), dose("h1", dt(11, 13))],
        );
        assert!(PresumedInfections::detect(&cohort).is_empty());
    }
}
