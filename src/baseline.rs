//! Baseline lab values.
//!
//! The deviation criteria compare each result against the hospitalization's
//! baseline for the same analyte: the value of the chronologically first
//! result of that analyte during the stay. Results sharing the earliest
//! timestamp resolve to the first record in extract order, so repeated runs
//! pick the same baseline.

use crate::{HospitalizationId, LabCategory, Labs};
use chrono::NaiveDateTime;
use std::{collections::BTreeMap, sync::Arc};

/// Baseline value per hospitalization per lab category.
pub struct Baselines {
    map: BTreeMap<(HospitalizationId, LabCategory), (NaiveDateTime, f64)>,
}

impl Baselines {
    pub fn compute(labs: &Labs) -> Self {
        let mut map: BTreeMap<(HospitalizationId, LabCategory), (NaiveDateTime, f64)> =
            BTreeMap::new();
        for lab in labs {
            let key = (Arc::clone(&lab.hospitalization_id), lab.category);
            match map.get_mut(&key) {
                Some((time, value)) => {
                    // Strictly earlier only: an equal timestamp keeps the
                    // record seen first.
                    if lab.result_time < *time {
                        *time = lab.result_time;
                        *value = lab.value;
                    }
                }
                None => {
                    map.insert(key, (lab.result_time, lab.value));
                }
            }
        }
        Baselines { map }
    }

    /// The baseline for one hospitalization and analyte, if any result of
    /// that analyte was recorded.
    pub fn get(&self, id: &HospitalizationId, category: LabCategory) -> Option<f64> {
        self.map
            .get(&(Arc::clone(id), category))
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Lab;
    use chrono::NaiveDate;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn lab(id: &str, category: LabCategory, value: f64, time: NaiveDateTime) -> Lab {
        Lab {
            hospitalization_id: id.into(),
            category,
            value,
            result_time: time,
        }
    }

    #[test]
    fn earliest_result_wins() {
        let labs: Labs = [
            lab("h1", LabCategory::Creatinine, 1.5, dt(2, 8)),
            lab("h1", LabCategory::Creatinine, 1.0, dt(1, 8)),
            lab("h1", LabCategory::PlateletCount, 220.0, dt(1, 9)),
        ]
        .into_iter()
        .collect();
        let baselines = Baselines::compute(&labs);
        let id: HospitalizationId = "h1".into();
        assert_eq!(baselines.get(&id, LabCategory::Creatinine), Some(1.0));
        assert_eq!(baselines.get(&id, LabCategory::PlateletCount), Some(220.0));
        assert_eq!(baselines.get(&id, LabCategory::Lactate), None);
        assert_eq!(baselines.len(), 2);
    }

    #[test]
    fn tied_timestamps_keep_first_record() {
        let labs: Labs = [
            lab("h1", LabCategory::Creatinine, 3.0, dt(1, 8)),
            lab("h1", LabCategory::Creatinine, 4.0, dt(1, 8)),
        ]
        .into_iter()
        .collect();
        let baselines = Baselines::compute(&labs);
        let id: HospitalizationId = "h1".into();
        assert_eq!(baselines.get(&id, LabCategory::Creatinine), Some(3.0));
    }
}
