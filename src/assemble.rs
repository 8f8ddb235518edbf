//! Sepsis case assembly.
//!
//! Pivots the reduced organ-dysfunction rows into the terminal wide table:
//! one row per qualifying hospitalization, one optional timestamp per
//! criterion, and the first criterion met computed twice, with lactate in
//! the criterion set and with it excluded. A hospitalization qualifies when
//! it has at least one presumed-infection anchor and at least one anchored
//! criterion.

use crate::{
    baseline::Baselines,
    dysfunction::{Criterion, Dysfunctions},
    infection::PresumedInfections,
    check_extension, output_path, show_dttm, show_opt_dttm, Cohort, Context, Hospitalization,
    HospitalizationId, PatientId, Result,
};
use chrono::NaiveDateTime;
use qu::ick_use::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, ops::Deref, path::Path, sync::Arc};

/// The wide summary row for one hospitalization meeting the sepsis
/// definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SepsisCase {
    pub hospitalization_id: HospitalizationId,
    pub patient_id: PatientId,
    pub admission_time: NaiveDateTime,
    pub discharge_time: NaiveDateTime,
    /// Earliest presumed-infection anchor of the stay.
    pub infection_time: NaiveDateTime,
    pub thrombocytopenia_time: Option<NaiveDateTime>,
    pub aki_time: Option<NaiveDateTime>,
    pub ventilation_time: Option<NaiveDateTime>,
    pub lactate_time: Option<NaiveDateTime>,
    pub vasopressor_time: Option<NaiveDateTime>,
    pub hyperbilirubinemia_time: Option<NaiveDateTime>,
    /// First criterion met, lactate included in the criterion set.
    pub first_criterion: Criterion,
    pub first_time: NaiveDateTime,
    /// First criterion met with lactate excluded; `None` when lactate alone
    /// qualified the stay.
    pub first_criterion_no_lactate: Option<Criterion>,
    pub first_time_no_lactate: Option<NaiveDateTime>,
}

impl SepsisCase {
    /// The qualifying time for one criterion, if it was met.
    pub fn criterion_time(&self, criterion: Criterion) -> Option<NaiveDateTime> {
        match criterion {
            Criterion::Thrombocytopenia => self.thrombocytopenia_time,
            Criterion::Aki => self.aki_time,
            Criterion::InvasiveVentilation => self.ventilation_time,
            Criterion::Lactate => self.lactate_time,
            Criterion::Vasopressor => self.vasopressor_time,
            Criterion::Hyperbilirubinemia => self.hyperbilirubinemia_time,
        }
    }

    /// Whether the stay still qualifies with lactate removed from the
    /// criterion set.
    pub fn is_case_without_lactate(&self) -> bool {
        self.first_criterion_no_lactate.is_some()
    }
}

/// The assembled wide table, one row per qualifying hospitalization, sorted
/// by `hospitalization_id`, with a pre-built index for it.
pub struct SepsisCases {
    els: Vec<SepsisCase>,
    id_idx: BTreeMap<HospitalizationId, usize>,
}

impl SepsisCases {
    fn new(els: Vec<SepsisCase>) -> Self {
        let mut this = Self {
            els,
            id_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.id_idx = self
            .els
            .iter()
            .enumerate()
            .map(|(idx, el)| (Arc::clone(&el.hospitalization_id), idx))
            .collect();
    }

    /// Pivot the reduced rows to one wide record per qualifying
    /// hospitalization.
    pub fn assemble(
        cohort: &Cohort,
        infections: &PresumedInfections,
        dysfunctions: &Dysfunctions,
    ) -> Self {
        let mut els: Vec<SepsisCase> = cohort
            .hospitalizations
            .par_iter()
            .filter_map(|hosp| assemble_one(hosp, infections, dysfunctions))
            .collect();
        els.sort_by(|a, b| a.hospitalization_id.cmp(&b.hospitalization_id));
        Self::new(els)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(crate::load(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        Ok(crate::save(&self.els, path)?)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&SepsisCase> {
        let idx = self.id_idx.get(id)?;
        self.els.get(*idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = SepsisCase> + '_ {
        self.els.iter().cloned()
    }

    /// Write the wide table as CSV for reporting collaborators.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result {
        let path = output_path(path.as_ref());
        check_extension(&path, "csv")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("could not create parent")?;
        }
        let mut out = csv::Writer::from_path(&path)
            .with_context(|| format!("unable to write \"{}\"", path.display()))?;
        out.write_record([
            "hospitalization_id",
            "patient_id",
            "admission_dttm",
            "discharge_dttm",
            "infection_dttm",
            "thrombocytopenia_dttm",
            "aki_dttm",
            "invasive_mechanical_ventilation_dttm",
            "lactate_dttm",
            "vasopressor_dttm",
            "hyperbilirubinemia_dttm",
            "first_criterion",
            "first_dttm",
            "first_criterion_no_lactate",
            "first_dttm_no_lactate",
        ])?;
        for case in &self.els {
            out.write_record(&[
                case.hospitalization_id.to_string(),
                case.patient_id.to_string(),
                show_dttm(case.admission_time),
                show_dttm(case.discharge_time),
                show_dttm(case.infection_time),
                show_opt_dttm(case.thrombocytopenia_time),
                show_opt_dttm(case.aki_time),
                show_opt_dttm(case.ventilation_time),
                show_opt_dttm(case.lactate_time),
                show_opt_dttm(case.vasopressor_time),
                show_opt_dttm(case.hyperbilirubinemia_time),
                case.first_criterion.to_string(),
                show_dttm(case.first_time),
                case.first_criterion_no_lactate
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                show_opt_dttm(case.first_time_no_lactate),
            ])?;
        }
        out.flush()?;
        Ok(())
    }
}

impl Deref for SepsisCases {
    type Target = [SepsisCase];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<SepsisCase> for SepsisCases {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = SepsisCase>,
    {
        Self::new(iter.into_iter().collect())
    }
}

fn assemble_one(
    hosp: &Hospitalization,
    infections: &PresumedInfections,
    dysfunctions: &Dysfunctions,
) -> Option<SepsisCase> {
    let id = &hosp.hospitalization_id;
    let infection_time = infections
        .for_hospitalization(id)
        .map(|pi| pi.infection_time)
        .min()?;

    let mut times: BTreeMap<Criterion, NaiveDateTime> = BTreeMap::new();
    for row in dysfunctions.for_hospitalization(id) {
        times.insert(row.criterion, row.time);
    }
    let (first_criterion, first_time) = first_met(times.iter().map(|(c, t)| (*c, *t)))?;
    let (first_criterion_no_lactate, first_time_no_lactate) = match first_met(
        times
            .iter()
            .filter(|(c, _)| **c != Criterion::Lactate)
            .map(|(c, t)| (*c, *t)),
    ) {
        Some((c, t)) => (Some(c), Some(t)),
        None => (None, None),
    };

    Some(SepsisCase {
        hospitalization_id: Arc::clone(id),
        patient_id: Arc::clone(&hosp.patient_id),
        admission_time: hosp.admission_time,
        discharge_time: hosp.discharge_time,
        infection_time,
        thrombocytopenia_time: times.get(&Criterion::Thrombocytopenia).copied(),
        aki_time: times.get(&Criterion::Aki).copied(),
        ventilation_time: times.get(&Criterion::InvasiveVentilation).copied(),
        lactate_time: times.get(&Criterion::Lactate).copied(),
        vasopressor_time: times.get(&Criterion::Vasopressor).copied(),
        hyperbilirubinemia_time: times.get(&Criterion::Hyperbilirubinemia).copied(),
        first_criterion,
        first_time,
        first_criterion_no_lactate,
        first_time_no_lactate,
    })
}

/// Earliest (time, criterion) over the given rows; ties at one instant
/// resolve to the criterion precedence order.
fn first_met(
    rows: impl IntoIterator<Item = (Criterion, NaiveDateTime)>,
) -> Option<(Criterion, NaiveDateTime)> {
    rows.into_iter()
        .min_by_key(|(criterion, time)| (*time, *criterion))
}

/// Everything one adjudication run produces.
pub struct Adjudication {
    pub infections: PresumedInfections,
    pub dysfunctions: Dysfunctions,
    pub cases: SepsisCases,
}

impl Adjudication {
    pub fn save(&self) -> Result {
        self.infections.save("presumed_infection.bin")?;
        self.dysfunctions.save("organ_dysfunction.bin")?;
        self.cases.save("sepsis_cases.bin")?;
        Ok(())
    }
}

/// Run the full adjudication over a loaded cohort.
pub fn adjudicate(cohort: &Cohort) -> Result<Adjudication> {
    cohort.ensure_populated()?;
    for hosp in cohort.hospitalizations.iter() {
        if cohort.patients.find_by_id(&hosp.patient_id).is_none() {
            event!(
                Level::WARN,
                "no patient record for hospitalization {}",
                hosp.hospitalization_id
            );
        }
    }

    let baselines = Baselines::compute(&cohort.labs);
    event!(Level::INFO, "computed {} lab baselines", baselines.len());
    let infections = PresumedInfections::detect(cohort);
    event!(
        Level::INFO,
        "found {} presumed-infection anchors",
        infections.len()
    );
    let dysfunctions = Dysfunctions::detect(cohort, &infections, &baselines);
    event!(
        Level::INFO,
        "found {} anchored organ-dysfunction rows",
        dysfunctions.len()
    );
    let cases = SepsisCases::assemble(cohort, &infections, &dysfunctions);
    event!(Level::INFO, "assembled {} sepsis cases", cases.len());

    Ok(Adjudication {
        infections,
        dysfunctions,
        cases,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dysfunction::OrganDysfunction, infection::PresumedInfection, AntibioticDose, Culture,
        DischargeCategory, ImvRecord, Lab, LabCategory, Patient, Sex, VasoCategory,
        VasoactiveDose,
    };
    use chrono::NaiveDate;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn hosp(id: &str) -> Hospitalization {
        Hospitalization {
            hospitalization_id: id.into(),
            patient_id: format!("p-{}", id).into(),
            admission_time: dt(1, 0),
            discharge_time: dt(20, 0),
            discharge_category: DischargeCategory::Home,
        }
    }

    fn anchor(id: &str, time: NaiveDateTime) -> PresumedInfection {
        PresumedInfection {
            hospitalization_id: id.into(),
            infection_time: time,
        }
    }

    fn row(id: &str, criterion: Criterion, time: NaiveDateTime) -> OrganDysfunction {
        OrganDysfunction {
            hospitalization_id: id.into(),
            criterion,
            time,
        }
    }

    fn bare_cohort(hosps: Vec<Hospitalization>) -> Cohort {
        let patients: Vec<Patient> = hosps
            .iter()
            .map(|h| Patient {
                patient_id: Arc::clone(&h.patient_id),
                sex: Sex::Unknown,
                birth_date: None,
                death_time: None,
            })
            .collect();
        Cohort {
            hospitalizations: hosps.into_iter().collect(),
            patients: patients.into_iter().collect(),
            cultures: Vec::new().into_iter().collect(),
            antibiotics: Vec::new().into_iter().collect(),
            vasoactives: Vec::new().into_iter().collect(),
            imv_records: Vec::new().into_iter().collect(),
            labs: Vec::new().into_iter().collect(),
        }
    }

    #[test]
    fn ties_resolve_by_precedence() {
        let cohort = bare_cohort(vec![hosp("h1")]);
        let infections: PresumedInfections = [anchor("h1", dt(10, 12))].into_iter().collect();
        // Lactate and vasopressor at the identical instant: lactate comes
        // first in the precedence order, but drops out of the lactate-free
        // set.
        let dysfunctions: Dysfunctions = [
            row("h1", Criterion::Vasopressor, dt(10, 13)),
            row("h1", Criterion::Lactate, dt(10, 13)),
        ]
        .into_iter()
        .collect();

        let cases = SepsisCases::assemble(&cohort, &infections, &dysfunctions);
        let case = cases.find_by_id("h1").unwrap();
        assert_eq!(case.first_criterion, Criterion::Lactate);
        assert_eq!(case.first_time, dt(10, 13));
        assert_eq!(case.first_criterion_no_lactate, Some(Criterion::Vasopressor));
        assert_eq!(case.first_time_no_lactate, Some(dt(10, 13)));
        assert!(case.is_case_without_lactate());
        assert_eq!(case.infection_time, dt(10, 12));
    }

    #[test]
    fn lactate_only_case_loses_caseness_without_lactate() {
        let cohort = bare_cohort(vec![hosp("h1"), hosp("h2")]);
        let infections: PresumedInfections = [
            anchor("h1", dt(10, 12)),
            anchor("h2", dt(10, 12)),
        ]
        .into_iter()
        .collect();
        let dysfunctions: Dysfunctions = [row("h1", Criterion::Lactate, dt(10, 13))]
            .into_iter()
            .collect();

        let cases = SepsisCases::assemble(&cohort, &infections, &dysfunctions);
        // h2 has an anchor but no criterion, so it is not a case at all.
        assert_eq!(cases.len(), 1);
        let case = cases.find_by_id("h1").unwrap();
        assert_eq!(case.first_criterion, Criterion::Lactate);
        assert!(!case.is_case_without_lactate());
        assert_eq!(case.first_criterion_no_lactate, None);
        assert_eq!(case.criterion_time(Criterion::Lactate), Some(dt(10, 13)));
        assert_eq!(case.criterion_time(Criterion::Aki), None);
    }

    fn end_to_end_cohort() -> Cohort {
        let mut cohort = bare_cohort(vec![hosp("h1")]);
        cohort.cultures = [Culture {
            hospitalization_id: "h1".into(),
            collect_time: dt(10, 12),
        }]
        .into_iter()
        .collect();
        cohort.antibiotics = (10..14)
            .map(|day| AntibioticDose {
                hospitalization_id: "h1".into(),
                admin_time: dt(day, 13),
            })
            .collect();
        cohort.vasoactives = [VasoactiveDose {
            hospitalization_id: "h1".into(),
            admin_time: dt(11, 12),
            category: VasoCategory::Norepinephrine,
            dose: 8.0,
        }]
        .into_iter()
        .collect();
        // Far outside any anchor window.
        cohort.imv_records = [ImvRecord {
            hospitalization_id: "h1".into(),
            recorded_time: dt(1, 8),
        }]
        .into_iter()
        .collect();
        // Below the lactate threshold.
        cohort.labs = [Lab {
            hospitalization_id: "h1".into(),
            category: LabCategory::Lactate,
            value: 1.0,
            result_time: dt(10, 13),
        }]
        .into_iter()
        .collect();
        cohort
    }

    #[test]
    fn end_to_end_vasopressor_case() {
        let cohort = end_to_end_cohort();
        let adjudication = adjudicate(&cohort).unwrap();

        assert_eq!(adjudication.infections.len(), 1);
        assert_eq!(adjudication.cases.len(), 1);
        let case = adjudication.cases.find_by_id("h1").unwrap();
        assert_eq!(case.infection_time, dt(10, 12));
        assert_eq!(case.first_criterion, Criterion::Vasopressor);
        assert_eq!(case.first_time, dt(11, 12));
        // No lactate event, so excluding lactate changes nothing.
        assert_eq!(case.first_criterion_no_lactate, Some(Criterion::Vasopressor));
        assert_eq!(case.first_time_no_lactate, Some(dt(11, 12)));
    }

    #[test]
    fn adjudication_is_deterministic() {
        let cohort = end_to_end_cohort();
        let a = adjudicate(&cohort).unwrap();
        let b = adjudicate(&cohort).unwrap();
        let a_bytes = bincode::serialize(&a.cases.els).unwrap();
        let b_bytes = bincode::serialize(&b.cases.els).unwrap();
        assert_eq!(a_bytes, b_bytes);
    }
}
