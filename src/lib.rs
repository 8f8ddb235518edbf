pub use anyhow::{Context, Error};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs, io,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use crate::{
    range::{Range, RangeSet, RangeSetCounts},
    util::{header, show_dttm, show_opt_dttm},
};
use crate::util::{
    discharge_category, dttm, maybe_lab_category, maybe_vaso_category, opt_date, opt_dttm, opt_f64,
    sex,
};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
pub type PatientId = ArcStr;
pub type HospitalizationId = ArcStr;

/// Generates a typed record store with a pre-built `hospitalization_id`
/// index. All the event-level tables share this shape; only the loading of
/// the original extract differs per store.
macro_rules! hosp_store {
    ($(#[$attr:meta])* $store:ident, $el:ty) => {
        $(#[$attr])*
        pub struct $store {
            els: ::std::vec::Vec<$el>,
            hosp_idx: ::std::collections::BTreeMap<$crate::HospitalizationId, ::std::vec::Vec<usize>>,
        }

        impl $store {
            fn new(els: ::std::vec::Vec<$el>) -> Self {
                let mut this = Self {
                    els,
                    hosp_idx: ::std::collections::BTreeMap::new(),
                };
                this.rebuild_index();
                this
            }

            fn rebuild_index(&mut self) {
                self.hosp_idx.clear();
                for (idx, el) in self.els.iter().enumerate() {
                    self.hosp_idx
                        .entry(::std::sync::Arc::clone(&el.hospitalization_id))
                        .or_insert_with(::std::vec::Vec::new)
                        .push(idx);
                }
            }

            pub fn load(path: impl AsRef<::std::path::Path>) -> $crate::Result<Self> {
                Ok(Self::new($crate::load(path)?))
            }

            pub fn save(&self, path: impl AsRef<::std::path::Path>) -> $crate::Result {
                Ok($crate::save(&self.els, path)?)
            }

            /// Iterate over all records, in extract order.
            pub fn iter(&self) -> impl Iterator<Item = $el> + '_ {
                self.els.iter().cloned()
            }

            /// Iterate over the records of one hospitalization, in extract order.
            pub fn for_hospitalization(
                &self,
                id: &str,
            ) -> impl Iterator<Item = &$el> + Clone + '_ {
                let idxs = match self.hosp_idx.get(id) {
                    Some(idxs) => idxs,
                    None => return ::itertools::Either::Left(::std::iter::empty()),
                };
                ::itertools::Either::Right(idxs.iter().map(|idx| {
                    self.els
                        .get(*idx)
                        .expect("inconsistent hospitalization index")
                }))
            }

            /// Hospitalization ids with at least one record, ascending.
            pub fn hospitalization_ids(
                &self,
            ) -> impl Iterator<Item = &$crate::HospitalizationId> + '_ {
                self.hosp_idx.keys()
            }
        }

        impl ::std::ops::Deref for $store {
            type Target = [$el];
            fn deref(&self) -> &Self::Target {
                &self.els
            }
        }

        impl<'a> IntoIterator for &'a $store {
            type IntoIter = <&'a [$el] as IntoIterator>::IntoIter;
            type Item = &'a $el;
            fn into_iter(self) -> Self::IntoIter {
                self.els.iter()
            }
        }

        impl ::std::iter::FromIterator<$el> for $store {
            fn from_iter<T>(iter: T) -> Self
            where
                T: IntoIterator<Item = $el>,
            {
                Self::new(iter.into_iter().collect())
            }
        }
    };
}

pub mod assemble;
pub mod baseline;
pub mod dysfunction;
pub mod infection;
mod range;
mod util;
pub mod window;

#[derive(Debug, Clone, Deserialize)]
struct HospitalizationRaw {
    hospitalization_id: HospitalizationId,
    patient_id: PatientId,
    #[serde(rename = "admission_dttm", deserialize_with = "dttm")]
    admission_time: NaiveDateTime,
    #[serde(rename = "discharge_dttm", deserialize_with = "dttm")]
    discharge_time: NaiveDateTime,
    #[serde(deserialize_with = "discharge_category")]
    discharge_category: DischargeCategory,
}

/// A row in the hospitalization dataset.
///
/// In this and the other stores, `hospitalization_id` always identifies the
/// same hospital stay, and `patient_id` the same person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospitalization {
    pub hospitalization_id: HospitalizationId,
    pub patient_id: PatientId,
    pub admission_time: NaiveDateTime,
    pub discharge_time: NaiveDateTime,
    pub discharge_category: DischargeCategory,
}

impl From<HospitalizationRaw> for Hospitalization {
    fn from(from: HospitalizationRaw) -> Self {
        Self {
            hospitalization_id: from.hospitalization_id,
            patient_id: from.patient_id,
            admission_time: from.admission_time,
            discharge_time: from.discharge_time,
            discharge_category: from.discharge_category,
        }
    }
}

/// The parsed list of hospitalizations, with a pre-built index for the
/// `hospitalization_id` field.
pub struct Hospitalizations {
    els: Vec<Hospitalization>,
    id_idx: BTreeMap<HospitalizationId, usize>,
}

impl Hospitalizations {
    fn new(els: Vec<Hospitalization>) -> Self {
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

    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<HospitalizationRaw> = load_orig(path)?;
        Ok(Self::new(els.into_iter().map(Into::into).collect()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        Ok(save(&self.els, path)?)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Hospitalization> {
        let idx = self.id_idx.get(id)?;
        self.els.get(*idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = Hospitalization> + '_ {
        self.els.iter().cloned()
    }
}

impl Deref for Hospitalizations {
    type Target = [Hospitalization];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Hospitalization> for Hospitalizations {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Hospitalization>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PatientRaw {
    patient_id: PatientId,
    #[serde(rename = "sex_category", deserialize_with = "sex")]
    sex: Sex,
    #[serde(deserialize_with = "opt_date")]
    birth_date: Option<NaiveDate>,
    #[serde(rename = "death_dttm", deserialize_with = "opt_dttm")]
    death_time: Option<NaiveDateTime>,
}

/// A row in the patient dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: PatientId,
    pub sex: Sex,
    pub birth_date: Option<NaiveDate>,
    pub death_time: Option<NaiveDateTime>,
}

impl From<PatientRaw> for Patient {
    fn from(from: PatientRaw) -> Self {
        Self {
            patient_id: from.patient_id,
            sex: from.sex,
            birth_date: from.birth_date,
            death_time: from.death_time,
        }
    }
}

impl Patient {
    /// Age in whole years at `date`, if the birth date is recorded.
    pub fn age_at(&self, date: NaiveDate) -> Option<i32> {
        let birth = self.birth_date?;
        let mut age = date.year() - birth.year();
        if (date.month(), date.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        Some(age)
    }
}

/// The parsed list of patients, with a pre-built index for the `patient_id`
/// field.
pub struct Patients {
    els: Vec<Patient>,
    id_idx: BTreeMap<PatientId, usize>,
}

impl Patients {
    fn new(els: Vec<Patient>) -> Self {
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
            .map(|(idx, el)| (Arc::clone(&el.patient_id), idx))
            .collect();
    }

    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<PatientRaw> = load_orig(path)?;
        Ok(Self::new(els.into_iter().map(Into::into).collect()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        Ok(save(&self.els, path)?)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Patient> {
        let idx = self.id_idx.get(id)?;
        self.els.get(*idx)
    }

    pub fn count_sexes(&self) -> BTreeMap<Sex, usize> {
        // B Tree so we get a predictable ordering.
        let mut map = BTreeMap::new();
        // Manually insert to make sure all categories are included.
        map.insert(Sex::Male, 0);
        map.insert(Sex::Female, 0);
        map.insert(Sex::Unknown, 0);
        for el in self.els.iter() {
            *map.entry(el.sex).or_insert(0) += 1;
        }
        map
    }

    pub fn iter(&self) -> impl Iterator<Item = Patient> + '_ {
        self.els.iter().cloned()
    }
}

impl Deref for Patients {
    type Target = [Patient];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Patient> for Patients {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Patient>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct CultureRaw {
    hospitalization_id: HospitalizationId,
    fluid_category: ArcStr,
    #[serde(rename = "collect_dttm", deserialize_with = "dttm")]
    collect_time: NaiveDateTime,
}

/// A blood culture collection. Cultures of other fluids are dropped at
/// import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Culture {
    pub hospitalization_id: HospitalizationId,
    pub collect_time: NaiveDateTime,
}

impl Culture {
    fn from_raw(raw: CultureRaw) -> Option<Self> {
        if !raw.fluid_category.trim().eq_ignore_ascii_case("blood") {
            return None;
        }
        Some(Culture {
            hospitalization_id: raw.hospitalization_id,
            collect_time: raw.collect_time,
        })
    }
}

hosp_store! {
    /// The parsed list of blood cultures, with a pre-built index for the
    /// `hospitalization_id` field.
    Cultures, Culture
}

impl Cultures {
    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<CultureRaw> = load_orig(path)?;
        Ok(els.into_iter().filter_map(Culture::from_raw).collect())
    }
}

/// Antimicrobial groups that count towards qualifying antimicrobial days,
/// matched case-insensitively against the `med_group` column of the
/// intermittent medication table.
pub static QUALIFYING_ANTIMICROBIALS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "aminoglycosides",
        "azoles",
        "carbapenems",
        "cephalosporins",
        "echinocandins",
        "fluoroquinolones",
        "glycopeptides",
        "glycylcyclines",
        "lincosamides",
        "lipopeptides",
        "macrolides",
        "monobactams",
        "nitroimidazoles",
        "oxazolidinones",
        "penicillins",
        "polyenes",
        "polymyxins",
        "rifamycins",
        "sulfonamides",
        "tetracyclines",
    ]
    .into_iter()
    .collect()
});

pub fn is_qualifying_antimicrobial(med_group: &str) -> bool {
    QUALIFYING_ANTIMICROBIALS.contains(med_group.trim().to_ascii_lowercase().as_str())
}

#[derive(Debug, Deserialize)]
struct AntibioticDoseRaw {
    hospitalization_id: HospitalizationId,
    #[serde(rename = "admin_dttm", deserialize_with = "dttm")]
    admin_time: NaiveDateTime,
    med_group: ArcStr,
}

/// One administration of a qualifying antimicrobial. Other medication groups
/// are dropped at import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntibioticDose {
    pub hospitalization_id: HospitalizationId,
    pub admin_time: NaiveDateTime,
}

impl AntibioticDose {
    fn from_raw(raw: AntibioticDoseRaw) -> Option<Self> {
        if !is_qualifying_antimicrobial(&raw.med_group) {
            return None;
        }
        Some(AntibioticDose {
            hospitalization_id: raw.hospitalization_id,
            admin_time: raw.admin_time,
        })
    }
}

hosp_store! {
    /// The parsed list of qualifying antimicrobial administrations, with a
    /// pre-built index for the `hospitalization_id` field.
    AntibioticDoses, AntibioticDose
}

impl AntibioticDoses {
    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<AntibioticDoseRaw> = load_orig(path)?;
        Ok(els
            .into_iter()
            .filter_map(AntibioticDose::from_raw)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct VasoactiveDoseRaw {
    hospitalization_id: HospitalizationId,
    #[serde(rename = "admin_dttm", deserialize_with = "dttm")]
    admin_time: NaiveDateTime,
    #[serde(rename = "med_category", deserialize_with = "maybe_vaso_category")]
    category: Option<VasoCategory>,
    #[serde(rename = "med_dose", deserialize_with = "opt_f64")]
    dose: Option<f64>,
}

/// One continuous-infusion record for a vasoactive drug. Records with other
/// categories, a missing dose or a dose ≤ 0 are dropped at import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VasoactiveDose {
    pub hospitalization_id: HospitalizationId,
    pub admin_time: NaiveDateTime,
    pub category: VasoCategory,
    pub dose: f64,
}

impl VasoactiveDose {
    fn from_raw(raw: VasoactiveDoseRaw) -> Option<Self> {
        let category = raw.category?;
        let dose = raw.dose.filter(|dose| *dose > 0.0)?;
        Some(VasoactiveDose {
            hospitalization_id: raw.hospitalization_id,
            admin_time: raw.admin_time,
            category,
            dose,
        })
    }
}

hosp_store! {
    /// The parsed list of vasoactive infusion records, with a pre-built index
    /// for the `hospitalization_id` field.
    VasoactiveDoses, VasoactiveDose
}

impl VasoactiveDoses {
    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<VasoactiveDoseRaw> = load_orig(path)?;
        Ok(els
            .into_iter()
            .filter_map(VasoactiveDose::from_raw)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ImvRecordRaw {
    hospitalization_id: HospitalizationId,
    #[serde(rename = "recorded_dttm", deserialize_with = "dttm")]
    recorded_time: NaiveDateTime,
    device_category: ArcStr,
}

/// One respiratory-support observation on invasive mechanical ventilation.
/// Other device categories are dropped at import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImvRecord {
    pub hospitalization_id: HospitalizationId,
    pub recorded_time: NaiveDateTime,
}

impl ImvRecord {
    fn from_raw(raw: ImvRecordRaw) -> Option<Self> {
        if !raw.device_category.trim().eq_ignore_ascii_case("imv") {
            return None;
        }
        Some(ImvRecord {
            hospitalization_id: raw.hospitalization_id,
            recorded_time: raw.recorded_time,
        })
    }
}

hosp_store! {
    /// The parsed list of invasive-ventilation observations, with a pre-built
    /// index for the `hospitalization_id` field.
    ImvRecords, ImvRecord
}

impl ImvRecords {
    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<ImvRecordRaw> = load_orig(path)?;
        Ok(els.into_iter().filter_map(ImvRecord::from_raw).collect())
    }
}

#[derive(Debug, Deserialize)]
struct LabRaw {
    hospitalization_id: HospitalizationId,
    #[serde(rename = "lab_category", deserialize_with = "maybe_lab_category")]
    category: Option<LabCategory>,
    #[serde(rename = "lab_value_numeric", deserialize_with = "opt_f64")]
    value: Option<f64>,
    #[serde(rename = "lab_result_dttm", deserialize_with = "dttm")]
    result_time: NaiveDateTime,
}

/// One numeric lab result in a tracked category. Other categories and
/// missing or non-finite values are dropped at import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lab {
    pub hospitalization_id: HospitalizationId,
    pub category: LabCategory,
    pub value: f64,
    pub result_time: NaiveDateTime,
}

impl Lab {
    fn from_raw(raw: LabRaw) -> Option<Self> {
        let category = raw.category?;
        let value = raw.value?;
        Some(Lab {
            hospitalization_id: raw.hospitalization_id,
            category,
            value,
            result_time: raw.result_time,
        })
    }
}

hosp_store! {
    /// The parsed list of tracked lab results, with a pre-built index for the
    /// `hospitalization_id` field.
    Labs, Lab
}

impl Labs {
    pub fn load_orig(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<LabRaw> = load_orig(path)?;
        Ok(els.into_iter().filter_map(Lab::from_raw).collect())
    }
}

// Sub-types

/// Sex as recorded in the patient table.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("Male"),
            Sex::Female => f.write_str("Female"),
            Sex::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Discharge disposition of a hospitalization.
///
/// `Expired`, `Hospice` and `AcuteCareHospital` end observation, so they
/// define a censoring time together with the death timestamp.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum DischargeCategory {
    Home,
    SkilledNursingFacility,
    AcuteInpatientRehab,
    Ltach,
    GroupHome,
    Psychiatric,
    Jail,
    AgainstMedicalAdvice,
    AcuteCareHospital,
    Hospice,
    Expired,
    Other,
    Missing,
}

impl DischargeCategory {
    pub const ALL: [DischargeCategory; 13] = {
        use DischargeCategory::*;
        [
            Home,
            SkilledNursingFacility,
            AcuteInpatientRehab,
            Ltach,
            GroupHome,
            Psychiatric,
            Jail,
            AgainstMedicalAdvice,
            AcuteCareHospital,
            Hospice,
            Expired,
            Other,
            Missing,
        ]
    };

    /// Whether this disposition means no further observation was possible.
    pub fn is_terminal(self) -> bool {
        use DischargeCategory::*;
        matches!(self, Expired | Hospice | AcuteCareHospital)
    }
}

impl fmt::Display for DischargeCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DischargeCategory::*;
        let s = match self {
            Home => "Home",
            SkilledNursingFacility => "Skilled nursing facility",
            AcuteInpatientRehab => "Acute inpatient rehab",
            Ltach => "LTACH",
            GroupHome => "Group home",
            Psychiatric => "Psychiatric hospital",
            Jail => "Jail",
            AgainstMedicalAdvice => "Against medical advice",
            AcuteCareHospital => "Acute care hospital",
            Hospice => "Hospice",
            Expired => "Expired",
            Other => "Other",
            Missing => "Missing",
        };
        f.write_str(s)
    }
}

/// The lab analytes read by the organ-dysfunction criteria.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum LabCategory {
    Creatinine,
    BilirubinTotal,
    PlateletCount,
    Lactate,
}

impl LabCategory {
    pub const ALL: [LabCategory; 4] = [
        LabCategory::Creatinine,
        LabCategory::BilirubinTotal,
        LabCategory::PlateletCount,
        LabCategory::Lactate,
    ];

    pub fn from_label(s: &str) -> Option<Self> {
        use LabCategory::*;
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "creatinine" => Creatinine,
            "bilirubin_total" => BilirubinTotal,
            "platelet_count" => PlateletCount,
            "lactate" => Lactate,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        use LabCategory::*;
        match self {
            Creatinine => "creatinine",
            BilirubinTotal => "bilirubin_total",
            PlateletCount => "platelet_count",
            Lactate => "lactate",
        }
    }
}

impl fmt::Display for LabCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The vasoactive drug categories that count for the vasopressor criterion.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum VasoCategory {
    Norepinephrine,
    Epinephrine,
    Phenylephrine,
    Vasopressin,
    Dopamine,
    Angiotensin,
}

impl VasoCategory {
    pub const ALL: [VasoCategory; 6] = [
        VasoCategory::Norepinephrine,
        VasoCategory::Epinephrine,
        VasoCategory::Phenylephrine,
        VasoCategory::Vasopressin,
        VasoCategory::Dopamine,
        VasoCategory::Angiotensin,
    ];

    pub fn from_label(s: &str) -> Option<Self> {
        use VasoCategory::*;
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "norepinephrine" => Norepinephrine,
            "epinephrine" => Epinephrine,
            "phenylephrine" => Phenylephrine,
            "vasopressin" => Vasopressin,
            "dopamine" => Dopamine,
            "angiotensin" => Angiotensin,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        use VasoCategory::*;
        match self {
            Norepinephrine => "norepinephrine",
            Epinephrine => "epinephrine",
            Phenylephrine => "phenylephrine",
            Vasopressin => "vasopressin",
            Dopamine => "dopamine",
            Angiotensin => "angiotensin",
        }
    }
}

impl fmt::Display for VasoCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// All the typed stores of one cohort extract, loaded together.
///
/// Built from the original CSV extract with `load_orig`, or from the bincode
/// caches written by `import_data` with `load`.
pub struct Cohort {
    pub hospitalizations: Hospitalizations,
    pub patients: Patients,
    pub cultures: Cultures,
    pub antibiotics: AntibioticDoses,
    pub vasoactives: VasoactiveDoses,
    pub imv_records: ImvRecords,
    pub labs: Labs,
}

impl Cohort {
    pub fn load_orig() -> Result<Self> {
        Ok(Cohort {
            hospitalizations: Hospitalizations::load_orig("hospitalization.csv")?,
            patients: Patients::load_orig("patient.csv")?,
            cultures: Cultures::load_orig("microbiology_culture.csv")?,
            antibiotics: AntibioticDoses::load_orig("medication_admin_intermittent.csv")?,
            vasoactives: VasoactiveDoses::load_orig("medication_admin_continuous.csv")?,
            imv_records: ImvRecords::load_orig("respiratory_support.csv")?,
            labs: Labs::load_orig("labs.csv")?,
        })
    }

    pub fn load() -> Result<Self> {
        Ok(Cohort {
            hospitalizations: Hospitalizations::load("hospitalizations.bin")?,
            patients: Patients::load("patients.bin")?,
            cultures: Cultures::load("cultures.bin")?,
            antibiotics: AntibioticDoses::load("antibiotic_doses.bin")?,
            vasoactives: VasoactiveDoses::load("vasoactive_doses.bin")?,
            imv_records: ImvRecords::load("imv_records.bin")?,
            labs: Labs::load("labs.bin")?,
        })
    }

    pub fn save(&self) -> Result {
        self.hospitalizations.save("hospitalizations.bin")?;
        self.patients.save("patients.bin")?;
        self.cultures.save("cultures.bin")?;
        self.antibiotics.save("antibiotic_doses.bin")?;
        self.vasoactives.save("vasoactive_doses.bin")?;
        self.imv_records.save("imv_records.bin")?;
        self.labs.save("labs.bin")?;
        Ok(())
    }

    /// Fail, naming the offending table, if any input table is empty after
    /// the import filters.
    pub fn ensure_populated(&self) -> Result {
        ensure!(
            !self.hospitalizations.is_empty(),
            "hospitalization table is empty"
        );
        ensure!(!self.patients.is_empty(), "patient table is empty");
        ensure!(
            !self.cultures.is_empty(),
            "microbiology_culture table has no blood cultures"
        );
        ensure!(
            !self.antibiotics.is_empty(),
            "medication_admin_intermittent table has no qualifying antimicrobials"
        );
        ensure!(
            !self.vasoactives.is_empty(),
            "medication_admin_continuous table has no vasoactive doses"
        );
        ensure!(
            !self.imv_records.is_empty(),
            "respiratory_support table has no IMV records"
        );
        ensure!(
            !self.labs.is_empty(),
            "labs table has no results in the tracked categories"
        );
        Ok(())
    }

    /// Death time of the patient of `hosp`, if recorded.
    pub fn death_time(&self, hosp: &Hospitalization) -> Option<NaiveDateTime> {
        self.patients.find_by_id(&hosp.patient_id)?.death_time
    }
}

/// Load data into memory.
pub(crate) fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    fn inner<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let path = output_path(path);
        let reader = io::BufReader::new(fs::File::open(path)?);
        bincode::deserialize_from(reader).map_err(Into::into)
    }
    let path = path.as_ref();
    check_extension(path, "bin")?;

    inner(path).with_context(|| format!("unable to load data from \"{}\"", path.display()))
}

/// Save data to disk.
pub(crate) fn save<T: Serialize>(contents: &[T], path: impl AsRef<Path>) -> Result {
    fn inner<T: Serialize>(contents: &[T], path: &Path) -> Result {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("could not create parent")?;
        }
        if util::path_exists(path)? {
            event!(
                Level::WARN,
                "overwriting existing file at \"{}\"",
                path.display()
            );
        }
        let mut out = io::BufWriter::new(fs::File::create(path)?);
        bincode::serialize_into(&mut out, contents)?;
        Ok(())
    }
    let path = path.as_ref();
    let path = output_path(path);
    check_extension(&path, "bin")?;

    inner(contents, &path).with_context(|| format!("unable to save data to \"{}\"", path.display()))
}

/// Load data into memory from the original cohort extract.
pub(crate) fn load_orig<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let path = orig_path(path);
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)?
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("while loading \"{}\"", path.display()))
}

/// Note: No protection from escaping the root directory.
pub fn orig_path(input: &Path) -> PathBuf {
    Path::new("data/extract").join(input)
}

/// Note: No protection from escaping the root directory.
pub fn output_path(input: &Path) -> PathBuf {
    Path::new("data/output").join(input)
}

pub fn check_extension(path: &Path, ext: &str) -> Result<()> {
    ensure!(
        matches!(path.extension(), Some(p) if p == ext),
        "filename should end with `.{}`",
        ext
    );
    Ok(())
}
