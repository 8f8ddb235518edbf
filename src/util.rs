use crate::{DischargeCategory, LabCategory, Sex, VasoCategory};
use chrono::{NaiveDate, NaiveDateTime};
use noisy_float::prelude::*;
use serde::{de, Deserialize, Deserializer};
use std::{fs, io, path::Path};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

// Helpers for serde to parse fields with quirks.

/// The extract writes missing values as empty strings or one of these markers.
fn is_null_marker(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case("na")
        || s.eq_ignore_ascii_case("nat")
        || s.eq_ignore_ascii_case("null")
}

fn parse_dttm(s: &str) -> Option<NaiveDateTime> {
    // Extracts vary between space- and T-separated timestamps, with or
    // without fractional seconds and a UTC offset.
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(v) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(v);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(v) = chrono::DateTime::parse_from_str(s, fmt) {
            return Some(v.naive_utc());
        }
    }
    None
}

/// Parse a timestamp column that must be present.
pub fn dttm<'de, D>(d: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    parse_dttm(s).ok_or_else(|| de::Error::custom(format!("unparseable timestamp: {:?}", s)))
}

/// Like `dttm`, but maps missing-value markers to `None`.
pub fn opt_dttm<'de, D>(d: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_null_marker(s) {
        return Ok(None);
    }
    match parse_dttm(s) {
        Some(v) => Ok(Some(v)),
        None => Err(de::Error::custom(format!("unparseable timestamp: {:?}", s))),
    }
}

/// Parse a date-only column (e.g. birth_date), mapping missing markers to `None`.
pub fn opt_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_null_marker(s) {
        return Ok(None);
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(v) => Ok(Some(v)),
        Err(e) => Err(de::Error::custom(format!("unparseable date {:?}: {}", s, e))),
    }
}

/// Parse a numeric column, mapping missing markers and non-finite values to `None`.
pub fn opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_null_marker(s) {
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(v) => Ok(R64::try_new(v).map(|v| v.raw())),
        Err(e) => Err(de::Error::custom(format!("unparseable number {:?}: {}", s, e))),
    }
}

/// Parse the sex category. Anything not recognisably male/female is `Unknown`.
pub fn sex<'de, D>(d: D) -> Result<Sex, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    Ok(match s.trim().to_ascii_lowercase().as_str() {
        "male" | "m" => Sex::Male,
        "female" | "f" => Sex::Female,
        _ => Sex::Unknown,
    })
}

/// Parse the discharge disposition category, with an `Other` catch-all so an
/// unmapped site value never aborts an import.
pub fn discharge_category<'de, D>(d: D) -> Result<DischargeCategory, D::Error>
where
    D: Deserializer<'de>,
{
    use DischargeCategory::*;
    let s: &str = Deserialize::deserialize(d)?;
    let s = s.trim();
    if is_null_marker(s) || s.eq_ignore_ascii_case("missing") {
        return Ok(Missing);
    }
    Ok(match s.to_ascii_lowercase().as_str() {
        "home" => Home,
        "expired" | "died" => Expired,
        "hospice" => Hospice,
        "acute care hospital" => AcuteCareHospital,
        "skilled nursing facility (snf)" | "snf" => SkilledNursingFacility,
        "acute inpatient rehab facility" | "acute inpatient rehab" => AcuteInpatientRehab,
        "long term care hospital (ltach)" | "ltach" => Ltach,
        "against medical advice (ama)" | "ama" => AgainstMedicalAdvice,
        "group home" => GroupHome,
        "psychiatric hospital" => Psychiatric,
        "jail" => Jail,
        _ => Other,
    })
}

/// Parse a lab category, mapping untracked categories to `None` so the import
/// filter can drop them.
pub fn maybe_lab_category<'de, D>(d: D) -> Result<Option<LabCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    Ok(LabCategory::from_label(s))
}

/// Parse a vasoactive drug category, mapping other drugs to `None` so the
/// import filter can drop them.
pub fn maybe_vaso_category<'de, D>(d: D) -> Result<Option<VasoCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    Ok(VasoCategory::from_label(s))
}

// Display helpers shared by the CSV export and the terminal tables.

pub fn show_dttm(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn show_opt_dttm(t: Option<NaiveDateTime>) -> String {
    t.map(show_dttm).unwrap_or_default()
}

pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

#[cfg(test)]
mod test {
    use super::parse_dttm;

    #[test]
    fn timestamp_formats() {
        let expect = chrono::NaiveDate::from_ymd_opt(2023, 4, 2)
            .unwrap()
            .and_hms_opt(13, 5, 0)
            .unwrap();
        for s in [
            "2023-04-02 13:05:00",
            "2023-04-02T13:05:00",
            "2023-04-02 13:05",
            "2023-04-02 13:05:00.000",
            "2023-04-02 13:05:00+00:00",
        ] {
            assert_eq!(parse_dttm(s), Some(expect), "failed for {:?}", s);
        }
        assert_eq!(parse_dttm("02/04/2023"), None);
    }
}
