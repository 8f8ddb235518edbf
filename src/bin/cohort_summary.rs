use ase_surveillance::{
    assemble::SepsisCases, dysfunction::Criterion, header, infection::PresumedInfections,
    show_dttm, Cohort, DischargeCategory, RangeSet, Sex,
};
use chrono::Datelike;
use qu::ick_use::*;
use std::collections::BTreeMap;
use term_data_table::{Cell, Row, Table};

#[qu::ick]
fn main() -> Result {
    let cohort = Cohort::load()?;
    let infections = PresumedInfections::load("presumed_infection.bin")?;
    let cases = SepsisCases::load("sepsis_cases.bin")?;

    let hosp_count = cohort.hospitalizations.len();
    let case_count = cases.len();

    header("Cohort");
    println!("hospitalizations: {}", hosp_count);
    println!("patients: {}", cohort.patients.len());
    let first_admission = cohort
        .hospitalizations
        .iter()
        .map(|hosp| hosp.admission_time)
        .min();
    let last_admission = cohort
        .hospitalizations
        .iter()
        .map(|hosp| hosp.admission_time)
        .max();
    if let (Some(first), Some(last)) = (first_admission, last_admission) {
        println!("admissions from {} to {}", show_dttm(first), show_dttm(last));
    }

    header("Sepsis incidence");
    println!(
        "hospitalizations with presumed infection: {}",
        infections.hospitalization_ids().count()
    );
    println!(
        "sepsis cases: {} ({:.1}% of hospitalizations)",
        case_count,
        pct(case_count, hosp_count)
    );
    let without_lactate = cases
        .iter()
        .filter(|case| case.is_case_without_lactate())
        .count();
    println!(
        "cases still qualifying without lactate: {} ({:.1}% of cases)",
        without_lactate,
        pct(without_lactate, case_count)
    );
    println!(
        "cases relying on lactate alone: {}",
        case_count - without_lactate
    );

    header("Cases by admission year");
    let mut by_year: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
    for hosp in cohort.hospitalizations.iter() {
        let slot = by_year.entry(hosp.admission_time.year()).or_default();
        slot.0 += 1;
        if cases.find_by_id(&hosp.hospitalization_id).is_some() {
            slot.1 += 1;
        }
    }
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Year"))
            .with_cell(Cell::from("Hospitalizations"))
            .with_cell(Cell::from("Cases"))
            .with_cell(Cell::from("Incidence")),
    );
    for (year, (total, met)) in by_year {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(year.to_string()))
                .with_cell(Cell::from(total.to_string()))
                .with_cell(Cell::from(met.to_string()))
                .with_cell(Cell::from(format!("{:.1}%", pct(met, total)))),
        );
    }
    println!("{}", table);

    header("Criteria among cases");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Criterion"))
            .with_cell(Cell::from("Met"))
            .with_cell(Cell::from("Percentage"))
            .with_cell(Cell::from("First met")),
    );
    for criterion in Criterion::ALL {
        let met = cases
            .iter()
            .filter(|case| case.criterion_time(criterion).is_some())
            .count();
        let first = cases
            .iter()
            .filter(|case| case.first_criterion == criterion)
            .count();
        table.add_row(
            Row::new()
                .with_cell(Cell::from(criterion.label()))
                .with_cell(Cell::from(met.to_string()))
                .with_cell(Cell::from(format!("{:.1}%", pct(met, case_count))))
                .with_cell(Cell::from(first.to_string())),
        );
    }
    println!("{}", table);

    header("Age at admission (cases)");
    let age_ranges = RangeSet::from_bounds([18, 30, 45, 60, 75]);
    let ages = cases.iter().map(|case| {
        cohort
            .patients
            .find_by_id(&case.patient_id)
            .and_then(|patient| patient.age_at(case.admission_time.date()))
    });
    let buckets = age_ranges.bucket_values(ages);
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Age"))
            .with_cell(Cell::from("Cases"))
            .with_cell(Cell::from("Percentage")),
    );
    for (range, count) in buckets.iter() {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(range.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!("{:.1}%", pct(count, case_count)))),
        );
    }
    table.add_row(
        Row::new()
            .with_cell(Cell::from("Missing"))
            .with_cell(Cell::from(buckets.missing().to_string()))
            .with_cell(Cell::from(format!(
                "{:.1}%",
                pct(buckets.missing(), case_count)
            ))),
    );
    println!("{}", table);

    header("Sex");
    let all_sexes = cohort.patients.count_sexes();
    let mut case_sexes: BTreeMap<Sex, usize> = all_sexes.keys().map(|sex| (*sex, 0)).collect();
    for case in cases.iter() {
        if let Some(patient) = cohort.patients.find_by_id(&case.patient_id) {
            *case_sexes.entry(patient.sex).or_insert(0) += 1;
        }
    }
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Sex"))
            .with_cell(Cell::from("Patients"))
            .with_cell(Cell::from("Cases")),
    );
    for (sex, patients) in &all_sexes {
        let with_case = case_sexes.get(sex).copied().unwrap_or(0);
        table.add_row(
            Row::new()
                .with_cell(Cell::from(sex.to_string()))
                .with_cell(Cell::from(patients.to_string()))
                .with_cell(Cell::from(with_case.to_string())),
        );
    }
    println!("{}", table);

    header("Discharge disposition (cases)");
    let mut dispositions: BTreeMap<DischargeCategory, usize> = DischargeCategory::ALL
        .into_iter()
        .map(|category| (category, 0))
        .collect();
    for case in cases.iter() {
        if let Some(hosp) = cohort.hospitalizations.find_by_id(&case.hospitalization_id) {
            *dispositions.entry(hosp.discharge_category).or_insert(0) += 1;
        }
    }
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Disposition"))
            .with_cell(Cell::from("Cases"))
            .with_cell(Cell::from("Percentage")),
    );
    for (disposition, count) in dispositions {
        table.add_row(
            Row::new()
                .with_cell(Cell::from(disposition.to_string()))
                .with_cell(Cell::from(count.to_string()))
                .with_cell(Cell::from(format!("{:.1}%", pct(count, case_count)))),
        );
    }
    println!("{}", table);
    Ok(())
}

fn pct(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.
    } else {
        num as f64 / denom as f64 * 100.
    }
}
