use ase_surveillance::{Cohort, LabCategory, VasoCategory};
use qu::ick_use::*;

#[qu::ick]
fn main() -> Result {
    let cohort = Cohort::load_orig()?;
    cohort.save()?;

    println!("hospitalizations: {}", cohort.hospitalizations.len());
    println!("patients: {}", cohort.patients.len());
    println!("blood cultures: {}", cohort.cultures.len());
    println!(
        "qualifying antimicrobial doses: {}",
        cohort.antibiotics.len()
    );
    println!("vasoactive doses: {}", cohort.vasoactives.len());
    for category in VasoCategory::ALL {
        let count = cohort
            .vasoactives
            .iter()
            .filter(|dose| dose.category == category)
            .count();
        println!("  {}: {}", category, count);
    }
    println!("IMV records: {}", cohort.imv_records.len());
    println!("lab results: {}", cohort.labs.len());
    for category in LabCategory::ALL {
        let count = cohort
            .labs
            .iter()
            .filter(|lab| lab.category == category)
            .count();
        println!("  {}: {}", category, count);
    }
    Ok(())
}
