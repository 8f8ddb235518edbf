use ase_surveillance::{
    assemble::{self, Adjudication},
    dysfunction::Criterion,
    header, Cohort,
};
use clap::Parser;
use qu::ick_use::*;
use term_data_table::{Cell, Row, Table};

#[derive(Parser)]
pub struct Opt {
    /// Skip the CSV export of the case table.
    #[clap(long, short)]
    skip_csv: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let cohort = Cohort::load()?;
    let adjudication = assemble::adjudicate(&cohort)?;
    adjudication.save()?;
    if !opt.skip_csv {
        adjudication.cases.export_csv("sepsis_cases.csv")?;
    }
    let Adjudication {
        infections,
        dysfunctions,
        cases,
    } = &adjudication;

    header("Stages");
    println!("hospitalizations: {}", cohort.hospitalizations.len());
    println!(
        "hospitalizations with presumed infection: {}",
        infections.hospitalization_ids().count()
    );
    println!("presumed-infection anchors: {}", infections.len());
    println!("anchored organ-dysfunction rows: {}", dysfunctions.len());
    println!("sepsis cases: {}", cases.len());
    println!(
        "sepsis cases without lactate: {}",
        cases
            .iter()
            .filter(|case| case.is_case_without_lactate())
            .count()
    );

    header("Criteria");
    let mut table = Table::new().with_row(
        Row::new()
            .with_cell(Cell::from("Criterion"))
            .with_cell(Cell::from("Rows"))
            .with_cell(Cell::from("First met")),
    );
    for criterion in Criterion::ALL {
        let rows = dysfunctions.for_criterion(criterion).count();
        let first = cases
            .iter()
            .filter(|case| case.first_criterion == criterion)
            .count();
        table.add_row(
            Row::new()
                .with_cell(Cell::from(criterion.label()))
                .with_cell(Cell::from(rows.to_string()))
                .with_cell(Cell::from(first.to_string())),
        );
    }
    println!("{}", table);
    Ok(())
}
