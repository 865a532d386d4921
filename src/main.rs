use std::path::PathBuf;

use clap::Parser;
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, IntoDiagnostic, Result};
use obsrange::{MappingDatabase, Measurement, RangeRule, RangeValidator, RuleDatabase, UnitDatabase};
use rustyline::DefaultEditor;
use tokio::runtime::{Builder, Runtime};

/// Checks measurements, entered like `489.5331 nmol/L`, against every rule in a rule database
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// A KDL file of named range rules
    #[arg(short, long)]
    rules: PathBuf,
    /// A KDL file of observation mapping documents, used to look up molecular weights
    #[arg(short, long)]
    mappings: PathBuf,
    /// Treat conversions that need a molecular weight as failures, instead of consulting the mappings
    #[arg(long, default_value_t = false)]
    no_molecular_weight_fallback: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let unit_db = UnitDatabase::default();
    let (rule_db, mapping_db) = runtime.block_on(async {
        tokio::try_join!(
            RuleDatabase::load(&unit_db, &args.rules),
            MappingDatabase::load(&unit_db, &args.mappings)
        )
    })?;

    let validator = RangeValidator::new(&unit_db, &mapping_db)
        .with_molecular_weight_fallback(!args.no_molecular_weight_fallback);

    let mut rl = DefaultEditor::new().into_diagnostic()?;
    while let Ok(line) = rl.readline("Measurement: ") {
        rl.add_history_entry(&line).into_diagnostic()?;
        match line.parse::<Measurement>() {
            Ok(measurement) => {
                for (name, rule) in rule_db.iter() {
                    check_rule(&runtime, &validator, &measurement, name, rule);
                }
                println!();
            }
            Err(diagnostic) => render_error(diagnostic),
        }
    }

    Ok(())
}

fn check_rule(
    runtime: &Runtime,
    validator: &RangeValidator<&UnitDatabase, &MappingDatabase>,
    measurement: &Measurement,
    name: &str,
    rule: &RangeRule,
) {
    // SAFETY: Every rule in a `RuleDatabase` has been checked to have bounds
    let bounds = rule.bounds().unwrap();
    let verdict = runtime.block_on(validator.is_within_rule_range(measurement, rule));
    match verdict {
        Ok(true) => println!("{name}: within range ({bounds} {})", rule.unit()),
        Ok(false) => println!("{name}: outside range ({bounds} {})", rule.unit()),
        Err(diagnostic) => {
            println!("{name}: could not be checked");
            render_error(*diagnostic);
        }
    }
}

fn render_error(diagnostic: impl Into<Box<dyn Diagnostic + 'static>>) {
    let mut buf = String::new();
    GraphicalReportHandler::new_themed(GraphicalTheme::unicode())
        .render_report(&mut buf, diagnostic.into().as_ref())
        .unwrap();
    println!("{buf}");
}
