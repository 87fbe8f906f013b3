use anyhow::{Context, Result};
use log::*;

use memsim::{
    command::Script,
    report,
    simulation::Simulation,
    strategy::Strategy,
};

fn main() -> Result<()> {
    std::env::set_var("RUST_LOG", "info");
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("Usage: memsim <script-file> [strategy]")?;

    // With an explicit strategy the script runs under that
    // one alone; without, it is replayed under all three so
    // the placements can be compared.
    let strategies = match args.next() {
        Some(name) => vec![name.parse::<Strategy>()?],
        None => Strategy::ALL.to_vec(),
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read script '{}'", path))?;
    let script: Script = text.parse()?;
    let simulation = Simulation::new(script);

    info!("Loaded '{}': pool of {} bytes", path, simulation.size());

    for strategy in strategies {
        let run = simulation.run(strategy)?;

        println!("=== {} ===", strategy);
        for snapshot in &run.snapshots {
            print!("{}", snapshot);
        }
        print!("{}", report::render(&run.pool, &run.failures));
    }

    Ok(())
}
