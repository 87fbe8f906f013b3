use log::{info, warn};

use crate::command::{Command, Script};
use crate::pool::{Pool, PoolError, PoolResult};
use crate::report;
use crate::strategy::Strategy;

/// A command that failed during a run. Failures do not stop
/// the simulation; they are collected and listed at the end
/// of the report.
#[derive(Debug)]
pub struct Failure {
    /// Position of the command in the script, starting at 1.
    pub index: usize,
    pub command: Command,
    pub error: PoolError,
}

/// The outcome of running a script under one strategy.
pub struct Run {
    pub strategy: Strategy,
    /// Final state of the pool after the last command.
    pub pool: Pool,
    pub failures: Vec<Failure>,
    /// Reports emitted by `O` commands, in script order.
    pub snapshots: Vec<String>,
}

/// Runs a parsed script against a fresh pool, once per chosen
/// strategy. The script itself is immutable; each run starts
/// from an empty pool of the script's size.
pub struct Simulation {
    script: Script,
}

impl Simulation {
    pub fn new(script: Script) -> Self {
        Self { script }
    }

    pub fn size(&self) -> u64 {
        self.script.size
    }

    pub fn run(&self, strategy: Strategy) -> PoolResult<Run> {
        let mut pool = Pool::new(self.script.size)?;
        let mut failures = Vec::new();
        let mut snapshots = Vec::new();

        for (index, command) in self.script.commands.iter().enumerate() {
            let index = index + 1;

            let result = match *command {
                Command::Alloc { id, size } => pool.allocate(id, size, strategy).map(|_| ()),
                Command::Dealloc { id } => pool.deallocate(id),
                Command::Compact => pool.compact(),
                Command::Report => {
                    snapshots.push(report::render(&pool, &failures));
                    Ok(())
                }
            };

            // A failed command leaves the pool untouched, so
            // the run can simply carry on with the next one.
            if let Err(error) = result {
                warn!("{}: command {} ({}) failed: {}", strategy, index, command, error);
                failures.push(Failure {
                    index,
                    command: *command,
                    error,
                });
            }
        }

        info!(
            "{}: ran {} commands, {} failed, {} of {} bytes in use",
            strategy,
            self.script.commands.len(),
            failures.len(),
            pool.used_bytes(),
            pool.size(),
        );

        Ok(Run {
            strategy,
            pool,
            failures,
            snapshots,
        })
    }
}
