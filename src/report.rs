//! Read-only rendering of a pool's state. The pool itself
//! never formats anything; this module walks its regions and
//! produces the listing the driver prints.

use std::fmt::Write;

use crate::pool::Pool;
use crate::simulation::Failure;

/// Renders a human-readable listing of the pool: its size,
/// the allocated and free regions in address order (ends are
/// exclusive), the fragmentation ratio, and any failures
/// recorded so far.
pub fn render(pool: &Pool, failures: &[Failure]) -> String {
    let mut out = String::new();
    let regions = pool.regions();

    // Writing to a String cannot fail, so the results of
    // write! are safe to discard.
    let _ = writeln!(out, "Size:\n{}", pool.size());

    let _ = writeln!(out, "Allocated blocks:");
    for region in regions.iter().filter(|region| !region.is_free()) {
        let _ = writeln!(out, "{}", region);
    }

    let _ = writeln!(out, "Free blocks:");
    for region in regions.iter().filter(|region| region.is_free()) {
        let _ = writeln!(out, "{}", region);
    }

    let _ = writeln!(out, "Fragmentation:\n{}", pool.fragmentation_ratio());

    let _ = writeln!(out, "Errors:");
    for failure in failures {
        let _ = writeln!(out, "{}: {}: {}", failure.index, failure.command, failure.error);
    }
    if failures.is_empty() {
        let _ = writeln!(out, "None");
    }

    out
}
