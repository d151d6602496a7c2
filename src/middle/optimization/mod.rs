//! Machine independent cleanup of the IR. Every pass works in place and
//! only ever ignores instructions or rewrites them where they stand, so an
//! instruction index means the same thing for the whole optimization.

use tracing::debug;

use crate::middle::ir::Program;

mod passes;
pub mod usage;

pub const DEFAULT_MAX_ROUNDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizationStats {
    pub rounds: usize,
    /// Instructions that were live before optimizing and are ignored now
    pub ignored: usize,
    /// Whether the last round changed nothing
    pub converged: bool,
}

/// Runs dead assignment elimination, copy propagation, constant folding and
/// control flow cleanup, in that order, until a round changes nothing or
/// `max_rounds` rounds have run.
pub fn optimize(program: &mut Program, max_rounds: usize) -> OptimizationStats {
    let live_before = program.live_count();
    let mut stats = OptimizationStats::default();

    while stats.rounds < max_rounds {
        stats.rounds += 1;

        let dead = passes::eliminate_dead_assignments(program);
        let copies = passes::propagate_copies(program);
        let folded = passes::fold_constants(program);
        let control_flow = passes::clean_up_control_flow(program);

        debug!(
            round = stats.rounds,
            dead,
            copies,
            folded,
            control_flow,
            live = program.live_count(),
            "optimization round"
        );

        if dead + copies + folded + control_flow == 0 {
            stats.converged = true;
            break;
        }
    }

    stats.ignored = live_before - program.live_count();
    stats
}
