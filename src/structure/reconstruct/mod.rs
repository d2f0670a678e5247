//! The ordered battery of local expression rewrites.
//!
//! Each pass is a single left-to-right scan over one instruction list that
//! deletes or replaces nodes in place. The order is a dependency graph, not a
//! style choice: the if+goto collapse must run before comparison aggregation,
//! aggregation before assert and ternary folding, and the dup cleanup last,
//! after every pass that consumes dup-carried values.

mod assert_stmt;
mod assignment_operator;
mod comparison;
mod dot_class;
mod dup_cleanup;
mod empty_synchronized;
mod if_goto;
mod init_array;
mod ternary;

pub(crate) use dup_cleanup::single_dup_load_cleanup;
pub(crate) use ternary::ternary_in_return;

use super::Ctx;
use crate::instruction::Instruction;

/// Run the full battery over one list.
pub(crate) fn execute_reconstructors(ctx: &mut Ctx, list: &mut Vec<Instruction>) {
    empty_synchronized::reconstruct(ctx.local_variables, list);
    if ctx.options.recognize_dot_class {
        dot_class::reconstruct(ctx.class, ctx.reference_map, list);
    }
    // Before comparison aggregation.
    if_goto::reconstruct(list);
    // After the if+goto collapse, before ternary folding.
    comparison::aggregate(list);
    // After comparison aggregation.
    if ctx.options.desugar_assert {
        assert_stmt::reconstruct(&ctx.class.constant_pool, list);
    }
    // After comparison aggregation.
    ternary::reconstruct(list);
    init_array::reconstruct(list);
    assignment_operator::reconstruct(list);
    dup_cleanup::remove_dup_constants(list);
}
