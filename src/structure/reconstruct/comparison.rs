//! Comparison aggregation.
//!
//! First the `lcmp`/`fcmp?`/`dcmp?` results tested against zero fold into a
//! direct three-operand compare-and-branch. Then adjacent conditional
//! branches born from one source condition (same line) aggregate into a
//! single multi-test node, so the later recognizers see one test per
//! source-level condition.

use crate::instruction::{BoolOp, Instruction, Op, UNKNOWN_LINE_NUMBER};

pub(crate) fn aggregate(list: &mut Vec<Instruction>) {
    fold_cmp_results(list);
    aggregate_adjacent(list);
}

fn fold_cmp_results(list: &mut [Instruction]) {
    for instruction in list.iter_mut() {
        let op = std::mem::replace(&mut instruction.op, Op::Return);
        instruction.op = match op {
            Op::If { cmp, value, branch } => {
                if matches!(value.op, Op::Cmp { .. }) {
                    match value.op {
                        Op::Cmp { value1, value2, .. } => Op::IfCmp { cmp, value1, value2, branch },
                        _ => unreachable!(),
                    }
                } else {
                    Op::If { cmp, value, branch }
                }
            }
            other => other,
        };
    }
}

fn aggregate_adjacent(list: &mut Vec<Instruction>) {
    let mut changed = true;
    while changed {
        changed = false;
        let mut i = 0;
        while i + 1 < list.len() {
            if !list[i].is_conditional_branch() || !list[i + 1].is_conditional_branch() {
                i += 1;
                continue;
            }
            let line = list[i].line_number;
            if line == UNKNOWN_LINE_NUMBER || line != list[i + 1].line_number {
                i += 1;
                continue;
            }
            let first_target = list[i].jump_offset().unwrap_or(-1);
            let second_target = list[i + 1].jump_offset().unwrap_or(-1);

            if first_target == second_target {
                // Both jump out on success: either sub-test takes the branch.
                let first = list.remove(i);
                merge_into(&mut list[i], first, BoolOp::Or, false);
                changed = true;
                continue;
            }

            let after_second = if i + 2 < list.len() { list[i + 2].offset } else { -1 };
            if first_target == after_second && after_second != -1 {
                // First test shortcuts over the second: invert it and require
                // both for the branch.
                let first = list.remove(i);
                merge_into(&mut list[i], first, BoolOp::And, true);
                changed = true;
                continue;
            }
            i += 1;
        }
    }
}

fn merge_into(second: &mut Instruction, mut first: Instruction, cmp: BoolOp, invert_first: bool) {
    if invert_first {
        first.invert_test();
    }
    let offset = second.offset;
    let line_number = first.line_number;
    let branch = second.branch().unwrap_or(1);
    let old_second = std::mem::replace(
        second,
        Instruction::new(offset, line_number, Op::Return),
    );

    let mut instructions = Vec::new();
    push_flattened(&mut instructions, first, cmp);
    push_flattened(&mut instructions, old_second, cmp);

    second.op = Op::ComplexIf { cmp, instructions, branch };
}

fn push_flattened(out: &mut Vec<Instruction>, instruction: Instruction, cmp: BoolOp) {
    match instruction.op {
        Op::ComplexIf { cmp: inner, instructions, .. } if inner == cmp => {
            out.extend(instructions);
        }
        _ => out.push(instruction),
    }
}
