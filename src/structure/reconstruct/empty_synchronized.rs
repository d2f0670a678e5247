//! Cleanup of `monitorenter`/`monitorexit` pairs bracketing no instructions.

use crate::instruction::{Instruction, Op};
use crate::local_variables::LocalVariables;

/// Rewrite `astore N = expr; monitorenter(N); monitorexit(N)` into an empty
/// `synchronized (expr) {}` block and drop bare adjacent monitor pairs.
pub(crate) fn reconstruct(local_variables: &mut LocalVariables, list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i + 1 < list.len() {
        if let Some(slot) = monitor_pair_slot(&list[i], &list[i + 1]) {
            if i > 0 && stores_slot(&list[i - 1], slot) {
                // Captured monitor: keep the expression, drop the slot.
                let exit_offset = list[i + 1].offset;
                let line_number = list[i].line_number;
                list.remove(i + 1);
                list.remove(i);
                let astore = list.remove(i - 1);
                let (index, monitor) = match astore.op {
                    Op::AStore { index, valueref } => (index, valueref),
                    _ => unreachable!(),
                };
                local_variables.remove_with_index_and_offset(index, astore.offset);
                list.insert(
                    i - 1,
                    Instruction::new(
                        exit_offset,
                        line_number,
                        Op::Synchronized { monitor, branch: 1, instructions: Vec::new() },
                    ),
                );
                continue;
            }
            // No recognizable capture: the pair guards nothing, drop it.
            list.remove(i + 1);
            list.remove(i);
            continue;
        }
        i += 1;
    }
}

fn monitor_pair_slot(enter: &Instruction, exit: &Instruction) -> Option<u16> {
    let enter_slot = match &enter.op {
        Op::MonitorEnter { objectref } => match objectref.op {
            Op::ALoad { index } => Some(index),
            Op::DupLoad { .. } => None,
            _ => return None,
        },
        _ => return None,
    };
    match &exit.op {
        Op::MonitorExit { objectref } => match objectref.op {
            Op::ALoad { index } => {
                if enter_slot.is_none() || enter_slot == Some(index) {
                    Some(index)
                } else {
                    None
                }
            }
            _ => None,
        },
        _ => None,
    }
}

fn stores_slot(instruction: &Instruction, slot: u16) -> bool {
    matches!(instruction.op, Op::AStore { index, .. } if index == slot)
}
