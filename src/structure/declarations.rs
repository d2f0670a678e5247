//! Local-variable declaration placement.
//!
//! Stores whose variable is still undeclared and whose live range fits the
//! current block become declarations in place; a store immediately returned
//! on the same line fuses into the return instead. Variables never hit by a
//! store get a bare declaration at their `start_pc`. A final pass over the
//! finished tree removes re-declarations that nested blocks inherited.

use std::collections::HashSet;

use crate::instruction::{Instruction, Op, UNKNOWN_LINE_NUMBER};
use crate::local_variables::{LocalVariables, DECLARED, NOT_DECLARED};

use super::util::index_for_offset;
use super::Ctx;

pub(crate) fn add_declarations(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    before_list_offset: i32,
) {
    if list.is_empty() {
        return;
    }
    let last_offset = list.last().map(|i| i.offset).unwrap_or(before_list_offset);

    // 1) Declarations on store instructions and for-loop inits.
    let mut i = 0;
    while i < list.len() {
        if list[i].is_store() {
            let slot = list[i].store_slot().unwrap_or(0);
            let offset = list[i].offset;
            let line_number = list[i].line_number;
            let lv = match ctx.local_variables.with_index_and_offset(slot, offset) {
                Some(lv) if lv.declaration_flag == NOT_DECLARED => (lv.start_pc, lv.length),
                _ => {
                    i += 1;
                    continue;
                }
            };
            let (lv_start_pc, lv_length) = lv;

            if let Some(return_line) = return_for_store(list, i, slot) {
                if return_line == line_number {
                    // `int x = expr; return x;` compacts into `return expr;`.
                    let store = list.remove(i);
                    let valueref = match store.op {
                        Op::AStore { valueref, .. }
                        | Op::IStore { valueref, .. }
                        | Op::Store { valueref, .. } => valueref,
                        _ => unreachable!(),
                    };
                    if let Op::XReturn { valueref: return_value } = &mut list[i].op {
                        *return_value = valueref;
                    }
                    if let Some(lv) =
                        ctx.local_variables.with_index_and_offset_mut(slot, offset)
                    {
                        lv.to_be_removed = true;
                    }
                    continue;
                }
            }

            if before_list_offset < lv_start_pc && lv_start_pc + lv_length - 1 <= last_offset {
                let mut store = list.remove(i);
                update_new_and_init_array(&mut store);
                list.insert(
                    i,
                    Instruction::new(
                        offset,
                        line_number,
                        Op::Declare { lv_index: slot, lv_start_pc, store: Some(Box::new(store)) },
                    ),
                );
                if let Some(lv) = ctx.local_variables.with_index_and_offset_mut(slot, offset) {
                    lv.declaration_flag = DECLARED;
                }
            }
        } else if let Op::For { init: Some(init), .. } = &list[i].op {
            if init.is_store() {
                let slot = init.store_slot().unwrap_or(0);
                let offset = init.offset;
                let in_range = ctx
                    .local_variables
                    .with_index_and_offset(slot, offset)
                    .map(|lv| {
                        lv.declaration_flag == NOT_DECLARED
                            && before_list_offset < lv.start_pc
                            && lv.start_pc + lv.length - 1 <= last_offset
                    })
                    .unwrap_or(false);
                if in_range {
                    let lv_start_pc = ctx
                        .local_variables
                        .with_index_and_offset(slot, offset)
                        .map(|lv| lv.start_pc)
                        .unwrap_or(offset);
                    if let Op::For { init: Some(init), .. } = &mut list[i].op {
                        let mut store = std::mem::replace(
                            init.as_mut(),
                            Instruction::new(offset, UNKNOWN_LINE_NUMBER, Op::Return),
                        );
                        update_new_and_init_array(&mut store);
                        let line_number = store.line_number;
                        **init = Instruction::new(
                            offset,
                            line_number,
                            Op::Declare {
                                lv_index: slot,
                                lv_start_pc,
                                store: Some(Box::new(store)),
                            },
                        );
                    }
                    if let Some(lv) =
                        ctx.local_variables.with_index_and_offset_mut(slot, offset)
                    {
                        lv.declaration_flag = DECLARED;
                    }
                }
            }
        }
        i += 1;
    }

    // 2) Bare declarations for everything still undeclared in this range.
    add_orphan_declarations(ctx.local_variables, list, before_list_offset, last_offset);
}

fn add_orphan_declarations(
    local_variables: &mut LocalVariables,
    list: &mut Vec<Instruction>,
    before_list_offset: i32,
    last_offset: i32,
) {
    for i in 0..local_variables.len() {
        let (slot, start_pc) = {
            let Some(lv) = local_variables.get(i) else { continue };
            if lv.declaration_flag != NOT_DECLARED
                || lv.to_be_removed
                || before_list_offset >= lv.start_pc
                || lv.start_pc + lv.length - 1 > last_offset
            {
                continue;
            }
            (lv.index, lv.start_pc)
        };
        let insert_index = index_for_offset(list, start_pc).unwrap_or(0);
        list.insert(
            insert_index,
            Instruction::new(
                start_pc,
                UNKNOWN_LINE_NUMBER,
                Op::Declare { lv_index: slot, lv_start_pc: start_pc, store: None },
            ),
        );
        if let Some(lv) = local_variables.get_mut(i) {
            lv.declaration_flag = DECLARED;
        }
    }
}

/// Line number of a `return x` that immediately follows a store to `x`.
fn return_for_store(list: &[Instruction], i: usize, slot: u16) -> Option<i32> {
    let next = list.get(i + 1)?;
    match &next.op {
        Op::XReturn { valueref } if valueref.load_slot() == Some(slot) => Some(next.line_number),
        _ => None,
    }
}

/// An initializer in declaration position renders with braces only.
fn update_new_and_init_array(store: &mut Instruction) {
    if let Op::AStore { valueref, .. } = &mut store.op {
        if matches!(valueref.op, Op::NewAndInitArray { .. }) {
            let op = std::mem::replace(&mut valueref.op, Op::Return);
            valueref.op = match op {
                Op::NewAndInitArray { new_array, values } => Op::InitArray { new_array, values },
                other => other,
            };
        }
    }
}

/// Remove re-declarations of unassigned variables and turn assigned
/// re-declarations back into plain assignments. Each nested block starts
/// from an immutable snapshot of every declaration visible above it, so
/// fresh declarations never leak to siblings.
pub(crate) fn manage_redeclared_variables(list: &mut Vec<Instruction>) {
    manage(&HashSet::new(), &mut HashSet::new(), list);
}

fn manage(
    outside: &HashSet<(u16, i32)>,
    inside: &mut HashSet<(u16, i32)>,
    list: &mut Vec<Instruction>,
) {
    let mut i = 0;
    while i < list.len() {
        let action = match &mut list[i].op {
            Op::Declare { lv_index, lv_start_pc, store } => {
                let key = (*lv_index, *lv_start_pc);
                if inside.contains(&key) || outside.contains(&key) {
                    match store.take() {
                        // Re-declaration without assignment: drop it.
                        None => Some(None),
                        // Assigned re-declaration: back to a plain store.
                        Some(s) if s.is_store() => Some(Some(*s)),
                        Some(kept) => {
                            *store = Some(kept);
                            None
                        }
                    }
                } else {
                    inside.insert(key);
                    None
                }
            }
            _ => None,
        };
        match action {
            Some(None) => {
                list.remove(i);
                continue;
            }
            Some(Some(replacement)) => list[i] = replacement,
            None => {}
        }

        let mut blocks = child_blocks(&mut list[i]);
        if !blocks.is_empty() {
            let merged: HashSet<(u16, i32)> = outside.union(inside).copied().collect();
            for block in blocks.iter_mut() {
                manage(&merged, &mut HashSet::new(), block);
            }
        }
        i += 1;
    }
}

/// The child scopes that can re-declare a variable declared above them.
fn child_blocks(instruction: &mut Instruction) -> Vec<&mut Vec<Instruction>> {
    match &mut instruction.op {
        Op::IfElse { instructions, else_instructions, .. } => {
            vec![instructions, else_instructions]
        }
        Op::Try { instructions, catches, finally_instructions, .. } => {
            let mut blocks = vec![instructions];
            for c in catches.iter_mut() {
                blocks.push(&mut c.instructions);
            }
            if let Some(f) = finally_instructions {
                blocks.push(f);
            }
            blocks
        }
        _ => Vec::new(),
    }
}
