//! Jump rewriting and label insertion.
//!
//! After loops, switches and conditionals are built, the remaining jumps are
//! rewritten into `break`/`continue`, inlined returns, duplicated
//! method-ending returns, or registered as labeled breaks. Registered label
//! offsets are resolved last by descending the finished tree and wrapping
//! the deepest node at each offset.

use crate::bytecode::{self, RawLoad};
use crate::error::StructureError;
use crate::instruction::{Instruction, Op, UNKNOWN_LINE_NUMBER};

use super::util::{index_for_offset, method_returned_signature};
use super::{Ctx, Scope};

pub(crate) fn create_break_and_continue(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
) -> Result<(), StructureError> {
    let mut index = 0;
    while index < list.len() {
        if list[index].is_conditional_branch() {
            let jump_offset = list[index].jump_offset().unwrap_or(-1);
            let offset = list[index].offset;
            let line_number = list[index].line_number;

            if scope.before_loop_entry < jump_offset && jump_offset <= scope.loop_entry {
                let test = take(list, index);
                list[index] = Instruction::new(
                    offset,
                    line_number,
                    Op::IfContinue { test: Box::new(test) },
                );
            } else if bytecode::jump_to(ctx.code, scope.break_offset, jump_offset) {
                let test = take(list, index);
                list[index] =
                    Instruction::new(offset, line_number, Op::IfBreak { test: Box::new(test) });
            } else if bytecode::jump_to(ctx.code, jump_offset, ctx.return_offset) {
                // The jump reaches the method's final return: if-return.
                let test = take(list, index);
                list[index] = Instruction::new(
                    offset,
                    line_number,
                    Op::IfSimple {
                        branch: jump_offset - offset,
                        test: Box::new(test),
                        instructions: vec![Instruction::new(
                            offset,
                            UNKNOWN_LINE_NUMBER,
                            Op::Return,
                        )],
                    },
                );
            } else if let Some(load) = bytecode::trailing_load_return(ctx.code, jump_offset) {
                // Duplicate the method-ending load/return rather than label it.
                let test = take(list, index);
                let return_instruction = duplicated_return(load, offset, UNKNOWN_LINE_NUMBER);
                list[index] = Instruction::new(
                    offset,
                    line_number,
                    Op::IfSimple {
                        branch: jump_offset - offset,
                        test: Box::new(test),
                        instructions: vec![return_instruction],
                    },
                );
            } else {
                ctx.label_offsets.insert(jump_offset);
                let test = take(list, index);
                list[index] = Instruction::new(
                    offset,
                    line_number,
                    Op::IfLabeledBreak { test: Box::new(test), target: jump_offset },
                );
            }
        } else if matches!(list[index].op, Op::Goto { .. }) {
            let jump_offset = list[index].jump_offset().unwrap_or(-1);
            let offset = list[index].offset;
            let mut line_number = list[index].line_number;
            if index == 0 || list[index - 1].line_number == line_number {
                line_number = UNKNOWN_LINE_NUMBER;
            }

            if scope.before_loop_entry < jump_offset && jump_offset <= scope.loop_entry {
                if scope.after_list == scope.after_body_loop && index + 1 == list.len() {
                    // The goto is the loop's last instruction: implicit.
                    list.remove(index);
                    continue;
                }
                list[index] = Instruction::new(offset, line_number, Op::GotoContinue);
            } else if bytecode::jump_to(ctx.code, scope.break_offset, jump_offset) {
                list[index] = Instruction::new(offset, line_number, Op::GotoBreak);
            } else if bytecode::jump_to(ctx.code, jump_offset, ctx.return_offset) {
                list[index] = Instruction::new(offset, line_number, Op::Return);
            } else if let Some(load) = bytecode::trailing_load_return(ctx.code, jump_offset) {
                let mut return_instruction = duplicated_return(load, offset, line_number);
                // Fuse with a preceding same-line store of the same slot.
                if index > 0 {
                    let fuse = {
                        let previous = &list[index - 1];
                        previous.is_store()
                            && previous.line_number == return_instruction.line_number
                            && previous.store_slot() == duplicated_slot(load)
                    };
                    if fuse {
                        let previous = list.remove(index - 1);
                        index -= 1;
                        if let Some(valueref) = previous.store_valueref() {
                            if let Op::XReturn { valueref: rv } = &mut return_instruction.op {
                                *rv = Box::new(valueref.clone());
                            }
                        }
                    }
                }
                list[index] = return_instruction;
            } else {
                ctx.label_offsets.insert(jump_offset);
                list[index] =
                    Instruction::new(offset, line_number, Op::GotoLabeledBreak { target: jump_offset });
            }
        }
        index += 1;
    }
    Ok(())
}

fn take(list: &mut [Instruction], index: usize) -> Instruction {
    std::mem::replace(
        &mut list[index],
        Instruction::new(0, UNKNOWN_LINE_NUMBER, Op::Return),
    )
}

fn duplicated_slot(load: RawLoad) -> Option<u16> {
    match load {
        RawLoad::ALoad(slot) | RawLoad::ILoad(slot) | RawLoad::Typed(slot, _) => Some(slot),
    }
}

fn duplicated_return(load: RawLoad, offset: i32, line_number: i32) -> Instruction {
    let load_op = match load {
        RawLoad::ALoad(index) => Op::ALoad { index },
        RawLoad::ILoad(index) => Op::ILoad { index },
        RawLoad::Typed(index, signature) => {
            Op::Load { index, signature: signature.to_string() }
        }
    };
    Instruction::new(
        offset,
        line_number,
        Op::XReturn { valueref: Box::new(Instruction::new(offset, line_number, load_op)) },
    )
}

/// Drop a `goto` that jumps to the lexically next instruction.
pub(crate) fn remove_nop_goto(list: &mut Vec<Instruction>) {
    if list.len() < 2 {
        return;
    }
    let mut next_offset = list.last().map(|i| i.offset).unwrap_or(-1);
    let mut index = list.len() - 1;
    while index > 0 {
        index -= 1;
        let instruction = &list[index];
        let offset = instruction.offset;
        if let Op::Goto { branch } = instruction.op {
            if branch >= 0 && offset + branch <= next_offset {
                list.remove(index);
            }
        }
        next_offset = offset;
    }
}

/// Same cleanup against the block end: a trailing `goto` out of the list is
/// the fall-through the block boundary already provides.
pub(crate) fn remove_no_jump_goto(list: &mut Vec<Instruction>, after_list_offset: i32) {
    let Some(last) = list.last() else { return };
    let mut last_offset = last.offset;
    if let Op::Goto { branch } = last.op {
        if branch >= 0 && last.offset + branch <= after_list_offset {
            list.pop();
        }
    }
    let mut index = list.len().saturating_sub(1);
    while index > 0 {
        index -= 1;
        let instruction = &list[index];
        let offset = instruction.offset;
        if let Op::Goto { branch } = instruction.op {
            if branch >= 0 && offset + branch <= last_offset {
                list.remove(index);
            }
        }
        last_offset = offset;
    }
}

/// Drop the synthetic trailing `return` the compiler appends: its line
/// number runs backwards relative to its predecessor.
pub(crate) fn remove_synthetic_return(
    list: &mut Vec<Instruction>,
    after_list_offset: i32,
    return_offset: i32,
) {
    if after_list_offset != return_offset {
        return;
    }
    match list.len() {
        0 => {}
        1 => remove_return_at(list, 0),
        len => {
            if list[len - 1].line_number < list[len - 2].line_number {
                remove_return_at(list, len - 1);
            }
        }
    }
}

fn remove_return_at(list: &mut Vec<Instruction>, index: usize) {
    match &mut list[index].op {
        Op::Return => {
            list.remove(index);
        }
        Op::Label { wrapped } => {
            if matches!(wrapped.as_deref().map(|i| &i.op), Some(Op::Return)) {
                *wrapped = None;
            }
        }
        _ => {}
    }
}

/// Add an explicit cast on an `areturn` whose reconstructed value signature
/// is `Object` while the method returns something more specific. The target
/// signature is appended to the constant pool.
pub(crate) fn add_cast_instruction_on_return(ctx: &mut Ctx, list: &mut [Instruction]) {
    let signature_index = if ctx.method_signature_index != 0 {
        ctx.method_signature_index
    } else {
        ctx.method_descriptor_index
    };
    let method_signature = match ctx.class.constant_pool.get_utf8(signature_index) {
        Some(descriptor) => method_returned_signature(descriptor).to_string(),
        None => return,
    };
    if method_signature == "Ljava/lang/Object;" {
        return;
    }

    for instruction in list.iter_mut() {
        let needs_cast = match &instruction.op {
            Op::XReturn { valueref } => {
                valueref
                    .returned_signature(&ctx.class.constant_pool, ctx.local_variables)
                    .as_deref()
                    == Some("Ljava/lang/Object;")
            }
            _ => false,
        };
        if !needs_cast {
            continue;
        }
        let new_signature_index = ctx.class.constant_pool.add_utf8(&method_signature);
        if let Op::XReturn { valueref } = &mut instruction.op {
            if let Op::CheckCast { index, .. } = &mut valueref.op {
                *index = new_signature_index;
            } else {
                let offset = valueref.offset;
                let line_number = valueref.line_number;
                let inner = std::mem::replace(
                    valueref.as_mut(),
                    Instruction::new(offset, line_number, Op::Return),
                );
                **valueref = Instruction::new(
                    offset,
                    line_number,
                    Op::CheckCast { index: new_signature_index, objectref: Box::new(inner) },
                );
            }
        }
    }
}

/// Resolve every registered label offset by wrapping the deepest node at
/// that offset in a `Label`.
pub(crate) fn add_labels(list: &mut Vec<Instruction>, label_offsets: &std::collections::BTreeSet<i32>) {
    for &label_offset in label_offsets.iter().rev() {
        search_instruction_and_add_label(list, label_offset);
    }
}

/// Returns false when no instruction matches the offset.
fn search_instruction_and_add_label(list: &mut Vec<Instruction>, label_offset: i32) -> bool {
    let Some(index) = index_for_offset(list, label_offset) else {
        return false;
    };

    let found = match &mut list[index].op {
        Op::InfiniteLoop { instructions, .. } => {
            search_instruction_and_add_label(instructions, label_offset)
        }
        Op::While { test, instructions, .. }
        | Op::DoWhile { test, instructions, .. }
        | Op::IfSimple { test, instructions, .. } => {
            if label_offset >= test.offset {
                search_instruction_and_add_label(instructions, label_offset)
            } else {
                false
            }
        }
        Op::Synchronized { monitor, instructions, .. } => {
            if label_offset >= monitor.offset {
                search_instruction_and_add_label(instructions, label_offset)
            } else {
                false
            }
        }
        Op::For { init, instructions, .. } => {
            if init.as_ref().map(|i| label_offset >= i.offset).unwrap_or(true) {
                search_instruction_and_add_label(instructions, label_offset)
            } else {
                false
            }
        }
        Op::IfElse { test, instructions, else_instructions, .. } => {
            if label_offset >= test.offset {
                search_instruction_and_add_label(instructions, label_offset)
                    || search_instruction_and_add_label(else_instructions, label_offset)
            } else {
                false
            }
        }
        Op::FastSwitch { test, pairs, .. } => {
            let mut found = false;
            if label_offset >= test.offset {
                for pair in pairs.iter_mut().rev() {
                    if found {
                        break;
                    }
                    if let Some(instructions) = &mut pair.instructions {
                        found = search_instruction_and_add_label(instructions, label_offset);
                    }
                }
            }
            found
        }
        Op::Try { instructions, catches, finally_instructions, .. } => {
            let mut found = search_instruction_and_add_label(instructions, label_offset);
            for c in catches.iter_mut() {
                if found {
                    break;
                }
                found = search_instruction_and_add_label(&mut c.instructions, label_offset);
            }
            if !found {
                if let Some(finally_instructions) = finally_instructions {
                    found = search_instruction_and_add_label(finally_instructions, label_offset);
                }
            }
            found
        }
        _ => false,
    };

    if !found {
        let wrapped = take(list, index);
        let line_number = wrapped.line_number;
        list[index] = Instruction::new(
            label_offset,
            line_number,
            Op::Label { wrapped: Some(Box::new(wrapped)) },
        );
    }
    true
}
