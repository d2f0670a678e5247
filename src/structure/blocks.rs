//! Builders turning aggregated protected regions into nested nodes.
//!
//! Both builders splice instructions out of the flat list in reverse offset
//! order, restore source order by reversing, run the expression battery over
//! each extracted body, and replace the region's anchor slot with the new
//! compound node.

use crate::error::StructureError;
use crate::instruction::{FastCatch, Instruction, Op, UNKNOWN_LINE_NUMBER};

use super::exception::{FastCodeException, RangeKind};
use super::reconstruct;
use super::util::{index_for_offset, search_min_escape_offset};
use super::Ctx;

/// Build a `synchronized` block from a monitor-protected region.
pub(crate) fn create_synchronized_block(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
) -> Result<(), StructureError> {
    let index = index_for_offset(list, fce.try_from_offset)
        .ok_or(StructureError::OutOfBounds { offset: fce.try_from_offset })?;

    if fce.kind == RangeKind::FinallySubroutine {
        create_synchronized_subroutine(ctx, list, fce, index)
    } else if fce.kind == RangeKind::SynchronizedDouble {
        create_synchronized_double(ctx, list, fce, index)
    } else if matches!(list[index].op, Op::MonitorExit { .. }) {
        if index == 0 {
            Err(StructureError::UnexpectedInstruction { offset: fce.try_from_offset })
        } else if matches!(list[index - 1].op, Op::MonitorEnter { .. }) {
            create_empty_synchronized_118(ctx, list, fce, index - 1)
        } else {
            create_synchronized_jikes_122(ctx, list, fce, index - 1)
        }
    } else {
        create_synchronized_general(ctx, list, fce, index)
    }
}

/// JDK 1.1 form: the monitor cleanup lives in a `jsr` subroutine.
fn create_synchronized_subroutine(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
    try_from_index: usize,
) -> Result<(), StructureError> {
    let finally_index = index_for_offset(list, fce.finally_from_offset)
        .ok_or(StructureError::OutOfBounds { offset: fce.finally_from_offset })?;
    let sub_procedure_offset = list
        .get(finally_index + 2)
        .map(|i| i.offset)
        .ok_or(StructureError::UnexpectedStructure("missing finally subroutine"))?;

    // Remove the jsr that enters the cleanup subroutine.
    let mut index = finally_index;
    while index > try_from_index {
        index -= 1;
        if matches!(list[index].op, Op::Jsr { .. }) {
            let jump_offset = list[index].jump_offset();
            list.remove(index);
            if jump_offset == Some(sub_procedure_offset) {
                break;
            }
        }
    }

    // Remove the handler and subroutine instructions.
    let mut index = match index_for_offset(list, fce.after_offset) {
        Some(i) => i as i32 - 1,
        None => list.len() as i32 - 1,
    };
    while index >= 0 && list[index as usize].offset >= fce.finally_from_offset {
        list.remove(index as usize);
        index -= 1;
    }

    // Extract the protected body.
    let mut instructions: Vec<Instruction> = Vec::new();
    while index >= 0 && list[index as usize].offset >= fce.try_from_offset {
        instructions.push(list.remove(index as usize));
        index -= 1;
    }
    let fast_synchronized_offset = instructions.first().map(|i| i.offset).unwrap_or(-1);
    let synchronized_jump_offset =
        search_min_escape_offset(&instructions, fce.try_from_offset, fce.after_offset);
    instructions.reverse();
    reconstruct::execute_reconstructors(ctx, &mut instructions);

    // Remove `monitorenter` and the capture store; the stored value is the
    // monitor expression.
    if index < 0 {
        return Err(StructureError::UnexpectedStructure("synchronized without monitorenter"));
    }
    let menter = list.remove(index as usize);
    let line_number = menter.line_number;
    let monitor_slot = match &menter.op {
        Op::MonitorEnter { objectref } => match objectref.op {
            Op::ALoad { index } => index,
            _ => return Err(StructureError::UnexpectedInstruction { offset: menter.offset }),
        },
        _ => return Err(StructureError::UnexpectedInstruction { offset: menter.offset }),
    };
    ctx.local_variables.remove_with_index_and_offset(monitor_slot, menter.offset);

    let astore_index = index as usize - 1;
    let astore = list.remove(astore_index);
    let monitor = match astore.op {
        Op::AStore { valueref, .. } => valueref,
        _ => return Err(StructureError::UnexpectedInstruction { offset: astore.offset }),
    };

    let branch = match synchronized_jump_offset {
        -1 => 1,
        jump if fast_synchronized_offset != -1 => jump - fast_synchronized_offset,
        _ => 1,
    };
    list.insert(
        astore_index,
        Instruction::new(
            fast_synchronized_offset,
            line_number,
            Op::Synchronized { monitor, branch, instructions },
        ),
    );
    Ok(())
}

/// JDK 1.1.8 nested double-monitor shape: the inner protected region is a
/// single already-built instruction.
fn create_synchronized_double(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
    index: usize,
) -> Result<(), StructureError> {
    let instruction = list.remove(index);
    let fast_synchronized_offset = instruction.offset;
    let instructions = vec![instruction];
    let synchronized_jump_offset =
        search_min_escape_offset(&instructions, fce.try_from_offset, fce.after_offset);

    if index < 2 {
        return Err(StructureError::UnexpectedStructure("double synchronized without capture"));
    }
    let menter = list.remove(index - 1);
    let line_number = menter.line_number;
    if !matches!(menter.op, Op::MonitorEnter { .. }) {
        return Err(StructureError::UnexpectedInstruction { offset: menter.offset });
    }

    let astore = list.remove(index - 2);
    let (monitor_slot, monitor) = match astore.op {
        Op::AStore { index, valueref } => (index, valueref),
        _ => return Err(StructureError::UnexpectedInstruction { offset: astore.offset }),
    };
    ctx.local_variables.remove_with_index_and_offset(monitor_slot, menter.offset);

    let branch =
        if synchronized_jump_offset != -1 { synchronized_jump_offset - fast_synchronized_offset } else { 1 };
    list.insert(
        index - 2,
        Instruction::new(
            fast_synchronized_offset,
            line_number,
            Op::Synchronized { monitor, branch, instructions },
        ),
    );
    Ok(())
}

/// JDK 1.1.8 empty synchronized block: `monitorenter` directly followed by
/// `monitorexit`.
fn create_empty_synchronized_118(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
    mut index: usize,
) -> Result<(), StructureError> {
    let menter = list.remove(index);
    let menter_line = menter.line_number;
    let monitor = match menter.op {
        Op::MonitorEnter { objectref } => match objectref.op {
            Op::Assignment { value1, value2, .. } => {
                // Monitor captured inline: purge the capture slot.
                match &value1.op {
                    Op::AStore { index: slot, .. } | Op::ALoad { index: slot } => {
                        ctx.local_variables.remove_with_index_and_offset(*slot, value1.offset);
                    }
                    _ => {}
                }
                // Remove the paired monitorexit.
                list.remove(index);
                value2
            }
            _ => {
                // Remove the paired monitorexit, then the capture store.
                list.remove(index);
                index -= 1;
                let astore = list.remove(index);
                match astore.op {
                    Op::AStore { index: slot, valueref } => {
                        ctx.local_variables.remove_with_index_and_offset(slot, astore.offset);
                        valueref
                    }
                    _ => {
                        return Err(StructureError::UnexpectedInstruction { offset: astore.offset })
                    }
                }
            }
        },
        _ => return Err(StructureError::UnexpectedInstruction { offset: menter.offset }),
    };

    let mut instructions: Vec<Instruction> = Vec::new();
    let gi = list.remove(index);
    let skips_handler =
        matches!(gi.op, Op::Goto { .. }) && gi.jump_offset() == Some(fce.after_offset);
    if !skips_handler {
        instructions.push(gi);
    }

    // Handler: `e = <caught>; monitorexit; throw e`.
    if matches!(list.get(index).map(|i| &i.op), Some(Op::AStore { .. })) {
        list.remove(index);
    }
    let monitorexit = list.remove(index);

    reconstruct::execute_reconstructors(ctx, &mut instructions);

    let node = Instruction::new(
        monitorexit.offset,
        menter_line,
        Op::Synchronized { monitor, branch: 1, instructions },
    );
    // Replace the rethrow.
    if index < list.len() {
        list[index] = node;
    } else {
        list.push(node);
    }
    Ok(())
}

/// Jikes 1.2.2 shape. The fall-through from a missing capture store is kept
/// even though modern class files cannot reach it.
fn create_synchronized_jikes_122(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
    index: usize,
) -> Result<(), StructureError> {
    // Remove the goto over the handler, the handler's monitorexit and the
    // rethrow.
    list.remove(index);
    list.remove(index);
    list.remove(index);

    let instruction = list.remove(index);
    let instruction_offset = instruction.offset;
    let instruction_line = instruction.line_number;
    let (menter_offset, menter_line, monitor_slot, monitor) = match instruction.op {
        Op::AStore { index: slot, valueref } => {
            let menter = list.remove(index);
            if !matches!(menter.op, Op::MonitorEnter { .. }) {
                return Err(StructureError::UnexpectedInstruction { offset: menter.offset });
            }
            (menter.offset, menter.line_number, slot, valueref)
        }
        Op::MonitorEnter { objectref } => match objectref.op {
            Op::Assignment { value1, value2, .. } => {
                let slot = match value1.op {
                    Op::AStore { index: slot, .. } => slot,
                    _ => {
                        return Err(StructureError::UnexpectedInstruction {
                            offset: value1.offset,
                        })
                    }
                };
                (instruction_offset, instruction_line, slot, value2)
            }
            _ => return Err(StructureError::UnexpectedInstruction { offset: instruction_offset }),
        },
        _ => return Err(StructureError::UnexpectedInstruction { offset: instruction_offset }),
    };
    ctx.local_variables.remove_with_index_and_offset(monitor_slot, menter_offset);

    // Body runs until the monitorexit on the monitor slot.
    let mut instructions: Vec<Instruction> = Vec::new();
    let exit_offset;
    loop {
        if index >= list.len() {
            return Err(StructureError::UnexpectedStructure("synchronized without monitorexit"));
        }
        let is_exit = match &list[index].op {
            Op::MonitorExit { objectref } => objectref.load_slot() == Some(monitor_slot),
            _ => false,
        };
        if is_exit {
            exit_offset = list[index].offset;
            break;
        }
        instructions.push(list.remove(index));
    }

    // A return of a value computed inside the block belongs to the block.
    if index + 1 < list.len() {
        let absorbs_return = match &list[index + 1].op {
            Op::XReturn { valueref } => exit_offset > valueref.offset,
            _ => false,
        };
        if absorbs_return {
            let return_instruction = list.remove(index + 1);
            instructions.push(return_instruction);
        }
    }

    reconstruct::execute_reconstructors(ctx, &mut instructions);

    let synchronized_jump_offset =
        search_min_escape_offset(&instructions, fce.try_from_offset, fce.after_offset);
    let branch =
        if synchronized_jump_offset != -1 { synchronized_jump_offset - exit_offset } else { 1 };

    let node = Instruction::new(
        exit_offset,
        menter_line,
        Op::Synchronized { monitor, branch, instructions },
    );
    list[index] = node;
    Ok(())
}

/// Modern compilers: the cleanup handler is inline after the body.
fn create_synchronized_general(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
    _try_index: usize,
) -> Result<(), StructureError> {
    let mut index = if fce.after_offset == -1
        || fce.after_offset > list.last().map(|i| i.offset).unwrap_or(-1)
    {
        list.len() as i32
    } else {
        index_for_offset(list, fce.after_offset)
            .ok_or(StructureError::OutOfBounds { offset: fce.after_offset })? as i32
    };
    index -= 1;
    let last_offset = list[index as usize].offset;

    // Remove the cleanup handler, remembering the exception slot it stored.
    let mut exception_load_index: i32 = -1;
    let mut removed: Option<Instruction> = None;
    while index >= 0 && list[index as usize].offset >= fce.finally_from_offset {
        removed = Some(list.remove(index as usize));
        index -= 1;
    }
    if let Some(Instruction { op: Op::AStore { index: slot, valueref }, .. }) = &removed {
        if matches!(valueref.op, Op::ExceptionLoad { .. }) {
            exception_load_index = *slot as i32;
        }
    }

    // Extract the protected body.
    let mut instructions: Vec<Instruction> = Vec::new();
    while index >= 0 && list[index as usize].offset >= fce.try_from_offset {
        instructions.push(list.remove(index as usize));
        index -= 1;
    }

    let synchronized_jump_offset =
        search_min_escape_offset(&instructions, fce.try_from_offset, fce.after_offset);
    instructions.reverse();

    let line_number =
        if index >= 0 { list[index as usize].line_number } else { UNKNOWN_LINE_NUMBER };

    // Monitor slot, read from the monitorenter still sitting at `index`.
    if index < 0 || !matches!(list[index as usize].op, Op::MonitorEnter { .. }) {
        return Err(StructureError::UnexpectedStructure("synchronized without monitorenter"));
    }
    let monitor_local_variable_index = monitor_slot_of(list, index as usize);

    if !instructions.is_empty() {
        // Drop the jump over the handler.
        if matches!(instructions.last().map(|i| &i.op), Some(Op::Goto { .. })) {
            instructions.pop();
        }
        remove_all_monitor_exits(&mut instructions, monitor_local_variable_index);

        // A rethrow left at the very end of the list belongs to the handler.
        let trailing_throw = match list.last().map(|i| &i.op) {
            Some(Op::Athrow { value }) => match &value.op {
                Op::ExceptionLoad { exception_name_index, .. } => *exception_name_index == 0,
                Op::ALoad { index } => *index as i32 == exception_load_index,
                _ => false,
            },
            _ => false,
        };
        if trailing_throw {
            list.pop();
        }
    }

    let menter = list.remove(index as usize);
    if monitor_local_variable_index != -1 {
        ctx.local_variables
            .remove_with_index_and_offset(monitor_local_variable_index as u16, menter.offset);
    }

    // Extract the monitor expression from the capture preceding the enter.
    let mut insert_pos = index as usize;
    let monitor = match menter.op {
        Op::MonitorEnter { objectref } => match objectref.op {
            Op::Assignment { value2, .. } => value2,
            Op::DupLoad { .. } => {
                // astore(dupload); dupstore(expr)
                list.remove(insert_pos - 1);
                let dupstore = list.remove(insert_pos - 2);
                insert_pos -= 2;
                match dupstore.op {
                    Op::DupStore { objectref } => objectref,
                    _ => {
                        return Err(StructureError::UnexpectedInstruction {
                            offset: dupstore.offset,
                        })
                    }
                }
            }
            Op::ALoad { .. } => {
                let astore = list.remove(insert_pos - 1);
                insert_pos -= 1;
                match astore.op {
                    Op::AStore { valueref, .. } => valueref,
                    _ => {
                        return Err(StructureError::UnexpectedInstruction { offset: astore.offset })
                    }
                }
            }
            _ => return Err(StructureError::UnexpectedInstruction { offset: menter.offset }),
        },
        _ => unreachable!(),
    };

    reconstruct::execute_reconstructors(ctx, &mut instructions);

    let branch =
        if synchronized_jump_offset != -1 { synchronized_jump_offset - last_offset } else { 1 };
    list.insert(
        insert_pos,
        Instruction::new(
            last_offset,
            line_number,
            Op::Synchronized { monitor, branch, instructions },
        ),
    );
    Ok(())
}

fn monitor_slot_of(list: &[Instruction], menter_index: usize) -> i32 {
    match &list[menter_index].op {
        Op::MonitorEnter { objectref } => match &objectref.op {
            Op::DupLoad { .. } => match list.get(menter_index.wrapping_sub(1)).map(|i| &i.op) {
                Some(Op::AStore { index, .. }) => *index as i32,
                _ => -1,
            },
            Op::ALoad { index } => *index as i32,
            Op::Assignment { value1, .. } => match value1.op {
                Op::ALoad { index } => index as i32,
                _ => -1,
            },
            _ => -1,
        },
        _ => -1,
    }
}

/// Remove every `monitorexit` on the slot, descending into nested blocks.
fn remove_all_monitor_exits(instructions: &mut Vec<Instruction>, monitor_slot: i32) {
    let mut index = instructions.len();
    while index > 0 {
        index -= 1;
        match &mut instructions[index].op {
            Op::MonitorExit { objectref } => {
                if objectref.load_slot().map(|s| s as i32) == Some(monitor_slot) {
                    instructions.remove(index);
                }
            }
            Op::Try { instructions: body, catches, finally_instructions, .. } => {
                remove_all_monitor_exits(body, monitor_slot);
                for c in catches.iter_mut() {
                    remove_all_monitor_exits(&mut c.instructions, monitor_slot);
                }
                if let Some(finally_instructions) = finally_instructions {
                    remove_all_monitor_exits(finally_instructions, monitor_slot);
                }
            }
            Op::Synchronized { instructions: body, .. } => {
                remove_all_monitor_exits(body, monitor_slot);
            }
            _ => {}
        }
    }
}

/// Build a `try`/`catch`/`finally` node from an aggregated region.
pub(crate) fn create_fast_try(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    fce: &FastCodeException,
) -> Result<(), StructureError> {
    let mut after_list_offset = fce.after_offset;
    let mut try_jump_offset = -1;
    let last_index = list.len() as i32 - 1;

    let mut index = if after_list_offset == -1
        || after_list_offset > list[last_index as usize].offset
    {
        last_index
    } else {
        index_for_offset(list, after_list_offset)
            .ok_or(StructureError::OutOfBounds { offset: after_list_offset })? as i32
            - 1
    };
    let last_offset = list[index as usize].offset;

    // Extract the finally body first.
    let mut finally_instructions: Option<Vec<Instruction>> = None;
    if fce.finally_from_offset > 0 {
        let mut instructions: Vec<Instruction> = Vec::new();
        while index >= 0 && list[index as usize].offset >= fce.finally_from_offset {
            instructions.push(list.remove(index as usize));
            index -= 1;
        }
        if instructions.is_empty() {
            return Err(StructureError::UnexpectedStructure("finally block"));
        }
        instructions.reverse();

        let first_offset = instructions[0].offset;
        let minimal_jump_offset =
            search_min_escape_offset(&instructions, first_offset, after_list_offset);
        after_list_offset = first_offset;
        if minimal_jump_offset != -1 && after_list_offset > minimal_jump_offset {
            after_list_offset = minimal_jump_offset;
        }
        finally_instructions = Some(instructions);
    }

    // Extract the catch bodies, last handler first.
    let mut catches: Vec<FastCatch> = Vec::new();
    for fcec in fce.catches.iter().rev() {
        let from_offset = fcec.from_offset;
        let mut instructions: Vec<Instruction> = Vec::new();
        while index >= 0 && list[index as usize].offset >= from_offset {
            instructions.push(list.remove(index as usize));
            index -= 1;
        }
        if instructions.is_empty() {
            return Err(StructureError::EmptyCatchBlock);
        }
        let catch_last_offset = instructions[0].offset;
        let try_jump_tmp =
            search_min_escape_offset(&instructions, fce.try_from_offset, fce.after_offset);
        if try_jump_tmp != -1 && (try_jump_offset == -1 || try_jump_offset > try_jump_tmp) {
            try_jump_offset = try_jump_tmp;
        }
        instructions.reverse();

        let exception_load = instructions
            .iter()
            .find_map(|i| {
                i.find(&|n| matches!(n.op, Op::ExceptionLoad { .. }))
                    .map(|el| (el.offset, el))
            })
            .map(|(offset, el)| match &el.op {
                Op::ExceptionLoad { index, .. } => (offset, *index),
                _ => (offset, 0),
            });
        let Some((exception_load_offset, var_index)) = exception_load else {
            return Err(StructureError::UnexpectedInstruction { offset: from_offset });
        };

        let first_offset = instructions[0].offset;
        let minimal_jump_offset =
            search_min_escape_offset(&instructions, first_offset, catch_last_offset);
        if after_list_offset > first_offset {
            after_list_offset = first_offset;
        }
        if minimal_jump_offset != -1 && after_list_offset > minimal_jump_offset {
            after_list_offset = minimal_jump_offset;
        }

        catches.insert(
            0,
            FastCatch {
                exception_load_offset,
                type_index: fcec.type_index,
                other_type_indexes: fcec.other_type_indexes.clone(),
                var_index,
                instructions,
            },
        );
    }

    // Extract the try body.
    let mut try_instructions: Vec<Instruction> = Vec::new();
    while index >= 0 && list[index as usize].offset >= fce.try_from_offset {
        try_instructions.push(list.remove(index as usize));
        index -= 1;
    }
    if try_instructions.is_empty() {
        return Err(StructureError::UnexpectedStructure("empty try block"));
    }
    let try_jump_tmp =
        search_min_escape_offset(&try_instructions, fce.try_from_offset, fce.try_to_offset);
    if try_jump_tmp != -1 && (try_jump_offset == -1 || try_jump_offset > try_jump_tmp) {
        try_jump_offset = try_jump_tmp;
    }
    try_instructions.reverse();
    let line_number = try_instructions[0].line_number;

    if try_jump_offset == -1 {
        try_jump_offset = last_offset + 1;
    }

    format_fast_try(
        ctx,
        fce,
        after_list_offset,
        &mut try_instructions,
        &mut catches,
        &mut finally_instructions,
    );

    reconstruct::execute_reconstructors(ctx, &mut try_instructions);
    for fast_catch in catches.iter_mut() {
        reconstruct::execute_reconstructors(ctx, &mut fast_catch.instructions);
    }
    if let Some(finally_instructions) = &mut finally_instructions {
        reconstruct::execute_reconstructors(ctx, finally_instructions);
    }

    let insert_pos = (index + 1) as usize;
    list.insert(
        insert_pos,
        Instruction::new(
            last_offset,
            line_number,
            Op::Try {
                branch: try_jump_offset - last_offset,
                instructions: try_instructions,
                catches,
                finally_instructions,
            },
        ),
    );
    Ok(())
}

/// Reduce the extracted bodies to their source shape: drop the exception
/// bindings, the epilogue jumps, the subroutine plumbing, and the duplicated
/// finally tails.
fn format_fast_try(
    ctx: &mut Ctx,
    fce: &FastCodeException,
    after_list_offset: i32,
    try_instructions: &mut Vec<Instruction>,
    catches: &mut [FastCatch],
    finally_instructions: &mut Option<Vec<Instruction>>,
) {
    // The finally body still carries its handler frame.
    if let Some(instructions) = finally_instructions {
        match fce.kind {
            RangeKind::FinallySubroutine => {
                // [e = caught; jsr; throw e; ra = <ret addr>; body...; ret]
                if let Some(entry) = instructions.iter().position(|i| {
                    matches!(&i.op, Op::AStore { valueref, .. }
                        if matches!(valueref.op, Op::ReturnAddressLoad))
                }) {
                    if let Op::AStore { index: slot, .. } = instructions[entry].op {
                        ctx.local_variables
                            .remove_with_index_and_offset(slot, instructions[entry].offset);
                    }
                    instructions.drain(..=entry);
                }
                while matches!(instructions.last().map(|i| &i.op), Some(Op::Ret { .. })) {
                    instructions.pop();
                }
            }
            _ => {
                // [e = caught; body...; throw e]
                let stored_slot = match instructions.first().map(|i| &i.op) {
                    Some(Op::AStore { index, valueref })
                        if matches!(valueref.op, Op::ExceptionLoad { .. }) =>
                    {
                        Some(*index)
                    }
                    _ => None,
                };
                if let Some(slot) = stored_slot {
                    instructions.remove(0);
                    let rethrows = match instructions.last().map(|i| &i.op) {
                        Some(Op::Athrow { value }) => value.load_slot() == Some(slot),
                        _ => false,
                    };
                    if rethrows {
                        instructions.pop();
                    }
                }
            }
        }
    }

    // Catch bodies: drop the exception binding and the join jump.
    for fast_catch in catches.iter_mut() {
        let instructions = &mut fast_catch.instructions;
        let binds_exception = matches!(
            instructions.first().map(|i| &i.op),
            Some(Op::AStore { valueref, .. }) if matches!(valueref.op, Op::ExceptionLoad { .. })
        );
        if binds_exception {
            instructions.remove(0);
        }
        strip_epilogue(instructions, after_list_offset, fce, finally_instructions.as_deref());
    }

    // Try body: the jsr plumbing, the join jump, the duplicated finally.
    if fce.kind == RangeKind::FinallySubroutine {
        try_instructions.retain(|i| !matches!(i.op, Op::Jsr { .. }));
    }
    strip_epilogue(try_instructions, after_list_offset, fce, finally_instructions.as_deref());
}

/// Drop a trailing `goto` out of the block, then a trailing copy of the
/// finally body when the compiler duplicated it inline.
fn strip_epilogue(
    instructions: &mut Vec<Instruction>,
    after_list_offset: i32,
    fce: &FastCodeException,
    finally_instructions: Option<&[Instruction]>,
) {
    if let Some(last) = instructions.last() {
        if let Op::Goto { .. } = last.op {
            let target = last.jump_offset().unwrap_or(-1);
            if target >= after_list_offset || target == fce.after_offset {
                instructions.pop();
            }
        }
    }

    if fce.kind != RangeKind::Finally {
        return;
    }
    let Some(finally_body) = finally_instructions else { return };
    let k = finally_body.len();
    if k == 0 || instructions.len() < k {
        return;
    }
    let keeps_return = matches!(instructions.last().map(|i| &i.op), Some(Op::XReturn { .. }));
    if instructions.len() < k + usize::from(keeps_return) {
        return;
    }
    let tail_start = instructions.len() - k - usize::from(keeps_return);
    let tail = &instructions[tail_start..tail_start + k];
    let duplicated = tail
        .iter()
        .zip(finally_body.iter())
        .all(|(a, b)| std::mem::discriminant(&a.op) == std::mem::discriminant(&b.op));
    if duplicated {
        instructions.drain(tail_start..tail_start + k);
    }
}
