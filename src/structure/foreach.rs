//! `for-each` pattern recognition.
//!
//! Four lowerings are recognized: the iterator protocol (any collection) and
//! three array forms that differ by compiler vendor in where the synthetic
//! array/length/index slots are initialized. Every recognized pattern purges
//! its synthetic slots from the local variable table.

use crate::error::StructureError;
use crate::instruction::{Instruction, Op};

use super::Ctx;

/// Which array lowering matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum ArrayPattern {
    None,
    /// `int j = (arr$ = values).length; for (int i = 0; i < j; ++i)`
    Sun15,
    /// `arr$ = values; int len$ = arr$.length; for (int i$ = 0; i$ < len$; ++i$)`
    Sun16,
    /// `arr$ = values; int i = 0; for (int len = arr$.length; i < len; ++i)`
    Ibm,
}

/// Loop variable of a recognized pattern: the declaration keeps its slot but
/// drops the initializing store; a bare store becomes the matching load.
pub(super) fn for_each_variable(instruction: Instruction) -> Instruction {
    let Instruction { offset, line_number, op } = instruction;
    let op = match op {
        Op::Declare { lv_index, lv_start_pc, .. } => {
            Op::Declare { lv_index, lv_start_pc, store: None }
        }
        Op::AStore { index, .. } => Op::ALoad { index },
        Op::IStore { index, .. } => Op::ILoad { index },
        Op::Store { index, signature, .. } => Op::Load { index, signature },
        other => other,
    };
    Instruction::new(offset, line_number, op)
}

/// Purge the variable a pattern's synthetic store created, keyed on the
/// store offset being the variable's `start_pc`.
pub(super) fn remove_synthetic_variable(ctx: &mut Ctx, store: &Instruction) {
    if let Some(slot) = store.store_slot() {
        let starts_here = ctx
            .local_variables
            .with_index_and_offset(slot, store.offset)
            .map(|lv| lv.start_pc == store.offset)
            .unwrap_or(false);
        if starts_here {
            ctx.local_variables.remove_with_index_and_offset(slot, store.offset);
        }
    }
}

/// Iterator protocol (class-file version 49+):
/// `it = values.iterator(); while (it.hasNext()) { T v = (T) it.next(); ... }`
pub(super) fn is_iterator_pattern(
    ctx: &Ctx,
    init: &Instruction,
    test: &Instruction,
    sub_list: &[Instruction],
) -> bool {
    if ctx.class.major_version < 49 || sub_list.is_empty() {
        return false;
    }
    let first = &sub_list[0];
    if test.line_number != first.line_number {
        return false;
    }

    // init: astore it = values.iterator()
    let (iterator_slot, iterator_call) = match &init.op {
        Op::AStore { index, valueref } => (*index, valueref),
        _ => return false,
    };
    let call_index = match &iterator_call.op {
        Op::Invokeinterface { index, .. } | Op::Invokevirtual { index, .. } => *index,
        _ => return false,
    };
    let lv_ok = ctx
        .local_variables
        .with_index_and_offset(iterator_slot, init.offset)
        .map(|lv| lv.signature_index != 0)
        .unwrap_or(false);
    if !lv_ok {
        return false;
    }
    match ctx.class.constant_pool.resolve_ref(call_index) {
        Some((_, "iterator", "()Ljava/util/Iterator;")) => {}
        _ => return false,
    }

    // test: it.hasNext()
    let test_value = match &test.op {
        Op::If { value, .. } => value,
        _ => return false,
    };
    let has_next_index = match &test_value.op {
        Op::Invokeinterface { index, objectref, .. } => {
            if objectref.load_slot() != Some(iterator_slot) {
                return false;
            }
            *index
        }
        _ => return false,
    };
    match ctx.class.constant_pool.resolve_ref(has_next_index) {
        Some((_, "hasNext", "()Z")) => {}
        _ => return false,
    }

    // first body instruction: T v = (T) it.next()
    let store = match &first.op {
        Op::Declare { store: Some(store), .. } => store,
        _ => return false,
    };
    let stored_value = match &store.op {
        Op::AStore { valueref, .. } => valueref,
        _ => return false,
    };
    let next_call = match &stored_value.op {
        Op::CheckCast { objectref, .. } => objectref,
        _ => stored_value,
    };
    let next_index = match &next_call.op {
        Op::Invokeinterface { index, objectref, .. } => {
            if objectref.load_slot() != Some(iterator_slot) {
                return false;
            }
            *index
        }
        _ => return false,
    };
    matches!(
        ctx.class.constant_pool.resolve_ref(next_index),
        Some((_, "next", "()Ljava/lang/Object;"))
    )
}

/// Dispatch over the three array lowerings.
pub(super) fn array_pattern_type(
    ctx: &Ctx,
    init: &Instruction,
    test: &Instruction,
    inc: &Instruction,
    list: &[Instruction],
    insert_pos: usize,
    sub_list: &[Instruction],
) -> ArrayPattern {
    if ctx.class.major_version < 49 || insert_pos == 0 || sub_list.is_empty() {
        return ArrayPattern::None;
    }
    let first = &sub_list[0];
    if test.line_number != first.line_number {
        return ArrayPattern::None;
    }

    let before_for = &list[insert_pos - 1];
    if test.line_number != before_for.line_number {
        return ArrayPattern::None;
    }
    let (si, si_value) = match &before_for.op {
        Op::IStore { valueref, .. } => (before_for, valueref.as_ref()),
        _ => return ArrayPattern::None,
    };

    match &si_value.op {
        Op::ArrayLength { arrayref } => match &arrayref.op {
            Op::Assignment { .. } => sun15_pattern(init, test, inc, first, si),
            _ => {
                if insert_pos > 1 {
                    sun16_pattern(init, test, inc, first, si, &list[insert_pos - 2])
                } else {
                    ArrayPattern::None
                }
            }
        },
        Op::IConst { .. } => ibm_pattern(init, test, inc, list, insert_pos, first, si),
        _ => ArrayPattern::None,
    }
}

/// `j = (arr$ = values).length` just before the loop.
fn sun15_pattern(
    init: &Instruction,
    test: &Instruction,
    inc: &Instruction,
    first: &Instruction,
    si_length: &Instruction,
) -> ArrayPattern {
    let assignment = match &si_length.op {
        Op::IStore { valueref, .. } => match &valueref.op {
            Op::ArrayLength { arrayref } => arrayref,
            _ => return ArrayPattern::None,
        },
        _ => return ArrayPattern::None,
    };
    let si_tmp_slot = match &assignment.op {
        Op::Assignment { operator, value1, .. } if operator == "=" => match value1.op {
            Op::AStore { index, .. } => index,
            _ => return ArrayPattern::None,
        },
        _ => return ArrayPattern::None,
    };
    if !is_zero_int_store(init) {
        return ArrayPattern::None;
    }
    let (Some(index_slot), Some(length_slot)) = (init.store_slot(), si_length.store_slot()) else {
        return ArrayPattern::None;
    };
    if !is_index_test(test, index_slot, length_slot) || !is_unit_increment(inc, index_slot) {
        return ArrayPattern::None;
    }
    if element_assignment_slots(first) == Some((si_tmp_slot, index_slot)) {
        ArrayPattern::Sun15
    } else {
        ArrayPattern::None
    }
}

/// `arr$ = values; len$ = arr$.length` just before the loop.
fn sun16_pattern(
    init: &Instruction,
    test: &Instruction,
    inc: &Instruction,
    first: &Instruction,
    si_length: &Instruction,
    before_before: &Instruction,
) -> ArrayPattern {
    let length_array_slot = match &si_length.op {
        Op::IStore { valueref, .. } => match &valueref.op {
            Op::ArrayLength { arrayref } => match arrayref.op {
                Op::ALoad { index } => index,
                _ => return ArrayPattern::None,
            },
            _ => return ArrayPattern::None,
        },
        _ => return ArrayPattern::None,
    };
    let si_tmp_slot = match &before_before.op {
        Op::AStore { index, .. } => *index,
        _ => return ArrayPattern::None,
    };
    if si_tmp_slot != length_array_slot || !is_zero_int_store(init) {
        return ArrayPattern::None;
    }
    let (Some(index_slot), Some(length_slot)) = (init.store_slot(), si_length.store_slot()) else {
        return ArrayPattern::None;
    };
    if !is_index_test(test, index_slot, length_slot) || !is_unit_increment(inc, index_slot) {
        return ArrayPattern::None;
    }
    if element_assignment_slots(first) == Some((si_tmp_slot, index_slot)) {
        ArrayPattern::Sun16
    } else {
        ArrayPattern::None
    }
}

/// `arr$ = values; i = 0` before the loop, length store as the `for` init.
fn ibm_pattern(
    init: &Instruction,
    test: &Instruction,
    inc: &Instruction,
    list: &[Instruction],
    insert_pos: usize,
    first: &Instruction,
    si_index: &Instruction,
) -> ArrayPattern {
    if !is_zero_int_store(si_index) || insert_pos < 2 {
        return ArrayPattern::None;
    }
    let before_before = &list[insert_pos - 2];
    if test.line_number != before_before.line_number {
        return ArrayPattern::None;
    }
    let si_tmp_slot = match &before_before.op {
        Op::AStore { index, .. } => *index,
        _ => return ArrayPattern::None,
    };

    // init: len = arr$.length
    let length_array_slot = match &init.op {
        Op::IStore { valueref, .. } => match &valueref.op {
            Op::ArrayLength { arrayref } => match arrayref.op {
                Op::ALoad { index } => index,
                _ => return ArrayPattern::None,
            },
            _ => return ArrayPattern::None,
        },
        _ => return ArrayPattern::None,
    };
    if length_array_slot != si_tmp_slot {
        return ArrayPattern::None;
    }
    let (Some(index_slot), Some(length_slot)) = (si_index.store_slot(), init.store_slot()) else {
        return ArrayPattern::None;
    };
    if !is_index_test(test, index_slot, length_slot) || !is_unit_increment(inc, index_slot) {
        return ArrayPattern::None;
    }
    if element_assignment_slots(first) == Some((si_tmp_slot, index_slot)) {
        ArrayPattern::Ibm
    } else {
        ArrayPattern::None
    }
}

/// Values expression of the SUN 1.5 form, plus the nested temp-array store
/// whose variable must be purged.
pub(super) fn sun15_values(
    si_length: Instruction,
) -> Result<(Instruction, Instruction), StructureError> {
    let offset = si_length.offset;
    match si_length.op {
        Op::IStore { valueref, .. } => match valueref.op {
            Op::ArrayLength { arrayref } => match arrayref.op {
                Op::Assignment { value1, value2, .. } => Ok((*value2, *value1)),
                _ => Err(StructureError::UnexpectedInstruction { offset }),
            },
            _ => Err(StructureError::UnexpectedInstruction { offset }),
        },
        _ => Err(StructureError::UnexpectedInstruction { offset }),
    }
}

fn is_zero_int_store(instruction: &Instruction) -> bool {
    match &instruction.op {
        Op::IStore { valueref, .. } => {
            matches!(&valueref.op, Op::IConst { value: 0, signature } if signature == "I")
        }
        _ => false,
    }
}

fn is_index_test(test: &Instruction, index_slot: u16, length_slot: u16) -> bool {
    match &test.op {
        Op::IfCmp { value1, value2, .. } => {
            matches!(value1.op, Op::ILoad { index } if index == index_slot)
                && matches!(value2.op, Op::ILoad { index } if index == length_slot)
        }
        _ => false,
    }
}

fn is_unit_increment(inc: &Instruction, index_slot: u16) -> bool {
    matches!(inc.op, Op::Iinc { index, count } if index == index_slot && count == 1)
}

/// `T v = arr$[i]` at the top of the body, possibly already wrapped in a
/// declaration.
fn element_assignment_slots(first: &Instruction) -> Option<(u16, u16)> {
    let store = match &first.op {
        Op::Declare { store: Some(store), .. } => store.as_ref(),
        _ => first,
    };
    let valueref = store.store_valueref()?;
    match &valueref.op {
        Op::ArrayLoad { arrayref, indexref, .. } => {
            let array_slot = match arrayref.op {
                Op::ALoad { index } => index,
                _ => return None,
            };
            let index_slot = match indexref.op {
                Op::ILoad { index } => index,
                _ => return None,
            };
            Some((array_slot, index_slot))
        }
        _ => None,
    }
}
