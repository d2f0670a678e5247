//! Back-edge recognition and loop shaping.
//!
//! The driver walks each list from the end looking for negative jumps. The
//! instructions between the target and the jump move into a sub-list which,
//! after recursive analysis, becomes the body of one of eight loop shapes.
//! Before any of that, the shared-goto optimizations some compilers apply to
//! nested loops are undone so every loop owns a distinct back-edge.

use crate::error::StructureError;
use crate::instruction::{Instruction, Op, UNKNOWN_LINE_NUMBER};

use super::foreach;
use super::util::{check_no_jump_to_interval, index_for_offset, search_min_escape_offset};
use super::{analyze_list, Ctx, Scope};

pub(crate) fn create_loops(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
) -> Result<(), StructureError> {
    // Undo loop-in-loop back-edge sharing first.
    let mut index = list.len() as i32;
    while index > 0 {
        index -= 1;
        let i = index as usize;
        if i >= list.len() {
            continue;
        }
        let is_jump = list[i].is_conditional_branch() || matches!(list[i].op, Op::Goto { .. });
        if is_jump && unoptimize_loop_in_loop(list, scope.before_list, i) {
            index += 1;
        }
    }

    // Recognize the loops proper.
    let mut index = list.len() as i32;
    while index > 0 {
        index -= 1;
        let i = index as usize;
        if i >= list.len() {
            continue;
        }
        let instruction = &list[i];

        if instruction.is_conditional_branch() {
            if instruction.branch().unwrap_or(0) < 0 {
                let jump_offset = instruction.jump_offset().unwrap_or(-1);
                if scope.before_list < jump_offset
                    && (scope.before_loop_entry >= jump_offset || jump_offset > scope.loop_entry)
                {
                    let offset = instruction.offset;
                    let mut new_index =
                        unoptimize_if_else_in_loop(ctx, list, scope, offset, jump_offset, i)?;
                    if new_index == -1 {
                        new_index = unoptimize_infinite_loop(ctx, list, scope, jump_offset, i)?;
                    }
                    index = if new_index == -1 {
                        analyze_back_if(ctx, list, scope.before_list, i)?
                    } else {
                        new_index
                    };
                }
            }
        } else if let Op::Goto { branch } = instruction.op {
            if branch < 0 {
                let jump_offset = instruction.jump_offset().unwrap_or(-1);
                if scope.before_list < jump_offset
                    && (scope.before_loop_entry >= jump_offset || jump_offset > scope.loop_entry)
                {
                    let offset = instruction.offset;
                    let new_index =
                        unoptimize_if_else_in_loop(ctx, list, scope, offset, jump_offset, i)?;
                    index = if new_index == -1 {
                        let after_sub_list = if i + 1 < list.len() {
                            list[i + 1].offset
                        } else {
                            scope.after_list
                        };
                        analyze_back_goto(ctx, list, scope.before_list, after_sub_list, i, jump_offset)?
                    } else {
                        new_index
                    };
                }
            }
        } else if matches!(list[i].op, Op::Try { .. } | Op::Synchronized { .. }) {
            let body_empty = match &list[i].op {
                Op::Try { instructions, .. } | Op::Synchronized { instructions, .. } => {
                    instructions.is_empty()
                }
                _ => false,
            };
            if !body_empty {
                let previous_offset =
                    if i > 0 { list[i - 1].offset } else { scope.before_list };
                let jump_offset = list[i].jump_offset().unwrap_or(-1);
                if jump_offset != -1
                    && previous_offset >= jump_offset
                    && scope.before_list < jump_offset
                    && (scope.before_loop_entry >= jump_offset || jump_offset > scope.loop_entry)
                {
                    list[i].set_branch(1);
                    let after_sub_list = if i + 1 < list.len() {
                        list[i + 1].offset
                    } else {
                        scope.after_list
                    };
                    index =
                        analyze_back_goto(ctx, list, scope.before_list, after_sub_list, i, jump_offset)?;
                }
            }
        }
    }
    Ok(())
}

/// Re-materialize the `goto` a compiler folded away when two nested loops
/// shared one back-edge. Returns true when a jump was rewritten and the
/// caller should rescan the same position.
fn unoptimize_loop_in_loop(list: &mut Vec<Instruction>, before_list_offset: i32, index: usize) -> bool {
    let bi_offset = list[index].offset;
    let bi_branch = match list[index].branch() {
        Some(b) if b < 0 => b,
        _ => return false,
    };
    let jump_offset = bi_offset + bi_branch;
    if jump_offset <= before_list_offset {
        return false;
    }
    let bi_is_goto = matches!(list[index].op, Op::Goto { .. });

    // Locate the outer target; switches must not jump across the interval.
    let mut i = index;
    loop {
        if i == 0 {
            return false;
        }
        i -= 1;
        if list[i].offset <= jump_offset {
            break;
        }
        if switch_jumps_past(&list[i], bi_offset) {
            return false;
        }
    }

    if i + 1 == index {
        return false;
    }
    let inner = i + 1;
    if !list[inner].is_conditional_branch() {
        return false;
    }
    let inner_branch = list[inner].branch().unwrap_or(0);
    if inner_branch >= 0 {
        return false;
    }
    let inner_offset = list[inner].offset;
    for candidate in &list[..i] {
        if switch_jumps_past(candidate, inner_offset) {
            return false;
        }
    }
    let jump_offset2 = inner_offset + inner_branch;

    // Locate the inner target with the same switch discipline.
    let mut j = i;
    loop {
        if j == 0 {
            return false;
        }
        j -= 1;
        if list[j].offset <= jump_offset2 {
            break;
        }
        if switch_jumps_past(&list[j], bi_offset) {
            return false;
        }
    }
    if j + 1 == inner {
        return false;
    }
    let target = j + 1;
    for candidate in &list[..j] {
        if switch_jumps_past(candidate, inner_offset) {
            return false;
        }
    }

    if bi_is_goto {
        // Shared bottom goto: give the inner loop its own back-edge right
        // after the outer one and retarget the inner conditional at it.
        let new_goto = Instruction::new(
            bi_offset + 1,
            UNKNOWN_LINE_NUMBER,
            Op::Goto { branch: jump_offset2 - bi_offset - 1 },
        );
        list.insert(index + 1, new_goto);
        list[inner].set_jump_offset(bi_offset + 1);
        false
    } else if matches!(list[target].op, Op::Goto { .. })
        && list[target].jump_offset() == Some(jump_offset2)
    {
        // A suitable goto already exists; point the outer loop at it.
        list[index].set_jump_offset(jump_offset2);
        false
    } else {
        let new_goto = Instruction::new(
            jump_offset2 - 1,
            UNKNOWN_LINE_NUMBER,
            Op::Goto { branch: jump_offset - jump_offset2 + 1 },
        );
        list.insert(j + 1, new_goto);
        list[index + 1].set_jump_offset(jump_offset2 - 1);
        true
    }
}

fn switch_jumps_past(instruction: &Instruction, limit_offset: i32) -> bool {
    match &instruction.op {
        Op::Switch { default_offset, offsets, .. } => {
            if instruction.offset + default_offset > limit_offset {
                return true;
            }
            offsets.iter().any(|o| instruction.offset + o > limit_offset)
        }
        _ => false,
    }
}

/// An if-else (or trailing throw) inside a loop that shares the loop's exit
/// goto: inject a distinct back-edge after the shared exit so the loop
/// closes on its own jump.
fn unoptimize_if_else_in_loop(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
    offset: i32,
    jump_offset: i32,
    index: usize,
) -> Result<i32, StructureError> {
    let Some(first_loop_index) = index_for_offset(list, jump_offset) else {
        return Ok(-1);
    };
    if index + 1 >= list.len() {
        return Ok(-1);
    }
    let after_loop_instruction_offset = list[index + 1].offset;

    let first_loop_instruction = &list[first_loop_index];
    let after_loop_jump_offset = if first_loop_instruction.is_conditional_branch()
        || matches!(
            first_loop_instruction.op,
            Op::Goto { .. } | Op::Try { .. } | Op::Synchronized { .. }
        ) {
        first_loop_instruction.jump_offset().unwrap_or(-1)
    } else {
        -1
    };

    if after_loop_jump_offset <= after_loop_instruction_offset {
        return Ok(-1);
    }

    let after_loop_index = match index_for_offset(list, after_loop_jump_offset) {
        Some(i) => i,
        None if after_loop_jump_offset <= scope.after_list => list.len(),
        None => return Ok(-1),
    };

    let last_instruction_offset = list[after_loop_index - 1].offset;
    if !check_no_jump_to_interval(list, 0, first_loop_index, offset, last_instruction_offset)
        || !check_no_jump_to_interval(list, after_loop_index, list.len(), offset, last_instruction_offset)
    {
        return Ok(-1);
    }

    // The injected goto shares the offset of the loop's last instruction.
    let new_goto = Instruction::new(
        last_instruction_offset,
        UNKNOWN_LINE_NUMBER,
        Op::Goto { branch: jump_offset - last_instruction_offset },
    );
    list.insert(after_loop_index, new_goto);

    analyze_back_goto(
        ctx,
        list,
        scope.before_list,
        after_loop_jump_offset,
        after_loop_index,
        jump_offset,
    )
}

/// A conditional back-jump directly followed by the exit goto of an infinite
/// loop: split the shared edge with a synthetic goto one byte after the exit.
fn unoptimize_infinite_loop(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
    jump_offset: i32,
    jump_index: usize,
) -> Result<i32, StructureError> {
    if jump_index + 1 >= list.len() {
        return Ok(-1);
    }
    if !matches!(list[jump_index + 1].op, Op::Goto { .. }) {
        return Ok(-1);
    }
    let after_goto_offset = if jump_index + 2 < list.len() {
        list[jump_index + 2].offset
    } else {
        scope.after_list
    };
    let goto_offset = list[jump_index + 1].offset;
    let jump_goto_offset = list[jump_index + 1].jump_offset().unwrap_or(-1);
    if goto_offset >= jump_goto_offset || jump_goto_offset > after_goto_offset {
        return Ok(-1);
    }

    let new_goto_offset = goto_offset + 1;
    list[jump_index].set_jump_offset(new_goto_offset);
    let new_goto = Instruction::new(
        new_goto_offset,
        UNKNOWN_LINE_NUMBER,
        Op::Goto { branch: jump_offset - new_goto_offset },
    );
    list.insert(jump_index + 2, new_goto);

    analyze_back_goto(ctx, list, scope.before_list, jump_goto_offset, jump_index + 2, jump_offset)
}

/// Shape classification inputs: line number plus enough of the instruction
/// kind to decide whether an init and an increment hit the same target.
#[derive(Clone, Copy, Debug)]
struct LoopCand {
    line_number: i32,
    kind: CandKind,
    target: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CandKind {
    RefOrField,
    IntStore,
    Iinc,
    Other,
}

fn summarize(instruction: &Instruction) -> LoopCand {
    // An `(x = expr)` wrapper classifies by its left-hand side.
    let target_instruction = match &instruction.op {
        Op::Assignment { value1, .. } => value1.as_ref(),
        _ => instruction,
    };
    let (kind, target) = match &target_instruction.op {
        Op::ALoad { index }
        | Op::AStore { index, .. }
        | Op::Load { index, .. }
        | Op::Store { index, .. } => (CandKind::RefOrField, Some(*index)),
        Op::GetStatic { index }
        | Op::PutStatic { index, .. }
        | Op::GetField { index, .. }
        | Op::PutField { index, .. } => (CandKind::RefOrField, Some(*index)),
        Op::IStore { index, .. } => (CandKind::IntStore, Some(*index)),
        Op::Iinc { index, .. } => (CandKind::Iinc, Some(*index)),
        _ => (CandKind::Other, None),
    };
    LoopCand { line_number: target_instruction.line_number, kind, target }
}

fn affine_pair(before_loop: &LoopCand, last_body: &LoopCand) -> bool {
    match before_loop.kind {
        CandKind::RefOrField => {
            last_body.kind == CandKind::RefOrField && before_loop.target == last_body.target
        }
        CandKind::IntStore => {
            matches!(last_body.kind, CandKind::IntStore | CandKind::Iinc)
                && before_loop.target == last_body.target
        }
        _ => false,
    }
}

/// The eight loop shapes:
/// 0 `for(;;)` 1 `for(init;;)` 2 `while(test)` 3 `for(init;test;)`
/// 4 `for(;;incr)` 5 `for(init;;incr)` 6 `for(;test;incr)`
/// 7 `for(init;test;incr)`. Line numbers break the ties byte offsets cannot.
fn get_loop_type(
    before_loop: Option<&LoopCand>,
    test: Option<&LoopCand>,
    before_last_body: Option<&LoopCand>,
    last_body: Option<&LoopCand>,
) -> u8 {
    let Some(before_loop) = before_loop else {
        let Some(test) = test else {
            let Some(last_body) = last_body else {
                return 0;
            };
            return match before_last_body {
                Some(bl) if bl.line_number > last_body.line_number => 4,
                _ => 0,
            };
        };
        if let Some(last_body) = last_body {
            if test.line_number != UNKNOWN_LINE_NUMBER {
                return if test.line_number == last_body.line_number { 6 } else { 2 };
            }
        }
        return 2;
    };

    let Some(test) = test else {
        let Some(last_body) = last_body else {
            return 0;
        };
        if before_loop.line_number == UNKNOWN_LINE_NUMBER {
            return if affine_pair(before_loop, last_body) { 5 } else { 0 };
        }
        if before_loop.line_number == last_body.line_number {
            return 5;
        }
        return match before_last_body {
            Some(bl) if bl.line_number > last_body.line_number => 4,
            _ => 0,
        };
    };

    let Some(last_body) = last_body else {
        if before_loop.line_number == UNKNOWN_LINE_NUMBER {
            return 2;
        }
        return if before_loop.line_number == test.line_number { 3 } else { 2 };
    };

    if before_loop.line_number == UNKNOWN_LINE_NUMBER {
        return if affine_pair(before_loop, last_body) { 7 } else { 2 };
    }
    let Some(before_last_body) = before_last_body else {
        if before_loop.line_number == test.line_number {
            return if before_loop.line_number == last_body.line_number { 7 } else { 3 };
        }
        return if test.line_number == last_body.line_number { 6 } else { 2 };
    };
    if before_last_body.line_number < last_body.line_number {
        return if before_loop.line_number == test.line_number { 3 } else { 2 };
    }
    if before_loop.line_number == test.line_number {
        return 7;
    }
    if affine_pair(before_loop, last_body) {
        7
    } else {
        6
    }
}

fn max_offset2(a: &Instruction, b: &Instruction) -> i32 {
    a.offset.max(b.offset)
}

fn max_offset3(a: &Instruction, b: &Instruction, c: &Instruction) -> i32 {
    max_offset2(a, b).max(c.offset)
}

/// A negative conditional branch closes a bottom-tested loop. The sub-list is
/// collected in reverse offset order; each shape decides what to reverse and
/// strip before the body is analyzed.
fn analyze_back_if(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    mut before_list_offset: i32,
    test_index: usize,
) -> Result<i32, StructureError> {
    let test = list.remove(test_index);
    let first_offset = test.jump_offset().unwrap_or(-1);

    let mut index = test_index as i32 - 1;
    let before_loop_entry =
        if index >= 0 { list[index as usize].offset } else { before_list_offset };

    let mut sub_list: Vec<Instruction> = Vec::new();
    while index >= 0 && list[index as usize].offset >= first_offset {
        sub_list.push(list.remove(index as usize));
        index -= 1;
    }
    let sub_list_length = sub_list.len();

    if index >= 0 {
        before_list_offset = list[index as usize].offset;
    }
    let break_offset = search_min_escape_offset(&sub_list, before_list_offset, test.offset);

    // The pre-loop jump a compiler emits for a top-tested loop.
    let mut jump_before_loop: Option<usize> = None;
    if index >= 0 {
        let mut i = index;
        loop {
            let instruction = &list[i as usize];
            let is_jump = instruction.is_conditional_branch()
                || matches!(
                    instruction.op,
                    Op::Goto { .. } | Op::Try { .. } | Op::Synchronized { .. }
                );
            if is_jump {
                if let Some(offset) = instruction.jump_offset() {
                    let last_body_offset =
                        sub_list.first().map(|x| x.offset).unwrap_or(instruction.offset);
                    if last_body_offset < offset && offset <= test.offset {
                        jump_before_loop = Some(i as usize);
                        break;
                    }
                }
            }
            if i == 0 {
                break;
            }
            i -= 1;
        }
    }

    if let Some(jump_index) = jump_before_loop {
        let jump_instruction_offset = list[jump_index].offset;
        if matches!(list[jump_index].op, Op::Goto { .. }) && jump_index as i32 == index {
            list.remove(index as usize);
            index -= 1;
        }

        let before_loop_cand =
            if index >= 0 { Some(summarize(&list[index as usize])) } else { None };
        let test_cand = summarize(&test);

        let mut last_body_cand = None;
        let mut before_last_body_cand = None;
        if sub_list_length > 0 {
            last_body_cand = Some(summarize(&sub_list[0]));
            if sub_list_length > 1 {
                before_last_body_cand = Some(summarize(&sub_list[1]));
                let last_body_offset = sub_list[0].offset;
                if !check_no_jump_to_interval(
                    &sub_list,
                    0,
                    sub_list_length,
                    last_body_offset,
                    test.offset,
                ) {
                    // A jump lands between the candidate increment and the
                    // test; it cannot be a for-loop increment.
                    last_body_cand = None;
                    before_last_body_cand = None;
                }
            }
        }

        let loop_type = get_loop_type(
            before_loop_cand.as_ref(),
            Some(&test_cand),
            before_last_body_cand.as_ref(),
            last_body_cand.as_ref(),
        );

        match loop_type {
            2 => {
                // while (test)
                let mut body = sub_list;
                body.reverse();
                if !body.is_empty() {
                    analyze_list(
                        ctx,
                        &mut body,
                        Scope {
                            before_loop_entry,
                            loop_entry: test.offset,
                            after_body_loop: test.offset,
                            before_list: jump_instruction_offset,
                            after_list: test.offset,
                            break_offset,
                        },
                    )?;
                }
                let branch = if break_offset != -1 { break_offset - test.offset } else { 1 };
                let insert_pos = (index + 1) as usize;
                let node = Instruction::new(
                    test.offset,
                    test.line_number,
                    Op::While { test: Box::new(test), branch, instructions: body },
                );
                list.insert(insert_pos, node);
                Ok(insert_pos as i32)
            }
            3 => {
                // for (init; test;)
                let before_loop = list.remove(index as usize);
                let mut body = sub_list;
                body.reverse();
                if !body.is_empty() {
                    analyze_list(
                        ctx,
                        &mut body,
                        Scope {
                            before_loop_entry,
                            loop_entry: test.offset,
                            after_body_loop: test.offset,
                            before_list: jump_instruction_offset,
                            after_list: test.offset,
                            break_offset,
                        },
                    )?;
                }
                let insert_pos = index as usize;
                create_for_loop_case1(ctx, list, insert_pos, before_loop, test, body, break_offset)?;
                Ok(insert_pos as i32)
            }
            6 => {
                // for (; test; incr)
                if sub_list_length > 1 {
                    let mut body = sub_list;
                    body.reverse();
                    let increment = body.pop().ok_or(StructureError::UnexpectedStructure(
                        "for loop without increment",
                    ))?;
                    let before_last_offset =
                        body.last().map(|i| i.offset).unwrap_or(before_loop_entry);
                    analyze_list(
                        ctx,
                        &mut body,
                        Scope {
                            before_loop_entry: before_last_offset,
                            loop_entry: increment.offset,
                            after_body_loop: increment.offset,
                            before_list: jump_instruction_offset,
                            after_list: increment.offset,
                            break_offset,
                        },
                    )?;
                    let branch = if break_offset != -1 { break_offset - test.offset } else { 1 };
                    let insert_pos = (index + 1) as usize;
                    let node = Instruction::new(
                        test.offset,
                        test.line_number,
                        Op::For {
                            init: None,
                            test: Some(Box::new(test)),
                            increment: Some(Box::new(increment)),
                            branch,
                            instructions: body,
                        },
                    );
                    list.insert(insert_pos, node);
                    Ok(insert_pos as i32)
                } else {
                    let mut body = sub_list;
                    if !body.is_empty() {
                        analyze_list(
                            ctx,
                            &mut body,
                            Scope {
                                before_loop_entry,
                                loop_entry: test.offset,
                                after_body_loop: test.offset,
                                before_list: jump_instruction_offset,
                                after_list: test.offset,
                                break_offset,
                            },
                        )?;
                    }
                    let branch = if break_offset != -1 { break_offset - test.offset } else { 1 };
                    let insert_pos = (index + 1) as usize;
                    let node = Instruction::new(
                        test.offset,
                        test.line_number,
                        Op::While { test: Box::new(test), branch, instructions: body },
                    );
                    list.insert(insert_pos, node);
                    Ok(insert_pos as i32)
                }
            }
            7 => {
                // for (init; test; incr)
                let before_loop = list.remove(index as usize);
                let mut body = sub_list;
                body.reverse();
                let increment = body.pop().ok_or(StructureError::UnexpectedStructure(
                    "for loop without increment",
                ))?;
                if !body.is_empty() {
                    let before_last_offset =
                        body.last().map(|i| i.offset).unwrap_or(before_loop_entry);
                    analyze_list(
                        ctx,
                        &mut body,
                        Scope {
                            before_loop_entry: before_last_offset,
                            loop_entry: increment.offset,
                            after_body_loop: increment.offset,
                            before_list: jump_instruction_offset,
                            after_list: increment.offset,
                            break_offset,
                        },
                    )?;
                }
                let insert_pos = index as usize;
                let new_index = create_for_loop_case3(
                    ctx,
                    list,
                    insert_pos,
                    before_loop,
                    test,
                    increment,
                    body,
                    break_offset,
                )?;
                Ok(new_index as i32)
            }
            _ => Err(StructureError::UnexpectedStructure("back-if loop shape")),
        }
    } else if sub_list_length > 0 {
        // No pre-loop jump: the body runs before the bottom test, a do-while.
        let mut body = sub_list;
        body.reverse();
        analyze_list(
            ctx,
            &mut body,
            Scope {
                before_loop_entry,
                loop_entry: test.offset,
                after_body_loop: test.offset,
                before_list: before_list_offset,
                after_list: test.offset,
                break_offset,
            },
        )?;
        let branch = if break_offset != -1 { break_offset - test.offset } else { 1 };
        let insert_pos = (index + 1) as usize;
        let node = Instruction::new(
            test.offset,
            UNKNOWN_LINE_NUMBER,
            Op::DoWhile { test: Box::new(test), branch, instructions: body },
        );
        list.insert(insert_pos, node);
        Ok(insert_pos as i32)
    } else {
        // A do-while with an empty body degenerates to a while.
        let insert_pos = (index + 1) as usize;
        let node = Instruction::new(
            test.offset,
            test.line_number,
            Op::While { test: Box::new(test), branch: 1, instructions: Vec::new() },
        );
        list.insert(insert_pos, node);
        Ok(insert_pos as i32)
    }
}

/// An unconditional back-goto (or a try/synchronized block whose escape jump
/// points backwards) closes a loop whose test, if any, sits at the top.
pub(super) fn analyze_back_goto(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    mut before_list_offset: i32,
    after_sub_list_offset: i32,
    jump_index: usize,
    first_offset: i32,
) -> Result<i32, StructureError> {
    let jump_instruction = list.remove(jump_index);
    let jump_instruction_offset = jump_instruction.offset;

    let mut sub_list: Vec<Instruction> = Vec::new();
    if matches!(jump_instruction.op, Op::Try { .. } | Op::Synchronized { .. }) {
        sub_list.push(jump_instruction);
    }

    let mut index = jump_index as i32 - 1;
    while index >= 0 && list[index as usize].offset >= first_offset {
        sub_list.push(list.remove(index as usize));
        index -= 1;
    }
    let sub_list_length = sub_list.len();

    if sub_list_length == 0 {
        let insert_pos = (index + 1) as usize;
        let node = Instruction::new(
            jump_instruction_offset,
            UNKNOWN_LINE_NUMBER,
            Op::InfiniteLoop { branch: 0, instructions: Vec::new() },
        );
        list.insert(insert_pos, node);
        return Ok(insert_pos as i32);
    }

    let before_loop_cand = if index >= 0 {
        before_list_offset = list[index as usize].offset;
        Some(summarize(&list[index as usize]))
    } else {
        None
    };

    let break_offset =
        search_min_escape_offset(&sub_list, before_list_offset, jump_instruction_offset);

    // The loop-top test: the lowest-offset instruction, when it is a
    // conditional whose jump is the loop escape.
    let top = sub_list.last().ok_or(StructureError::UnexpectedStructure("empty loop body"))?;
    let has_test = top.is_conditional_branch() && top.jump_offset() == Some(break_offset);
    let test_cand = if has_test { Some(summarize(top)) } else { None };

    let mut last_body_cand = None;
    let mut before_last_body_cand = None;
    {
        let last_body = &sub_list[0];
        let last_is_test = has_test && sub_list_length == 1;
        if !last_is_test {
            last_body_cand = Some(summarize(last_body));
            if sub_list_length > 1 {
                let before_last = &sub_list[1];
                let before_last_is_test = has_test && sub_list_length == 2;
                if !before_last_is_test {
                    before_last_body_cand = Some(summarize(before_last));
                }
                if !check_no_jump_to_interval(
                    &sub_list,
                    0,
                    sub_list_length,
                    last_body.offset,
                    jump_instruction_offset,
                ) || !check_no_jump_to_interval(
                    &sub_list,
                    0,
                    sub_list_length,
                    before_list_offset,
                    first_offset,
                ) {
                    last_body_cand = None;
                    before_last_body_cand = None;
                }
            }
        }
    }

    let loop_type = get_loop_type(
        before_loop_cand.as_ref(),
        test_cand.as_ref(),
        before_last_body_cand.as_ref(),
        last_body_cand.as_ref(),
    );

    match loop_type {
        0 | 1 => {
            // Infinite loop; a preceding statement stays outside the node.
            let mut body = sub_list;
            body.reverse();
            let first_body_offset = body.first().map(|i| i.offset).unwrap_or(first_offset);
            analyze_list(
                ctx,
                &mut body,
                Scope {
                    before_loop_entry: before_list_offset,
                    loop_entry: first_body_offset,
                    after_body_loop: after_sub_list_offset,
                    before_list: before_list_offset,
                    after_list: after_sub_list_offset,
                    break_offset,
                },
            )?;
            let branch =
                if break_offset != -1 { break_offset - jump_instruction_offset } else { 1 };
            let insert_pos = (index + 1) as usize;
            let node = Instruction::new(
                jump_instruction_offset,
                UNKNOWN_LINE_NUMBER,
                Op::InfiniteLoop { branch, instructions: body },
            );
            list.insert(insert_pos, node);
            Ok(insert_pos as i32)
        }
        2 => {
            // while (test), test hoisted from the loop top.
            let mut body = sub_list;
            let mut test = body
                .pop()
                .ok_or(StructureError::UnexpectedStructure("loop without top test"))?;
            body.reverse();
            if !body.is_empty() {
                let before_test_offset = if index >= 0 {
                    list[index as usize].offset
                } else {
                    before_list_offset
                };
                analyze_list(
                    ctx,
                    &mut body,
                    Scope {
                        before_loop_entry: before_test_offset,
                        loop_entry: test.offset,
                        after_body_loop: after_sub_list_offset,
                        before_list: test.offset,
                        after_list: after_sub_list_offset,
                        break_offset,
                    },
                )?;
            }
            let branch =
                if break_offset != -1 { break_offset - jump_instruction_offset } else { 1 };
            test.invert_test();
            let insert_pos = (index + 1) as usize;
            let node = Instruction::new(
                jump_instruction_offset,
                test.line_number,
                Op::While { test: Box::new(test), branch, instructions: body },
            );
            list.insert(insert_pos, node);
            Ok(insert_pos as i32)
        }
        3 => {
            // for (init; test;)
            let before_loop = list.remove(index as usize);
            let mut body = sub_list;
            let mut test = body
                .pop()
                .ok_or(StructureError::UnexpectedStructure("loop without top test"))?;
            body.reverse();
            if !body.is_empty() {
                analyze_list(
                    ctx,
                    &mut body,
                    Scope {
                        before_loop_entry: before_loop.offset,
                        loop_entry: test.offset,
                        after_body_loop: after_sub_list_offset,
                        before_list: test.offset,
                        after_list: after_sub_list_offset,
                        break_offset,
                    },
                )?;
            }
            test.invert_test();
            let insert_pos = index as usize;
            create_for_loop_case1(ctx, list, insert_pos, before_loop, test, body, break_offset)?;
            Ok(insert_pos as i32)
        }
        4 | 5 => {
            // for (;;incr) / for (init;;incr)
            let with_init = loop_type == 5;
            let before_loop = if with_init {
                Some(list.remove(index as usize))
            } else {
                None
            };
            let mut body = sub_list;
            body.reverse();
            let increment = body.pop().ok_or(StructureError::UnexpectedStructure(
                "for loop without increment",
            ))?;
            if !body.is_empty() {
                let before_last_offset =
                        body.last().map(|i| i.offset).unwrap_or(before_list_offset);
                analyze_list(
                    ctx,
                    &mut body,
                    Scope {
                        before_loop_entry: before_last_offset,
                        loop_entry: increment.offset,
                        after_body_loop: increment.offset,
                        before_list: before_list_offset,
                        after_list: after_sub_list_offset,
                        break_offset,
                    },
                )?;
            }
            let branch =
                if break_offset != -1 { break_offset - jump_instruction_offset } else { 1 };
            let insert_pos = if with_init { index as usize } else { (index + 1) as usize };
            let node = Instruction::new(
                jump_instruction_offset,
                increment.line_number,
                Op::For {
                    init: before_loop.map(Box::new),
                    test: None,
                    increment: Some(Box::new(increment)),
                    branch,
                    instructions: body,
                },
            );
            list.insert(insert_pos, node);
            Ok(insert_pos as i32)
        }
        6 => {
            // for (; test; incr), or while when only the test remains.
            let mut body = sub_list;
            let mut test = body
                .pop()
                .ok_or(StructureError::UnexpectedStructure("loop without top test"))?;
            if body.len() > 1 {
                body.reverse();
                let increment = body
                    .pop()
                    .ok_or(StructureError::UnexpectedStructure("for loop without increment"))?;
                if !body.is_empty() {
                    let before_last_offset =
                        body.last().map(|i| i.offset).unwrap_or(before_list_offset);
                    analyze_list(
                        ctx,
                        &mut body,
                        Scope {
                            before_loop_entry: before_last_offset,
                            loop_entry: increment.offset,
                            after_body_loop: increment.offset,
                            before_list: test.offset,
                            after_list: after_sub_list_offset,
                            break_offset,
                        },
                    )?;
                }
                let branch =
                    if break_offset != -1 { break_offset - jump_instruction_offset } else { 1 };
                test.invert_test();
                let insert_pos = (index + 1) as usize;
                let line_number = increment.line_number;
                let node = Instruction::new(
                    jump_instruction_offset,
                    line_number,
                    Op::For {
                        init: None,
                        test: Some(Box::new(test)),
                        increment: Some(Box::new(increment)),
                        branch,
                        instructions: body,
                    },
                );
                list.insert(insert_pos, node);
                Ok(insert_pos as i32)
            } else {
                if !body.is_empty() {
                    let before_test_offset = if index >= 0 {
                        list[index as usize].offset
                    } else {
                        before_list_offset
                    };
                    let loop_entry = body[0].offset;
                    analyze_list(
                        ctx,
                        &mut body,
                        Scope {
                            before_loop_entry: before_test_offset,
                            loop_entry: test.offset,
                            after_body_loop: loop_entry,
                            before_list: test.offset,
                            after_list: after_sub_list_offset,
                            break_offset,
                        },
                    )?;
                }
                let branch =
                    if break_offset != -1 { break_offset - jump_instruction_offset } else { 1 };
                test.invert_test();
                let insert_pos = (index + 1) as usize;
                let node = Instruction::new(
                    jump_instruction_offset,
                    test.line_number,
                    Op::While { test: Box::new(test), branch, instructions: body },
                );
                list.insert(insert_pos, node);
                Ok(insert_pos as i32)
            }
        }
        7 => {
            // for (init; test; incr)
            let before_loop = list.remove(index as usize);
            let mut body = sub_list;
            let mut test = body
                .pop()
                .ok_or(StructureError::UnexpectedStructure("loop without top test"))?;
            body.reverse();
            let increment = body.pop().ok_or(StructureError::UnexpectedStructure(
                "for loop without increment",
            ))?;
            if !body.is_empty() {
                let before_last_offset =
                        body.last().map(|i| i.offset).unwrap_or(before_list_offset);
                analyze_list(
                    ctx,
                    &mut body,
                    Scope {
                        before_loop_entry: before_last_offset,
                        loop_entry: increment.offset,
                        after_body_loop: increment.offset,
                        before_list: test.offset,
                        after_list: after_sub_list_offset,
                        break_offset,
                    },
                )?;
            }
            test.invert_test();
            let insert_pos = index as usize;
            let new_index = create_for_loop_case3(
                ctx,
                list,
                insert_pos,
                before_loop,
                test,
                increment,
                body,
                break_offset,
            )?;
            Ok(new_index as i32)
        }
        _ => Err(StructureError::UnexpectedStructure("back-goto loop shape")),
    }
}

/// Build `for (init; test;)`, specializing into the iterator `for-each` when
/// the pattern matches.
fn create_for_loop_case1(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    insert_pos: usize,
    before_loop: Instruction,
    test: Instruction,
    mut body: Vec<Instruction>,
    break_offset: i32,
) -> Result<(), StructureError> {
    let for_loop_offset = max_offset2(&before_loop, &test);
    let branch = if break_offset != -1 { break_offset - for_loop_offset } else { 1 };

    if ctx.options.desugar_foreach
        && foreach::is_iterator_pattern(ctx, &before_loop, &test, &body)
    {
        let variable = foreach::for_each_variable(body.remove(0));
        let values = match &before_loop.op {
            Op::AStore { valueref, .. } => match &valueref.op {
                Op::Invokeinterface { objectref, .. } | Op::Invokevirtual { objectref, .. } => {
                    objectref.as_ref().clone()
                }
                _ => return Err(StructureError::UnexpectedInstruction { offset: before_loop.offset }),
            },
            _ => return Err(StructureError::UnexpectedInstruction { offset: before_loop.offset }),
        };
        foreach::remove_synthetic_variable(ctx, &before_loop);
        let node = Instruction::new(
            for_loop_offset,
            before_loop.line_number,
            Op::ForEach {
                variable: Box::new(variable),
                values: Box::new(values),
                branch,
                instructions: body,
            },
        );
        list.insert(insert_pos, node);
    } else {
        let line_number = before_loop.line_number;
        let node = Instruction::new(
            for_loop_offset,
            line_number,
            Op::For {
                init: Some(Box::new(before_loop)),
                test: Some(Box::new(test)),
                increment: None,
                branch,
                instructions: body,
            },
        );
        list.insert(insert_pos, node);
    }
    Ok(())
}

/// Build `for (init; test; incr)`, specializing into one of the three array
/// `for-each` lowerings when the surrounding stores match.
#[allow(clippy::too_many_arguments)]
fn create_for_loop_case3(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    insert_pos: usize,
    before_loop: Instruction,
    test: Instruction,
    last_body_loop: Instruction,
    mut body: Vec<Instruction>,
    break_offset: i32,
) -> Result<usize, StructureError> {
    let for_loop_offset = max_offset3(&before_loop, &test, &last_body_loop);
    let branch = if break_offset != -1 { break_offset - for_loop_offset } else { 1 };

    let pattern = if ctx.options.desugar_foreach {
        foreach::array_pattern_type(ctx, &before_loop, &test, &last_body_loop, list, insert_pos, &body)
    } else {
        foreach::ArrayPattern::None
    };

    match pattern {
        foreach::ArrayPattern::Sun15 => {
            let variable = foreach::for_each_variable(body.remove(0));
            let pos = insert_pos - 1;
            let si_length = list.remove(pos);
            let (values, si_tmp_array) = foreach::sun15_values(si_length)?;
            foreach::remove_synthetic_variable(ctx, &si_tmp_array);
            foreach::remove_synthetic_variable(ctx, &before_loop);
            let line_number = variable.line_number;
            let node = Instruction::new(
                for_loop_offset,
                line_number,
                Op::ForEach {
                    variable: Box::new(variable),
                    values: Box::new(values),
                    branch,
                    instructions: body,
                },
            );
            list.insert(pos, node);
            Ok(pos)
        }
        foreach::ArrayPattern::Sun16 => {
            let variable = foreach::for_each_variable(body.remove(0));
            let si_length = list.remove(insert_pos - 1);
            let si_tmp_array = list.remove(insert_pos - 2);
            let values = match si_tmp_array.op {
                Op::AStore { ref valueref, .. } => valueref.as_ref().clone(),
                _ => return Err(StructureError::UnexpectedInstruction { offset: si_tmp_array.offset }),
            };
            foreach::remove_synthetic_variable(ctx, &si_length);
            foreach::remove_synthetic_variable(ctx, &before_loop);
            foreach::remove_synthetic_variable(ctx, &si_tmp_array);
            let pos = insert_pos - 2;
            let line_number = variable.line_number;
            let node = Instruction::new(
                for_loop_offset,
                line_number,
                Op::ForEach {
                    variable: Box::new(variable),
                    values: Box::new(values),
                    branch,
                    instructions: body,
                },
            );
            list.insert(pos, node);
            Ok(pos)
        }
        foreach::ArrayPattern::Ibm => {
            let variable = foreach::for_each_variable(body.remove(0));
            let si_index = list.remove(insert_pos - 1);
            let si_tmp_array = list.remove(insert_pos - 2);
            let values = match si_tmp_array.op {
                Op::AStore { ref valueref, .. } => valueref.as_ref().clone(),
                _ => return Err(StructureError::UnexpectedInstruction { offset: si_tmp_array.offset }),
            };
            foreach::remove_synthetic_variable(ctx, &before_loop);
            foreach::remove_synthetic_variable(ctx, &si_index);
            foreach::remove_synthetic_variable(ctx, &si_tmp_array);
            let pos = insert_pos - 2;
            let line_number = variable.line_number;
            let node = Instruction::new(
                for_loop_offset,
                line_number,
                Op::ForEach {
                    variable: Box::new(variable),
                    values: Box::new(values),
                    branch,
                    instructions: body,
                },
            );
            list.insert(pos, node);
            Ok(pos)
        }
        foreach::ArrayPattern::None => {
            let line_number = before_loop.line_number;
            let node = Instruction::new(
                for_loop_offset,
                line_number,
                Op::For {
                    init: Some(Box::new(before_loop)),
                    test: Some(Box::new(test)),
                    increment: Some(Box::new(last_body_loop)),
                    branch,
                    instructions: body,
                },
            );
            list.insert(insert_pos, node);
            Ok(insert_pos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(line_number: i32, kind: CandKind, target: Option<u16>) -> LoopCand {
        LoopCand { line_number, kind, target }
    }

    #[test]
    fn loop_type_table() {
        let istore1 = cand(10, CandKind::IntStore, Some(1));
        let iinc1 = cand(12, CandKind::Iinc, Some(1));
        let iinc1_same_line = cand(10, CandKind::Iinc, Some(1));
        let test_same_line = cand(10, CandKind::Other, None);
        let test_other_line = cand(11, CandKind::Other, None);
        let stmt = cand(11, CandKind::Other, None);

        // No init, no test, no increment: infinite.
        assert_eq!(get_loop_type(None, None, None, None), 0);
        // Test only: while.
        assert_eq!(get_loop_type(None, Some(&test_other_line), None, None), 2);
        // Init and test on one line: for (init; test;).
        assert_eq!(get_loop_type(Some(&istore1), Some(&test_same_line), None, None), 3);
        // Init and test on different lines: while preceded by a statement.
        assert_eq!(get_loop_type(Some(&istore1), Some(&test_other_line), None, None), 2);
        // Full shape, init/test sharing a line: for (init; test; incr).
        assert_eq!(
            get_loop_type(Some(&istore1), Some(&test_same_line), Some(&stmt), Some(&iinc1_same_line)),
            7
        );
        // Without line data, the same slot ties the increment to the init.
        let istore1_no_line = cand(UNKNOWN_LINE_NUMBER, CandKind::IntStore, Some(1));
        assert_eq!(get_loop_type(Some(&istore1_no_line), None, Some(&stmt), Some(&iinc1)), 5);
    }

    #[test]
    fn loop_type_without_line_numbers_prefers_while() {
        // Stripped line numbers: a while can only be told from a do-while by
        // the pre-loop jump, so the table falls back to 2.
        let init = cand(UNKNOWN_LINE_NUMBER, CandKind::IntStore, Some(1));
        let test = cand(UNKNOWN_LINE_NUMBER, CandKind::Other, None);
        let body = cand(UNKNOWN_LINE_NUMBER, CandKind::Other, None);
        assert_eq!(get_loop_type(Some(&init), Some(&test), None, Some(&body)), 2);
    }
}
