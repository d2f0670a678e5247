//! Forward-conditional recognition: `if`, `if/else`, `if-break`.
//!
//! Loops and switches are already built when this runs, so every remaining
//! forward conditional opens either a plain `if` body, an `if/else` pair
//! bridged by a `goto`, or one of the break forms handled later by the jump
//! rewriter.

use crate::bytecode;
use crate::error::StructureError;
use crate::instruction::{Instruction, Op};

use super::labels::create_break_and_continue;
use super::util::search_min_escape_offset;
use super::{analyze_list, Ctx, Scope};

pub(crate) fn create_if_else(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
) -> Result<(), StructureError> {
    let mut index = 0;
    while index < list.len() {
        if list[index].is_conditional_branch() {
            analyze_if_and_if_else(ctx, list, scope, index)?;
        }
        index += 1;
    }
    Ok(())
}

fn analyze_if_and_if_else(
    ctx: &mut Ctx,
    list: &mut Vec<Instruction>,
    scope: Scope,
    test_index: usize,
) -> Result<(), StructureError> {
    if list.is_empty() {
        return Ok(());
    }
    let test = &list[test_index];
    let mut else_offset = test.jump_offset().unwrap_or(-1);

    if test.branch().unwrap_or(0) < 0
        && scope.before_loop_entry < else_offset
        && else_offset <= scope.loop_entry
        && scope.after_body_loop == scope.after_list
    {
        // A backward jump to the loop entry from the block that ends the
        // loop body behaves like a jump past the body.
        else_offset = scope.after_list;
    }

    let test_offset = test.offset;
    if else_offset <= test_offset || (scope.after_list != -1 && else_offset > scope.after_list) {
        return Ok(());
    }

    let mut test = list.remove(test_index);

    if test_index < list.len() {
        let mut sub_list = extract_block(list, test_index, else_offset);
        if sub_list.is_empty() {
            test.invert_test();
            let node = Instruction::new(
                test.offset,
                test.line_number,
                Op::IfSimple {
                    branch: else_offset - test.offset,
                    test: Box::new(test),
                    instructions: Vec::new(),
                },
            );
            list.insert(test_index, node);
            return Ok(());
        }

        let before_else_offset = sub_list.last().map(|i| i.offset).unwrap_or(test.offset);
        let before_else_line =
            sub_list.last().map(|i| i.line_number).unwrap_or(test.line_number);
        let mut minus_jump_offset =
            search_min_escape_offset(&sub_list, test.offset, before_else_offset);
        let last_list_offset = list.last().map(|i| i.offset).unwrap_or(before_else_offset);

        // A trailing return whose line number runs backwards is the
        // compiler's synthetic copy: treat it as the bridge of an if-else.
        if minus_jump_offset == -1
            && sub_list.len() > 1
            && matches!(sub_list.last().map(|i| &i.op), Some(Op::Return))
        {
            let reaches_return = scope.after_list == -1
                || scope.after_list == ctx.return_offset
                || bytecode::jump_to(
                    ctx.code,
                    bytecode::next_instruction_offset(ctx.code, last_list_offset),
                    ctx.return_offset,
                );
            let line_runs_backwards = sub_list[sub_list.len() - 2].line_number > before_else_line
                || list
                    .get(test_index)
                    .map(|i| i.line_number < before_else_line)
                    .unwrap_or(false);
            if reaches_return && line_runs_backwards {
                minus_jump_offset = if ctx.return_offset == -1 {
                    last_list_offset + 1
                } else {
                    ctx.return_offset
                };
            }
        }

        if minus_jump_offset != -1 {
            if sub_list.len() == 1 && matches!(sub_list[0].op, Op::Goto { .. }) {
                // A lone goto body becomes a break or continue directly.
                create_break_and_continue(ctx, &mut sub_list, scope)?;
                test.invert_test();
                let node = Instruction::new(
                    before_else_offset,
                    test.line_number,
                    Op::IfSimple {
                        branch: else_offset - before_else_offset,
                        test: Box::new(test),
                        instructions: sub_list,
                    },
                );
                list.insert(test_index, node);
                return Ok(());
            }

            let after_if_else_offset = if minus_jump_offset < test.offset
                && scope.before_loop_entry < minus_jump_offset
                && minus_jump_offset <= scope.loop_entry
            {
                // The body escapes back to the loop entry; only a forward
                // escape can delimit an else block.
                let positive_jump_offset =
                    search_min_escape_offset(&sub_list, -1, before_else_offset);
                if (positive_jump_offset == -1 || positive_jump_offset >= scope.after_list)
                    && scope.after_body_loop == scope.after_list
                {
                    scope.after_list
                } else {
                    positive_jump_offset
                }
            } else {
                minus_jump_offset
            };

            let joins_after_list = scope.after_list == -1
                || after_if_else_offset <= scope.after_list
                || bytecode::jump_to(
                    ctx.code,
                    bytecode::next_instruction_offset(ctx.code, last_list_offset),
                    after_if_else_offset,
                );
            if after_if_else_offset > else_offset && joins_after_list {
                // if-else (or else-if chain): drop the bridging jump.
                let bridge = match sub_list.last().map(|i| &i.op) {
                    Some(Op::Goto { .. })
                        if sub_list.last().and_then(|i| i.jump_offset())
                            == Some(minus_jump_offset) =>
                    {
                        true
                    }
                    Some(Op::Return) => true,
                    _ => false,
                };
                if bridge {
                    sub_list.pop();
                }

                let mut sub_else_list = extract_block(list, test_index, after_if_else_offset);
                if !sub_else_list.is_empty() {
                    analyze_list(
                        ctx,
                        &mut sub_list,
                        Scope {
                            before_list: test.offset,
                            after_list: after_if_else_offset,
                            ..scope
                        },
                    )?;
                    analyze_list(
                        ctx,
                        &mut sub_else_list,
                        Scope {
                            before_list: before_else_offset,
                            after_list: after_if_else_offset,
                            ..scope
                        },
                    )?;

                    let last_if_else_offset = sub_else_list
                        .last()
                        .map(|i| i.offset)
                        .unwrap_or(before_else_offset);
                    test.invert_test();
                    let node = Instruction::new(
                        last_if_else_offset,
                        test.line_number,
                        Op::IfElse {
                            branch: after_if_else_offset - last_if_else_offset,
                            test: Box::new(test),
                            instructions: sub_list,
                            else_instructions: sub_else_list,
                        },
                    );
                    list.insert(test_index, node);
                    return Ok(());
                }
            }
        }

        // Plain if.
        analyze_list(
            ctx,
            &mut sub_list,
            Scope { before_list: test.offset, after_list: else_offset, ..scope },
        )?;
        test.invert_test();
        let node = Instruction::new(
            before_else_offset,
            test.line_number,
            Op::IfSimple {
                branch: else_offset - before_else_offset,
                test: Box::new(test),
                instructions: sub_list,
            },
        );
        list.insert(test_index, node);
        Ok(())
    } else if else_offset == scope.break_offset {
        let node = Instruction::new(
            test.offset,
            test.line_number,
            Op::IfBreak { test: Box::new(test) },
        );
        list.insert(test_index, node);
        Ok(())
    } else {
        let node = Instruction::new(
            test.offset,
            test.line_number,
            Op::IfSimple {
                branch: else_offset - test.offset,
                test: Box::new(test),
                instructions: Vec::new(),
            },
        );
        list.insert(test_index, node);
        Ok(())
    }
}

/// Move `list[index..]` instructions below `end_offset` into a fresh list.
pub(super) fn extract_block(
    list: &mut Vec<Instruction>,
    index: usize,
    end_offset: i32,
) -> Vec<Instruction> {
    let mut sub_list = Vec::new();
    while index < list.len() && list[index].offset < end_offset {
        sub_list.push(list.remove(index));
    }
    sub_list
}
