//! Ternary operator folding.
//!
//! The compiler lowers `c ? a : b` into two converging jumps with the true
//! value stranded on the stack; upstream decoding leaves it as a
//! `TernaryOpStore`. The false value ends up embedded in the statement at the
//! convergence point, where the fold rewrites it into a `TernaryOp`.

use crate::instruction::{Instruction, Op};

pub(crate) fn reconstruct(list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i + 3 < list.len() {
        let shape = list[i].is_conditional_branch()
            && matches!(list[i + 1].op, Op::TernaryOpStore { .. })
            && matches!(list[i + 2].op, Op::Goto { .. });
        if !shape {
            i += 1;
            continue;
        }
        let test_target = list[i].jump_offset().unwrap_or(-1);
        let goto_offset = list[i + 2].offset;
        let goto_target = list[i + 2].jump_offset().unwrap_or(-1);
        let consumer_offset = list[i + 3].offset;

        // The test skips over the goto into the false value, and the goto
        // converges inside (or right at) the consumer statement.
        if test_target <= goto_offset
            || test_target > consumer_offset
            || goto_target < test_target
            || goto_target > consumer_offset + 1
        {
            i += 1;
            continue;
        }

        let goto_instruction = list.remove(i + 2);
        let ternary_store = list.remove(i + 1);
        let mut test = list.remove(i);
        test.invert_test();
        let value1 = match ternary_store.op {
            Op::TernaryOpStore { value } => value,
            _ => unreachable!(),
        };

        if !fold_into_consumer(&mut list[i], test, value1, goto_instruction.offset) {
            // No embedded false value: leave the list untouched beyond the
            // removals already made and fail the method downstream.
            i += 1;
            continue;
        }
    }
}

/// Replace the first operand of `consumer` produced after the bridging goto
/// with the folded ternary. Returns false when no such operand exists.
fn fold_into_consumer(
    consumer: &mut Instruction,
    test: Instruction,
    value1: Box<Instruction>,
    goto_offset: i32,
) -> bool {
    let mut done = false;
    let mut is_root = true;
    consumer.walk_mut(&mut |node| {
        if is_root {
            is_root = false;
            return;
        }
        if done || node.offset <= goto_offset {
            return;
        }
        done = true;
        let value2 = std::mem::replace(
            node,
            Instruction::new(node.offset, node.line_number, Op::Return),
        );
        let offset = value2.offset;
        let line_number = test.line_number;
        *node = Instruction::new(
            offset,
            line_number,
            Op::TernaryOp {
                test: Box::new(test.clone()),
                value1: value1.clone(),
                value2: Box::new(value2),
            },
        );
    });
    done
}

/// Fold `if (!c) return b; return a;` shapes emitted for `return c ? a : b;`
/// (recognized by the shared source line) into a single ternary return.
pub(crate) fn ternary_in_return(list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i + 2 < list.len() {
        let shape = list[i].is_conditional_branch()
            && matches!(list[i + 1].op, Op::XReturn { .. })
            && matches!(list[i + 2].op, Op::XReturn { .. })
            && list[i].jump_offset() == Some(list[i + 2].offset)
            && list[i].line_number == list[i + 1].line_number
            && list[i].line_number != crate::instruction::UNKNOWN_LINE_NUMBER;
        if !shape {
            i += 1;
            continue;
        }

        let second_return = list.remove(i + 2);
        let first_return = list.remove(i + 1);
        let mut test = list.remove(i);
        test.invert_test();

        let value1 = match first_return.op {
            Op::XReturn { valueref } => valueref,
            _ => unreachable!(),
        };
        let (offset, value2) = match second_return.op {
            Op::XReturn { valueref } => (second_return.offset, valueref),
            _ => unreachable!(),
        };
        let line_number = test.line_number;
        let ternary = Instruction::new(
            value2.offset,
            line_number,
            Op::TernaryOp { test: Box::new(test), value1, value2 },
        );
        list.insert(
            i,
            Instruction::new(offset, line_number, Op::XReturn { valueref: Box::new(ternary) }),
        );
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Cmp;

    fn iconst(offset: i32, value: i32) -> Instruction {
        Instruction::new(offset, 1, Op::IConst { value, signature: "I".to_string() })
    }

    #[test]
    fn folds_converging_branches_into_ternary() {
        // x = (a == 0) ? 1 : 2;
        let mut list = vec![
            Instruction::new(
                2,
                1,
                Op::If {
                    cmp: Cmp::Ne,
                    value: Box::new(Instruction::new(0, 1, Op::ILoad { index: 1 })),
                    branch: 7, // -> 9, the false value
                },
            ),
            Instruction::new(5, 1, Op::TernaryOpStore { value: Box::new(iconst(5, 1)) }),
            Instruction::new(6, 1, Op::Goto { branch: 4 }), // -> 10
            Instruction::new(
                10,
                1,
                Op::IStore { index: 2, valueref: Box::new(iconst(9, 2)) },
            ),
        ];
        reconstruct(&mut list);
        assert_eq!(list.len(), 1);
        match &list[0].op {
            Op::IStore { valueref, .. } => match &valueref.op {
                Op::TernaryOp { test, value1, value2 } => {
                    // Branch polarity inverts back to the source condition.
                    assert!(matches!(test.op, Op::If { cmp: Cmp::Eq, .. }));
                    assert!(matches!(value1.op, Op::IConst { value: 1, .. }));
                    assert!(matches!(value2.op, Op::IConst { value: 2, .. }));
                }
                other => panic!("expected ternary, got {:?}", other),
            },
            other => panic!("expected store, got {:?}", other),
        }
    }

    #[test]
    fn folds_two_returns_into_ternary_return() {
        // return (a == 0) ? 1 : 2;
        let mut list = vec![
            Instruction::new(
                2,
                1,
                Op::If {
                    cmp: Cmp::Ne,
                    value: Box::new(Instruction::new(0, 1, Op::ILoad { index: 1 })),
                    branch: 6, // -> 8, the false return
                },
            ),
            Instruction::new(6, 1, Op::XReturn { valueref: Box::new(iconst(5, 1)) }),
            Instruction::new(8, 1, Op::XReturn { valueref: Box::new(iconst(7, 2)) }),
        ];
        ternary_in_return(&mut list);
        assert_eq!(list.len(), 1);
        match &list[0].op {
            Op::XReturn { valueref } => {
                assert!(matches!(valueref.op, Op::TernaryOp { .. }));
            }
            other => panic!("expected ternary return, got {:?}", other),
        }
    }
}
