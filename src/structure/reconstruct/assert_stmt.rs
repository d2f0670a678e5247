//! `assert` statement recognition.
//!
//! Source `assert cond : msg;` compiles to a branch guarded by the synthetic
//! `$assertionsDisabled` field followed by a thrown `AssertionError`. After
//! comparison aggregation the guard and the condition share one multi-test
//! node, so the pattern is two adjacent statements.

use crate::constant_pool::ConstantPool;
use crate::instruction::{Instruction, Op};

pub(crate) fn reconstruct(pool: &ConstantPool, list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i + 1 < list.len() {
        if !is_assertion_error_throw(pool, &list[i + 1]) {
            i += 1;
            continue;
        }
        let Some(condition) = strip_disabled_guard(pool, &list[i]) else {
            i += 1;
            continue;
        };

        let throw = list.remove(i + 1);
        let guard = list.remove(i);
        let msg = match throw.op {
            Op::Athrow { value } => match value.op {
                Op::InvokeNew { args, .. } => args.into_iter().next().map(Box::new),
                _ => None,
            },
            _ => None,
        };
        list.insert(
            i,
            Instruction::new(
                guard.offset,
                guard.line_number,
                Op::Assert { test: Box::new(condition), msg },
            ),
        );
        i += 1;
    }
}

fn is_assertion_error_throw(pool: &ConstantPool, instruction: &Instruction) -> bool {
    match &instruction.op {
        Op::Athrow { value } => match &value.op {
            Op::InvokeNew { index, .. } => pool
                .resolve_ref(*index)
                .map(|(class_name, _, _)| class_name == "java/lang/AssertionError")
                .unwrap_or(false),
            _ => false,
        },
        _ => false,
    }
}

/// Drop the `$assertionsDisabled` sub-test from the guard; what remains is
/// the asserted condition (in skip-the-throw polarity, which is the source
/// polarity).
fn strip_disabled_guard(pool: &ConstantPool, guard: &Instruction) -> Option<Instruction> {
    match &guard.op {
        Op::ComplexIf { instructions, .. } => {
            let (first, rest) = instructions.split_first()?;
            if !is_disabled_test(pool, first) {
                return None;
            }
            match rest {
                [single] => Some(single.clone()),
                [] => None,
                many => {
                    let last = many.last()?;
                    let mut node = guard.clone();
                    match &mut node.op {
                        Op::ComplexIf { instructions, .. } => {
                            *instructions = many.to_vec();
                        }
                        _ => unreachable!(),
                    }
                    node.offset = last.offset;
                    Some(node)
                }
            }
        }
        // `assert false;` keeps only the guard itself.
        Op::If { .. } if is_disabled_test(pool, guard) => {
            let mut node = guard.clone();
            node.op = Op::IConst { value: 0, signature: "Z".to_string() };
            Some(node)
        }
        _ => None,
    }
}

fn is_disabled_test(pool: &ConstantPool, test: &Instruction) -> bool {
    match &test.op {
        Op::If { value, .. } => match &value.op {
            Op::GetStatic { index } => pool
                .resolve_ref(*index)
                .map(|(_, name, _)| name == "$assertionsDisabled")
                .unwrap_or(false),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::ConstantPool;
    use crate::instruction::{BoolOp, Cmp};

    #[test]
    fn guarded_throw_becomes_assert() {
        let mut pool = ConstantPool::default();
        let disabled_field = pool.add_field_ref("T", "$assertionsDisabled", "Z");
        let error_ctor = pool.add_method_ref("java/lang/AssertionError", "<init>", "()V");

        // if ($assertionsDisabled || x != 0) goto 14; throw new AssertionError();
        let guard = Instruction::new(
            5,
            3,
            Op::If {
                cmp: Cmp::Ne,
                value: Box::new(Instruction::new(0, 3, Op::GetStatic { index: disabled_field })),
                branch: 9,
            },
        );
        let condition = Instruction::new(
            8,
            3,
            Op::If {
                cmp: Cmp::Ne,
                value: Box::new(Instruction::new(7, 3, Op::ILoad { index: 1 })),
                branch: 6,
            },
        );
        let mut list = vec![
            Instruction::new(
                8,
                3,
                Op::ComplexIf { cmp: BoolOp::Or, instructions: vec![guard, condition], branch: 6 },
            ),
            Instruction::new(
                13,
                3,
                Op::Athrow {
                    value: Box::new(Instruction::new(
                        12,
                        3,
                        Op::InvokeNew { index: error_ctor, args: vec![] },
                    )),
                },
            ),
            Instruction::new(14, 4, Op::Return),
        ];
        reconstruct(&pool, &mut list);
        assert_eq!(list.len(), 2);
        match &list[0].op {
            Op::Assert { test, msg } => {
                assert!(matches!(test.op, Op::If { cmp: Cmp::Ne, .. }));
                assert!(msg.is_none());
            }
            other => panic!("expected assert, got {:?}", other),
        }
    }

    #[test]
    fn unguarded_throw_is_left_alone() {
        let mut pool = ConstantPool::default();
        let error_ctor = pool.add_method_ref("java/lang/AssertionError", "<init>", "()V");
        let mut list = vec![Instruction::new(
            13,
            3,
            Op::Athrow {
                value: Box::new(Instruction::new(
                    12,
                    3,
                    Op::InvokeNew { index: error_ctor, args: vec![] },
                )),
            },
        )];
        reconstruct(&pool, &mut list);
        assert_eq!(list.len(), 1);
        assert!(matches!(list[0].op, Op::Athrow { .. }));
    }
}
