//! Cleanup of dup bookkeeping left over after expression folding.

use crate::instruction::{Instruction, Op};

/// Inline `DupStore`s that keep a constant or a field read: the duplicated
/// value is side-effect free, so every `DupLoad` can repeat it directly.
pub(crate) fn remove_dup_constants(list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i < list.len() {
        let replacement = match &list[i].op {
            Op::DupStore { objectref } if is_repeatable(objectref) => {
                Some((list[i].offset, objectref.as_ref().clone()))
            }
            _ => None,
        };
        match replacement {
            Some((dup_offset, value)) => {
                list.remove(i);
                replace_dup_loads(list, dup_offset, &value);
            }
            None => i += 1,
        }
    }
}

/// Inline a `DupStore` consumed by exactly one `DupLoad`; the duplication was
/// an artifact of an expression the earlier passes already folded.
pub(crate) fn single_dup_load_cleanup(list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i < list.len() {
        let candidate = match &list[i].op {
            Op::DupStore { objectref } => Some((list[i].offset, objectref.as_ref().clone())),
            _ => None,
        };
        let Some((dup_offset, value)) = candidate else {
            i += 1;
            continue;
        };
        let mut loads = 0usize;
        for instruction in list.iter() {
            instruction.walk(&mut |node| {
                if matches!(node.op, Op::DupLoad { dup_offset: d } if d == dup_offset) {
                    loads += 1;
                }
            });
        }
        if loads == 1 {
            list.remove(i);
            replace_dup_loads(list, dup_offset, &value);
        } else {
            i += 1;
        }
    }
}

fn is_repeatable(instruction: &Instruction) -> bool {
    matches!(
        instruction.op,
        Op::AConstNull
            | Op::IConst { .. }
            | Op::LConst { .. }
            | Op::FConst { .. }
            | Op::DConst { .. }
            | Op::Ldc { .. }
            | Op::Ldc2W { .. }
            | Op::GetStatic { .. }
            | Op::ClassLiteral { .. }
    )
}

fn replace_dup_loads(list: &mut [Instruction], dup_offset: i32, value: &Instruction) {
    for instruction in list.iter_mut() {
        instruction.walk_mut(&mut |node| {
            if matches!(node.op, Op::DupLoad { dup_offset: d } if d == dup_offset) {
                let offset = node.offset;
                let line_number = node.line_number;
                *node = value.clone();
                node.offset = offset;
                node.line_number = line_number;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iconst(offset: i32, value: i32) -> Instruction {
        Instruction::new(offset, 1, Op::IConst { value, signature: "I".to_string() })
    }

    fn dup_load(offset: i32, dup_offset: i32) -> Instruction {
        Instruction::new(offset, 1, Op::DupLoad { dup_offset })
    }

    #[test]
    fn constant_dup_stores_inline_everywhere() {
        let mut list = vec![
            Instruction::new(2, 1, Op::DupStore { objectref: Box::new(iconst(1, 7)) }),
            Instruction::new(4, 1, Op::IStore { index: 1, valueref: Box::new(dup_load(3, 2)) }),
            Instruction::new(6, 1, Op::IStore { index: 2, valueref: Box::new(dup_load(5, 2)) }),
        ];
        remove_dup_constants(&mut list);
        assert_eq!(list.len(), 2);
        for store in &list {
            match &store.op {
                Op::IStore { valueref, .. } => {
                    assert!(matches!(valueref.op, Op::IConst { value: 7, .. }));
                }
                other => panic!("expected store, got {:?}", other),
            }
        }
    }

    #[test]
    fn single_use_dup_store_inlines() {
        let call = Instruction::new(
            1,
            1,
            Op::Invokestatic { index: 5, args: vec![] },
        );
        let mut list = vec![
            Instruction::new(2, 1, Op::DupStore { objectref: Box::new(call) }),
            Instruction::new(4, 1, Op::IStore { index: 1, valueref: Box::new(dup_load(3, 2)) }),
        ];
        single_dup_load_cleanup(&mut list);
        assert_eq!(list.len(), 1);
        match &list[0].op {
            Op::IStore { valueref, .. } => {
                assert!(matches!(valueref.op, Op::Invokestatic { .. }));
            }
            other => panic!("expected store, got {:?}", other),
        }
    }

    #[test]
    fn multi_use_side_effecting_dup_store_stays() {
        let call = Instruction::new(1, 1, Op::Invokestatic { index: 5, args: vec![] });
        let mut list = vec![
            Instruction::new(2, 1, Op::DupStore { objectref: Box::new(call) }),
            Instruction::new(4, 1, Op::IStore { index: 1, valueref: Box::new(dup_load(3, 2)) }),
            Instruction::new(6, 1, Op::IStore { index: 2, valueref: Box::new(dup_load(5, 2)) }),
        ];
        single_dup_load_cleanup(&mut list);
        assert_eq!(list.len(), 3, "a call must not be duplicated");
    }
}
