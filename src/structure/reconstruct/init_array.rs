//! Array-initializer folding.
//!
//! A literal `new int[] { a, b, c }` decodes as an array allocation followed
//! by one indexed store per element. The fold collapses the run into a single
//! initializer node; declaration placement later downgrades it to the braces
//! form when it initializes a declaration.

use crate::instruction::{Instruction, Op};

pub(crate) fn reconstruct(list: &mut Vec<Instruction>) {
    let mut i = 0;
    while i < list.len() {
        if !fold_at(list, i) {
            i += 1;
        }
    }
}

fn fold_at(list: &mut Vec<Instruction>, i: usize) -> bool {
    // Anchor: a store (or dup) of a fresh array with a constant dimension.
    let (anchor_slot, dup_offset) = match &list[i].op {
        Op::AStore { index, valueref } if is_sized_new_array(valueref) => (Some(*index), -1),
        Op::DupStore { objectref } if is_sized_new_array(objectref) => (None, list[i].offset),
        _ => return false,
    };

    // Count the run of element stores hitting the fresh array in index order.
    let mut count = 0usize;
    while i + 1 + count < list.len() {
        let next = &list[i + 1 + count];
        if !is_element_store(next, anchor_slot, dup_offset, count as i32) {
            break;
        }
        count += 1;
    }
    if count == 0 {
        return false;
    }

    let values: Vec<Instruction> = list
        .drain(i + 1..i + 1 + count)
        .map(|store| match store.op {
            Op::ArrayStore { valueref, .. } => *valueref,
            _ => unreachable!(),
        })
        .collect();

    let anchor = &mut list[i];
    let op = std::mem::replace(&mut anchor.op, Op::Return);
    anchor.op = match op {
        Op::AStore { index, valueref } => Op::AStore {
            index,
            valueref: Box::new(Instruction::new(
                valueref.offset,
                valueref.line_number,
                Op::NewAndInitArray { new_array: valueref, values },
            )),
        },
        Op::DupStore { objectref } => Op::DupStore {
            objectref: Box::new(Instruction::new(
                objectref.offset,
                objectref.line_number,
                Op::NewAndInitArray { new_array: objectref, values },
            )),
        },
        _ => unreachable!(),
    };
    true
}

fn is_sized_new_array(instruction: &Instruction) -> bool {
    match &instruction.op {
        Op::NewArray { dimension, .. } | Op::ANewArray { dimension, .. } => {
            matches!(dimension.op, Op::IConst { .. })
        }
        _ => false,
    }
}

fn is_element_store(
    instruction: &Instruction,
    anchor_slot: Option<u16>,
    dup_offset: i32,
    expected_index: i32,
) -> bool {
    match &instruction.op {
        Op::ArrayStore { arrayref, indexref, .. } => {
            let hits_array = match (&arrayref.op, anchor_slot) {
                (Op::ALoad { index }, Some(slot)) => *index == slot,
                (Op::DupLoad { dup_offset: d }, None) => *d == dup_offset,
                _ => false,
            };
            hits_array
                && matches!(indexref.op, Op::IConst { value, .. } if value == expected_index)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iconst(offset: i32, value: i32) -> Instruction {
        Instruction::new(offset, 1, Op::IConst { value, signature: "I".to_string() })
    }

    fn element_store(offset: i32, slot: u16, index: i32, value: i32) -> Instruction {
        Instruction::new(
            offset,
            1,
            Op::ArrayStore {
                arrayref: Box::new(Instruction::new(offset - 2, 1, Op::ALoad { index: slot })),
                indexref: Box::new(iconst(offset - 1, index)),
                valueref: Box::new(iconst(offset, value)),
            },
        )
    }

    #[test]
    fn folds_constant_stores_into_initializer() {
        // int[] a = new int[2]; a[0] = 7; a[1] = 8;  (one source literal)
        let mut list = vec![
            Instruction::new(
                2,
                1,
                Op::AStore {
                    index: 1,
                    valueref: Box::new(Instruction::new(
                        1,
                        1,
                        Op::NewArray { type_code: 10, dimension: Box::new(iconst(0, 2)) },
                    )),
                },
            ),
            element_store(5, 1, 0, 7),
            element_store(8, 1, 1, 8),
            Instruction::new(10, 2, Op::Return),
        ];
        reconstruct(&mut list);
        assert_eq!(list.len(), 2);
        match &list[0].op {
            Op::AStore { valueref, .. } => match &valueref.op {
                Op::NewAndInitArray { values, .. } => {
                    assert_eq!(values.len(), 2);
                    assert!(matches!(values[0].op, Op::IConst { value: 7, .. }));
                    assert!(matches!(values[1].op, Op::IConst { value: 8, .. }));
                }
                other => panic!("expected array initializer, got {:?}", other),
            },
            other => panic!("expected store, got {:?}", other),
        }
    }

    #[test]
    fn out_of_order_stores_do_not_fold() {
        let mut list = vec![
            Instruction::new(
                2,
                1,
                Op::AStore {
                    index: 1,
                    valueref: Box::new(Instruction::new(
                        1,
                        1,
                        Op::NewArray { type_code: 10, dimension: Box::new(iconst(0, 2)) },
                    )),
                },
            ),
            element_store(5, 1, 1, 7),
        ];
        reconstruct(&mut list);
        assert_eq!(list.len(), 2);
        assert!(matches!(
            list[0].op,
            Op::AStore { ref valueref, .. } if matches!(valueref.op, Op::NewArray { .. })
        ));
    }
}
