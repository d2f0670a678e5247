//! Compound assignment recognition: `x = x OP expr` becomes `x OP= expr`.

use crate::instruction::{Instruction, Op};

pub(crate) fn reconstruct(list: &mut [Instruction]) {
    for instruction in list.iter_mut() {
        rewrite(instruction);
    }
}

fn rewrite(instruction: &mut Instruction) {
    let offset = instruction.offset;
    let line_number = instruction.line_number;
    let op = std::mem::replace(&mut instruction.op, Op::Return);

    instruction.op = match op {
        Op::AStore { index, valueref } => {
            rewrite_store(offset, line_number, index, valueref, |index| Op::ALoad { index })
        }
        Op::IStore { index, valueref } => {
            rewrite_store(offset, line_number, index, valueref, |index| Op::ILoad { index })
        }
        Op::Store { index, signature, valueref } => {
            let sig = signature.clone();
            rewrite_store(offset, line_number, index, valueref, move |index| Op::Load {
                index,
                signature: sig.clone(),
            })
        }
        Op::PutField { index, objectref, valueref } => {
            rewrite_put_field(offset, line_number, index, objectref, valueref)
        }
        Op::PutStatic { index, valueref } => {
            rewrite_put_static(offset, line_number, index, valueref)
        }
        other => other,
    };
}

fn rewrite_store(
    offset: i32,
    line_number: i32,
    slot: u16,
    valueref: Box<Instruction>,
    make_load: impl Fn(u16) -> Op,
) -> Op {
    match valueref.op {
        Op::BinaryOp { operator, value1, value2 } if value1.load_slot() == Some(slot) => {
            Op::Assignment {
                operator: format!("{}=", operator),
                value1: Box::new(Instruction::new(offset, line_number, make_load(slot))),
                value2,
            }
        }
        op => {
            let valueref = Box::new(Instruction::new(valueref.offset, valueref.line_number, op));
            match make_load(slot) {
                Op::ALoad { index } => Op::AStore { index, valueref },
                Op::ILoad { index } => Op::IStore { index, valueref },
                Op::Load { index, signature } => Op::Store { index, signature, valueref },
                _ => unreachable!(),
            }
        }
    }
}

fn rewrite_put_field(
    offset: i32,
    line_number: i32,
    index: u16,
    objectref: Box<Instruction>,
    valueref: Box<Instruction>,
) -> Op {
    let folds = match &valueref.op {
        Op::BinaryOp { value1, .. } => match &value1.op {
            Op::GetField { index: get_index, objectref: get_obj } => {
                *get_index == index && same_simple_target(&objectref, get_obj)
            }
            _ => false,
        },
        _ => false,
    };
    if !folds {
        return Op::PutField { index, objectref, valueref };
    }
    match valueref.op {
        Op::BinaryOp { operator, value1, value2 } => Op::Assignment {
            operator: format!("{}=", operator),
            value1: Box::new(Instruction::new(offset, line_number, value1.op)),
            value2,
        },
        _ => unreachable!(),
    }
}

fn rewrite_put_static(
    offset: i32,
    line_number: i32,
    index: u16,
    valueref: Box<Instruction>,
) -> Op {
    let folds = match &valueref.op {
        Op::BinaryOp { value1, .. } => {
            matches!(value1.op, Op::GetStatic { index: get_index } if get_index == index)
        }
        _ => false,
    };
    if !folds {
        return Op::PutStatic { index, valueref };
    }
    match valueref.op {
        Op::BinaryOp { operator, value1, value2 } => Op::Assignment {
            operator: format!("{}=", operator),
            value1: Box::new(Instruction::new(offset, line_number, value1.op)),
            value2,
        },
        _ => unreachable!(),
    }
}

/// Conservative receiver equality: both sides load the same slot. Anything
/// more complex could have side effects and is left alone.
fn same_simple_target(a: &Instruction, b: &Instruction) -> bool {
    match (a.load_slot(), b.load_slot()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iconst(offset: i32, value: i32) -> Instruction {
        Instruction::new(offset, 1, Op::IConst { value, signature: "I".to_string() })
    }

    #[test]
    fn store_of_binary_op_on_same_slot_becomes_compound() {
        // x = x + 3  =>  x += 3
        let mut list = vec![Instruction::new(
            4,
            1,
            Op::IStore {
                index: 1,
                valueref: Box::new(Instruction::new(
                    3,
                    1,
                    Op::BinaryOp {
                        operator: "+".to_string(),
                        value1: Box::new(Instruction::new(1, 1, Op::ILoad { index: 1 })),
                        value2: Box::new(iconst(2, 3)),
                    },
                )),
            },
        )];
        reconstruct(&mut list);
        match &list[0].op {
            Op::Assignment { operator, value1, value2 } => {
                assert_eq!(operator, "+=");
                assert!(matches!(value1.op, Op::ILoad { index: 1 }));
                assert!(matches!(value2.op, Op::IConst { value: 3, .. }));
            }
            other => panic!("expected compound assignment, got {:?}", other),
        }
    }

    #[test]
    fn store_of_binary_op_on_other_slot_is_untouched() {
        // x = y + 3 stays a plain store.
        let mut list = vec![Instruction::new(
            4,
            1,
            Op::IStore {
                index: 1,
                valueref: Box::new(Instruction::new(
                    3,
                    1,
                    Op::BinaryOp {
                        operator: "+".to_string(),
                        value1: Box::new(Instruction::new(1, 1, Op::ILoad { index: 2 })),
                        value2: Box::new(iconst(2, 3)),
                    },
                )),
            },
        )];
        reconstruct(&mut list);
        assert!(matches!(list[0].op, Op::IStore { index: 1, .. }));
    }

    #[test]
    fn field_update_through_same_receiver_becomes_compound() {
        // this.n = this.n * 2  =>  this.n *= 2
        let get = Instruction::new(
            2,
            1,
            Op::GetField { index: 9, objectref: Box::new(Instruction::new(1, 1, Op::ALoad { index: 0 })) },
        );
        let mut list = vec![Instruction::new(
            6,
            1,
            Op::PutField {
                index: 9,
                objectref: Box::new(Instruction::new(0, 1, Op::ALoad { index: 0 })),
                valueref: Box::new(Instruction::new(
                    5,
                    1,
                    Op::BinaryOp {
                        operator: "*".to_string(),
                        value1: Box::new(get),
                        value2: Box::new(iconst(4, 2)),
                    },
                )),
            },
        )];
        reconstruct(&mut list);
        match &list[0].op {
            Op::Assignment { operator, .. } => assert_eq!(operator, "*="),
            other => panic!("expected compound assignment, got {:?}", other),
        }
    }
}
