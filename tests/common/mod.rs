//! Builders shared by the structuring tests: instruction shorthands, a
//! method/class fixture, and the tree-walking invariant checks.

#![allow(dead_code)]

use classfile_structurer::constant_pool::ConstantPool;
use classfile_structurer::instruction::{Cmp, Instruction, Op, UNKNOWN_LINE_NUMBER};
use classfile_structurer::local_variables::{LocalVariable, LocalVariables};
use classfile_structurer::types::{ClassContext, Method, MethodAccessFlags, ReferenceMap};

pub fn ins(offset: i32, line_number: i32, op: Op) -> Instruction {
    Instruction::new(offset, line_number, op)
}

pub fn iconst(offset: i32, line_number: i32, value: i32) -> Instruction {
    ins(offset, line_number, Op::IConst { value, signature: "I".to_string() })
}

pub fn iload(offset: i32, line_number: i32, index: u16) -> Instruction {
    ins(offset, line_number, Op::ILoad { index })
}

pub fn aload(offset: i32, line_number: i32, index: u16) -> Instruction {
    ins(offset, line_number, Op::ALoad { index })
}

pub fn istore(offset: i32, line_number: i32, index: u16, value: Instruction) -> Instruction {
    ins(offset, line_number, Op::IStore { index, valueref: Box::new(value) })
}

pub fn astore(offset: i32, line_number: i32, index: u16, value: Instruction) -> Instruction {
    ins(offset, line_number, Op::AStore { index, valueref: Box::new(value) })
}

pub fn goto(offset: i32, line_number: i32, target: i32) -> Instruction {
    ins(offset, line_number, Op::Goto { branch: target - offset })
}

pub fn iinc(offset: i32, line_number: i32, index: u16, count: i16) -> Instruction {
    ins(offset, line_number, Op::Iinc { index, count })
}

pub fn if_cmp(
    offset: i32,
    line_number: i32,
    cmp: Cmp,
    value1: Instruction,
    value2: Instruction,
    target: i32,
) -> Instruction {
    ins(
        offset,
        line_number,
        Op::IfCmp {
            cmp,
            value1: Box::new(value1),
            value2: Box::new(value2),
            branch: target - offset,
        },
    )
}

pub fn if_test(
    offset: i32,
    line_number: i32,
    cmp: Cmp,
    value: Instruction,
    target: i32,
) -> Instruction {
    ins(offset, line_number, Op::If { cmp, value: Box::new(value), branch: target - offset })
}

pub fn ret(offset: i32, line_number: i32) -> Instruction {
    ins(offset, line_number, Op::Return)
}

pub fn xreturn(offset: i32, line_number: i32, value: Instruction) -> Instruction {
    ins(offset, line_number, Op::XReturn { valueref: Box::new(value) })
}

pub fn local_variable(index: u16, start_pc: i32, length: i32) -> LocalVariable {
    LocalVariable::new(index, start_pc, length, 0, 0)
}

pub fn typed_local_variable(
    index: u16,
    start_pc: i32,
    length: i32,
    signature_index: u16,
) -> LocalVariable {
    LocalVariable::new(index, start_pc, length, 0, signature_index)
}

/// A void-method fixture; callers fill in code bytes, exception table and
/// the variable table as the scenario needs. Parameters are left out of the
/// table, so every registered variable starts undeclared.
pub fn method(local_variables: Vec<LocalVariable>) -> Method {
    Method::new(
        MethodAccessFlags::PUBLIC,
        1,
        2,
        Vec::new(),
        Vec::new(),
        LocalVariables::new(local_variables, 0),
    )
}

pub fn class(pool: ConstantPool) -> ClassContext {
    ClassContext::new(52, 1, pool)
}

/// A pool with a descriptor at the index `method()` points at.
pub fn minimal_pool() -> ConstantPool {
    let mut pool = ConstantPool::default();
    pool.add_utf8("run"); // 1: method name
    pool.add_utf8("()V"); // 2: method descriptor
    pool
}

pub fn run(
    class: &mut ClassContext,
    method: &mut Method,
    list: Vec<Instruction>,
) -> ReferenceMap {
    let mut reference_map = ReferenceMap::default();
    classfile_structurer::build(
        &mut reference_map,
        class,
        method,
        list,
        &Default::default(),
    );
    assert!(!method.contains_error, "method analysis failed");
    reference_map
}

/// Spec'd universal invariants over a finished tree.
pub fn assert_invariants(list: &[Instruction]) {
    // 1. No low-level jump or monitor instruction survives.
    for_each_node(list, &mut |node| {
        assert!(
            !matches!(
                node.op,
                Op::Goto { .. }
                    | Op::Jsr { .. }
                    | Op::Ret { .. }
                    | Op::MonitorEnter { .. }
                    | Op::MonitorExit { .. }
            ),
            "low-level instruction left at offset {}",
            node.offset
        );
    });

    // 2. Every labeled jump resolves to exactly one label.
    let mut label_targets = Vec::new();
    let mut labels = Vec::new();
    for_each_node(list, &mut |node| match &node.op {
        Op::GotoLabeledBreak { target } | Op::IfLabeledBreak { target, .. } => {
            label_targets.push(*target)
        }
        Op::Label { .. } => labels.push(node.offset),
        _ => {}
    });
    for target in label_targets {
        assert_eq!(
            labels.iter().filter(|&&l| l == target).count(),
            1,
            "jump target {} needs exactly one label",
            target
        );
    }

    // 5. Sibling statements stay strictly offset-ordered.
    assert_offset_ordered(list);
}

fn assert_offset_ordered(list: &[Instruction]) {
    for pair in list.windows(2) {
        assert!(
            pair[0].offset < pair[1].offset,
            "offsets out of order: {} then {}",
            pair[0].offset,
            pair[1].offset
        );
    }
    for node in list {
        for body in body_lists(node) {
            assert_offset_ordered(body);
        }
    }
}

/// Visit every node in every nested body and operand tree.
pub fn for_each_node(list: &[Instruction], f: &mut dyn FnMut(&Instruction)) {
    for node in list {
        node.walk(f);
    }
}

fn body_lists(node: &Instruction) -> Vec<&Vec<Instruction>> {
    match &node.op {
        Op::IfSimple { instructions, .. }
        | Op::While { instructions, .. }
        | Op::DoWhile { instructions, .. }
        | Op::For { instructions, .. }
        | Op::ForEach { instructions, .. }
        | Op::InfiniteLoop { instructions, .. }
        | Op::Synchronized { instructions, .. } => vec![instructions],
        Op::IfElse { instructions, else_instructions, .. } => {
            vec![instructions, else_instructions]
        }
        Op::FastSwitch { pairs, .. } => {
            pairs.iter().filter_map(|p| p.instructions.as_ref()).collect()
        }
        Op::Try { instructions, catches, finally_instructions, .. } => {
            let mut lists = vec![instructions];
            for c in catches {
                lists.push(&c.instructions);
            }
            if let Some(f) = finally_instructions {
                lists.push(f);
            }
            lists
        }
        _ => Vec::new(),
    }
}

/// Count nodes matching a predicate anywhere in the tree.
pub fn count_nodes(list: &[Instruction], pred: &dyn Fn(&Instruction) -> bool) -> usize {
    let mut count = 0;
    for_each_node(list, &mut |node| {
        if pred(node) {
            count += 1;
        }
    });
    count
}

pub const NO_LINE: i32 = UNKNOWN_LINE_NUMBER;
