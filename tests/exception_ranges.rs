//! Exception-table aggregation and range classification.

mod common;

use classfile_structurer::instruction::{Instruction, Op};
use classfile_structurer::structure::exception::{aggregate_code_exceptions, RangeKind};
use classfile_structurer::types::CodeException;

use common::*;

fn entry(start_pc: i32, end_pc: i32, handler_pc: i32, catch_type: u16) -> CodeException {
    CodeException { start_pc, end_pc, handler_pc, catch_type }
}

fn athrow(offset: i32, value: Instruction) -> Instruction {
    ins(offset, NO_LINE, Op::Athrow { value: Box::new(value) })
}

fn exception_store(offset: i32, slot: u16) -> Instruction {
    astore(
        offset,
        NO_LINE,
        slot,
        ins(offset, NO_LINE, Op::ExceptionLoad { exception_name_index: 0, index: slot }),
    )
}

/// Statement list of a try with two catch handlers on one protected span.
fn two_catch_list() -> Vec<Instruction> {
    vec![
        istore(1, 2, 1, iconst(0, 2, 1)),
        goto(4, 2, 24),
        exception_store(7, 2),
        istore(10, 3, 1, iconst(9, 3, 2)),
        goto(13, 3, 24),
        exception_store(16, 2),
        istore(19, 4, 1, iconst(18, 4, 3)),
        ret(24, 5),
    ]
}

#[test]
fn entries_sharing_a_span_merge_into_one_range() {
    let table = vec![entry(0, 4, 7, 30), entry(0, 4, 16, 31)];
    let ranges = aggregate_code_exceptions(&table, &two_catch_list());
    assert_eq!(ranges.len(), 1);
    let range = &ranges[0];
    assert_eq!(range.kind, RangeKind::Catch);
    assert_eq!(range.catches.len(), 2);
    assert_eq!(range.catches[0].type_index, 30);
    assert_eq!(range.catches[1].type_index, 31);
    assert_eq!(range.finally_from_offset, -1);
    assert!(!range.synchronized_flag);
    assert_eq!(range.after_offset, 24);
}

#[test]
fn multi_catch_entries_collect_other_types() {
    // Two types sharing one handler: a multi-catch.
    let table = vec![entry(0, 4, 7, 30), entry(0, 4, 7, 31)];
    let ranges = aggregate_code_exceptions(&table, &two_catch_list());
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].catches.len(), 1);
    assert_eq!(ranges[0].catches[0].type_index, 30);
    assert_eq!(ranges[0].catches[0].other_type_indexes, vec![31]);
}

#[test]
fn catch_all_rethrowing_stored_exception_is_finally() {
    // try body; goto join; e = caught; cleanup; throw e; join
    let list = vec![
        istore(1, 2, 1, iconst(0, 2, 1)),
        goto(4, 2, 16),
        exception_store(7, 2),
        istore(10, 3, 1, iconst(9, 3, 2)),
        athrow(14, aload(13, NO_LINE, 2)),
        ret(16, 4),
    ];
    let table = vec![entry(0, 4, 7, 0)];
    let ranges = aggregate_code_exceptions(&table, &list);
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].kind, RangeKind::Finally);
    assert_eq!(ranges[0].finally_from_offset, 7);
    assert!(!ranges[0].synchronized_flag);
}

#[test]
fn jsr_in_protected_code_marks_the_subroutine_form() {
    let list = vec![
        istore(1, 2, 1, iconst(0, 2, 1)),
        ins(2, 2, Op::Jsr { branch: 14 }),
        goto(5, 2, 20),
        exception_store(8, 2),
        ins(9, NO_LINE, Op::Jsr { branch: 7 }),
        athrow(12, aload(11, NO_LINE, 2)),
        ins(16, NO_LINE, Op::AStore { index: 3, valueref: Box::new(ins(16, NO_LINE, Op::ReturnAddressLoad)) }),
        istore(18, 3, 1, iconst(17, 3, 2)),
        ins(19, 3, Op::Ret { index: 3 }),
        ret(20, 4),
    ];
    let table = vec![entry(0, 2, 8, 0)];
    let ranges = aggregate_code_exceptions(&table, &list);
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].kind, RangeKind::FinallySubroutine);
    assert_eq!(ranges[0].finally_from_offset, 8);
}

#[test]
fn monitor_cleanup_handler_marks_synchronized() {
    let list = vec![
        astore(1, 2, 2, aload(0, 2, 1)),
        ins(2, 2, Op::MonitorEnter { objectref: Box::new(aload(2, 2, 2)) }),
        istore(5, 3, 1, iconst(4, 3, 1)),
        ins(7, 4, Op::MonitorExit { objectref: Box::new(aload(6, 4, 2)) }),
        goto(8, 4, 16),
        exception_store(11, 3),
        ins(13, NO_LINE, Op::MonitorExit { objectref: Box::new(aload(12, NO_LINE, 2)) }),
        athrow(15, aload(14, NO_LINE, 3)),
        ret(16, 5),
    ];
    let table = vec![entry(5, 7, 11, 0), entry(11, 15, 11, 0)];
    let ranges = aggregate_code_exceptions(&table, &list);
    // The handler's self-protecting entry folds away.
    assert_eq!(ranges.len(), 1);
    assert!(ranges[0].synchronized_flag);
    assert_eq!(ranges[0].finally_from_offset, 11);
    assert_eq!(ranges[0].after_offset, 16);
}

#[test]
fn unknown_handler_shape_falls_back_to_plain_catch() {
    // A catch-all handler that neither rethrows nor exits a monitor.
    let list = vec![
        istore(1, 2, 1, iconst(0, 2, 1)),
        goto(4, 2, 12),
        exception_store(7, 2),
        istore(10, 3, 1, iconst(9, 3, 2)),
        ret(12, 4),
    ];
    let table = vec![entry(0, 4, 7, 0)];
    let ranges = aggregate_code_exceptions(&table, &list);
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].kind, RangeKind::Catch);
    assert_eq!(ranges[0].finally_from_offset, -1);
    assert!(!ranges[0].synchronized_flag);
}

#[test]
fn ranges_order_outermost_first() {
    // Inner try nested in an outer try.
    let list = vec![
        istore(1, 2, 1, iconst(0, 2, 1)),
        istore(4, 3, 1, iconst(3, 3, 2)),
        goto(7, 3, 20),
        exception_store(10, 2),
        istore(13, 4, 1, iconst(12, 4, 3)),
        goto(14, 4, 20),
        exception_store(17, 3),
        istore(19, 5, 1, iconst(18, 5, 4)),
        ret(20, 6),
    ];
    let table = vec![entry(4, 7, 10, 30), entry(0, 14, 17, 31)];
    let ranges = aggregate_code_exceptions(&table, &list);
    assert_eq!(ranges.len(), 2);
    assert!(ranges[0].try_from_offset <= ranges[1].try_from_offset);
    assert!(ranges[0].try_to_offset >= ranges[1].try_to_offset || ranges[0].try_from_offset < ranges[1].try_from_offset);
    // Reverse iteration (the driver's order) sees the inner range first.
    assert_eq!(ranges[1].catches[0].type_index, 30);
}
